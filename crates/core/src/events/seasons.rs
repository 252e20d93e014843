use once_cell::sync::Lazy;
use regex_lite::Regex;

// "3", "Season 3", "S03", "1-3", "Season 1 - Season 3"
static SEASON_TOKEN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^\s*(?:season\s*|s)?(\d+)\s*(?:-\s*(?:season\s*|s)?(\d+))?\s*$").unwrap()
});

/// Parse a comma separated season list into sorted, unique season numbers.
/// Tokens that do not look like a season are skipped.
pub fn parse_season_list(value: &str) -> Vec<u32> {
    let mut seasons: Vec<u32> = value
        .split(',')
        .filter_map(|token| SEASON_TOKEN.captures(token))
        .flat_map(|caps| {
            let start: u32 = caps
                .get(1)
                .and_then(|m| m.as_str().parse().ok())
                .unwrap_or(0);
            let end: u32 = caps
                .get(2)
                .and_then(|m| m.as_str().parse().ok())
                .unwrap_or(start);
            if end >= start && end - start <= 100 {
                (start..=end).collect::<Vec<_>>()
            } else {
                vec![start]
            }
        })
        .filter(|&s| s > 0)
        .collect();
    seasons.sort_unstable();
    seasons.dedup();
    seasons
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_numbers() {
        assert_eq!(parse_season_list("1, 2, 3"), vec![1, 2, 3]);
    }

    #[test]
    fn test_prefixed_forms() {
        assert_eq!(parse_season_list("Season 1, season 4"), vec![1, 4]);
        assert_eq!(parse_season_list("S01,S10"), vec![1, 10]);
    }

    #[test]
    fn test_ranges_and_duplicates() {
        assert_eq!(parse_season_list("1-3, 2, Season 5 - Season 6"), vec![1, 2, 3, 5, 6]);
    }

    #[test]
    fn test_garbage_is_skipped() {
        assert_eq!(parse_season_list("Specials, 2, , x"), vec![2]);
        assert!(parse_season_list("").is_empty());
    }
}
