use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::{EpisodeOutcome, LedgerError, ReconcileOutcome, SeasonLedger, SeasonStatus};

/// All season ledgers of one show, keyed by season number.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ShowLedger {
    seasons: BTreeMap<u32, SeasonLedger>,
}

impl ShowLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.seasons.is_empty()
    }

    pub fn len(&self) -> usize {
        self.seasons.len()
    }

    pub fn season(&self, season_number: u32) -> Option<&SeasonLedger> {
        self.seasons.get(&season_number)
    }

    pub fn season_mut(&mut self, season_number: u32) -> Option<&mut SeasonLedger> {
        self.seasons.get_mut(&season_number)
    }

    /// Track a season the provider has not described yet.
    pub fn ensure_season(&mut self, season_number: u32) -> bool {
        if self.seasons.contains_key(&season_number) {
            return false;
        }
        self.seasons
            .insert(season_number, SeasonLedger::empty(season_number));
        true
    }

    pub fn seasons(&self) -> impl Iterator<Item = &SeasonLedger> {
        self.seasons.values()
    }

    pub fn seasons_mut(&mut self) -> impl Iterator<Item = &mut SeasonLedger> {
        self.seasons.values_mut()
    }

    /// Reconcile one season, creating its ledger the first time it is seen.
    pub fn reconcile_with_provider(
        &mut self,
        season_number: u32,
        provider_episode_count: u32,
        provider_aired_count: u32,
    ) -> ReconcileOutcome {
        self.seasons
            .entry(season_number)
            .or_insert_with(|| SeasonLedger::empty(season_number))
            .reconcile_with_provider(provider_episode_count, provider_aired_count)
    }

    pub fn mark_episodes(
        &mut self,
        season_number: u32,
        ordinals: &[u32],
        outcome: EpisodeOutcome,
    ) -> Result<(), LedgerError> {
        match self.seasons.get_mut(&season_number) {
            Some(season) => season.mark_episodes(ordinals, outcome),
            None => Err(LedgerError::OutOfRangeEpisode {
                season: season_number,
                episode: ordinals.first().copied().unwrap_or(0),
                aired: 0,
            }),
        }
    }

    /// Confirm every outstanding episode in every season.
    pub fn mark_all_complete(&mut self) -> usize {
        self.seasons
            .values_mut()
            .map(SeasonLedger::mark_season_complete)
            .sum()
    }

    /// True when every season that has aired anything is completed.
    /// Seasons that have not aired do not block completion.
    pub fn is_complete(&self) -> bool {
        let mut any_aired = false;
        for season in self.seasons.values() {
            match season.status() {
                SeasonStatus::NotAired => {}
                SeasonStatus::Completed => any_aired = true,
                _ => return false,
            }
        }
        any_aired
    }

    /// Whether any season still has episodes waiting to be fetched.
    pub fn has_outstanding(&self) -> bool {
        self.seasons
            .values()
            .any(|s| matches!(s.status(), SeasonStatus::Processing | SeasonStatus::Failed))
    }

    pub fn seasons_with_status(&self, status: SeasonStatus) -> Vec<u32> {
        self.seasons
            .values()
            .filter(|s| s.status() == status)
            .map(|s| s.season_number)
            .collect()
    }

    pub fn discrepant_seasons(&self) -> Vec<u32> {
        self.seasons
            .values()
            .filter(|s| s.is_discrepant)
            .map(|s| s.season_number)
            .collect()
    }

    pub fn progress(&self) -> u8 {
        show_progress(self.seasons.values())
    }
}

/// Percentage of episodes confirmed across seasons, rounded to the nearest
/// integer. Seasons with no known episodes do not count; 0 when nothing is known.
pub fn show_progress<'a>(seasons: impl IntoIterator<Item = &'a SeasonLedger>) -> u8 {
    let (confirmed, total) = seasons
        .into_iter()
        .filter(|s| s.episode_count > 0)
        .fold((0u64, 0u64), |(c, t), s| {
            (
                c + s.confirmed_episodes().len() as u64,
                t + u64::from(s.episode_count),
            )
        });
    if total == 0 {
        return 0;
    }
    ((confirmed * 100 + total / 2) / total).min(100) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_scenario_forty_percent() {
        let mut show = ShowLedger::new();
        show.reconcile_with_provider(1, 10, 4);
        show.mark_episodes(1, &[1, 2, 3, 4], EpisodeOutcome::Confirmed)
            .unwrap();
        assert_eq!(show.season(1).unwrap().status(), SeasonStatus::Completed);
        assert_eq!(show.progress(), 40);

        show.reconcile_with_provider(1, 10, 6);
        let season = show.season(1).unwrap();
        assert_eq!(season.status(), SeasonStatus::Processing);
        assert_eq!(
            season.unprocessed_episodes().iter().copied().collect::<Vec<_>>(),
            vec![5, 6]
        );
        assert_eq!(show.progress(), 40);
    }

    #[test]
    fn test_ensure_season_keeps_existing_progress() {
        let mut show = ShowLedger::new();
        show.reconcile_with_provider(1, 4, 4);
        show.mark_episodes(1, &[1, 2], EpisodeOutcome::Confirmed)
            .unwrap();

        assert!(!show.ensure_season(1));
        assert_eq!(show.season(1).unwrap().confirmed_episodes().len(), 2);

        assert!(show.ensure_season(2));
        assert_eq!(show.season(2).unwrap().status(), SeasonStatus::NotAired);
        assert_eq!(show.len(), 2);
    }

    #[test]
    fn test_progress_zero_denominator() {
        let mut show = ShowLedger::new();
        assert_eq!(show.progress(), 0);
        show.reconcile_with_provider(1, 0, 0);
        assert_eq!(show.progress(), 0);
    }

    #[test]
    fn test_progress_rounds_across_seasons() {
        let mut show = ShowLedger::new();
        show.reconcile_with_provider(1, 3, 3);
        show.reconcile_with_provider(2, 0, 0);
        show.mark_episodes(1, &[1], EpisodeOutcome::Confirmed).unwrap();
        // 1/3 = 33.3 -> 33
        assert_eq!(show.progress(), 33);
        show.mark_episodes(1, &[2], EpisodeOutcome::Confirmed).unwrap();
        // 2/3 = 66.7 -> 67
        assert_eq!(show.progress(), 67);
    }

    #[test]
    fn test_unknown_season_is_out_of_range() {
        let mut show = ShowLedger::new();
        let err = show
            .mark_episodes(7, &[1], EpisodeOutcome::Confirmed)
            .unwrap_err();
        assert!(matches!(err, LedgerError::OutOfRangeEpisode { season: 7, .. }));
    }

    #[test]
    fn test_is_complete_ignores_unaired_seasons() {
        let mut show = ShowLedger::new();
        show.reconcile_with_provider(1, 2, 2);
        show.reconcile_with_provider(2, 8, 0);
        assert!(!show.is_complete());
        show.mark_all_complete();
        assert!(show.is_complete());
        assert_eq!(show.seasons_with_status(SeasonStatus::NotAired), vec![2]);
    }

    #[test]
    fn test_serializes_as_map() {
        let mut show = ShowLedger::new();
        show.reconcile_with_provider(1, 2, 1);
        let json = serde_json::to_string(&show).unwrap();
        let back: ShowLedger = serde_json::from_str(&json).unwrap();
        assert_eq!(back, show);
    }
}
