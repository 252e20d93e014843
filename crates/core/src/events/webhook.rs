use serde::Deserialize;
use serde_json::{Map, Value};

use super::{parse_season_list, EventError, InboundRequest};
use crate::media::{ExternalIds, MediaKind};

/// Identifier that templates send either as a number or as a string.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum FlexibleId {
    Number(u64),
    Text(String),
}

impl FlexibleId {
    /// `None` for empty strings.
    pub fn parse(&self, field: &'static str) -> Result<Option<u64>, EventError> {
        match self {
            FlexibleId::Number(n) => Ok(Some(*n)),
            FlexibleId::Text(s) if s.trim().is_empty() => Ok(None),
            FlexibleId::Text(s) => {
                s.trim()
                    .parse()
                    .map(Some)
                    .map_err(|_| EventError::InvalidId {
                        field,
                        value: s.clone(),
                    })
            }
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebhookMedia {
    pub media_type: String,
    #[serde(rename = "tmdbId", default)]
    pub tmdb_id: Option<FlexibleId>,
    #[serde(rename = "tvdbId", default)]
    pub tvdb_id: Option<FlexibleId>,
    #[serde(rename = "imdbId", default)]
    pub imdb_id: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebhookRequest {
    #[serde(default)]
    pub request_id: Option<FlexibleId>,
    #[serde(rename = "requestedBy_username", default)]
    pub requested_by_username: Option<String>,
    #[serde(rename = "requestedBy_email", default)]
    pub requested_by_email: Option<String>,
}

/// One element of the `extra` array.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ExtraItem {
    /// `{"requested_seasons": [1, 2]}`
    RequestedSeasons { requested_seasons: Vec<u32> },
    /// `{"name": "Requested Seasons", "value": "1, 2"}`
    Named { name: String, value: String },
    Other(Value),
}

/// The `extra` field is a list in most templates and an object in some.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum WebhookExtra {
    Items(Vec<ExtraItem>),
    Object(Map<String, Value>),
}

/// Raw request-service webhook body.
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookPayload {
    pub notification_type: String,
    #[serde(default)]
    pub event: Option<String>,
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub media: Option<WebhookMedia>,
    #[serde(default)]
    pub request: Option<WebhookRequest>,
    #[serde(default)]
    pub extra: Option<WebhookExtra>,
}

/// Classified webhook.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookEvent {
    Test,
    /// Pending, approved or auto-approved request.
    Request(InboundRequest),
    /// The request was declined upstream.
    Declined { provider_id: u64, kind: MediaKind },
    /// A notification type this service does not act on.
    Unsupported { notification_type: String },
}

const REQUEST_TYPES: &[&str] = &[
    "MEDIA_PENDING",
    "MEDIA_APPROVED",
    "MEDIA_AUTO_APPROVED",
    "MEDIA_AUTO_REQUESTED",
];

impl WebhookPayload {
    pub fn classify(&self) -> Result<WebhookEvent, EventError> {
        let kind = self.notification_type.as_str();
        if kind == "TEST_NOTIFICATION" {
            return Ok(WebhookEvent::Test);
        }
        if REQUEST_TYPES.contains(&kind) {
            return self.normalize().map(WebhookEvent::Request);
        }
        if kind == "MEDIA_DECLINED" {
            let request = self.normalize()?;
            return Ok(WebhookEvent::Declined {
                provider_id: request.provider_id,
                kind: request.kind,
            });
        }
        Ok(WebhookEvent::Unsupported {
            notification_type: self.notification_type.clone(),
        })
    }

    /// Reduce the payload to the canonical request form.
    pub fn normalize(&self) -> Result<InboundRequest, EventError> {
        let media = self.media.as_ref().ok_or(EventError::MissingMedia)?;
        let kind: MediaKind = media
            .media_type
            .parse()
            .map_err(|_| EventError::UnsupportedKind(media.media_type.clone()))?;
        let provider_id = media
            .tmdb_id
            .as_ref()
            .map(|id| id.parse("tmdbId"))
            .transpose()?
            .flatten()
            .ok_or(EventError::InvalidId {
                field: "tmdbId",
                value: String::new(),
            })?;

        let tvdb = media
            .tvdb_id
            .as_ref()
            .map(|id| id.parse("tvdbId"))
            .transpose()?
            .flatten();

        let upstream_request_id = self
            .request
            .as_ref()
            .and_then(|r| r.request_id.as_ref())
            .map(|id| id.parse("request_id"))
            .transpose()?
            .flatten();

        let requested_by = self.request.as_ref().and_then(|r| {
            r.requested_by_username
                .clone()
                .or_else(|| r.requested_by_email.clone())
        });

        let seasons = match kind {
            MediaKind::Show => self.requested_seasons(),
            MediaKind::Movie => Vec::new(),
        };

        let (title, year) = self
            .subject
            .as_deref()
            .map(split_title_year)
            .unwrap_or((None, None));

        Ok(InboundRequest {
            provider_id,
            kind,
            seasons,
            title,
            year,
            requested_by,
            upstream_request_id,
            upstream_media_id: None,
            external_ids: ExternalIds {
                imdb: media.imdb_id.clone().filter(|s| !s.is_empty()),
                tvdb,
                trakt: None,
            },
        })
    }

    /// Requested seasons, tried in order: a `requested_seasons` list item,
    /// a "Requested Seasons" name/value item, a `requested_seasons` key on an
    /// object-shaped extra. Empty when none applies.
    pub fn requested_seasons(&self) -> Vec<u32> {
        let Some(extra) = &self.extra else {
            return Vec::new();
        };
        seasons_from_list_item(extra)
            .or_else(|| seasons_from_named_item(extra))
            .or_else(|| seasons_from_object(extra))
            .unwrap_or_default()
    }
}

fn seasons_from_list_item(extra: &WebhookExtra) -> Option<Vec<u32>> {
    let WebhookExtra::Items(items) = extra else {
        return None;
    };
    items.iter().find_map(|item| match item {
        ExtraItem::RequestedSeasons { requested_seasons } => Some(sorted_unique(requested_seasons)),
        _ => None,
    })
}

fn seasons_from_named_item(extra: &WebhookExtra) -> Option<Vec<u32>> {
    let WebhookExtra::Items(items) = extra else {
        return None;
    };
    items.iter().find_map(|item| match item {
        ExtraItem::Named { name, value } if name.eq_ignore_ascii_case("Requested Seasons") => {
            Some(parse_season_list(value))
        }
        _ => None,
    })
}

fn seasons_from_object(extra: &WebhookExtra) -> Option<Vec<u32>> {
    let WebhookExtra::Object(map) = extra else {
        return None;
    };
    match map.get("requested_seasons")? {
        Value::Array(values) => {
            let seasons: Vec<u32> = values
                .iter()
                .filter_map(|v| match v {
                    Value::Number(n) => n.as_u64().and_then(|n| u32::try_from(n).ok()),
                    Value::String(s) => parse_season_list(s).first().copied(),
                    _ => None,
                })
                .collect();
            Some(sorted_unique(&seasons))
        }
        Value::String(s) => Some(parse_season_list(s)),
        _ => None,
    }
}

fn sorted_unique(seasons: &[u32]) -> Vec<u32> {
    let mut out: Vec<u32> = seasons.iter().copied().filter(|&s| s > 0).collect();
    out.sort_unstable();
    out.dedup();
    out
}

/// "Title (2019)" -> ("Title", 2019)
fn split_title_year(subject: &str) -> (Option<String>, Option<i32>) {
    let subject = subject.trim();
    if subject.is_empty() {
        return (None, None);
    }
    if let Some(open) = subject.rfind('(') {
        if let Some(inner) = subject[open + 1..].strip_suffix(')') {
            if let Ok(year) = inner.trim().parse::<i32>() {
                let title = subject[..open].trim();
                if !title.is_empty() {
                    return (Some(title.to_string()), Some(year));
                }
            }
        }
    }
    (Some(subject.to_string()), None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(value: Value) -> WebhookPayload {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_test_notification() {
        let payload = parse(json!({
            "notification_type": "TEST_NOTIFICATION",
            "subject": "Test Notification"
        }));
        assert_eq!(payload.classify().unwrap(), WebhookEvent::Test);
    }

    #[test]
    fn test_movie_request_with_string_ids() {
        let payload = parse(json!({
            "notification_type": "MEDIA_AUTO_APPROVED",
            "event": "Movie Request Automatically Approved",
            "subject": "The Matrix (1999)",
            "media": { "media_type": "movie", "tmdbId": "603", "tvdbId": "" },
            "request": { "request_id": "42", "requestedBy_username": "neo" },
            "extra": []
        }));
        let WebhookEvent::Request(request) = payload.classify().unwrap() else {
            panic!("expected request");
        };
        assert_eq!(request.provider_id, 603);
        assert_eq!(request.kind, MediaKind::Movie);
        assert_eq!(request.upstream_request_id, Some(42));
        assert_eq!(request.requested_by.as_deref(), Some("neo"));
        assert_eq!(request.title.as_deref(), Some("The Matrix"));
        assert_eq!(request.year, Some(1999));
        assert!(request.external_ids.tvdb.is_none());
        assert!(request.seasons.is_empty());
    }

    #[test]
    fn test_tv_seasons_from_list_item() {
        let payload = parse(json!({
            "notification_type": "MEDIA_PENDING",
            "media": { "media_type": "tv", "tmdbId": 1399 },
            "extra": [ { "requested_seasons": [3, 1, 3] } ]
        }));
        let request = payload.normalize().unwrap();
        assert_eq!(request.kind, MediaKind::Show);
        assert_eq!(request.seasons, vec![1, 3]);
    }

    #[test]
    fn test_tv_seasons_from_named_item() {
        let payload = parse(json!({
            "notification_type": "MEDIA_APPROVED",
            "media": { "media_type": "tv", "tmdbId": "1399" },
            "extra": [
                { "name": "Something Else", "value": "x" },
                { "name": "Requested Seasons", "value": "Season 1, Season 2" }
            ]
        }));
        assert_eq!(payload.normalize().unwrap().seasons, vec![1, 2]);
    }

    #[test]
    fn test_list_item_takes_precedence_over_named_item() {
        let payload = parse(json!({
            "notification_type": "MEDIA_APPROVED",
            "media": { "media_type": "tv", "tmdbId": 1 },
            "extra": [
                { "name": "Requested Seasons", "value": "5" },
                { "requested_seasons": [2] }
            ]
        }));
        assert_eq!(payload.normalize().unwrap().seasons, vec![2]);
    }

    #[test]
    fn test_tv_seasons_from_object_extra() {
        let payload = parse(json!({
            "notification_type": "MEDIA_APPROVED",
            "media": { "media_type": "tv", "tmdbId": 1 },
            "extra": { "requested_seasons": ["Season 4", 2] }
        }));
        assert_eq!(payload.normalize().unwrap().seasons, vec![2, 4]);
    }

    #[test]
    fn test_missing_media_is_error() {
        let payload = parse(json!({ "notification_type": "MEDIA_PENDING" }));
        assert_eq!(payload.classify().unwrap_err(), EventError::MissingMedia);
    }

    #[test]
    fn test_bad_tmdb_id_is_error() {
        let payload = parse(json!({
            "notification_type": "MEDIA_PENDING",
            "media": { "media_type": "movie", "tmdbId": "abc" }
        }));
        assert!(matches!(
            payload.normalize().unwrap_err(),
            EventError::InvalidId { field: "tmdbId", .. }
        ));
    }

    #[test]
    fn test_unknown_media_type() {
        let payload = parse(json!({
            "notification_type": "MEDIA_PENDING",
            "media": { "media_type": "music", "tmdbId": 1 }
        }));
        assert_eq!(
            payload.normalize().unwrap_err(),
            EventError::UnsupportedKind("music".to_string())
        );
    }

    #[test]
    fn test_declined_and_unsupported() {
        let declined = parse(json!({
            "notification_type": "MEDIA_DECLINED",
            "media": { "media_type": "movie", "tmdbId": 9 }
        }));
        assert_eq!(
            declined.classify().unwrap(),
            WebhookEvent::Declined {
                provider_id: 9,
                kind: MediaKind::Movie
            }
        );

        let other = parse(json!({ "notification_type": "ISSUE_CREATED" }));
        assert!(matches!(
            other.classify().unwrap(),
            WebhookEvent::Unsupported { .. }
        ));
    }
}
