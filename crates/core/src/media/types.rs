use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ledger::{SeasonSnapshot, SeasonStatus, ShowLedger};
use crate::retry::{RetryPolicy, RetryState};

/// Kind of media a record tracks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    Movie,
    #[serde(alias = "tv")]
    Show,
}

impl MediaKind {
    pub const ALL: [MediaKind; 2] = [MediaKind::Movie, MediaKind::Show];

    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Movie => "movie",
            MediaKind::Show => "show",
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MediaKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "movie" | "movies" => Ok(MediaKind::Movie),
            "show" | "tv" | "series" => Ok(MediaKind::Show),
            other => Err(format!("unknown media kind: {}", other)),
        }
    }
}

/// Lifecycle status of a media record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Skipped,
    Cancelled,
    Ignored,
}

impl MediaStatus {
    pub const ALL: [MediaStatus; 7] = [
        MediaStatus::Pending,
        MediaStatus::Processing,
        MediaStatus::Completed,
        MediaStatus::Failed,
        MediaStatus::Skipped,
        MediaStatus::Cancelled,
        MediaStatus::Ignored,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MediaStatus::Pending => "pending",
            MediaStatus::Processing => "processing",
            MediaStatus::Completed => "completed",
            MediaStatus::Failed => "failed",
            MediaStatus::Skipped => "skipped",
            MediaStatus::Cancelled => "cancelled",
            MediaStatus::Ignored => "ignored",
        }
    }

    /// Whether the lifecycle allows moving from `self` to `next`.
    pub fn can_transition_to(&self, next: MediaStatus) -> bool {
        use MediaStatus::*;

        if *self == next {
            return false;
        }
        match (*self, next) {
            (Ignored, Pending) => true,
            (Ignored, _) => false,
            (_, Ignored) => true,
            (Pending, _) => true,
            (Processing, _) => true,
            (Failed, Processing | Pending | Completed) => true,
            (Completed, Processing | Pending) => true,
            (Skipped | Cancelled, Pending | Completed) => true,
            _ => false,
        }
    }

    /// Statuses the dispatch queue may hold an entry for.
    pub fn is_dispatchable(&self) -> bool {
        matches!(self, MediaStatus::Pending | MediaStatus::Processing)
    }
}

impl fmt::Display for MediaStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MediaStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MediaStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| format!("unknown media status: {}", s))
    }
}

/// Status shown to operators, refined from the lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisplayStatus {
    Pending,
    Processing,
    Completed,
    PartiallyCompleted,
    Unreleased,
    Failed,
    Skipped,
    Cancelled,
    Ignored,
}

/// Secondary identifiers for a title.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalIds {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub imdb: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tvdb: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trakt: Option<String>,
}

impl ExternalIds {
    /// Fill ids this set is missing from `other`.
    pub fn merge_missing(&mut self, other: &ExternalIds) {
        if self.imdb.is_none() {
            self.imdb = other.imdb.clone();
        }
        if self.tvdb.is_none() {
            self.tvdb = other.tvdb;
        }
        if self.trakt.is_none() {
            self.trakt = other.trakt.clone();
        }
    }
}

/// Identifiers the upstream request service uses for this title.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpstreamIds {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_id: Option<u64>,
}

/// Attempted lifecycle move the table does not allow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidTransition {
    pub from: MediaStatus,
    pub to: MediaStatus,
}

impl fmt::Display for InvalidTransition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cannot move from {} to {}", self.from, self.to)
    }
}

impl std::error::Error for InvalidTransition {}

/// The unified lifecycle record for one requested title.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaRecord {
    /// Store-assigned id; 0 until inserted.
    pub id: i64,
    /// TMDB id.
    pub provider_id: u64,
    pub kind: MediaKind,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year: Option<i32>,
    #[serde(default)]
    pub external_ids: ExternalIds,
    #[serde(default)]
    pub upstream: UpstreamIds,
    pub status: MediaStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processing_stage: Option<String>,

    pub error_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(default)]
    pub retry: RetryState,

    pub request_count: u32,
    pub first_requested_at: DateTime<Utc>,
    pub last_requested_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requested_by: Option<String>,

    #[serde(default)]
    pub subscription_active: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subscription_last_checked: Option<DateTime<Utc>>,

    /// Seasons explicitly requested; empty means the whole show.
    #[serde(default)]
    pub requested_seasons: Vec<u32>,
    #[serde(default)]
    pub seasons: ShowLedger,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processing_started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processing_completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl MediaRecord {
    /// A fresh pending record for a first request.
    pub fn new(provider_id: u64, kind: MediaKind, title: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: 0,
            provider_id,
            kind,
            title: title.into(),
            year: None,
            external_ids: ExternalIds::default(),
            upstream: UpstreamIds::default(),
            status: MediaStatus::Pending,
            processing_stage: None,
            error_count: 0,
            last_error_at: None,
            error_message: None,
            retry: RetryState::default(),
            request_count: 1,
            first_requested_at: now,
            last_requested_at: now,
            requested_by: None,
            subscription_active: false,
            subscription_last_checked: None,
            requested_seasons: Vec::new(),
            seasons: ShowLedger::new(),
            processing_started_at: None,
            processing_completed_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_show(&self) -> bool {
        self.kind == MediaKind::Show
    }

    /// Move to `next`, stamping the lifecycle timestamps. Returns the previous status.
    pub fn transition_to(
        &mut self,
        next: MediaStatus,
        now: DateTime<Utc>,
    ) -> Result<MediaStatus, InvalidTransition> {
        let from = self.status;
        if !from.can_transition_to(next) {
            return Err(InvalidTransition { from, to: next });
        }
        self.status = next;
        self.updated_at = now;
        match next {
            MediaStatus::Processing => {
                self.processing_started_at = Some(now);
                self.processing_completed_at = None;
            }
            MediaStatus::Completed => {
                self.processing_completed_at = Some(now);
                self.processing_stage = None;
            }
            _ => {}
        }
        Ok(from)
    }

    /// Count a failed attempt. Error history accumulates; it is never cleared here.
    pub fn record_failure(
        &mut self,
        message: impl Into<String>,
        policy: &RetryPolicy,
        now: DateTime<Utc>,
    ) {
        self.error_count = self.error_count.saturating_add(1);
        self.error_message = Some(message.into());
        self.last_error_at = Some(now);
        self.retry.record_failure(policy, now);
    }

    /// Count a repeat request for the same title.
    pub fn record_request(&mut self, requested_by: Option<String>, now: DateTime<Utc>) {
        self.request_count = self.request_count.saturating_add(1);
        self.last_requested_at = now;
        if requested_by.is_some() {
            self.requested_by = requested_by;
        }
        self.updated_at = now;
    }

    /// Add seasons to the requested set, keeping it sorted and unique.
    /// Returns the seasons that were not requested before.
    pub fn add_requested_seasons(&mut self, seasons: &[u32]) -> Vec<u32> {
        let mut added = Vec::new();
        for &s in seasons {
            if !self.requested_seasons.contains(&s) {
                self.requested_seasons.push(s);
                added.push(s);
            }
        }
        self.requested_seasons.sort_unstable();
        added
    }

    /// Whether retry eligibility has been reached under `policy`.
    pub fn is_retry_eligible(&self, policy: &RetryPolicy, now: DateTime<Utc>) -> bool {
        if self.status != MediaStatus::Failed {
            return false;
        }
        match self.last_error_at {
            Some(at) => policy.is_eligible(self.retry.attempt_count, at, now),
            None => !policy.is_exhausted(self.retry.attempt_count),
        }
    }

    /// Completion percentage: confirmed episodes for shows, all-or-nothing for movies.
    pub fn progress(&self) -> u8 {
        match self.kind {
            MediaKind::Movie => {
                if self.status == MediaStatus::Completed {
                    100
                } else {
                    0
                }
            }
            MediaKind::Show => {
                if self.seasons.is_empty() && self.status == MediaStatus::Completed {
                    100
                } else {
                    self.seasons.progress()
                }
            }
        }
    }

    pub fn display_status(&self) -> DisplayStatus {
        match self.status {
            MediaStatus::Pending if self.is_show() && self.all_requested_unaired() => {
                DisplayStatus::Unreleased
            }
            MediaStatus::Pending => DisplayStatus::Pending,
            MediaStatus::Processing => DisplayStatus::Processing,
            MediaStatus::Completed => DisplayStatus::Completed,
            MediaStatus::Failed
                if self.is_show()
                    && !self
                        .seasons
                        .seasons_with_status(SeasonStatus::Completed)
                        .is_empty() =>
            {
                DisplayStatus::PartiallyCompleted
            }
            MediaStatus::Failed => DisplayStatus::Failed,
            MediaStatus::Skipped => DisplayStatus::Skipped,
            MediaStatus::Cancelled => DisplayStatus::Cancelled,
            MediaStatus::Ignored => DisplayStatus::Ignored,
        }
    }

    pub fn season_snapshots(&self) -> Vec<SeasonSnapshot> {
        self.seasons.seasons().map(|s| s.snapshot()).collect()
    }

    fn all_requested_unaired(&self) -> bool {
        let relevant: Vec<_> = self
            .seasons
            .seasons()
            .filter(|s| {
                self.requested_seasons.is_empty() || self.requested_seasons.contains(&s.season_number)
            })
            .collect();
        !relevant.is_empty()
            && relevant
                .iter()
                .all(|s| s.status() == SeasonStatus::NotAired)
    }
}
