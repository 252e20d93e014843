use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{LedgerError, AIRED_COUNT_DECREASED};

/// Derived status of a single season.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SeasonStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    NotAired,
}

impl SeasonStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SeasonStatus::Pending => "pending",
            SeasonStatus::Processing => "processing",
            SeasonStatus::Completed => "completed",
            SeasonStatus::Failed => "failed",
            SeasonStatus::NotAired => "not_aired",
        }
    }
}

/// Outcome the fetch backend reports for a set of episodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EpisodeOutcome {
    Confirmed,
    Failed,
}

/// What a provider reconciliation did to the ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// Aired count unchanged.
    Unchanged,
    /// These ordinals aired since the last reconciliation and are now unprocessed.
    NewlyAired(Vec<u32>),
    /// The provider reported fewer aired episodes than previously recorded.
    /// Nothing was moved; the season is flagged.
    Shrunk { recorded: u32, reported: u32 },
}

/// Per-season truth about which aired episodes have been fetched.
///
/// Every aired ordinal `1..=aired_episodes` lives in exactly one of the
/// confirmed, failed or unprocessed sets. Unaired ordinals are never stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeasonLedger {
    pub season_number: u32,
    pub episode_count: u32,
    pub aired_episodes: u32,
    confirmed_episodes: BTreeSet<u32>,
    failed_episodes: BTreeSet<u32>,
    unprocessed_episodes: BTreeSet<u32>,
    #[serde(default)]
    pub is_discrepant: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub discrepancy_reason: Option<String>,
    /// Aired count the provider reported when the discrepancy was flagged.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_reported_aired: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_checked_at: Option<DateTime<Utc>>,
}

impl SeasonLedger {
    /// Create a season with every aired episode unprocessed.
    pub fn new(season_number: u32, episode_count: u32, aired_episodes: u32) -> Self {
        Self {
            season_number,
            episode_count: episode_count.max(aired_episodes),
            aired_episodes,
            confirmed_episodes: BTreeSet::new(),
            failed_episodes: BTreeSet::new(),
            unprocessed_episodes: (1..=aired_episodes).collect(),
            is_discrepant: false,
            discrepancy_reason: None,
            provider_reported_aired: None,
            last_checked_at: None,
        }
    }

    /// Create a season not yet known to the provider.
    pub fn empty(season_number: u32) -> Self {
        Self::new(season_number, 0, 0)
    }

    pub fn confirmed_episodes(&self) -> &BTreeSet<u32> {
        &self.confirmed_episodes
    }

    pub fn failed_episodes(&self) -> &BTreeSet<u32> {
        &self.failed_episodes
    }

    pub fn unprocessed_episodes(&self) -> &BTreeSet<u32> {
        &self.unprocessed_episodes
    }

    /// Ordinals announced by the provider but not aired yet.
    pub fn unaired_episodes(&self) -> Vec<u32> {
        (self.aired_episodes.saturating_add(1)..=self.episode_count).collect()
    }

    /// Apply freshly fetched provider counts.
    ///
    /// A lower aired count than recorded flags the season and moves nothing;
    /// the recorded aired count is kept so tracked episodes stay in range.
    pub fn reconcile_with_provider(
        &mut self,
        provider_episode_count: u32,
        provider_aired_count: u32,
    ) -> ReconcileOutcome {
        self.last_checked_at = Some(Utc::now());
        let recorded = self.aired_episodes;

        if provider_aired_count < recorded {
            self.is_discrepant = true;
            self.discrepancy_reason = Some(AIRED_COUNT_DECREASED.to_string());
            self.provider_reported_aired = Some(provider_aired_count);
            self.episode_count = provider_episode_count.max(recorded);
            return ReconcileOutcome::Shrunk {
                recorded,
                reported: provider_aired_count,
            };
        }

        self.episode_count = provider_episode_count.max(provider_aired_count);

        if provider_aired_count == recorded {
            return ReconcileOutcome::Unchanged;
        }

        let newly_aired: Vec<u32> = (recorded + 1..=provider_aired_count).collect();
        self.unprocessed_episodes.extend(newly_aired.iter().copied());
        self.aired_episodes = provider_aired_count;
        ReconcileOutcome::NewlyAired(newly_aired)
    }

    /// Move episodes into the confirmed or failed set.
    ///
    /// All ordinals are validated before anything moves.
    pub fn mark_episodes(
        &mut self,
        ordinals: &[u32],
        outcome: EpisodeOutcome,
    ) -> Result<(), LedgerError> {
        if let Some(&bad) = ordinals.iter().find(|&&ep| !self.is_tracked(ep)) {
            return Err(LedgerError::OutOfRangeEpisode {
                season: self.season_number,
                episode: bad,
                aired: self.aired_episodes,
            });
        }

        for &ep in ordinals {
            self.confirmed_episodes.remove(&ep);
            self.failed_episodes.remove(&ep);
            self.unprocessed_episodes.remove(&ep);
            match outcome {
                EpisodeOutcome::Confirmed => self.confirmed_episodes.insert(ep),
                EpisodeOutcome::Failed => self.failed_episodes.insert(ep),
            };
        }
        Ok(())
    }

    /// Confirm every failed or unprocessed episode. Returns how many moved.
    pub fn mark_season_complete(&mut self) -> usize {
        let moved: Vec<u32> = self
            .failed_episodes
            .iter()
            .chain(self.unprocessed_episodes.iter())
            .copied()
            .collect();
        self.failed_episodes.clear();
        self.unprocessed_episodes.clear();
        self.confirmed_episodes.extend(moved.iter().copied());
        moved.len()
    }

    /// Clear the discrepancy flag after operator review.
    pub fn acknowledge_discrepancy(&mut self) -> bool {
        let was = self.is_discrepant;
        self.is_discrepant = false;
        self.discrepancy_reason = None;
        self.provider_reported_aired = None;
        was
    }

    pub fn status(&self) -> SeasonStatus {
        if self.aired_episodes == 0 {
            return SeasonStatus::NotAired;
        }
        if self.unprocessed_episodes.is_empty()
            && self.failed_episodes.is_empty()
            && (1..=self.aired_episodes).all(|ep| self.confirmed_episodes.contains(&ep))
        {
            return SeasonStatus::Completed;
        }
        if !self.failed_episodes.is_empty() && self.unprocessed_episodes.is_empty() {
            return SeasonStatus::Failed;
        }
        if !self.unprocessed_episodes.is_empty() {
            return SeasonStatus::Processing;
        }
        SeasonStatus::Pending
    }

    /// Episodes still needing a fetch attempt (unprocessed, then failed).
    pub fn outstanding_episodes(&self) -> Vec<u32> {
        let mut eps: Vec<u32> = self
            .unprocessed_episodes
            .union(&self.failed_episodes)
            .copied()
            .collect();
        eps.sort_unstable();
        eps
    }

    pub fn snapshot(&self) -> SeasonSnapshot {
        SeasonSnapshot {
            season_number: self.season_number,
            episode_count: self.episode_count,
            aired_episodes: self.aired_episodes,
            status: self.status(),
            confirmed_episodes: self.confirmed_episodes.iter().copied().collect(),
            failed_episodes: self.failed_episodes.iter().copied().collect(),
            unprocessed_episodes: self.unprocessed_episodes.iter().copied().collect(),
            unaired_episodes: self.unaired_episodes(),
            is_discrepant: self.is_discrepant,
            discrepancy_reason: self.discrepancy_reason.clone(),
        }
    }

    fn is_tracked(&self, ep: u32) -> bool {
        self.confirmed_episodes.contains(&ep)
            || self.failed_episodes.contains(&ep)
            || self.unprocessed_episodes.contains(&ep)
    }
}

/// Read-only view of a season including derived fields.
#[derive(Debug, Clone, Serialize)]
pub struct SeasonSnapshot {
    pub season_number: u32,
    pub episode_count: u32,
    pub aired_episodes: u32,
    pub status: SeasonStatus,
    pub confirmed_episodes: Vec<u32>,
    pub failed_episodes: Vec<u32>,
    pub unprocessed_episodes: Vec<u32>,
    pub unaired_episodes: Vec<u32>,
    pub is_discrepant: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub discrepancy_reason: Option<String>,
}
