//! Per-season episode bookkeeping for TV shows.
//!
//! A [`SeasonLedger`] records which aired episodes of one season have been
//! confirmed, which failed, and which are still unprocessed. A [`ShowLedger`]
//! groups the seasons of one show and computes overall progress.

mod season;
mod show;

pub use season::{EpisodeOutcome, ReconcileOutcome, SeasonLedger, SeasonSnapshot, SeasonStatus};
pub use show::{show_progress, ShowLedger};

use thiserror::Error;

/// Reason recorded on a season whose provider-reported aired count went down.
pub const AIRED_COUNT_DECREASED: &str = "aired count decreased";

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LedgerError {
    /// The episode ordinal is not tracked by the season (zero, unaired, or unknown season).
    #[error("Episode {episode} is out of range for season {season} ({aired} aired)")]
    OutOfRangeEpisode {
        season: u32,
        episode: u32,
        aired: u32,
    },
}
