//! Operator commands, bulk commands and read-side queries.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use tracing::{info, warn};

use super::{
    BulkResult, ClearOutcome, GatewayError, GatewayStats, ReconciliationGateway, SkipOutcome,
    SCAN_LIMIT,
};
use crate::audit::AuditEvent;
use crate::ledger::EpisodeOutcome;
use crate::media::{MediaFilter, MediaKind, MediaRecord, MediaStatus};
use crate::queue::QueueEntry;

/// Error message recorded on records skipped out of the queue.
pub const SKIPPED_BY_OPERATOR: &str = "skipped by operator";

impl ReconciliationGateway {
    /// Mark a whole record, one season, or some episodes of a season as done.
    ///
    /// The record completes when nothing aired is left outstanding.
    pub async fn mark_complete(
        &self,
        media_id: i64,
        season: Option<u32>,
        episodes: Option<Vec<u32>>,
    ) -> Result<MediaRecord, GatewayError> {
        if season.is_none() && episodes.is_some() {
            return Err(GatewayError::InvalidRequest(
                "episodes require a season".to_string(),
            ));
        }

        let _guard = self.record_locks.lock(media_id).await;
        let mut record = self.load(media_id)?;
        if record.status == MediaStatus::Ignored {
            return Err(GatewayError::InvalidTransition(format!(
                "media {} is ignored",
                media_id
            )));
        }

        let mut events = Vec::new();
        let completes = match (record.kind, season, episodes) {
            (MediaKind::Movie, Some(_), _) => {
                return Err(GatewayError::InvalidRequest(
                    "movies have no seasons".to_string(),
                ));
            }
            (MediaKind::Movie, None, _) => true,
            (MediaKind::Show, None, _) => {
                record.seasons.mark_all_complete();
                true
            }
            (MediaKind::Show, Some(number), None) => {
                let ledger = record.seasons.season_mut(number).ok_or_else(|| {
                    GatewayError::InvalidRequest(format!("season {} is not tracked", number))
                })?;
                ledger.mark_season_complete();
                events.push(AuditEvent::EpisodesMarked {
                    media_id,
                    season: number,
                    episodes: Vec::new(),
                    outcome: "season_complete".to_string(),
                });
                record.seasons.is_complete()
            }
            (MediaKind::Show, Some(number), Some(episodes)) => {
                record
                    .seasons
                    .mark_episodes(number, &episodes, EpisodeOutcome::Confirmed)?;
                events.push(AuditEvent::EpisodesMarked {
                    media_id,
                    season: number,
                    episodes,
                    outcome: "confirmed".to_string(),
                });
                record.seasons.is_complete()
            }
        };

        let completed = completes && record.status != MediaStatus::Completed;
        if completed {
            Self::transition(
                &mut record,
                MediaStatus::Completed,
                "marked complete by operator",
                &mut events,
            )?;
            self.dequeue(media_id);
            record.retry.next_eligible_at = None;
        }

        self.save(&mut record, events).await?;
        if completed {
            self.post_mark_available(&record);
        }
        Ok(record)
    }

    /// Reset retry bookkeeping and queue the record again.
    pub async fn retrigger(&self, media_id: i64) -> Result<MediaRecord, GatewayError> {
        let _guard = self.record_locks.lock(media_id).await;
        let mut record = self.load(media_id)?;
        if record.status == MediaStatus::Ignored {
            return Err(GatewayError::InvalidTransition(format!(
                "media {} is ignored",
                media_id
            )));
        }
        if self.queue.contains(media_id) {
            return Err(GatewayError::AlreadyQueued(media_id));
        }

        let previous_status = record.status;
        let mut events = Vec::new();
        self.enqueue(&record, &mut events)?;

        record.retry.reset();
        record.error_message = None;
        record.processing_stage = None;
        if record.status != MediaStatus::Pending {
            Self::transition(
                &mut record,
                MediaStatus::Pending,
                "retriggered by operator",
                &mut events,
            )?;
        }
        events.push(AuditEvent::Retriggered {
            media_id,
            previous_status,
        });

        self.save(&mut record, events).await?;
        info!("Retriggered media {} (was {})", media_id, previous_status);
        Ok(record)
    }

    /// Take the record out of the queue and fail it. Skipping a record
    /// that is not queued does nothing.
    pub async fn skip(&self, media_id: i64) -> Result<SkipOutcome, GatewayError> {
        let _guard = self.record_locks.lock(media_id).await;
        let mut record = self.load(media_id)?;

        let Some(was_processing) = self.dequeue(media_id) else {
            return Ok(SkipOutcome {
                media_id,
                removed: false,
                was_processing: false,
            });
        };

        let mut events = vec![AuditEvent::Skipped {
            media_id,
            was_processing,
        }];
        if record.status.can_transition_to(MediaStatus::Failed) {
            Self::transition(
                &mut record,
                MediaStatus::Failed,
                SKIPPED_BY_OPERATOR,
                &mut events,
            )?;
            record.record_failure(SKIPPED_BY_OPERATOR, &self.policy, Utc::now());
            record.processing_stage = None;
        }

        self.save(&mut record, events).await?;
        Ok(SkipOutcome {
            media_id,
            removed: true,
            was_processing,
        })
    }

    /// Skip every entry of `kind` (both kinds when `None`), in queue order.
    pub async fn clear_queue(&self, kind: Option<MediaKind>) -> ClearOutcome {
        let mut outcome = ClearOutcome {
            kind,
            ..Default::default()
        };

        for entry in self.queue.list(kind) {
            match self.skip(entry.media_id).await {
                Ok(skipped) if skipped.removed => outcome.cleared += 1,
                Ok(_) => {}
                Err(e) => {
                    warn!("Could not skip media {}: {}", entry.media_id, e);
                    if self.dequeue(entry.media_id).is_some() {
                        outcome.cleared += 1;
                    } else {
                        outcome.failed += 1;
                    }
                }
            }
        }

        info!(
            "Cleared {} entries from {} queue(s)",
            outcome.cleared,
            kind.map(|k| k.as_str()).unwrap_or("all")
        );
        self.emit(AuditEvent::QueueCleared {
            kind,
            cleared: outcome.cleared,
        })
        .await;
        outcome
    }

    /// Ignore an active record, or bring an ignored one back to pending.
    pub async fn toggle_ignore(&self, media_id: i64) -> Result<MediaRecord, GatewayError> {
        self.set_ignored(media_id, None).await
    }

    /// Move the record to `ignored` (or out of it); `None` flips the current state.
    async fn set_ignored(
        &self,
        media_id: i64,
        ignored: Option<bool>,
    ) -> Result<MediaRecord, GatewayError> {
        let _guard = self.record_locks.lock(media_id).await;
        let mut record = self.load(media_id)?;
        let is_ignored = record.status == MediaStatus::Ignored;
        if ignored == Some(is_ignored) {
            return Ok(record);
        }
        let mut events = Vec::new();

        if is_ignored {
            Self::transition(
                &mut record,
                MediaStatus::Pending,
                "un-ignored by operator",
                &mut events,
            )?;
            events.push(AuditEvent::IgnoreToggled {
                media_id,
                ignored: false,
            });
            if let Err(e) = self.enqueue(&record, &mut events) {
                warn!("Un-ignored media {} not queued: {}", media_id, e);
            }
        } else {
            if let Some(was_processing) = self.dequeue(media_id) {
                events.push(AuditEvent::Skipped {
                    media_id,
                    was_processing,
                });
            }
            Self::transition(
                &mut record,
                MediaStatus::Ignored,
                "ignored by operator",
                &mut events,
            )?;
            record.processing_stage = None;
            events.push(AuditEvent::IgnoreToggled {
                media_id,
                ignored: true,
            });
        }

        self.save(&mut record, events).await?;
        Ok(record)
    }

    /// Flip whether the subscription loop watches this show for new episodes.
    pub async fn toggle_subscription(&self, media_id: i64) -> Result<MediaRecord, GatewayError> {
        let _guard = self.record_locks.lock(media_id).await;
        let mut record = self.load(media_id)?;
        if !record.is_show() {
            return Err(GatewayError::InvalidTransition(
                "subscriptions apply to shows only".to_string(),
            ));
        }

        record.subscription_active = !record.subscription_active;
        let event = AuditEvent::SubscriptionToggled {
            media_id,
            active: record.subscription_active,
        };
        self.save(&mut record, vec![event]).await?;
        info!(
            "Subscription for media {} is now {}",
            media_id,
            if record.subscription_active { "on" } else { "off" }
        );
        Ok(record)
    }

    /// Retry a failed record now, consuming one attempt but skipping the backoff.
    pub async fn retry_now(&self, media_id: i64) -> Result<MediaRecord, GatewayError> {
        let _guard = self.record_locks.lock(media_id).await;
        let mut record = self.load(media_id)?;
        if record.status != MediaStatus::Failed {
            return Err(GatewayError::InvalidTransition(format!(
                "media {} is {}, only failed records can be retried",
                media_id, record.status
            )));
        }

        let mut events = Vec::new();
        self.enqueue(&record, &mut events)?;
        record.retry.begin_retry();
        Self::transition(&mut record, MediaStatus::Pending, "manual retry", &mut events)?;
        events.push(AuditEvent::RetryScheduled {
            media_id,
            attempt_count: record.retry.attempt_count,
        });

        self.save(&mut record, events).await?;
        Ok(record)
    }

    /// Clear a season's discrepancy flag after review.
    pub async fn acknowledge_discrepancy(
        &self,
        media_id: i64,
        season: u32,
    ) -> Result<MediaRecord, GatewayError> {
        let _guard = self.record_locks.lock(media_id).await;
        let mut record = self.load(media_id)?;
        let ledger = record.seasons.season_mut(season).ok_or_else(|| {
            GatewayError::InvalidRequest(format!("season {} is not tracked", season))
        })?;

        let mut events = Vec::new();
        if ledger.acknowledge_discrepancy() {
            info!("Discrepancy on media {} season {} acknowledged", media_id, season);
            events.push(AuditEvent::DiscrepancyAcknowledged { media_id, season });
        }
        self.save(&mut record, events).await?;
        Ok(record)
    }

    /// Remove a record permanently, dropping any queue entry first.
    pub async fn delete(&self, media_id: i64) -> Result<MediaRecord, GatewayError> {
        let _guard = self.record_locks.lock(media_id).await;
        self.dequeue(media_id);
        let removed = self.store.delete(media_id)?;
        info!("Deleted media {} ({})", media_id, removed.title);
        self.emit(AuditEvent::MediaDeleted {
            media_id,
            previous_status: removed.status,
        })
        .await;
        Ok(removed)
    }

    /// Retrigger each record in order; failures do not stop the batch.
    pub async fn retrigger_many(&self, media_ids: &[i64]) -> BulkResult {
        let mut result = BulkResult::default();
        for &media_id in media_ids {
            result.record(media_id, self.retrigger(media_id).await);
        }
        result
    }

    /// Ignore each record. Records already ignored count as successes.
    pub async fn ignore_many(&self, media_ids: &[i64]) -> BulkResult {
        let outcomes = join_all(media_ids.iter().map(|&media_id| async move {
            (media_id, self.set_ignored(media_id, Some(true)).await)
        }))
        .await;

        let mut result = BulkResult::default();
        for (media_id, outcome) in outcomes {
            result.record(media_id, outcome);
        }
        result
    }

    pub async fn delete_many(&self, media_ids: &[i64]) -> BulkResult {
        let outcomes = join_all(
            media_ids
                .iter()
                .map(|&media_id| async move { (media_id, self.delete(media_id).await) }),
        )
        .await;

        let mut result = BulkResult::default();
        for (media_id, outcome) in outcomes {
            result.record(media_id, outcome);
        }
        result
    }

    pub fn get_media_record(&self, media_id: i64) -> Result<MediaRecord, GatewayError> {
        self.load(media_id)
    }

    pub fn list_media(&self, filter: &MediaFilter) -> Result<Vec<MediaRecord>, GatewayError> {
        Ok(self.store.list(filter)?)
    }

    pub fn count_media(&self, filter: &MediaFilter) -> Result<i64, GatewayError> {
        Ok(self.store.count(filter)?)
    }

    pub fn list_queue(&self, kind: Option<MediaKind>) -> Vec<QueueEntry> {
        self.queue.list(kind)
    }

    pub fn currently_processing(&self, kind: MediaKind) -> Option<QueueEntry> {
        self.queue.current(kind)
    }

    /// Failed records whose backoff has elapsed at `now`, oldest request first.
    pub fn list_failed_eligible_for_retry(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<MediaRecord>, GatewayError> {
        let failed = self.store.list(
            &MediaFilter::new()
                .with_status(MediaStatus::Failed)
                .with_limit(SCAN_LIMIT),
        )?;
        Ok(failed
            .into_iter()
            .filter(|r| r.is_retry_eligible(&self.policy, now))
            .collect())
    }

    pub fn stats(&self) -> Result<GatewayStats, GatewayError> {
        let mut by_status = BTreeMap::new();
        for status in MediaStatus::ALL {
            let count = self
                .store
                .count(&MediaFilter::new().with_status(status))?;
            by_status.insert(status.as_str().to_string(), count);
        }

        let shows = self.store.list(
            &MediaFilter::new()
                .with_kind(MediaKind::Show)
                .with_limit(SCAN_LIMIT),
        )?;
        let discrepant_seasons = shows
            .iter()
            .map(|r| r.seasons.discrepant_seasons().len())
            .sum();

        Ok(GatewayStats {
            total: self.store.count(&MediaFilter::new())?,
            by_status,
            subscribed: self
                .store
                .count(&MediaFilter::new().with_subscribed(true))?,
            discrepant_seasons,
            queue: self.queue.status(),
        })
    }
}
