//! Promotion, backend outcome reports, the retry sweep and queue restore.

use chrono::{DateTime, Utc};
use tracing::{debug, error, info, warn};

use super::{GatewayError, ReconciliationGateway, SweepReport, SCAN_LIMIT};
use crate::audit::AuditEvent;
use crate::backend::FetchPayload;
use crate::ledger::EpisodeOutcome;
use crate::media::{MediaFilter, MediaKind, MediaRecord, MediaStatus};
use crate::metrics;
use crate::queue::{QueueEntry, QueueStatus};

enum RetryAction {
    Requeued,
    AlreadyAvailable,
    QueueFull,
    NotEligible,
}

fn processing_stage(payload: &FetchPayload) -> String {
    match payload.seasons.as_slice() {
        [season] => format!("season_{}_in_progress", season),
        _ => "fetching".to_string(),
    }
}

impl ReconciliationGateway {
    /// Promote the head of `kind`'s queue and hand it to the fetch backend.
    ///
    /// Returns `Ok(None)` when the processing slot is busy or nothing is
    /// queued. If the backend cannot be reached the entry goes back to the
    /// head of the queue and the record stays pending.
    pub async fn promote_next(
        &self,
        kind: MediaKind,
    ) -> Result<Option<QueueEntry>, GatewayError> {
        loop {
            let Some(entry) = self.queue.promote_next(kind) else {
                return Ok(None);
            };
            let media_id = entry.media_id;
            let _guard = self.record_locks.lock(media_id).await;

            if !self
                .queue
                .get(media_id)
                .is_some_and(|e| e.queue_status == QueueStatus::Processing)
            {
                debug!("Media {} left the queue before promotion", media_id);
                continue;
            }

            let mut record = match self.store.get(media_id) {
                Ok(Some(record)) if record.status.is_dispatchable() => record,
                Ok(Some(record)) => {
                    warn!(
                        "Dropping media {} from the {} queue: it is {}",
                        media_id, kind, record.status
                    );
                    self.queue.complete(media_id);
                    continue;
                }
                Ok(None) => {
                    warn!("Dropping deleted media {} from the {} queue", media_id, kind);
                    self.queue.complete(media_id);
                    continue;
                }
                Err(e) => {
                    self.queue.requeue_front(media_id);
                    return Err(e.into());
                }
            };

            let Some(backend) = self.backend.clone() else {
                self.queue.requeue_front(media_id);
                return Err(GatewayError::ExternalBackendUnreachable(
                    "no fetch backend configured".to_string(),
                ));
            };

            let payload = FetchPayload::for_record(&record);
            if let Err(e) = backend.enqueue_for_fetch(media_id, kind, &payload).await {
                metrics::BACKEND_CALLS
                    .with_label_values(&["enqueue_for_fetch", "error"])
                    .inc();

                if e.is_unreachable() {
                    self.queue.requeue_front(media_id);
                    warn!("Media {} stays queued, backend unreachable: {}", media_id, e);
                    return Err(GatewayError::ExternalBackendUnreachable(e.to_string()));
                }

                // The backend answered and refused the job; count it as a failed attempt.
                self.queue.complete(media_id);
                let mut events = Vec::new();
                let message = format!("backend rejected job: {}", e);
                Self::transition(&mut record, MediaStatus::Failed, &message, &mut events)?;
                record.record_failure(message, &self.policy, Utc::now());
                self.save(&mut record, events).await?;
                continue;
            }
            metrics::BACKEND_CALLS
                .with_label_values(&["enqueue_for_fetch", "ok"])
                .inc();

            let mut events = Vec::new();
            if record.status != MediaStatus::Processing {
                Self::transition(&mut record, MediaStatus::Processing, "promoted", &mut events)?;
            }
            record.processing_stage = Some(processing_stage(&payload));
            events.push(AuditEvent::Promoted { media_id, kind });
            self.save(&mut record, events).await?;

            info!(
                "Promoted media {} ({}) on the {} queue, job {}",
                media_id, record.title, kind, payload.job_id
            );
            return Ok(Some(self.queue.get(media_id).unwrap_or(entry)));
        }
    }

    /// The backend fetched the whole title.
    pub async fn report_success(&self, media_id: i64) -> Result<MediaRecord, GatewayError> {
        let _guard = self.record_locks.lock(media_id).await;
        let mut record = self.load(media_id)?;
        let mut events = Vec::new();

        Self::observe_processing(&record, "completed");
        Self::transition(&mut record, MediaStatus::Completed, "fetch succeeded", &mut events)?;
        if record.is_show() {
            record.seasons.mark_all_complete();
        }
        record.retry.next_eligible_at = None;
        self.queue.skip(media_id);

        self.save(&mut record, events).await?;
        self.post_mark_available(&record);
        Ok(record)
    }

    /// The backend gave up on the title.
    pub async fn report_failure(
        &self,
        media_id: i64,
        message: &str,
    ) -> Result<MediaRecord, GatewayError> {
        let _guard = self.record_locks.lock(media_id).await;
        let mut record = self.load(media_id)?;
        let mut events = Vec::new();

        Self::observe_processing(&record, "failed");
        Self::transition(&mut record, MediaStatus::Failed, message, &mut events)?;
        record.record_failure(message, &self.policy, Utc::now());
        record.processing_stage = None;
        self.queue.skip(media_id);
        if record.retry.next_eligible_at.is_some() {
            events.push(AuditEvent::RetryScheduled {
                media_id,
                attempt_count: record.retry.attempt_count,
            });
        } else {
            warn!("Media {} has no automatic retries left", media_id);
        }

        self.save(&mut record, events).await?;
        Ok(record)
    }

    /// The backend resolved some episodes of a season.
    ///
    /// The record completes once every aired episode is confirmed. It fails
    /// when nothing is left unprocessed and some episodes failed.
    pub async fn report_episodes(
        &self,
        media_id: i64,
        season: u32,
        episodes: &[u32],
        outcome: EpisodeOutcome,
    ) -> Result<MediaRecord, GatewayError> {
        let _guard = self.record_locks.lock(media_id).await;
        let mut record = self.load(media_id)?;
        if !record.is_show() {
            return Err(GatewayError::InvalidRequest(
                "episode reports apply to shows only".to_string(),
            ));
        }

        record.seasons.mark_episodes(season, episodes, outcome)?;
        let label = match outcome {
            EpisodeOutcome::Confirmed => "confirmed",
            EpisodeOutcome::Failed => "failed",
        };
        debug!(
            "Media {} season {}: {} {:?}",
            media_id, season, label, episodes
        );
        let mut events = vec![AuditEvent::EpisodesMarked {
            media_id,
            season,
            episodes: episodes.to_vec(),
            outcome: label.to_string(),
        }];

        let unprocessed_left = record
            .seasons
            .seasons()
            .any(|s| !s.unprocessed_episodes().is_empty());
        let any_failed = record
            .seasons
            .seasons()
            .any(|s| !s.failed_episodes().is_empty());

        let mut completed = false;
        if record.seasons.is_complete() {
            if record.status != MediaStatus::Completed {
                Self::observe_processing(&record, "completed");
                Self::transition(
                    &mut record,
                    MediaStatus::Completed,
                    "all aired episodes confirmed",
                    &mut events,
                )?;
                self.queue.skip(media_id);
                completed = true;
            }
        } else if record.status == MediaStatus::Processing && !unprocessed_left && any_failed {
            let message = format!("episodes failed in season {}", season);
            Self::observe_processing(&record, "failed");
            Self::transition(&mut record, MediaStatus::Failed, &message, &mut events)?;
            record.record_failure(message, &self.policy, Utc::now());
            record.processing_stage = None;
            self.queue.skip(media_id);
        } else if record.status == MediaStatus::Processing {
            record.processing_stage = Some(format!("season_{}_in_progress", season));
        }

        self.save(&mut record, events).await?;
        if completed {
            self.post_mark_available(&record);
        }
        Ok(record)
    }

    /// The backend chose not to fetch the title.
    pub async fn report_skipped(
        &self,
        media_id: i64,
        reason: &str,
    ) -> Result<MediaRecord, GatewayError> {
        let _guard = self.record_locks.lock(media_id).await;
        let mut record = self.load(media_id)?;
        let mut events = Vec::new();

        Self::transition(&mut record, MediaStatus::Skipped, reason, &mut events)?;
        record.processing_stage = None;
        self.queue.skip(media_id);

        self.save(&mut record, events).await?;
        Ok(record)
    }

    /// Requeue failed records whose backoff has elapsed, and admit pending
    /// records a full queue turned away earlier.
    pub async fn retry_sweep(
        &self,
        now: DateTime<Utc>,
        batch_size: usize,
    ) -> Result<SweepReport, GatewayError> {
        let candidates = self.list_failed_eligible_for_retry(now)?;
        let mut report = SweepReport::default();

        for record in candidates.into_iter().take(batch_size) {
            report.examined += 1;
            let outcome = match self.retry_one(record.id, now).await {
                Ok(RetryAction::Requeued) => {
                    report.requeued += 1;
                    "requeued"
                }
                Ok(RetryAction::AlreadyAvailable) => {
                    report.already_available += 1;
                    "already_available"
                }
                Ok(RetryAction::QueueFull) => {
                    report.queue_full += 1;
                    "queue_full"
                }
                Ok(RetryAction::NotEligible) => continue,
                Err(e) => {
                    error!("Retry of media {} failed: {}", record.id, e);
                    report.errors += 1;
                    "error"
                }
            };
            metrics::RETRY_SWEEP.with_label_values(&[outcome]).inc();
        }

        report.readmitted = self.readmit_pending().await?;

        if report.examined > 0 || report.readmitted > 0 {
            info!(
                "Retry sweep: {} examined, {} requeued, {} already available, {} queue full, {} readmitted, {} errors",
                report.examined,
                report.requeued,
                report.already_available,
                report.queue_full,
                report.readmitted,
                report.errors
            );
        }
        Ok(report)
    }

    async fn retry_one(
        &self,
        media_id: i64,
        now: DateTime<Utc>,
    ) -> Result<RetryAction, GatewayError> {
        let _guard = self.record_locks.lock(media_id).await;
        let mut record = self.load(media_id)?;
        if !record.is_retry_eligible(&self.policy, now) {
            return Ok(RetryAction::NotEligible);
        }

        let mut events = Vec::new();
        if let Some(upstream) = &self.upstream {
            match upstream
                .check_availability(record.provider_id, record.kind)
                .await
            {
                Ok(availability) if availability.is_available() => {
                    Self::transition(
                        &mut record,
                        MediaStatus::Completed,
                        "already available upstream",
                        &mut events,
                    )?;
                    if record.is_show() {
                        record.seasons.mark_all_complete();
                    }
                    record.retry.next_eligible_at = None;
                    self.save(&mut record, events).await?;
                    return Ok(RetryAction::AlreadyAvailable);
                }
                Ok(_) => {}
                Err(e) => debug!("Availability check for media {} failed: {}", media_id, e),
            }
        }

        match self.enqueue(&record, &mut events) {
            Ok(_) => {}
            Err(GatewayError::QueueFull { .. }) => return Ok(RetryAction::QueueFull),
            Err(e) => return Err(e),
        }
        record.retry.begin_retry();
        Self::transition(&mut record, MediaStatus::Pending, "automatic retry", &mut events)?;
        events.push(AuditEvent::RetryScheduled {
            media_id,
            attempt_count: record.retry.attempt_count,
        });

        self.save(&mut record, events).await?;
        Ok(RetryAction::Requeued)
    }

    /// Enqueue pending records that are not in the queue, oldest request
    /// first, until a lane fills up. Returns how many were admitted.
    pub async fn readmit_pending(&self) -> Result<usize, GatewayError> {
        let pending = self.store.list(
            &MediaFilter::new()
                .with_status(MediaStatus::Pending)
                .with_limit(SCAN_LIMIT),
        )?;

        let mut full: Vec<MediaKind> = Vec::new();
        let mut admitted = 0;
        for candidate in pending {
            if full.contains(&candidate.kind) || self.queue.contains(candidate.id) {
                continue;
            }
            let _guard = self.record_locks.lock(candidate.id).await;
            let Some(record) = self.store.get(candidate.id)? else {
                continue;
            };
            if record.status != MediaStatus::Pending || self.queue.contains(record.id) {
                continue;
            }

            let mut events = Vec::new();
            match self.enqueue(&record, &mut events) {
                Ok(_) => {
                    admitted += 1;
                    self.emit_all(events).await;
                }
                Err(GatewayError::QueueFull { kind, .. }) => full.push(kind),
                Err(e) => warn!("Could not readmit media {}: {}", record.id, e),
            }
        }
        Ok(admitted)
    }

    /// Rebuild the queue after a restart.
    ///
    /// Records left processing go back to pending, then every pending record
    /// is admitted in request order.
    pub async fn restore_queue(&self) -> Result<usize, GatewayError> {
        let interrupted = self.store.list(
            &MediaFilter::new()
                .with_status(MediaStatus::Processing)
                .with_limit(SCAN_LIMIT),
        )?;

        for candidate in interrupted {
            let _guard = self.record_locks.lock(candidate.id).await;
            let mut record = self.load(candidate.id)?;
            if record.status != MediaStatus::Processing {
                continue;
            }
            let mut events = Vec::new();
            Self::transition(&mut record, MediaStatus::Pending, "restarted", &mut events)?;
            record.processing_stage = None;
            self.save(&mut record, events).await?;
        }

        let admitted = self.readmit_pending().await?;
        info!("Restored {} queue entries", admitted);
        Ok(admitted)
    }
}
