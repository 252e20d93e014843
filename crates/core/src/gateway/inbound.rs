//! Inbound requests, webhooks, correlation and provider refreshes.

use std::sync::Arc;

use chrono::Utc;
use futures::stream::{self, StreamExt};
use tracing::{debug, info, warn};

use super::{
    CorrelationOutcome, GatewayError, ReconciliationGateway, RefreshOutcome, RequestOutcome,
    SubscriptionReport, WebhookOutcome, SCAN_LIMIT,
};
use crate::audit::AuditEvent;
use crate::backend::SideEffect;
use crate::events::{InboundRequest, ProviderRefresh, SeasonCounts, WebhookEvent, WebhookPayload};
use crate::ledger::ReconcileOutcome;
use crate::media::{MediaFilter, MediaKind, MediaRecord, MediaStatus, UpstreamIds};
use crate::metrics;

/// How many recent upstream requests the correlation fallback scans.
const RECENT_REQUEST_WINDOW: u32 = 500;

/// Metadata lookups in flight at once during a subscription check.
const SUBSCRIPTION_CONCURRENCY: usize = 4;

impl ReconciliationGateway {
    /// Classify a webhook delivery and act on it.
    pub async fn handle_webhook(
        &self,
        payload: &WebhookPayload,
    ) -> Result<WebhookOutcome, GatewayError> {
        let event = payload
            .classify()
            .map_err(|e| GatewayError::InvalidRequest(e.to_string()))?;

        match event {
            WebhookEvent::Test => {
                info!("Received test notification");
                Ok(WebhookOutcome::Test)
            }
            WebhookEvent::Request(request) => {
                self.handle_request(request).await.map(WebhookOutcome::Request)
            }
            WebhookEvent::Declined { provider_id, kind } => {
                let media_id = self.decline(provider_id, kind).await?;
                Ok(WebhookOutcome::Declined { media_id })
            }
            WebhookEvent::Unsupported { notification_type } => {
                debug!("Ignoring {} notification", notification_type);
                Ok(WebhookOutcome::Ignored { notification_type })
            }
        }
    }

    /// Record a new request, or count a repeat of an existing one.
    ///
    /// A title is tracked by exactly one record. A full queue does not fail
    /// the request; the record stays pending and is admitted later.
    pub async fn handle_request(
        &self,
        request: InboundRequest,
    ) -> Result<RequestOutcome, GatewayError> {
        if request.provider_id == 0 {
            return Err(GatewayError::InvalidRequest(
                "provider id must be positive".to_string(),
            ));
        }

        let seasons = match request.kind {
            MediaKind::Movie => Vec::new(),
            MediaKind::Show => {
                let mut seasons: Vec<u32> =
                    request.seasons.iter().copied().filter(|&s| s > 0).collect();
                seasons.sort_unstable();
                seasons.dedup();
                seasons
            }
        };

        let (outcome, upstream_ids) = {
            let _title = self
                .title_locks
                .lock((request.provider_id, request.kind))
                .await;
            match self
                .store
                .find_by_provider(request.provider_id, request.kind)?
            {
                Some(existing) => self.repeat_request(existing.id, &request, &seasons).await?,
                None => self.create_record(&request, &seasons).await?,
            }
        };

        if let (Some(request_id), None, true) = (
            request.upstream_request_id,
            upstream_ids.media_id,
            self.upstream.is_some(),
        ) {
            let gateway = self.clone();
            let media_id = outcome.media_id;
            tokio::spawn(async move {
                if let Err(e) = gateway.correlate(media_id, request_id).await {
                    warn!("Correlation for media {} failed: {}", media_id, e);
                }
            });
        }

        Ok(outcome)
    }

    async fn create_record(
        &self,
        request: &InboundRequest,
        seasons: &[u32],
    ) -> Result<(RequestOutcome, UpstreamIds), GatewayError> {
        let title = request
            .title
            .clone()
            .unwrap_or_else(|| format!("{} {}", request.kind, request.provider_id));
        let mut record = MediaRecord::new(request.provider_id, request.kind, title);
        record.year = request.year;
        record.external_ids = request.external_ids.clone();
        record.upstream = UpstreamIds {
            request_id: request.upstream_request_id,
            media_id: request.upstream_media_id,
        };
        record.requested_by = request.requested_by.clone();
        record.requested_seasons = seasons.to_vec();

        let record = self.store.insert(&record)?;
        let _guard = self.record_locks.lock(record.id).await;

        let mut events = vec![AuditEvent::RequestReceived {
            media_id: record.id,
            provider_id: record.provider_id,
            kind: record.kind,
            created: true,
            request_count: record.request_count,
            seasons: seasons.to_vec(),
            requested_by: record.requested_by.clone(),
        }];

        let (queued, queue_rejection) = match self.enqueue(&record, &mut events) {
            Ok(_) => (true, None),
            Err(e) => {
                warn!("Media {} recorded but not queued: {}", record.id, e);
                (false, Some(e.to_string()))
            }
        };

        metrics::REQUESTS_RECEIVED
            .with_label_values(&[record.kind.as_str(), "created"])
            .inc();
        info!(
            "Created media {} for {} {} ({})",
            record.id, record.kind, record.provider_id, record.title
        );
        self.emit_all(events).await;

        let outcome = RequestOutcome {
            media_id: record.id,
            created: true,
            reactivated: false,
            request_count: record.request_count,
            affected_seasons: seasons.to_vec(),
            queued,
            queue_rejection,
        };
        Ok((outcome, record.upstream))
    }

    async fn repeat_request(
        &self,
        media_id: i64,
        request: &InboundRequest,
        seasons: &[u32],
    ) -> Result<(RequestOutcome, UpstreamIds), GatewayError> {
        let _guard = self.record_locks.lock(media_id).await;
        let mut record = self.load(media_id)?;

        record.record_request(request.requested_by.clone(), Utc::now());
        record.external_ids.merge_missing(&request.external_ids);
        if record.year.is_none() {
            record.year = request.year;
        }
        if request.upstream_request_id.is_some() {
            record.upstream.request_id = request.upstream_request_id;
        }
        if request.upstream_media_id.is_some() {
            record.upstream.media_id = request.upstream_media_id;
        }

        // An empty season list asks for the whole show.
        let added = match (record.is_show(), seasons.is_empty()) {
            (false, _) => Vec::new(),
            (true, true) => {
                record.requested_seasons.clear();
                Vec::new()
            }
            (true, false) if record.requested_seasons.is_empty() => Vec::new(),
            (true, false) => record.add_requested_seasons(seasons),
        };
        for &season in &added {
            record.seasons.ensure_season(season);
        }

        let mut events = vec![AuditEvent::RequestReceived {
            media_id: record.id,
            provider_id: record.provider_id,
            kind: record.kind,
            created: false,
            request_count: record.request_count,
            seasons: seasons.to_vec(),
            requested_by: record.requested_by.clone(),
        }];

        let mut reactivated = false;
        let wants_queue = match record.status {
            MediaStatus::Ignored => {
                Self::transition(&mut record, MediaStatus::Pending, "requested again", &mut events)?;
                reactivated = true;
                true
            }
            MediaStatus::Pending => !self.queue.contains(record.id),
            _ => false,
        };

        let mut queue_rejection = None;
        if wants_queue {
            if let Err(e) = self.enqueue(&record, &mut events) {
                warn!("Media {} not queued: {}", record.id, e);
                queue_rejection = Some(e.to_string());
            }
        }

        self.save(&mut record, events).await?;

        let result = if reactivated { "reactivated" } else { "repeated" };
        metrics::REQUESTS_RECEIVED
            .with_label_values(&[record.kind.as_str(), result])
            .inc();
        info!(
            "Repeat request for media {} (count {}, new seasons {:?})",
            record.id, record.request_count, added
        );

        let outcome = RequestOutcome {
            media_id: record.id,
            created: false,
            reactivated,
            request_count: record.request_count,
            affected_seasons: added,
            queued: self.queue.contains(record.id),
            queue_rejection,
        };
        Ok((outcome, record.upstream))
    }

    /// Cancel the record for a request declined upstream.
    /// Returns the affected record id, if the title is tracked.
    pub async fn decline(
        &self,
        provider_id: u64,
        kind: MediaKind,
    ) -> Result<Option<i64>, GatewayError> {
        let _title = self.title_locks.lock((provider_id, kind)).await;
        let Some(existing) = self.store.find_by_provider(provider_id, kind)? else {
            debug!("Declined {} {} is not tracked", kind, provider_id);
            return Ok(None);
        };

        let _guard = self.record_locks.lock(existing.id).await;
        let mut record = self.load(existing.id)?;
        let mut events = Vec::new();

        if let Some(was_processing) = self.dequeue(record.id) {
            events.push(AuditEvent::Skipped {
                media_id: record.id,
                was_processing,
            });
        }
        if record.status.can_transition_to(MediaStatus::Cancelled) {
            Self::transition(
                &mut record,
                MediaStatus::Cancelled,
                "declined upstream",
                &mut events,
            )?;
        } else {
            debug!(
                "Media {} is {}, leaving it as is after decline",
                record.id, record.status
            );
        }

        self.save(&mut record, events).await?;
        Ok(Some(record.id))
    }

    /// Resolve the upstream media id for a request that arrived without it.
    ///
    /// Looks the request up directly, then falls back to matching the recent
    /// request list by title. Failure is logged and counted, never returned.
    pub async fn correlate(
        &self,
        media_id: i64,
        request_id: u64,
    ) -> Result<CorrelationOutcome, GatewayError> {
        let Some(upstream) = self.upstream.clone() else {
            return Ok(CorrelationOutcome::Incomplete);
        };
        let (provider_id, kind) = {
            let record = self.load(media_id)?;
            (record.provider_id, record.kind)
        };

        let mut outcome = match upstream.get_request(request_id).await {
            Ok(request) => match request.media_id {
                Some(upstream_media_id) => CorrelationOutcome::Direct { upstream_media_id },
                None => CorrelationOutcome::Incomplete,
            },
            Err(e) => {
                debug!("Direct lookup of request {} failed: {}", request_id, e);
                CorrelationOutcome::Incomplete
            }
        };

        if outcome == CorrelationOutcome::Incomplete {
            outcome = match upstream.list_recent_requests(RECENT_REQUEST_WINDOW).await {
                Ok(recent) => recent
                    .iter()
                    .filter(|r| r.matches(provider_id, kind))
                    .find_map(|r| {
                        r.media_id.map(|upstream_media_id| CorrelationOutcome::RecentList {
                            request_id: r.id,
                            upstream_media_id,
                        })
                    })
                    .unwrap_or(CorrelationOutcome::Incomplete),
                Err(e) => {
                    warn!("Listing recent upstream requests failed: {}", e);
                    CorrelationOutcome::Incomplete
                }
            };
        }

        metrics::CORRELATIONS
            .with_label_values(&[outcome.as_str()])
            .inc();

        let resolved = match outcome {
            CorrelationOutcome::Direct { upstream_media_id } => Some((request_id, upstream_media_id)),
            CorrelationOutcome::RecentList {
                request_id,
                upstream_media_id,
            } => Some((request_id, upstream_media_id)),
            CorrelationOutcome::Incomplete => None,
        };

        let event = AuditEvent::CorrelationAttempted {
            media_id,
            request_id,
            outcome: outcome.as_str().to_string(),
            upstream_media_id: resolved.map(|(_, m)| m),
        };

        match resolved {
            Some((resolved_request, upstream_media_id)) => {
                let _guard = self.record_locks.lock(media_id).await;
                let mut record = self.load(media_id)?;
                record.upstream.request_id = Some(resolved_request);
                record.upstream.media_id = Some(upstream_media_id);
                self.save(&mut record, vec![event]).await?;

                self.effects.post(SideEffect::NotifyRequest {
                    media_id,
                    request_id: resolved_request,
                    upstream_media_id,
                });
                info!(
                    "Correlated media {} with upstream request {} ({})",
                    media_id,
                    resolved_request,
                    outcome.as_str()
                );
            }
            None => {
                warn!(
                    "CorrelationIncomplete: request {} for media {} not matched upstream",
                    request_id, media_id
                );
                self.emit(event).await;
            }
        }

        Ok(outcome)
    }

    /// Apply fresh provider counts to the show they describe.
    pub async fn refresh_metadata(
        &self,
        refresh: &ProviderRefresh,
    ) -> Result<RefreshOutcome, GatewayError> {
        let record = self
            .store
            .find_by_provider(refresh.provider_id, refresh.kind)?
            .ok_or(GatewayError::UnknownTitle {
                provider_id: refresh.provider_id,
                kind: refresh.kind,
            })?;
        self.refresh_record(record.id, &refresh.seasons, false).await
    }

    async fn refresh_record(
        &self,
        media_id: i64,
        seasons: &[SeasonCounts],
        from_subscription: bool,
    ) -> Result<RefreshOutcome, GatewayError> {
        for counts in seasons {
            counts
                .validate()
                .map_err(|e| GatewayError::InvalidRequest(e.to_string()))?;
        }

        let _guard = self.record_locks.lock(media_id).await;
        let mut record = self.load(media_id)?;
        let mut outcome = RefreshOutcome {
            media_id,
            ..Default::default()
        };

        if !record.is_show() {
            debug!("Ignoring season refresh for movie {}", media_id);
            return Ok(outcome);
        }

        let mut events = Vec::new();
        for counts in seasons {
            let season = counts.season_number;
            if season == 0
                || (!record.requested_seasons.is_empty()
                    && !record.requested_seasons.contains(&season))
            {
                continue;
            }

            match record.seasons.reconcile_with_provider(
                season,
                counts.episode_count,
                counts.aired_episodes,
            ) {
                ReconcileOutcome::Unchanged => {}
                ReconcileOutcome::NewlyAired(episodes) => {
                    debug!("Media {} season {} aired {:?}", media_id, season, episodes);
                    events.push(AuditEvent::EpisodesAired {
                        media_id,
                        season,
                        episodes: episodes.clone(),
                    });
                    outcome.newly_aired.insert(season, episodes);
                }
                ReconcileOutcome::Shrunk { recorded, reported } => {
                    metrics::DISCREPANCIES_DETECTED.inc();
                    warn!(
                        "Media {} season {}: provider reports {} aired, {} recorded",
                        media_id, season, reported, recorded
                    );
                    events.push(AuditEvent::DiscrepancyDetected {
                        media_id,
                        season,
                        recorded_aired: recorded,
                        reported_aired: reported,
                    });
                    outcome.discrepant_seasons.push(season);
                }
            }
        }

        if from_subscription {
            record.subscription_last_checked = Some(Utc::now());
        }

        if !outcome.newly_aired.is_empty()
            && record.status == MediaStatus::Completed
            && record.subscription_active
        {
            Self::transition(
                &mut record,
                MediaStatus::Pending,
                "new episodes aired",
                &mut events,
            )?;
            outcome.reopened = true;
            if let Err(e) = self.enqueue(&record, &mut events) {
                warn!("Reopened media {} not queued: {}", media_id, e);
            }
        }

        self.save(&mut record, events).await?;
        Ok(outcome)
    }

    /// Refresh every subscribed show from the metadata provider.
    pub async fn check_subscriptions(&self) -> Result<SubscriptionReport, GatewayError> {
        let Some(metadata) = self.metadata.clone() else {
            return Ok(SubscriptionReport::default());
        };

        let shows = self.store.list(
            &MediaFilter::new()
                .with_kind(MediaKind::Show)
                .with_subscribed(true)
                .with_limit(SCAN_LIMIT),
        )?;

        let results: Vec<(u64, Result<RefreshOutcome, String>)> = stream::iter(shows)
            .map(|record| {
                let metadata = Arc::clone(&metadata);
                async move {
                    let result = match metadata
                        .season_summaries(record.provider_id, &record.external_ids)
                        .await
                    {
                        Ok(seasons) => self
                            .refresh_record(record.id, &seasons, true)
                            .await
                            .map_err(|e| e.to_string()),
                        Err(e) => Err(format!("metadata unavailable: {}", e)),
                    };
                    (record.provider_id, result)
                }
            })
            .buffer_unordered(SUBSCRIPTION_CONCURRENCY)
            .collect()
            .await;

        let mut report = SubscriptionReport::default();
        for (provider_id, result) in results {
            report.checked += 1;
            match result {
                Ok(outcome) if outcome.reopened => report.reopened += 1,
                Ok(_) => {}
                Err(e) => {
                    warn!("Subscription check for show {} failed: {}", provider_id, e);
                    report.errors += 1;
                }
            }
        }

        info!(
            "Subscription check: {} checked, {} reopened, {} errors",
            report.checked, report.reopened, report.errors
        );
        Ok(report)
    }
}
