//! Background scheduler implementation.
//!
//! Runs three kinds of loops against the gateway:
//! - Promotion: one per media kind, hands the queue head to the fetch backend
//! - Retry sweep: requeues failed records whose backoff has elapsed
//! - Subscriptions: refreshes subscribed shows from the metadata provider

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, error, info, warn};

use crate::gateway::{GatewayError, ReconciliationGateway, SubscriptionReport, SweepReport};
use crate::media::MediaKind;

use super::types::{SchedulerConfig, SchedulerError, SchedulerStatus};

/// Drives the gateway's periodic work.
pub struct Scheduler {
    config: SchedulerConfig,
    gateway: ReconciliationGateway,

    // Runtime state
    running: Arc<AtomicBool>,
    status: Arc<RwLock<SchedulerStatus>>,
    shutdown_tx: broadcast::Sender<()>,
}

impl Scheduler {
    pub fn new(config: SchedulerConfig, gateway: ReconciliationGateway) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);

        Self {
            config,
            gateway,
            running: Arc::new(AtomicBool::new(false)),
            status: Arc::new(RwLock::new(SchedulerStatus::default())),
            shutdown_tx,
        }
    }

    /// Start the scheduler (spawns background tasks).
    ///
    /// Records that were processing when the process last stopped are put
    /// back in their queues before any loop runs.
    pub async fn start(&self) {
        if self.running.swap(true, Ordering::SeqCst) {
            warn!("Scheduler already running");
            return;
        }

        info!("Starting scheduler");

        match self.gateway.restore_queue().await {
            Ok(restored) => info!("Restored {} records to the dispatch queues", restored),
            Err(e) => error!("Failed to restore dispatch queues: {}", e),
        }

        if self.gateway.has_backend() {
            self.spawn_promotion_loop(MediaKind::Movie);
            self.spawn_promotion_loop(MediaKind::Show);
        } else {
            warn!("No fetch backend configured, queued media will not be dispatched");
        }

        self.spawn_sweep_loop();

        if self.config.subscriptions_enabled && self.gateway.has_metadata() {
            self.spawn_subscription_loop();
        } else {
            debug!("Subscription checks disabled");
        }

        info!("Scheduler started");
    }

    /// Stop the scheduler gracefully.
    pub async fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            warn!("Scheduler not running");
            return;
        }

        info!("Stopping scheduler");

        // Signal shutdown to all loops
        let _ = self.shutdown_tx.send(());

        // Give loops a moment to finish the current pass
        tokio::time::sleep(Duration::from_millis(200)).await;

        info!("Scheduler stopped");
    }

    pub async fn status(&self) -> SchedulerStatus {
        let mut status = self.status.read().await.clone();
        status.running = self.running.load(Ordering::Relaxed);
        status
    }

    /// Promote queued entries of `kind` until the processing slot is taken.
    pub async fn run_promotions(&self, kind: MediaKind) -> Result<usize, SchedulerError> {
        if !self.gateway.has_backend() {
            return Err(SchedulerError::NoBackend);
        }
        Self::promote_pass(&self.gateway, &self.status, kind).await
    }

    /// Run one retry sweep now.
    pub async fn run_sweep(&self) -> Result<SweepReport, SchedulerError> {
        Self::sweep_pass(
            &self.gateway,
            &self.status,
            self.config.sweep_batch_size,
        )
        .await
    }

    /// Check subscribed shows now.
    pub async fn run_subscription_check(&self) -> Result<SubscriptionReport, SchedulerError> {
        if !self.gateway.has_metadata() {
            return Err(SchedulerError::NoMetadataProvider);
        }
        Self::subscription_pass(&self.gateway, &self.status).await
    }

    async fn promote_pass(
        gateway: &ReconciliationGateway,
        status: &RwLock<SchedulerStatus>,
        kind: MediaKind,
    ) -> Result<usize, SchedulerError> {
        let mut promoted = 0;
        while let Some(entry) = gateway.promote_next(kind).await? {
            debug!("Media {} handed to the fetch backend", entry.media_id);
            promoted += 1;
        }
        if promoted > 0 {
            status.write().await.promoted += promoted as u64;
        }
        Ok(promoted)
    }

    async fn sweep_pass(
        gateway: &ReconciliationGateway,
        status: &RwLock<SchedulerStatus>,
        batch_size: usize,
    ) -> Result<SweepReport, SchedulerError> {
        let report = gateway.retry_sweep(Utc::now(), batch_size).await?;
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

        let mut status = status.write().await;
        status.last_sweep_at = Some(Utc::now());
        status.last_sweep_requeued = report.requeued;
        Ok(report)
    }

    async fn subscription_pass(
        gateway: &ReconciliationGateway,
        status: &RwLock<SchedulerStatus>,
    ) -> Result<SubscriptionReport, SchedulerError> {
        let report = gateway.check_subscriptions().await?;
        info!(
            "Subscription check: {} shows checked, {} reopened, {} errors",
            report.checked, report.reopened, report.errors
        );

        let mut status = status.write().await;
        status.last_subscription_check_at = Some(Utc::now());
        status.last_subscription_reopened = report.reopened;
        Ok(report)
    }

    fn spawn_promotion_loop(&self, kind: MediaKind) {
        let running = Arc::clone(&self.running);
        let status = Arc::clone(&self.status);
        let gateway = self.gateway.clone();
        let interval = self.config.promote_interval;
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            info!("Promotion loop for {} queue started", kind);
            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        info!("Promotion loop for {} queue received shutdown signal", kind);
                        break;
                    }
                    _ = tokio::time::sleep(interval) => {
                        if !running.load(Ordering::Relaxed) {
                            break;
                        }
                        match Self::promote_pass(&gateway, &status, kind).await {
                            Ok(_) => {}
                            Err(SchedulerError::Gateway(
                                GatewayError::ExternalBackendUnreachable(reason),
                            )) => {
                                warn!("Fetch backend unreachable, {} queue paused: {}", kind, reason);
                            }
                            Err(e) => error!("Promotion error on {} queue: {}", kind, e),
                        }
                    }
                }
            }
            info!("Promotion loop for {} queue stopped", kind);
        });
    }

    fn spawn_sweep_loop(&self) {
        let running = Arc::clone(&self.running);
        let status = Arc::clone(&self.status);
        let gateway = self.gateway.clone();
        let interval = self.config.sweep_interval;
        let batch_size = self.config.sweep_batch_size;
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            info!("Retry sweep loop started");
            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        info!("Retry sweep loop received shutdown signal");
                        break;
                    }
                    _ = tokio::time::sleep(interval) => {
                        if !running.load(Ordering::Relaxed) {
                            break;
                        }
                        if let Err(e) = Self::sweep_pass(&gateway, &status, batch_size).await {
                            error!("Retry sweep error: {}", e);
                        }
                    }
                }
            }
            info!("Retry sweep loop stopped");
        });
    }

    fn spawn_subscription_loop(&self) {
        let running = Arc::clone(&self.running);
        let status = Arc::clone(&self.status);
        let gateway = self.gateway.clone();
        let interval = self.config.subscription_interval;
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            info!("Subscription loop started");
            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        info!("Subscription loop received shutdown signal");
                        break;
                    }
                    _ = tokio::time::sleep(interval) => {
                        if !running.load(Ordering::Relaxed) {
                            break;
                        }
                        if let Err(e) = Self::subscription_pass(&gateway, &status).await {
                            error!("Subscription check error: {}", e);
                        }
                    }
                }
            }
            info!("Subscription loop stopped");
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::create_side_effect_system;
    use crate::events::ProviderRefresh;
    use crate::media::{MediaStatus, SqliteMediaStore};
    use crate::queue::DispatchQueue;
    use crate::testing::fixtures::{
        movie_request, season_counts, show_request, test_policy, TestGateway,
    };

    fn fast_config() -> SchedulerConfig {
        SchedulerConfig {
            promote_interval: Duration::from_millis(10),
            sweep_interval: Duration::from_millis(10),
            sweep_batch_size: 10,
            subscriptions_enabled: true,
            subscription_interval: Duration::from_secs(3600),
        }
    }

    fn bare_gateway() -> ReconciliationGateway {
        let store = Arc::new(SqliteMediaStore::in_memory().unwrap());
        let queue = Arc::new(DispatchQueue::new(10, 10, Duration::from_secs(60)));
        let (effects, _dispatcher) = create_side_effect_system(None, None, 16);
        ReconciliationGateway::new(store, queue, test_policy(), effects)
    }

    #[tokio::test]
    async fn test_run_promotions_hands_head_to_backend() {
        let harness = TestGateway::new();
        let first = harness
            .gateway
            .handle_request(movie_request(603))
            .await
            .unwrap();
        harness
            .gateway
            .handle_request(movie_request(604))
            .await
            .unwrap();

        let scheduler = Scheduler::new(fast_config(), harness.gateway.clone());
        let promoted = scheduler.run_promotions(MediaKind::Movie).await.unwrap();

        // One processing slot per kind
        assert_eq!(promoted, 1);
        assert_eq!(harness.backend.fetched_ids().await, vec![first.media_id]);
        assert_eq!(scheduler.status().await.promoted, 1);

        let again = scheduler.run_promotions(MediaKind::Movie).await.unwrap();
        assert_eq!(again, 0);
    }

    #[tokio::test]
    async fn test_run_promotions_without_backend() {
        let scheduler = Scheduler::new(fast_config(), bare_gateway());
        let err = scheduler
            .run_promotions(MediaKind::Show)
            .await
            .unwrap_err();
        assert!(matches!(err, SchedulerError::NoBackend));
    }

    #[tokio::test]
    async fn test_run_subscription_check_without_metadata() {
        let scheduler = Scheduler::new(fast_config(), bare_gateway());
        let err = scheduler.run_subscription_check().await.unwrap_err();
        assert!(matches!(err, SchedulerError::NoMetadataProvider));
    }

    #[tokio::test]
    async fn test_run_sweep_records_status() {
        let harness = TestGateway::new();
        let scheduler = Scheduler::new(fast_config(), harness.gateway.clone());

        let report = scheduler.run_sweep().await.unwrap();
        assert_eq!(report.examined, 0);

        let status = scheduler.status().await;
        assert!(status.last_sweep_at.is_some());
        assert_eq!(status.last_sweep_requeued, 0);
    }

    #[tokio::test]
    async fn test_run_subscription_check_reopens_show() {
        let harness = TestGateway::new();
        let outcome = harness
            .gateway
            .handle_request(show_request(1399, vec![1]))
            .await
            .unwrap();
        harness
            .gateway
            .refresh_metadata(&ProviderRefresh {
                provider_id: 1399,
                kind: MediaKind::Show,
                seasons: vec![season_counts(1, 10, 2)],
            })
            .await
            .unwrap();
        harness
            .gateway
            .toggle_subscription(outcome.media_id)
            .await
            .unwrap();
        harness
            .gateway
            .mark_complete(outcome.media_id, None, None)
            .await
            .unwrap();
        harness
            .metadata
            .set_seasons(1399, vec![season_counts(1, 10, 4)])
            .await;

        let scheduler = Scheduler::new(fast_config(), harness.gateway.clone());
        let report = scheduler.run_subscription_check().await.unwrap();
        assert_eq!(report.checked, 1);
        assert_eq!(report.reopened, 1);

        let record = harness.gateway.get_media_record(outcome.media_id).unwrap();
        assert_eq!(record.status, MediaStatus::Pending);
        assert_eq!(scheduler.status().await.last_subscription_reopened, 1);
    }

    #[tokio::test]
    async fn test_start_dispatches_and_stop_halts() {
        let harness = TestGateway::new();
        let outcome = harness
            .gateway
            .handle_request(movie_request(603))
            .await
            .unwrap();

        let scheduler = Scheduler::new(fast_config(), harness.gateway.clone());
        scheduler.start().await;
        assert!(scheduler.status().await.running);

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(harness.backend.fetched_ids().await, vec![outcome.media_id]);

        scheduler.stop().await;
        assert!(!scheduler.status().await.running);
    }

    #[tokio::test]
    async fn test_start_twice_is_noop() {
        let harness = TestGateway::new();
        let scheduler = Scheduler::new(fast_config(), harness.gateway.clone());
        scheduler.start().await;
        scheduler.start().await;
        assert!(scheduler.status().await.running);
        scheduler.stop().await;
        scheduler.stop().await;
        assert!(!scheduler.status().await.running);
    }
}
