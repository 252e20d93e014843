//! Testing utilities and mock implementations.
//!
//! This module provides mock implementations of every external collaborator
//! trait, so the gateway can be exercised end to end without a request
//! service, a metadata provider or a fetch backend.
//!
//! # Example
//!
//! ```rust,ignore
//! use seerrbridge_core::testing::fixtures::{movie_request, TestGateway};
//!
//! let harness = TestGateway::new();
//! let outcome = harness.gateway.handle_request(movie_request(603)).await?;
//! harness.gateway.promote_next(MediaKind::Movie).await?;
//! assert_eq!(harness.backend.fetched_ids().await, vec![outcome.media_id]);
//! ```

mod mock_fetch_backend;
mod mock_metadata_provider;
mod mock_request_service;

pub use mock_fetch_backend::{MockFetchBackend, RecordedFetch};
pub use mock_metadata_provider::MockMetadataProvider;
pub use mock_request_service::{MockRequestService, RecordedUpstreamCall};

/// Test fixtures and helper functions.
pub mod fixtures {
    use std::sync::Arc;
    use std::time::Duration;

    use tokio::sync::Mutex;

    use super::{MockFetchBackend, MockMetadataProvider, MockRequestService};
    use crate::backend::{create_side_effect_system, FetchBackend, SideEffectDispatcher};
    use crate::events::{InboundRequest, SeasonCounts};
    use crate::gateway::ReconciliationGateway;
    use crate::media::{MediaKind, SqliteMediaStore};
    use crate::metadata::MetadataProvider;
    use crate::queue::DispatchQueue;
    use crate::retry::RetryPolicy;
    use crate::upstream::RequestService;

    /// A movie request with a title.
    pub fn movie_request(provider_id: u64) -> InboundRequest {
        InboundRequest::new(provider_id, MediaKind::Movie)
            .with_title(format!("Movie {}", provider_id))
    }

    /// A show request for `seasons` (empty for the whole show).
    pub fn show_request(provider_id: u64, seasons: Vec<u32>) -> InboundRequest {
        InboundRequest::new(provider_id, MediaKind::Show)
            .with_title(format!("Show {}", provider_id))
            .with_seasons(seasons)
    }

    pub fn season_counts(
        season_number: u32,
        episode_count: u32,
        aired_episodes: u32,
    ) -> SeasonCounts {
        SeasonCounts {
            season_number,
            episode_count,
            aired_episodes,
        }
    }

    /// One hour initial delay, doubling, capped at a day, three attempts.
    pub fn test_policy() -> RetryPolicy {
        RetryPolicy::new(
            Duration::from_secs(3600),
            2.0,
            Duration::from_secs(24 * 3600),
            3,
        )
    }

    /// A gateway over an in-memory store and mock collaborators.
    ///
    /// Side effects are not delivered until [`TestGateway::flush_effects`]
    /// is called, which keeps assertions on the mocks deterministic.
    pub struct TestGateway {
        pub gateway: ReconciliationGateway,
        pub store: Arc<SqliteMediaStore>,
        pub backend: Arc<MockFetchBackend>,
        pub upstream: Arc<MockRequestService>,
        pub metadata: Arc<MockMetadataProvider>,
        dispatcher: Mutex<SideEffectDispatcher>,
        movie_capacity: usize,
        show_capacity: usize,
        policy: RetryPolicy,
    }

    impl TestGateway {
        pub fn new() -> Self {
            Self::with_capacity(250, 250)
        }

        pub fn with_capacity(movie_capacity: usize, show_capacity: usize) -> Self {
            Self::with_options(movie_capacity, show_capacity, test_policy())
        }

        pub fn with_options(
            movie_capacity: usize,
            show_capacity: usize,
            policy: RetryPolicy,
        ) -> Self {
            let store = Arc::new(SqliteMediaStore::in_memory().expect("in-memory store"));
            Self::assemble(
                store,
                Arc::new(MockFetchBackend::new()),
                Arc::new(MockRequestService::new()),
                Arc::new(MockMetadataProvider::new()),
                movie_capacity,
                show_capacity,
                policy,
            )
        }

        /// A new gateway with an empty queue over the same store and mocks,
        /// as after a process restart.
        pub fn restart(&self) -> Self {
            Self::assemble(
                Arc::clone(&self.store),
                Arc::clone(&self.backend),
                Arc::clone(&self.upstream),
                Arc::clone(&self.metadata),
                self.movie_capacity,
                self.show_capacity,
                self.policy,
            )
        }

        fn assemble(
            store: Arc<SqliteMediaStore>,
            backend: Arc<MockFetchBackend>,
            upstream: Arc<MockRequestService>,
            metadata: Arc<MockMetadataProvider>,
            movie_capacity: usize,
            show_capacity: usize,
            policy: RetryPolicy,
        ) -> Self {
            let (effects, dispatcher) = create_side_effect_system(
                Some(backend.clone() as Arc<dyn FetchBackend>),
                Some(upstream.clone() as Arc<dyn RequestService>),
                256,
            );
            let queue = Arc::new(DispatchQueue::new(
                movie_capacity,
                show_capacity,
                Duration::from_secs(60),
            ));
            let gateway = ReconciliationGateway::new(store.clone(), queue, policy, effects)
                .with_backend(backend.clone())
                .with_upstream(upstream.clone())
                .with_metadata(metadata.clone() as Arc<dyn MetadataProvider>);

            Self {
                gateway,
                store,
                backend,
                upstream,
                metadata,
                dispatcher: Mutex::new(dispatcher),
                movie_capacity,
                show_capacity,
                policy,
            }
        }

        /// Deliver every side effect posted so far.
        pub async fn flush_effects(&self) -> usize {
            self.dispatcher.lock().await.drain().await
        }
    }

    impl Default for TestGateway {
        fn default() -> Self {
            Self::new()
        }
    }
}
