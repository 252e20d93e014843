pub mod audit;
pub mod backend;
pub mod config;
pub mod events;
pub mod gateway;
pub mod ledger;
pub mod media;
pub mod metadata;
pub mod metrics;
pub mod queue;
pub mod retry;
pub mod scheduler;
pub mod testing;
pub mod upstream;

pub use config::{
    load_config, load_config_from_str, validate_config, Config, ConfigError, SanitizedConfig,
};
pub use gateway::{GatewayError, ReconciliationGateway};
pub use media::{MediaKind, MediaRecord, MediaStatus, MediaStore, SqliteMediaStore};
pub use queue::DispatchQueue;
pub use retry::RetryPolicy;
pub use scheduler::{Scheduler, SchedulerConfig, SchedulerStatus};
