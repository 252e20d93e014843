//! Background scheduler for queue promotion, retry sweeps and
//! subscription checks.
//!
//! - **Promotion**: one loop per media kind, at most one entry processing per kind
//! - **Retry sweep**: periodic, bounded batch of failed records
//! - **Subscriptions**: periodic metadata refresh of subscribed shows

mod runner;
mod types;

pub use runner::Scheduler;
pub use types::{SchedulerConfig, SchedulerError, SchedulerStatus};
