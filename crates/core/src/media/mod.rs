//! Unified lifecycle records for requested movies and shows.

mod sqlite_store;
mod store;
mod types;

pub use sqlite_store::SqliteMediaStore;
pub use store::{MediaError, MediaFilter, MediaStore};
pub use types::{
    DisplayStatus, ExternalIds, InvalidTransition, MediaKind, MediaRecord, MediaStatus,
    UpstreamIds,
};
