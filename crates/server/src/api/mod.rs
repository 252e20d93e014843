pub mod audit;
pub mod error;
pub mod handlers;
pub mod media;
pub mod middleware;
pub mod queue;
pub mod routes;
pub mod webhook;

pub use routes::create_router;
