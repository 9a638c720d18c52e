//! HTTP API handlers for resync-engine

pub mod health;
pub mod operations;
pub mod sse;

pub use health::health_routes;
pub use operations::operation_routes;
pub use sse::sync_event_stream;
