//! Server-Sent Events for sync lifecycle streaming

use axum::{
    extract::State,
    response::sse::{Event, Sse},
};
use futures::stream::Stream;
use std::convert::Infallible;

use crate::AppState;

/// GET /events - SSE stream of queue lifecycle events
///
/// Streams:
/// - OperationSubmitted
/// - OperationCompleted
/// - OperationRetryScheduled
/// - OperationFailed
pub async fn sync_event_stream(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    resync_common::sse::sync_event_sse_stream(&state.event_bus)
}
