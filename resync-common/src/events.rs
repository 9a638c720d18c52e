//! Sync lifecycle events
//!
//! The engine broadcasts one event per queue transition. Subscribers (the
//! SSE endpoint, tests) receive events emitted after they subscribe.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::db::OperationType;

/// Queue lifecycle event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum SyncEvent {
    /// Operation accepted into the queue
    OperationSubmitted {
        operation_id: Uuid,
        user_id: String,
        operation_type: OperationType,
        timestamp: DateTime<Utc>,
    },

    /// Handler succeeded; client may discard its local copy
    OperationCompleted {
        operation_id: Uuid,
        user_id: String,
        summary: serde_json::Value,
        timestamp: DateTime<Utc>,
    },

    /// Handler failed; operation re-queued after a backoff
    OperationRetryScheduled {
        operation_id: Uuid,
        user_id: String,
        retry_count: u32,
        delay_ms: u64,
        error: String,
        timestamp: DateTime<Utc>,
    },

    /// Retry ceiling reached; manual resubmission required
    OperationFailed {
        operation_id: Uuid,
        user_id: String,
        retry_count: u32,
        error: String,
        timestamp: DateTime<Utc>,
    },
}

impl SyncEvent {
    /// Event name used as the SSE `event:` field
    pub fn event_type(&self) -> &'static str {
        match self {
            SyncEvent::OperationSubmitted { .. } => "OperationSubmitted",
            SyncEvent::OperationCompleted { .. } => "OperationCompleted",
            SyncEvent::OperationRetryScheduled { .. } => "OperationRetryScheduled",
            SyncEvent::OperationFailed { .. } => "OperationFailed",
        }
    }

    pub fn operation_id(&self) -> Uuid {
        match self {
            SyncEvent::OperationSubmitted { operation_id, .. }
            | SyncEvent::OperationCompleted { operation_id, .. }
            | SyncEvent::OperationRetryScheduled { operation_id, .. }
            | SyncEvent::OperationFailed { operation_id, .. } => *operation_id,
        }
    }
}

/// Broadcast channel for [`SyncEvent`]s
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<SyncEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    ///
    /// Slow subscribers lose the oldest events once `capacity` is exceeded.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.tx.subscribe()
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: SyncEvent) {
        let _ = self.tx.send(event);
    }

    /// Get the current number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Get the configured channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_subscriber_receives_emitted_event() {
        let bus = EventBus::new(10);
        let mut rx = bus.subscribe();
        let id = Uuid::new_v4();

        bus.emit_lossy(SyncEvent::OperationFailed {
            operation_id: id,
            user_id: "u1".to_string(),
            retry_count: 3,
            error: "store unavailable".to_string(),
            timestamp: Utc::now(),
        });

        let event = rx.recv().await.unwrap();
        assert_eq!(event.operation_id(), id);
        assert_eq!(event.event_type(), "OperationFailed");
    }

    #[test]
    fn test_emit_without_subscribers_is_silent() {
        let bus = EventBus::new(4);
        assert_eq!(bus.subscriber_count(), 0);
        bus.emit_lossy(SyncEvent::OperationSubmitted {
            operation_id: Uuid::new_v4(),
            user_id: "u1".to_string(),
            operation_type: OperationType::BaselineUpdate,
            timestamp: Utc::now(),
        });
        assert_eq!(bus.capacity(), 4);
    }

    #[test]
    fn test_event_serializes_with_type_tag() {
        let event = SyncEvent::OperationSubmitted {
            operation_id: Uuid::nil(),
            user_id: "u1".to_string(),
            operation_type: OperationType::ConversationSync,
            timestamp: Utc::now(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "OperationSubmitted");
        assert_eq!(json["operation_type"], "conversation_sync");
    }
}
