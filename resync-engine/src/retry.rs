//! Retry controller
//!
//! Wraps handler execution with bounded retries:
//!
//! ```text
//! pending → processing → completed
//!                      → pending   (retry_count += 1, retry_count < max)
//!                      → failed    (retry_count reached max, or not retryable)
//! ```
//!
//! The decision is made by [`RetryPolicy`], a pure function of the previous
//! retry count; [`RetryController`] applies it to the queue.
//!
//! Status writes after a handler run are re-run on lock contention. If one
//! still fails, the row stays `processing` until its claim lease expires and
//! a worker reclaims it; the handler then runs again against already
//! committed data and converges to the same result.

use futures::FutureExt;
use resync_common::db::SyncOperation;
use resync_common::events::{EventBus, SyncEvent};
use resync_common::time::{now, now_millis};
use serde_json::Value;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::db::SyncQueue;
use crate::error::SyncError;
use crate::handlers::OperationExecutor;
use crate::utils::retry_on_lock;

/// Default retry ceiling
pub const MAX_RETRIES: u32 = 3;

/// Default claim lease
pub const DEFAULT_PROCESSING_LEASE: Duration = Duration::from_secs(300);

/// Default time a status write is re-run on lock contention
pub const DEFAULT_MAX_LOCK_WAIT_MS: u64 = 5000;

/// What happens to an operation after a failed attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Back to `pending`, claimable after `delay`
    Retry { retry_count: u32, delay: Duration },
    /// Terminal
    Fail { retry_count: u32 },
}

/// Retry ceiling and exponential backoff
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub backoff_unit: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: MAX_RETRIES,
            backoff_unit: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, backoff_unit: Duration) -> Self {
        Self {
            max_retries,
            backoff_unit,
        }
    }

    /// Decide the transition after a failed attempt
    ///
    /// `previous_retry_count` is the count stored before the attempt. The new
    /// count never exceeds `max_retries`.
    pub fn on_failure(&self, previous_retry_count: u32, retryable: bool) -> Transition {
        let retry_count = previous_retry_count.saturating_add(1).min(self.max_retries);

        if retryable && retry_count < self.max_retries {
            Transition::Retry {
                retry_count,
                delay: self.backoff_delay(retry_count),
            }
        } else {
            Transition::Fail { retry_count }
        }
    }

    /// `2^retry_count` backoff units
    pub fn backoff_delay(&self, retry_count: u32) -> Duration {
        self.backoff_unit
            .saturating_mul(2u32.saturating_pow(retry_count))
    }
}

/// Result of processing one claimed operation
#[derive(Debug, Clone, PartialEq)]
pub enum ProcessOutcome {
    Completed { summary: Option<Value> },
    RetryScheduled { retry_count: u32, delay: Duration },
    Failed { retry_count: u32, error: String },
}

/// Claims operations and applies handler outcomes to the queue
pub struct RetryController {
    queue: SyncQueue,
    executor: Arc<dyn OperationExecutor>,
    policy: RetryPolicy,
    event_bus: EventBus,
    lease: Duration,
    max_lock_wait_ms: u64,
}

impl RetryController {
    pub fn new(
        queue: SyncQueue,
        executor: Arc<dyn OperationExecutor>,
        policy: RetryPolicy,
        event_bus: EventBus,
    ) -> Self {
        Self {
            queue,
            executor,
            policy,
            event_bus,
            lease: DEFAULT_PROCESSING_LEASE,
            max_lock_wait_ms: DEFAULT_MAX_LOCK_WAIT_MS,
        }
    }

    /// How long a claim is held before the operation may be reclaimed
    pub fn with_lease(mut self, lease: Duration) -> Self {
        self.lease = lease;
        self
    }

    /// How long status writes are re-run on lock contention
    pub fn with_max_lock_wait_ms(mut self, max_lock_wait_ms: u64) -> Self {
        self.max_lock_wait_ms = max_lock_wait_ms;
        self
    }

    /// Claim and process the next due operation
    ///
    /// Returns `Ok(None)` when nothing is due.
    pub async fn process_next(&self) -> Result<Option<ProcessOutcome>, SyncError> {
        let lease_ms = i64::try_from(self.lease.as_millis()).unwrap_or(i64::MAX);
        let Some(operation) = self.queue.claim_next(now_millis(), lease_ms).await? else {
            return Ok(None);
        };

        self.process(&operation).await.map(Some)
    }

    /// Run the handler for an operation already in `processing`
    pub async fn process(&self, operation: &SyncOperation) -> Result<ProcessOutcome, SyncError> {
        let attempt = operation.retry_count + 1;

        info!(
            operation_id = %operation.id,
            operation_type = %operation.operation_type,
            attempt,
            "Processing sync operation"
        );

        let outcome = AssertUnwindSafe(async { self.executor.execute(operation).await })
            .catch_unwind()
            .await;

        // (error text, retryable)
        let failure = match outcome {
            Ok(Ok(report)) if report.success => {
                return self.complete(operation, report.summary).await;
            }
            Ok(Ok(report)) => (
                report
                    .error
                    .unwrap_or_else(|| "handler reported failure".to_string()),
                true,
            ),
            Ok(Err(err)) => (err.to_string(), err.is_retryable()),
            Err(panic) => (
                SyncError::HandlerPanicked(panic_message(panic.as_ref())).to_string(),
                true,
            ),
        };

        self.fail(operation, failure.0, failure.1).await
    }

    async fn complete(
        &self,
        operation: &SyncOperation,
        summary: Option<Value>,
    ) -> Result<ProcessOutcome, SyncError> {
        let queue = &self.queue;
        let id = operation.id;
        let stored_summary = summary.as_ref();
        retry_on_lock("mark_completed", self.max_lock_wait_ms, move || async move {
            queue.mark_completed(id, stored_summary).await.map_err(SyncError::from)
        })
        .await?;

        info!(operation_id = %operation.id, "Sync operation completed");

        self.event_bus.emit_lossy(SyncEvent::OperationCompleted {
            operation_id: operation.id,
            user_id: operation.user_id.clone(),
            summary: summary.clone().unwrap_or(Value::Null),
            timestamp: now(),
        });

        Ok(ProcessOutcome::Completed { summary })
    }

    async fn fail(
        &self,
        operation: &SyncOperation,
        error_text: String,
        retryable: bool,
    ) -> Result<ProcessOutcome, SyncError> {
        let queue = &self.queue;
        let id = operation.id;
        let error_ref = error_text.as_str();

        match self.policy.on_failure(operation.retry_count, retryable) {
            Transition::Retry { retry_count, delay } => {
                let delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
                let available_at_ms =
                    now_millis().saturating_add(i64::try_from(delay_ms).unwrap_or(i64::MAX));

                retry_on_lock("reschedule", self.max_lock_wait_ms, move || async move {
                    queue
                        .reschedule(id, retry_count, available_at_ms, error_ref)
                        .await
                        .map_err(SyncError::from)
                })
                .await?;

                warn!(
                    operation_id = %operation.id,
                    retry_count,
                    delay_ms,
                    error = %error_text,
                    "Sync operation failed, retry scheduled"
                );

                self.event_bus.emit_lossy(SyncEvent::OperationRetryScheduled {
                    operation_id: operation.id,
                    user_id: operation.user_id.clone(),
                    retry_count,
                    delay_ms,
                    error: error_text,
                    timestamp: now(),
                });

                Ok(ProcessOutcome::RetryScheduled { retry_count, delay })
            }
            Transition::Fail { retry_count } => {
                retry_on_lock("mark_failed", self.max_lock_wait_ms, move || async move {
                    queue
                        .mark_failed(id, retry_count, error_ref)
                        .await
                        .map_err(SyncError::from)
                })
                .await?;

                if retryable {
                    let exhausted = SyncError::ExhaustedRetries {
                        operation_id: operation.id,
                        attempts: retry_count,
                        last_error: error_text.clone(),
                    };
                    error!(
                        operation_id = %operation.id,
                        retry_count,
                        error = %exhausted,
                        "Sync operation failed permanently"
                    );
                } else {
                    error!(
                        operation_id = %operation.id,
                        retry_count,
                        error = %error_text,
                        "Sync operation failed permanently (not retryable)"
                    );
                }

                self.event_bus.emit_lossy(SyncEvent::OperationFailed {
                    operation_id: operation.id,
                    user_id: operation.user_id.clone(),
                    retry_count,
                    error: error_text.clone(),
                    timestamp: now(),
                });

                Ok(ProcessOutcome::Failed {
                    retry_count,
                    error: error_text,
                })
            }
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> RetryPolicy {
        RetryPolicy::new(3, Duration::from_millis(100))
    }

    #[test]
    fn test_first_failures_retry_with_exponential_backoff() {
        assert_eq!(
            policy().on_failure(0, true),
            Transition::Retry {
                retry_count: 1,
                delay: Duration::from_millis(200)
            }
        );
        assert_eq!(
            policy().on_failure(1, true),
            Transition::Retry {
                retry_count: 2,
                delay: Duration::from_millis(400)
            }
        );
    }

    #[test]
    fn test_ceiling_fails() {
        assert_eq!(policy().on_failure(2, true), Transition::Fail { retry_count: 3 });
    }

    #[test]
    fn test_retry_count_never_exceeds_ceiling() {
        assert_eq!(policy().on_failure(3, true), Transition::Fail { retry_count: 3 });
        assert_eq!(policy().on_failure(u32::MAX, true), Transition::Fail { retry_count: 3 });
    }

    #[test]
    fn test_non_retryable_fails_immediately() {
        assert_eq!(policy().on_failure(0, false), Transition::Fail { retry_count: 1 });
    }

    #[test]
    fn test_backoff_saturates() {
        let p = RetryPolicy::new(100, Duration::from_secs(1));
        assert_eq!(p.backoff_delay(64), Duration::from_secs(1).saturating_mul(u32::MAX));
    }

    #[test]
    fn test_panic_message_extraction() {
        let payload: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(payload.as_ref()), "boom");

        let payload: Box<dyn Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_message(payload.as_ref()), "bang");
    }
}
