//! Handler run summaries
//!
//! Stored as JSON in `sync_operations.summary` and returned by the status
//! endpoint.

use serde::Serialize;
use uuid::Uuid;

use crate::conflict::Side;

/// Why one batch entry was not applied
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Rejection {
    pub index: usize,
    pub reason: String,
}

/// Per-entity outcome counts of a batch
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BatchSummary {
    pub inserted: usize,
    pub skipped_duplicate: usize,
    pub rejected_invalid: usize,
    pub rejections: Vec<Rejection>,
}

impl BatchSummary {
    pub fn record_inserted(&mut self) {
        self.inserted += 1;
    }

    pub fn record_duplicate(&mut self) {
        self.skipped_duplicate += 1;
    }

    pub fn record_rejected(&mut self, index: usize, reason: impl Into<String>) {
        self.rejected_invalid += 1;
        self.rejections.push(Rejection {
            index,
            reason: reason.into(),
        });
    }
}

/// How a singleton record was written
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SingletonOutcome {
    Created,
    Merged,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SyncSummary {
    Conversation {
        conversation_id: Uuid,
        conversation_created: bool,
        #[serde(flatten)]
        messages: BatchSummary,
    },
    Emotion {
        #[serde(flatten)]
        emotions: BatchSummary,
    },
    Baseline {
        baseline_type: String,
        outcome: SingletonOutcome,
        session_count: i64,
        strategy: Option<String>,
        winner: Option<Side>,
    },
    Preference {
        outcome: SingletonOutcome,
        strategy: Option<String>,
        winner: Option<Side>,
    },
}
