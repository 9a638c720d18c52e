//! Data models for resync-engine
//!
//! - [`payload`]: typed operation payloads decoded at submission
//! - [`summary`]: per-run summaries written back to the queue

pub mod payload;
pub mod summary;

pub use payload::{
    BaselinePayload, ClientId, ConversationPayload, EmotionEntry, EmotionPayload, Entry,
    MessageEntry, PreferencePayload, SyncPayload,
};
pub use summary::{BatchSummary, Rejection, SingletonOutcome, SyncSummary};
