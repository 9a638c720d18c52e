//! Identity resolution
//!
//! Maps client-local identifiers (counters, temp ids) to stable UUIDs. The
//! mapping is a pure function of its inputs: the same (user, discriminator,
//! client value) yields the same id on every call, on every node, across
//! restarts. Redelivery safety everywhere else depends on this.

use resync_common::uuid_utils;
use uuid::Uuid;

/// Stable server-side identifier
pub type StableId = Uuid;

/// Fixed namespace for all derived ids. Changing it re-keys every entity.
pub const SYNC_NAMESPACE: Uuid = Uuid::from_u128(0x6f1c_2b8e_94d3_5a07_b1e4_3c9d_72a6_0f58);

/// Discriminator for user ids
pub const USER: &str = "user";

/// Discriminator for conversation ids
pub const CONVERSATION: &str = "conversation";

/// Discriminator for emotion record ids
pub const EMOTION: &str = "emotion";

/// Discriminator for message ids, scoped to one conversation
pub fn message_scope(conversation_id: &StableId) -> String {
    format!("message:{}", conversation_id)
}

/// Resolve a client value to a stable id
///
/// Values that already parse as UUIDs are returned unchanged. Anything else
/// is hashed (UUIDv5) together with the user and discriminator, so equal
/// client counters used for different entity kinds never collide.
pub fn resolve(user_id: &str, discriminator: &str, client_value: &str) -> StableId {
    if let Some(id) = uuid_utils::parse_opt(client_value) {
        return id;
    }

    Uuid::new_v5(&SYNC_NAMESPACE, derivation_name(user_id, discriminator, client_value).as_bytes())
}

/// Length-prefixed so that separators inside user ids cannot alias another tuple
fn derivation_name(user_id: &str, discriminator: &str, client_value: &str) -> String {
    format!(
        "{}:{}|{}:{}|{}:{}",
        user_id.len(),
        user_id,
        discriminator.len(),
        discriminator,
        client_value.len(),
        client_value
    )
}
