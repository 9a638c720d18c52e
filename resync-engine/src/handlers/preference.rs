//! `user_preference_sync` handler

use resync_common::db::Preferences;
use serde_json::Value;
use sqlx::SqliteConnection;
use tracing::info;

use super::OperationContext;
use crate::conflict::{ConflictResolver, Versioned};
use crate::db::preferences::{get_preferences, insert_preferences, update_preferences};
use crate::error::SyncError;
use crate::models::{PreferencePayload, SingletonOutcome, SyncSummary};

/// Preference key naming the user's chosen merge strategy
pub const USER_STRATEGY_KEY: &str = "merge_strategy";

/// Strategy the user has chosen for their singleton records, if any
pub(crate) fn user_strategy(preferences: Option<&Preferences>) -> Option<String> {
    preferences
        .and_then(|p| p.value.get(USER_STRATEGY_KEY))
        .and_then(Value::as_str)
        .map(str::to_string)
}

/// Strategy for merging an incoming preference snapshot
///
/// The snapshot's own `merge_strategy` wins, then an explicit
/// `conflict_strategy`, then the stored choice. A snapshot that changes
/// `merge_strategy` is always merged under the new value.
fn incoming_user_strategy(payload: &PreferencePayload, existing: &Preferences) -> Option<String> {
    if let Some(name) = payload.values.get(USER_STRATEGY_KEY).and_then(Value::as_str) {
        return Some(name.to_string());
    }
    if payload.conflict_strategy.is_some() {
        return None;
    }
    user_strategy(Some(existing))
}

/// Stored preferences of `user_id`, looked up for their merge strategy
pub(crate) async fn load_user_strategy(
    conn: &mut SqliteConnection,
    user_id: &str,
) -> Result<Option<String>, SyncError> {
    let preferences = get_preferences(&mut *conn, user_id).await?;
    Ok(user_strategy(preferences.as_ref()))
}

pub(crate) async fn apply(
    conn: &mut SqliteConnection,
    context: &OperationContext,
    resolver: &ConflictResolver,
    payload: &PreferencePayload,
) -> Result<SyncSummary, SyncError> {
    let local_at = payload.updated_at.unwrap_or(context.submitted_at);
    let local_value = Value::Object(payload.values.clone());

    let Some(existing) = get_preferences(&mut *conn, &context.user_id).await? else {
        insert_preferences(
            &mut *conn,
            &Preferences {
                user_id: context.user_id.clone(),
                value: local_value,
                created_at: local_at,
                updated_at: local_at,
            },
        )
        .await?;

        info!(
            operation_id = %context.operation_id,
            user_id = %context.user_id,
            "Preferences created"
        );

        return Ok(SyncSummary::Preference {
            outcome: SingletonOutcome::Created,
            strategy: None,
            winner: None,
        });
    };

    let user_preference = incoming_user_strategy(payload, &existing);
    let merged = resolver.resolve(
        &Versioned::new(local_value, Some(local_at)),
        &Versioned::new(existing.value.clone(), Some(existing.updated_at)),
        payload.conflict_strategy.as_deref(),
        user_preference.as_deref(),
    )?;

    update_preferences(
        &mut *conn,
        &Preferences {
            user_id: existing.user_id.clone(),
            value: merged.value,
            created_at: existing.created_at,
            updated_at: merged.updated_at.unwrap_or(existing.updated_at),
        },
    )
    .await?;

    info!(
        operation_id = %context.operation_id,
        user_id = %context.user_id,
        strategy = %merged.strategy,
        winner = ?merged.winner,
        "Preferences merged"
    );

    Ok(SyncSummary::Preference {
        outcome: SingletonOutcome::Merged,
        strategy: Some(merged.strategy),
        winner: Some(merged.winner),
    })
}
