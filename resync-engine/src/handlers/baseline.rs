//! `baseline_update` handler

use resync_common::db::Baseline;
use serde_json::Value;
use sqlx::SqliteConnection;
use tracing::info;

use super::preference::load_user_strategy;
use super::OperationContext;
use crate::conflict::{ConflictResolver, Versioned};
use crate::db::baselines::{get_baseline, insert_baseline, update_baseline};
use crate::error::SyncError;
use crate::models::{BaselinePayload, SingletonOutcome, SyncSummary};

/// Session counters only grow: whichever side has seen more sessions wins
pub fn merge_session_count(local: i64, remote: i64) -> i64 {
    local.max(remote)
}

pub(crate) async fn apply(
    conn: &mut SqliteConnection,
    context: &OperationContext,
    resolver: &ConflictResolver,
    payload: &BaselinePayload,
) -> Result<SyncSummary, SyncError> {
    let baseline_type = payload.baseline_type.trim();
    if baseline_type.is_empty() {
        return Err(SyncError::Validation("baseline_type is required".to_string()));
    }
    if payload.session_count < 0 {
        return Err(SyncError::Validation(format!(
            "session_count must not be negative, got {}",
            payload.session_count
        )));
    }

    let local_at = payload.updated_at.unwrap_or(context.submitted_at);
    let local_value = Value::Object(payload.metrics.clone());

    let Some(existing) = get_baseline(&mut *conn, &context.user_id, baseline_type).await? else {
        insert_baseline(
            &mut *conn,
            &Baseline {
                user_id: context.user_id.clone(),
                baseline_type: baseline_type.to_string(),
                value: local_value,
                session_count: payload.session_count,
                established_at: local_at,
                updated_at: local_at,
            },
        )
        .await?;

        info!(
            operation_id = %context.operation_id,
            user_id = %context.user_id,
            baseline_type,
            session_count = payload.session_count,
            "Baseline established"
        );

        return Ok(SyncSummary::Baseline {
            baseline_type: baseline_type.to_string(),
            outcome: SingletonOutcome::Created,
            session_count: payload.session_count,
            strategy: None,
            winner: None,
        });
    };

    let user_preference = load_user_strategy(conn, &context.user_id).await?;
    let merged = resolver.resolve(
        &Versioned::new(local_value, Some(local_at)),
        &Versioned::new(existing.value.clone(), Some(existing.updated_at)),
        payload.conflict_strategy.as_deref(),
        user_preference.as_deref(),
    )?;

    let session_count = merge_session_count(payload.session_count, existing.session_count);

    update_baseline(
        &mut *conn,
        &Baseline {
            user_id: existing.user_id.clone(),
            baseline_type: existing.baseline_type.clone(),
            value: merged.value,
            session_count,
            established_at: existing.established_at,
            updated_at: merged.updated_at.unwrap_or(existing.updated_at),
        },
    )
    .await?;

    info!(
        operation_id = %context.operation_id,
        user_id = %context.user_id,
        baseline_type,
        session_count,
        strategy = %merged.strategy,
        winner = ?merged.winner,
        "Baseline merged"
    );

    Ok(SyncSummary::Baseline {
        baseline_type: baseline_type.to_string(),
        outcome: SingletonOutcome::Merged,
        session_count,
        strategy: Some(merged.strategy),
        winner: Some(merged.winner),
    })
}
