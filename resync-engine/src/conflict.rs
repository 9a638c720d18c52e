//! Conflict resolution for singleton records
//!
//! Merges a local snapshot (the incoming payload) with a remote snapshot
//! (the row already stored). Pure: no I/O, no clock reads.
//!
//! Strategies are looked up by name in a [`ConflictResolver`] registry built
//! from configuration. `last_write_wins` is always registered and is the
//! default unless configuration names another.

use chrono::{DateTime, Utc};
use resync_common::config::SyncSettings;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::error::SyncError;

pub const LAST_WRITE_WINS: &str = "last_write_wins";
pub const PREFER_LOCAL: &str = "prefer_local";
pub const PREFER_REMOTE: &str = "prefer_remote";
pub const FIELD_MERGE: &str = "field_merge";

/// A value with its optional last-updated time
#[derive(Debug, Clone, PartialEq)]
pub struct Versioned {
    pub value: Value,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Versioned {
    pub fn new(value: Value, updated_at: Option<DateTime<Utc>>) -> Self {
        Self { value, updated_at }
    }
}

/// Which snapshot a merge took its value from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Local,
    Remote,
    /// Fields taken from both snapshots
    Both,
}

/// Result of a merge
#[derive(Debug, Clone, PartialEq)]
pub struct Merged {
    pub value: Value,
    pub updated_at: Option<DateTime<Utc>>,
    pub winner: Side,
    /// Name of the strategy that produced this merge
    pub strategy: String,
}

/// A named merge strategy
pub trait MergeStrategy: Send + Sync + fmt::Debug {
    fn name(&self) -> &str;

    fn merge(&self, local: &Versioned, remote: &Versioned) -> (Value, Option<DateTime<Utc>>, Side);
}

/// Later timestamp wins. Ties, and a missing local timestamp, favor remote.
pub fn last_write_winner(local: &Versioned, remote: &Versioned) -> Side {
    match (local.updated_at, remote.updated_at) {
        (Some(l), Some(r)) if l > r => Side::Local,
        (Some(_), None) => Side::Local,
        _ => Side::Remote,
    }
}

fn take(side: Side, local: &Versioned, remote: &Versioned) -> (Value, Option<DateTime<Utc>>, Side) {
    let chosen = if side == Side::Local { local } else { remote };
    (chosen.value.clone(), chosen.updated_at, side)
}

#[derive(Debug)]
pub struct LastWriteWins;

impl MergeStrategy for LastWriteWins {
    fn name(&self) -> &str {
        LAST_WRITE_WINS
    }

    fn merge(&self, local: &Versioned, remote: &Versioned) -> (Value, Option<DateTime<Utc>>, Side) {
        take(last_write_winner(local, remote), local, remote)
    }
}

#[derive(Debug)]
pub struct PreferLocal;

impl MergeStrategy for PreferLocal {
    fn name(&self) -> &str {
        PREFER_LOCAL
    }

    fn merge(&self, local: &Versioned, remote: &Versioned) -> (Value, Option<DateTime<Utc>>, Side) {
        take(Side::Local, local, remote)
    }
}

#[derive(Debug)]
pub struct PreferRemote;

impl MergeStrategy for PreferRemote {
    fn name(&self) -> &str {
        PREFER_REMOTE
    }

    fn merge(&self, local: &Versioned, remote: &Versioned) -> (Value, Option<DateTime<Utc>>, Side) {
        take(Side::Remote, local, remote)
    }
}

/// Union of object keys; keys on both sides take the last-write winner's value
///
/// Non-object values fall back to last-write-wins.
#[derive(Debug)]
pub struct FieldMerge;

impl MergeStrategy for FieldMerge {
    fn name(&self) -> &str {
        FIELD_MERGE
    }

    fn merge(&self, local: &Versioned, remote: &Versioned) -> (Value, Option<DateTime<Utc>>, Side) {
        let (Value::Object(local_fields), Value::Object(remote_fields)) = (&local.value, &remote.value)
        else {
            return LastWriteWins.merge(local, remote);
        };

        let winner = last_write_winner(local, remote);
        let (primary, secondary) = if winner == Side::Local {
            (local_fields, remote_fields)
        } else {
            (remote_fields, local_fields)
        };

        let mut merged = secondary.clone();
        for (key, value) in primary {
            merged.insert(key.clone(), value.clone());
        }

        let side = if local_fields.is_empty() || remote_fields.is_empty() {
            winner
        } else {
            Side::Both
        };

        (
            Value::Object(merged),
            later(local.updated_at, remote.updated_at),
            side,
        )
    }
}

fn later(a: Option<DateTime<Utc>>, b: Option<DateTime<Utc>>) -> Option<DateTime<Utc>> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.max(b)),
        (a, b) => a.or(b),
    }
}

/// Built-in strategy by name
pub fn builtin_strategy(name: &str) -> Option<Arc<dyn MergeStrategy>> {
    match name {
        LAST_WRITE_WINS => Some(Arc::new(LastWriteWins)),
        PREFER_LOCAL => Some(Arc::new(PreferLocal)),
        PREFER_REMOTE => Some(Arc::new(PreferRemote)),
        FIELD_MERGE => Some(Arc::new(FieldMerge)),
        _ => None,
    }
}

/// Registry of enabled merge strategies
#[derive(Debug, Clone)]
pub struct ConflictResolver {
    strategies: HashMap<String, Arc<dyn MergeStrategy>>,
    default_strategy: String,
}

impl Default for ConflictResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl ConflictResolver {
    /// Resolver with only `last_write_wins`
    pub fn new() -> Self {
        let mut strategies: HashMap<String, Arc<dyn MergeStrategy>> = HashMap::new();
        strategies.insert(LAST_WRITE_WINS.to_string(), Arc::new(LastWriteWins));
        Self {
            strategies,
            default_strategy: LAST_WRITE_WINS.to_string(),
        }
    }

    /// Resolver with the built-ins named in `[sync] strategies`
    pub fn from_settings(settings: &SyncSettings) -> resync_common::Result<Self> {
        let mut resolver = Self::new();

        for name in &settings.strategies {
            let strategy = builtin_strategy(name).ok_or_else(|| {
                resync_common::Error::Config(format!("Unknown conflict strategy in sync.strategies: {}", name))
            })?;
            resolver.register(strategy);
        }

        if !resolver.strategies.contains_key(&settings.default_strategy) {
            return Err(resync_common::Error::Config(format!(
                "sync.default_strategy '{}' is not enabled",
                settings.default_strategy
            )));
        }
        resolver.default_strategy = settings.default_strategy.clone();

        Ok(resolver)
    }

    /// Enable a strategy (replaces any strategy with the same name)
    pub fn register(&mut self, strategy: Arc<dyn MergeStrategy>) {
        self.strategies.insert(strategy.name().to_string(), strategy);
    }

    pub fn default_strategy(&self) -> &str {
        &self.default_strategy
    }

    pub fn strategy_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.strategies.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Merge `local` over `remote`
    ///
    /// Strategy precedence: `user_preference`, then `strategy`, then the
    /// configured default.
    pub fn resolve(
        &self,
        local: &Versioned,
        remote: &Versioned,
        strategy: Option<&str>,
        user_preference: Option<&str>,
    ) -> Result<Merged, SyncError> {
        let name = user_preference
            .or(strategy)
            .unwrap_or(self.default_strategy.as_str());

        let merge_strategy = self.strategies.get(name).ok_or_else(|| {
            SyncError::ConflictResolution(format!("Unrecognized conflict strategy: {}", name))
        })?;

        let (value, updated_at, winner) = merge_strategy.merge(local, remote);

        Ok(Merged {
            value,
            updated_at,
            winner,
            strategy: name.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn at(secs: i64) -> Option<DateTime<Utc>> {
        Some(Utc.timestamp_opt(secs, 0).unwrap())
    }

    fn all_strategies() -> ConflictResolver {
        ConflictResolver::from_settings(&SyncSettings::default()).unwrap()
    }

    #[test]
    fn test_last_write_wins_later_remote() {
        let resolver = ConflictResolver::new();
        let local = Versioned::new(json!("A"), at(100));
        let remote = Versioned::new(json!("B"), at(200));

        let merged = resolver.resolve(&local, &remote, None, None).unwrap();
        assert_eq!(merged.value, json!("B"));
        assert_eq!(merged.winner, Side::Remote);
        assert_eq!(merged.strategy, LAST_WRITE_WINS);
    }

    #[test]
    fn test_last_write_wins_later_local() {
        let resolver = ConflictResolver::new();
        let local = Versioned::new(json!("A"), at(200));
        let remote = Versioned::new(json!("B"), at(100));

        let merged = resolver.resolve(&local, &remote, None, None).unwrap();
        assert_eq!(merged.value, json!("A"));
        assert_eq!(merged.updated_at, at(200));
    }

    #[test]
    fn test_last_write_wins_tie_favors_remote() {
        let resolver = ConflictResolver::new();
        let local = Versioned::new(json!("A"), at(100));
        let remote = Versioned::new(json!("B"), at(100));

        let merged = resolver.resolve(&local, &remote, None, None).unwrap();
        assert_eq!(merged.value, json!("B"));
    }

    #[test]
    fn test_missing_timestamps() {
        let untimed = Versioned::new(json!("A"), None);
        let timed = Versioned::new(json!("B"), at(1));

        assert_eq!(last_write_winner(&untimed, &timed), Side::Remote);
        assert_eq!(last_write_winner(&timed, &untimed), Side::Local);
        assert_eq!(last_write_winner(&untimed, &untimed), Side::Remote);
    }

    #[test]
    fn test_user_preference_overrides_default() {
        let resolver = all_strategies();
        let local = Versioned::new(json!("A"), at(100));
        let remote = Versioned::new(json!("B"), at(200));

        let merged = resolver
            .resolve(&local, &remote, None, Some(PREFER_LOCAL))
            .unwrap();
        assert_eq!(merged.value, json!("A"));
        assert_eq!(merged.updated_at, at(100));
        assert_eq!(merged.strategy, PREFER_LOCAL);
    }

    #[test]
    fn test_user_preference_beats_explicit_strategy() {
        let resolver = all_strategies();
        let local = Versioned::new(json!("A"), at(300));
        let remote = Versioned::new(json!("B"), at(200));

        let merged = resolver
            .resolve(&local, &remote, Some(LAST_WRITE_WINS), Some(PREFER_REMOTE))
            .unwrap();
        assert_eq!(merged.value, json!("B"));
    }

    #[test]
    fn test_unknown_strategy_is_conflict_resolution_error() {
        let resolver = ConflictResolver::new();
        let local = Versioned::new(json!({}), at(1));
        let remote = Versioned::new(json!({}), at(2));

        let result = resolver.resolve(&local, &remote, None, Some("coin_flip"));
        assert!(matches!(result, Err(SyncError::ConflictResolution(_))));
    }

    #[test]
    fn test_disabled_builtin_is_rejected() {
        // Only last_write_wins is registered by new()
        let resolver = ConflictResolver::new();
        let local = Versioned::new(json!({}), at(1));
        let remote = Versioned::new(json!({}), at(2));

        assert!(resolver.resolve(&local, &remote, None, Some(FIELD_MERGE)).is_err());
    }

    #[test]
    fn test_field_merge_unions_keys() {
        let resolver = all_strategies();
        let local = Versioned::new(json!({"theme": "dark", "font": 14}), at(200));
        let remote = Versioned::new(json!({"theme": "light", "locale": "en"}), at(100));

        let merged = resolver
            .resolve(&local, &remote, None, Some(FIELD_MERGE))
            .unwrap();
        assert_eq!(merged.value, json!({"theme": "dark", "font": 14, "locale": "en"}));
        assert_eq!(merged.winner, Side::Both);
        assert_eq!(merged.updated_at, at(200));
    }

    #[test]
    fn test_field_merge_non_objects_fall_back() {
        let local = Versioned::new(json!(1), at(100));
        let remote = Versioned::new(json!(2), at(200));

        let (value, _, side) = FieldMerge.merge(&local, &remote);
        assert_eq!(value, json!(2));
        assert_eq!(side, Side::Remote);
    }

    #[test]
    fn test_from_settings_rejects_unknown_names() {
        let settings = SyncSettings {
            strategies: vec!["last_write_wins".to_string(), "majority_vote".to_string()],
            ..SyncSettings::default()
        };
        assert!(ConflictResolver::from_settings(&settings).is_err());
    }

    #[test]
    fn test_from_settings_requires_default_enabled() {
        let settings = SyncSettings {
            strategies: vec![],
            default_strategy: FIELD_MERGE.to_string(),
            ..SyncSettings::default()
        };
        assert!(ConflictResolver::from_settings(&settings).is_err());
    }

    #[test]
    fn test_custom_strategy_can_be_registered() {
        #[derive(Debug)]
        struct AlwaysEmpty;

        impl MergeStrategy for AlwaysEmpty {
            fn name(&self) -> &str {
                "always_empty"
            }

            fn merge(&self, _: &Versioned, _: &Versioned) -> (Value, Option<DateTime<Utc>>, Side) {
                (json!({}), None, Side::Both)
            }
        }

        let mut resolver = ConflictResolver::new();
        resolver.register(Arc::new(AlwaysEmpty));

        let local = Versioned::new(json!({"a": 1}), at(1));
        let merged = resolver
            .resolve(&local, &local, None, Some("always_empty"))
            .unwrap();
        assert_eq!(merged.value, json!({}));
        assert_eq!(resolver.strategy_names(), vec!["always_empty", LAST_WRITE_WINS]);
    }
}
