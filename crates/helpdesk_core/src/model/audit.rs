//! Audit ledger records and entity snapshots.
//!
//! # Responsibility
//! - Capture before/after entity state as opaque JSON text.
//! - Describe one ledger append ([`AuditEntry`]) and one stored row
//!   ([`AuditRecord`]).
//!
//! # Invariants
//! - Snapshot capture never fails: values that cannot be serialized are
//!   stored as a JSON string of their `Debug` form and flagged degraded.
//! - Stored records are immutable; there is no update path.

use crate::model::board::UserId;
use log::warn;
use serde::Serialize;
use std::fmt::Debug;

/// Opaque serialized entity state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    raw: String,
    degraded: bool,
}

impl Snapshot {
    /// Serializes `value` to JSON, degrading to a string form on failure.
    pub fn capture<T>(value: &T) -> Self
    where
        T: Serialize + Debug + ?Sized,
    {
        match serde_json::to_string(value) {
            Ok(raw) => Self {
                raw,
                degraded: false,
            },
            Err(err) => {
                warn!("event=audit_snapshot module=audit status=degraded error={err}");
                let fallback = serde_json::Value::String(format!("{value:?}"));
                Self {
                    raw: fallback.to_string(),
                    degraded: true,
                }
            }
        }
    }

    /// Wraps text loaded back from the ledger.
    pub fn from_stored(raw: String) -> Self {
        Self {
            raw,
            degraded: false,
        }
    }

    /// Stored text, returned verbatim.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Whether capture fell back to the degraded string form.
    ///
    /// Only meaningful for snapshots captured in this process.
    pub fn is_degraded(&self) -> bool {
        self.degraded
    }

    /// Parses the stored text as JSON, if it is JSON.
    pub fn to_value(&self) -> Option<serde_json::Value> {
        serde_json::from_str(&self.raw).ok()
    }
}

/// One ledger append request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditEntry {
    pub entity_type: String,
    pub action: String,
    pub message: String,
    pub entity_id: Option<String>,
    pub before: Option<Snapshot>,
    pub after: Option<Snapshot>,
}

impl AuditEntry {
    pub fn new(
        entity_type: impl Into<String>,
        action: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            entity_type: entity_type.into(),
            action: action.into(),
            message: message.into(),
            entity_id: None,
            before: None,
            after: None,
        }
    }

    /// Sets the audited entity id (any displayable id: uuid, ticket number).
    pub fn entity(mut self, id: impl ToString) -> Self {
        self.entity_id = Some(id.to_string());
        self
    }

    pub fn before<T>(mut self, value: &T) -> Self
    where
        T: Serialize + Debug + ?Sized,
    {
        self.before = Some(Snapshot::capture(value));
        self
    }

    pub fn after<T>(mut self, value: &T) -> Self
    where
        T: Serialize + Debug + ?Sized,
    {
        self.after = Some(Snapshot::capture(value));
        self
    }

    /// Whether any attached snapshot was degraded during capture.
    pub fn is_degraded(&self) -> bool {
        self.before.as_ref().is_some_and(Snapshot::is_degraded)
            || self.after.as_ref().is_some_and(Snapshot::is_degraded)
    }
}

/// Stored ledger row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditRecord {
    pub id: i64,
    /// Epoch ms.
    pub created_at: i64,
    pub actor_id: Option<UserId>,
    pub actor_email: Option<String>,
    pub actor_name: Option<String>,
    pub ip: Option<String>,
    pub user_agent: Option<String>,
    pub entity_type: String,
    pub entity_id: Option<String>,
    pub action: String,
    pub message: String,
    pub before: Option<Snapshot>,
    pub after: Option<Snapshot>,
}

#[cfg(test)]
mod tests {
    use super::{AuditEntry, Snapshot};
    use std::collections::BTreeMap;

    #[test]
    fn capture_serializes_structured_values() {
        let snapshot = Snapshot::capture(&serde_json::json!({"status": "open"}));
        assert!(!snapshot.is_degraded());
        assert_eq!(snapshot.to_value().unwrap()["status"], "open");
    }

    #[test]
    fn capture_degrades_when_serialization_fails() {
        // JSON object keys must be strings; tuple keys make serde_json fail.
        let mut value = BTreeMap::new();
        value.insert((1, 2), "cell");

        let snapshot = Snapshot::capture(&value);
        assert!(snapshot.is_degraded());
        let parsed = snapshot.to_value().unwrap();
        assert!(parsed.as_str().unwrap().contains("cell"));
    }

    #[test]
    fn entry_builder_tracks_degraded_snapshots() {
        let mut broken = BTreeMap::new();
        broken.insert((0, 0), 1);

        let entry = AuditEntry::new("Task", "update", "fields: title")
            .entity(42)
            .before(&serde_json::json!({"title": "a"}))
            .after(&broken);
        assert_eq!(entry.entity_id.as_deref(), Some("42"));
        assert!(entry.is_degraded());
    }
}
