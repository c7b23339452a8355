//! Change history written to `table_audit`.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::{Entity, Result};

/// What happened to a record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AuditAction {
    Insert,
    Update,
    Delete,
    /// Record copied from dev into prod
    Sync,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::Insert => "INSERT",
            AuditAction::Update => "UPDATE",
            AuditAction::Delete => "DELETE",
            AuditAction::Sync => "SYNC",
        }
    }
}

impl std::fmt::Display for AuditAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A stored audit row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct TableAudit {
    pub audit_id: i32,
    pub table_name: String,
    pub record_id: i32,
    pub action: String,
    pub old_data: Option<serde_json::Value>,
    pub new_data: Option<serde_json::Value>,
    pub changed_by: Option<String>,
    pub changed_at: NaiveDateTime,
    pub change_reason: Option<String>,
}

/// An audit row to be written
#[derive(Debug, Clone, PartialEq)]
pub struct NewAuditEntry {
    pub table_name: String,
    pub record_id: i32,
    pub action: AuditAction,
    pub old_data: Option<serde_json::Value>,
    pub new_data: Option<serde_json::Value>,
    pub changed_by: Option<String>,
    pub changed_at: NaiveDateTime,
    pub change_reason: Option<String>,
}

impl NewAuditEntry {
    /// Build an entry from before/after snapshots of an entity.
    ///
    /// Snapshots go through the entity's `Serialize` impl, so credential
    /// secrets are already redacted.
    pub fn for_change<T: Entity>(
        action: AuditAction,
        record_id: i32,
        old: Option<&T>,
        new: Option<&T>,
        changed_by: Option<&str>,
        changed_at: NaiveDateTime,
    ) -> Result<Self> {
        Ok(Self {
            table_name: T::KIND.table_name().to_string(),
            record_id,
            action,
            old_data: old.map(serde_json::to_value).transpose()?,
            new_data: new.map(serde_json::to_value).transpose()?,
            changed_by: changed_by.map(str::to_string),
            changed_at,
            change_reason: None,
        })
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.change_reason = Some(reason.into());
        self
    }

    /// Materialize as a stored row with the given id.
    pub fn into_row(self, audit_id: i32) -> TableAudit {
        TableAudit {
            audit_id,
            table_name: self.table_name,
            record_id: self.record_id,
            action: self.action.as_str().to_string(),
            old_data: self.old_data,
            new_data: self.new_data,
            changed_by: self.changed_by,
            changed_at: self.changed_at,
            change_reason: self.change_reason,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{CategoryDraft, EntityDraft};
    use chrono::NaiveDate;
    use serde_json::json;

    #[test]
    fn test_entry_snapshots_are_redacted() {
        let at = NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_opt(8, 0, 0)
            .unwrap();
        let category = CategoryDraft {
            categoryname: "warehouse".to_string(),
            systemid: 2,
            db_creds: Some(json!({"host": "h", "password": "pw"})),
            ..Default::default()
        }
        .into_entity(9);

        let entry = NewAuditEntry::for_change(
            AuditAction::Insert,
            9,
            None,
            Some(&category),
            Some("alice"),
            at,
        )
        .unwrap()
        .with_reason("created via API");

        assert_eq!(entry.table_name, "category");
        assert!(entry.old_data.is_none());
        let new_data = entry.new_data.as_ref().unwrap();
        assert_eq!(new_data["db_creds"]["password"], json!(crate::credentials::REDACTED));

        let row = entry.into_row(1);
        assert_eq!(row.action, "INSERT");
        assert_eq!(row.changed_by.as_deref(), Some("alice"));
        assert_eq!(row.change_reason.as_deref(), Some("created via API"));
    }

    #[test]
    fn test_action_serialization() {
        assert_eq!(serde_json::to_value(AuditAction::Sync).unwrap(), json!("SYNC"));
        assert_eq!(AuditAction::Delete.to_string(), "DELETE");
    }
}
