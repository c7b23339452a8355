//! The five metadata tables and their draft (request body) types.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::credentials::{
    reject_redacted_marker, restore_redacted_creds, serialize_redacted_creds,
};
use crate::validation::{
    validate_json_object, validate_optional_text, validate_required_text, MAX_NAME_LEN,
    MAX_STATUS_LEN,
};
use crate::{ColumnValue, Entity, EntityDraft, EntityKind, Result};

fn stamp_dates(
    date_created: &mut Option<NaiveDateTime>,
    date_updated: &mut Option<NaiveDateTime>,
    now: NaiveDateTime,
    creating: bool,
) {
    if creating && date_created.is_none() {
        *date_created = Some(now);
    }
    *date_updated = Some(now);
}

// ============================================================================
// Systems
// ============================================================================

/// A system registered in the metadata store (`systems` table)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct System {
    pub systemid: i32,
    pub systemname: String,
    pub systemurl: Option<String>,
    pub description: Option<String>,
    pub domain: Option<String>,
    pub date_created: Option<NaiveDateTime>,
    pub date_updated: Option<NaiveDateTime>,
    pub status: Option<String>,
    pub system_preferences: Option<serde_json::Value>,
}

/// Create/update body for [`System`]
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SystemDraft {
    pub systemname: String,
    #[serde(default)]
    pub systemurl: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub domain: Option<String>,
    #[serde(default)]
    pub date_created: Option<NaiveDateTime>,
    #[serde(default)]
    pub date_updated: Option<NaiveDateTime>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub system_preferences: Option<serde_json::Value>,
}

impl Entity for System {
    type Draft = SystemDraft;

    const KIND: EntityKind = EntityKind::System;

    const COLUMNS: &'static [&'static str] = &[
        "systemid",
        "systemname",
        "systemurl",
        "description",
        "domain",
        "date_created",
        "date_updated",
        "status",
        "system_preferences",
    ];

    fn id(&self) -> i32 {
        self.systemid
    }

    fn date_updated(&self) -> Option<NaiveDateTime> {
        self.date_updated
    }

    fn column_values(&self) -> Vec<ColumnValue> {
        vec![
            ColumnValue::Int(Some(self.systemid)),
            ColumnValue::Text(Some(self.systemname.clone())),
            ColumnValue::Text(self.systemurl.clone()),
            ColumnValue::Text(self.description.clone()),
            ColumnValue::Text(self.domain.clone()),
            ColumnValue::Timestamp(self.date_created),
            ColumnValue::Timestamp(self.date_updated),
            ColumnValue::Text(self.status.clone()),
            ColumnValue::Json(self.system_preferences.clone()),
        ]
    }
}

impl EntityDraft for SystemDraft {
    type Entity = System;

    fn validate(&self) -> Result<()> {
        validate_required_text(&self.systemname, "systemname", MAX_NAME_LEN)?;
        validate_optional_text(self.systemurl.as_deref(), "systemurl", MAX_NAME_LEN)?;
        validate_optional_text(self.status.as_deref(), "status", MAX_STATUS_LEN)
    }

    fn stamp(&mut self, now: NaiveDateTime, creating: bool) {
        stamp_dates(&mut self.date_created, &mut self.date_updated, now, creating);
    }

    fn inherit(&mut self, existing: &System) {
        self.date_created = self.date_created.or(existing.date_created);
    }

    fn column_values(&self) -> Vec<ColumnValue> {
        vec![
            ColumnValue::Text(Some(self.systemname.clone())),
            ColumnValue::Text(self.systemurl.clone()),
            ColumnValue::Text(self.description.clone()),
            ColumnValue::Text(self.domain.clone()),
            ColumnValue::Timestamp(self.date_created),
            ColumnValue::Timestamp(self.date_updated),
            ColumnValue::Text(self.status.clone()),
            ColumnValue::Json(self.system_preferences.clone()),
        ]
    }

    fn into_entity(self, id: i32) -> System {
        System {
            systemid: id,
            systemname: self.systemname,
            systemurl: self.systemurl,
            description: self.description,
            domain: self.domain,
            date_created: self.date_created,
            date_updated: self.date_updated,
            status: self.status,
            system_preferences: self.system_preferences,
        }
    }
}

// ============================================================================
// Roles
// ============================================================================

/// A role belonging to a system (`roles` table)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Role {
    pub roleid: i32,
    pub rolename: String,
    pub systemid: i32,
    pub description: Option<String>,
    pub role_preferences: Option<serde_json::Value>,
    pub date_created: Option<NaiveDateTime>,
    pub date_updated: Option<NaiveDateTime>,
    pub status: Option<String>,
}

/// Create/update body for [`Role`]
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RoleDraft {
    pub rolename: String,
    pub systemid: i32,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub role_preferences: Option<serde_json::Value>,
    #[serde(default)]
    pub date_created: Option<NaiveDateTime>,
    #[serde(default)]
    pub date_updated: Option<NaiveDateTime>,
    #[serde(default)]
    pub status: Option<String>,
}

impl Entity for Role {
    type Draft = RoleDraft;

    const KIND: EntityKind = EntityKind::Role;

    const COLUMNS: &'static [&'static str] = &[
        "roleid",
        "rolename",
        "systemid",
        "description",
        "role_preferences",
        "date_created",
        "date_updated",
        "status",
    ];

    fn id(&self) -> i32 {
        self.roleid
    }

    fn system_id(&self) -> Option<i32> {
        Some(self.systemid)
    }

    fn date_updated(&self) -> Option<NaiveDateTime> {
        self.date_updated
    }

    fn column_values(&self) -> Vec<ColumnValue> {
        vec![
            ColumnValue::Int(Some(self.roleid)),
            ColumnValue::Text(Some(self.rolename.clone())),
            ColumnValue::Int(Some(self.systemid)),
            ColumnValue::Text(self.description.clone()),
            ColumnValue::Json(self.role_preferences.clone()),
            ColumnValue::Timestamp(self.date_created),
            ColumnValue::Timestamp(self.date_updated),
            ColumnValue::Text(self.status.clone()),
        ]
    }
}

impl EntityDraft for RoleDraft {
    type Entity = Role;

    fn validate(&self) -> Result<()> {
        validate_required_text(&self.rolename, "rolename", MAX_NAME_LEN)?;
        validate_optional_text(self.status.as_deref(), "status", MAX_STATUS_LEN)
    }

    fn system_id(&self) -> Option<i32> {
        Some(self.systemid)
    }

    fn stamp(&mut self, now: NaiveDateTime, creating: bool) {
        stamp_dates(&mut self.date_created, &mut self.date_updated, now, creating);
    }

    fn inherit(&mut self, existing: &Role) {
        self.date_created = self.date_created.or(existing.date_created);
    }

    fn column_values(&self) -> Vec<ColumnValue> {
        vec![
            ColumnValue::Text(Some(self.rolename.clone())),
            ColumnValue::Int(Some(self.systemid)),
            ColumnValue::Text(self.description.clone()),
            ColumnValue::Json(self.role_preferences.clone()),
            ColumnValue::Timestamp(self.date_created),
            ColumnValue::Timestamp(self.date_updated),
            ColumnValue::Text(self.status.clone()),
        ]
    }

    fn into_entity(self, id: i32) -> Role {
        Role {
            roleid: id,
            rolename: self.rolename,
            systemid: self.systemid,
            description: self.description,
            role_preferences: self.role_preferences,
            date_created: self.date_created,
            date_updated: self.date_updated,
            status: self.status,
        }
    }
}

// ============================================================================
// Categories
// ============================================================================

/// A category belonging to a system (`category` table)
///
/// `db_type` and `db_creds` describe the source database used by the
/// onboarding flow. The password inside `db_creds` is redacted on
/// serialization; storage backends bind the raw value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Category {
    pub categoryid: i32,
    pub categoryname: String,
    pub systemid: i32,
    pub description: Option<String>,
    pub category_preferences: Option<serde_json::Value>,
    pub db_type: Option<String>,
    #[serde(serialize_with = "serialize_redacted_creds")]
    pub db_creds: Option<serde_json::Value>,
    pub date_created: Option<NaiveDateTime>,
    pub date_updated: Option<NaiveDateTime>,
    pub status: Option<String>,
}

/// Create/update body for [`Category`]
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CategoryDraft {
    pub categoryname: String,
    pub systemid: i32,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub category_preferences: Option<serde_json::Value>,
    #[serde(default)]
    pub db_type: Option<String>,
    #[serde(default, serialize_with = "serialize_redacted_creds")]
    pub db_creds: Option<serde_json::Value>,
    #[serde(default)]
    pub date_created: Option<NaiveDateTime>,
    #[serde(default)]
    pub date_updated: Option<NaiveDateTime>,
    #[serde(default)]
    pub status: Option<String>,
}

impl Entity for Category {
    type Draft = CategoryDraft;

    const KIND: EntityKind = EntityKind::Category;

    const COLUMNS: &'static [&'static str] = &[
        "categoryid",
        "categoryname",
        "systemid",
        "description",
        "category_preferences",
        "db_type",
        "db_creds",
        "date_created",
        "date_updated",
        "status",
    ];

    fn id(&self) -> i32 {
        self.categoryid
    }

    fn system_id(&self) -> Option<i32> {
        Some(self.systemid)
    }

    fn date_updated(&self) -> Option<NaiveDateTime> {
        self.date_updated
    }

    fn column_values(&self) -> Vec<ColumnValue> {
        vec![
            ColumnValue::Int(Some(self.categoryid)),
            ColumnValue::Text(Some(self.categoryname.clone())),
            ColumnValue::Int(Some(self.systemid)),
            ColumnValue::Text(self.description.clone()),
            ColumnValue::Json(self.category_preferences.clone()),
            ColumnValue::Text(self.db_type.clone()),
            ColumnValue::Json(self.db_creds.clone()),
            ColumnValue::Timestamp(self.date_created),
            ColumnValue::Timestamp(self.date_updated),
            ColumnValue::Text(self.status.clone()),
        ]
    }
}

impl EntityDraft for CategoryDraft {
    type Entity = Category;

    fn validate(&self) -> Result<()> {
        validate_required_text(&self.categoryname, "categoryname", MAX_NAME_LEN)?;
        validate_optional_text(self.db_type.as_deref(), "db_type", MAX_STATUS_LEN)?;
        validate_optional_text(self.status.as_deref(), "status", MAX_STATUS_LEN)?;
        validate_json_object(self.db_creds.as_ref(), "db_creds")?;
        reject_redacted_marker(self.db_creds.as_ref())?;
        if let Some(db_type) = self.db_type.as_deref() {
            db_type.parse::<crate::SourceDbType>()?;
        }
        Ok(())
    }

    fn system_id(&self) -> Option<i32> {
        Some(self.systemid)
    }

    fn stamp(&mut self, now: NaiveDateTime, creating: bool) {
        stamp_dates(&mut self.date_created, &mut self.date_updated, now, creating);
    }

    fn inherit(&mut self, existing: &Category) {
        self.date_created = self.date_created.or(existing.date_created);
        if let (Some(incoming), Some(stored)) = (self.db_creds.as_mut(), existing.db_creds.as_ref())
        {
            restore_redacted_creds(incoming, stored);
        }
    }

    fn column_values(&self) -> Vec<ColumnValue> {
        vec![
            ColumnValue::Text(Some(self.categoryname.clone())),
            ColumnValue::Int(Some(self.systemid)),
            ColumnValue::Text(self.description.clone()),
            ColumnValue::Json(self.category_preferences.clone()),
            ColumnValue::Text(self.db_type.clone()),
            ColumnValue::Json(self.db_creds.clone()),
            ColumnValue::Timestamp(self.date_created),
            ColumnValue::Timestamp(self.date_updated),
            ColumnValue::Text(self.status.clone()),
        ]
    }

    fn into_entity(self, id: i32) -> Category {
        Category {
            categoryid: id,
            categoryname: self.categoryname,
            systemid: self.systemid,
            description: self.description,
            category_preferences: self.category_preferences,
            db_type: self.db_type,
            db_creds: self.db_creds,
            date_created: self.date_created,
            date_updated: self.date_updated,
            status: self.status,
        }
    }
}

// ============================================================================
// Catalogs
// ============================================================================

/// Table-level metadata (`catalog` table)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Catalog {
    pub tableid: i32,
    pub table_vector_id: Option<String>,
    pub table_name: Option<String>,
    pub table_description: Option<String>,
    pub rules: Option<serde_json::Value>,
    pub usage_patterns: Option<serde_json::Value>,
    pub columns: Option<serde_json::Value>,
    pub date_created: Option<NaiveDateTime>,
    pub date_updated: Option<NaiveDateTime>,
    pub archive: Option<i32>,
}

/// Create/update body for [`Catalog`]
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogDraft {
    pub table_vector_id: Option<String>,
    pub table_name: Option<String>,
    pub table_description: Option<String>,
    pub rules: Option<serde_json::Value>,
    pub usage_patterns: Option<serde_json::Value>,
    pub columns: Option<serde_json::Value>,
    pub date_created: Option<NaiveDateTime>,
    pub date_updated: Option<NaiveDateTime>,
    pub archive: Option<i32>,
}

impl Entity for Catalog {
    type Draft = CatalogDraft;

    const KIND: EntityKind = EntityKind::Catalog;

    const COLUMNS: &'static [&'static str] = &[
        "tableid",
        "table_vector_id",
        "table_name",
        "table_description",
        "rules",
        "usage_patterns",
        "columns",
        "date_created",
        "date_updated",
        "archive",
    ];

    fn id(&self) -> i32 {
        self.tableid
    }

    fn date_updated(&self) -> Option<NaiveDateTime> {
        self.date_updated
    }

    fn column_values(&self) -> Vec<ColumnValue> {
        vec![
            ColumnValue::Int(Some(self.tableid)),
            ColumnValue::Text(self.table_vector_id.clone()),
            ColumnValue::Text(self.table_name.clone()),
            ColumnValue::Text(self.table_description.clone()),
            ColumnValue::Json(self.rules.clone()),
            ColumnValue::Json(self.usage_patterns.clone()),
            ColumnValue::Json(self.columns.clone()),
            ColumnValue::Timestamp(self.date_created),
            ColumnValue::Timestamp(self.date_updated),
            ColumnValue::Int(self.archive),
        ]
    }
}

impl EntityDraft for CatalogDraft {
    type Entity = Catalog;

    fn validate(&self) -> Result<()> {
        if let Some(name) = self.table_name.as_deref() {
            validate_required_text(name, "table_name", MAX_NAME_LEN)?;
        }
        Ok(())
    }

    fn stamp(&mut self, now: NaiveDateTime, creating: bool) {
        stamp_dates(&mut self.date_created, &mut self.date_updated, now, creating);
    }

    fn inherit(&mut self, existing: &Catalog) {
        self.date_created = self.date_created.or(existing.date_created);
    }

    fn column_values(&self) -> Vec<ColumnValue> {
        vec![
            ColumnValue::Text(self.table_vector_id.clone()),
            ColumnValue::Text(self.table_name.clone()),
            ColumnValue::Text(self.table_description.clone()),
            ColumnValue::Json(self.rules.clone()),
            ColumnValue::Json(self.usage_patterns.clone()),
            ColumnValue::Json(self.columns.clone()),
            ColumnValue::Timestamp(self.date_created),
            ColumnValue::Timestamp(self.date_updated),
            ColumnValue::Int(self.archive),
        ]
    }

    fn into_entity(self, id: i32) -> Catalog {
        Catalog {
            tableid: id,
            table_vector_id: self.table_vector_id,
            table_name: self.table_name,
            table_description: self.table_description,
            rules: self.rules,
            usage_patterns: self.usage_patterns,
            columns: self.columns,
            date_created: self.date_created,
            date_updated: self.date_updated,
            archive: self.archive,
        }
    }
}

// ============================================================================
// Contexts
// ============================================================================

/// A business context spanning several tables (`context` table)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Context {
    pub contextid: i32,
    pub context_vector_id: Option<String>,
    pub context_name: Option<String>,
    pub context_description: Option<String>,
    pub table_descriptions: Option<serde_json::Value>,
    pub rules: Option<serde_json::Value>,
    pub relevanttables: Option<serde_json::Value>,
    pub columns: Option<serde_json::Value>,
    pub context_rules: Option<serde_json::Value>,
    pub date_created: Option<NaiveDateTime>,
    pub date_updated: Option<NaiveDateTime>,
    pub archive: Option<i32>,
}

/// Create/update body for [`Context`]
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextDraft {
    pub context_vector_id: Option<String>,
    pub context_name: Option<String>,
    pub context_description: Option<String>,
    pub table_descriptions: Option<serde_json::Value>,
    pub rules: Option<serde_json::Value>,
    pub relevanttables: Option<serde_json::Value>,
    pub columns: Option<serde_json::Value>,
    pub context_rules: Option<serde_json::Value>,
    pub date_created: Option<NaiveDateTime>,
    pub date_updated: Option<NaiveDateTime>,
    pub archive: Option<i32>,
}

impl Entity for Context {
    type Draft = ContextDraft;

    const KIND: EntityKind = EntityKind::Context;

    const COLUMNS: &'static [&'static str] = &[
        "contextid",
        "context_vector_id",
        "context_name",
        "context_description",
        "table_descriptions",
        "rules",
        "relevanttables",
        "columns",
        "context_rules",
        "date_created",
        "date_updated",
        "archive",
    ];

    fn id(&self) -> i32 {
        self.contextid
    }

    fn date_updated(&self) -> Option<NaiveDateTime> {
        self.date_updated
    }

    fn column_values(&self) -> Vec<ColumnValue> {
        vec![
            ColumnValue::Int(Some(self.contextid)),
            ColumnValue::Text(self.context_vector_id.clone()),
            ColumnValue::Text(self.context_name.clone()),
            ColumnValue::Text(self.context_description.clone()),
            ColumnValue::Json(self.table_descriptions.clone()),
            ColumnValue::Json(self.rules.clone()),
            ColumnValue::Json(self.relevanttables.clone()),
            ColumnValue::Json(self.columns.clone()),
            ColumnValue::Json(self.context_rules.clone()),
            ColumnValue::Timestamp(self.date_created),
            ColumnValue::Timestamp(self.date_updated),
            ColumnValue::Int(self.archive),
        ]
    }
}

impl EntityDraft for ContextDraft {
    type Entity = Context;

    fn validate(&self) -> Result<()> {
        if let Some(name) = self.context_name.as_deref() {
            validate_required_text(name, "context_name", MAX_NAME_LEN)?;
        }
        Ok(())
    }

    fn stamp(&mut self, now: NaiveDateTime, creating: bool) {
        stamp_dates(&mut self.date_created, &mut self.date_updated, now, creating);
    }

    fn inherit(&mut self, existing: &Context) {
        self.date_created = self.date_created.or(existing.date_created);
    }

    fn column_values(&self) -> Vec<ColumnValue> {
        vec![
            ColumnValue::Text(self.context_vector_id.clone()),
            ColumnValue::Text(self.context_name.clone()),
            ColumnValue::Text(self.context_description.clone()),
            ColumnValue::Json(self.table_descriptions.clone()),
            ColumnValue::Json(self.rules.clone()),
            ColumnValue::Json(self.relevanttables.clone()),
            ColumnValue::Json(self.columns.clone()),
            ColumnValue::Json(self.context_rules.clone()),
            ColumnValue::Timestamp(self.date_created),
            ColumnValue::Timestamp(self.date_updated),
            ColumnValue::Int(self.archive),
        ]
    }

    fn into_entity(self, id: i32) -> Context {
        Context {
            contextid: id,
            context_vector_id: self.context_vector_id,
            context_name: self.context_name,
            context_description: self.context_description,
            table_descriptions: self.table_descriptions,
            rules: self.rules,
            relevanttables: self.relevanttables,
            columns: self.columns,
            context_rules: self.context_rules,
            date_created: self.date_created,
            date_updated: self.date_updated,
            archive: self.archive,
        }
    }
}
