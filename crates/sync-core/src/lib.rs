//! metasync Core
//!
//! Core types, traits, and Postgres schema for the metasync dev/prod
//! metadata service.
//!
//! The five metadata tables (systems, roles, categories, catalogs and
//! contexts) are modelled as [`Entity`] types. Each one has a matching
//! [`EntityDraft`] used as the request body for create and update. Storage
//! backends stay generic over `Entity`, so every table shares one code path
//! for list, lookup, upsert and delete.

use chrono::NaiveDateTime;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sqlx::postgres::PgRow;

pub mod audit;
pub mod credentials;
pub mod entities;
pub mod validation;

pub use audit::{AuditAction, NewAuditEntry, TableAudit};
pub use credentials::{SourceCredentials, SourceDbType};
pub use entities::{
    Catalog, CatalogDraft, Category, CategoryDraft, Context, ContextDraft, Role, RoleDraft,
    System, SystemDraft,
};

/// Name of the audit table present in both environments.
pub const AUDIT_TABLE: &str = "table_audit";

// ============================================================================
// Entity Kinds & Environments
// ============================================================================

/// The metadata tables managed by the service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    System,
    Role,
    Category,
    Catalog,
    Context,
}

impl EntityKind {
    /// Every kind, in dependency order (systems first).
    pub const ALL: [EntityKind; 5] = [
        EntityKind::System,
        EntityKind::Role,
        EntityKind::Category,
        EntityKind::Catalog,
        EntityKind::Context,
    ];

    /// Database table name.
    pub fn table_name(&self) -> &'static str {
        match self {
            EntityKind::System => "systems",
            EntityKind::Role => "roles",
            EntityKind::Category => "category",
            EntityKind::Catalog => "catalog",
            EntityKind::Context => "context",
        }
    }

    /// Primary key column.
    pub fn primary_key(&self) -> &'static str {
        match self {
            EntityKind::System => "systemid",
            EntityKind::Role => "roleid",
            EntityKind::Category => "categoryid",
            EntityKind::Catalog => "tableid",
            EntityKind::Context => "contextid",
        }
    }

    /// Human-readable label used in messages ("System not found in dev").
    pub fn label(&self) -> &'static str {
        match self {
            EntityKind::System => "System",
            EntityKind::Role => "Role",
            EntityKind::Category => "Category",
            EntityKind::Catalog => "Catalog",
            EntityKind::Context => "Context",
        }
    }

    /// URL path segment (`/systems/`, `/categories/`, ...).
    pub fn route_segment(&self) -> &'static str {
        match self {
            EntityKind::System => "systems",
            EntityKind::Role => "roles",
            EntityKind::Category => "categories",
            EntityKind::Catalog => "catalogs",
            EntityKind::Context => "contexts",
        }
    }

    /// Whether rows of this kind reference a system through `systemid`.
    pub fn has_system_column(&self) -> bool {
        matches!(self, EntityKind::Role | EntityKind::Category)
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.route_segment())
    }
}

impl std::str::FromStr for EntityKind {
    type Err = SyncError;

    /// Accepts the label, the route segment, or the table name.
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let lowered = s.to_lowercase();
        EntityKind::ALL
            .into_iter()
            .find(|kind| {
                lowered == kind.label().to_lowercase()
                    || lowered == kind.route_segment()
                    || lowered == kind.table_name()
            })
            .ok_or_else(|| SyncError::ValidationError(format!("Unknown entity type: {}", s)))
    }
}

/// Which database a request addresses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Dev,
    Prod,
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Dev => "dev",
            Environment::Prod => "prod",
        }
    }

    /// Prefix for the `{PREFIX}_DB_*` environment variables.
    pub fn env_prefix(&self) -> &'static str {
        match self {
            Environment::Dev => "DEV",
            Environment::Prod => "PROD",
        }
    }
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Environment {
    type Err = SyncError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "dev" | "development" => Ok(Environment::Dev),
            "prod" | "production" => Ok(Environment::Prod),
            _ => Err(SyncError::ValidationError(format!(
                "Unknown environment: {} (expected dev or prod)",
                s
            ))),
        }
    }
}

// ============================================================================
// Column Values & Entity Traits
// ============================================================================

/// A single column value, typed the way Postgres stores it.
///
/// Entities expose their columns as an ordered list of these so that storage
/// backends can bind them without knowing the concrete struct.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnValue {
    Int(Option<i32>),
    Text(Option<String>),
    Timestamp(Option<NaiveDateTime>),
    Json(Option<serde_json::Value>),
}

/// A row in one of the metadata tables.
pub trait Entity:
    Serialize
    + DeserializeOwned
    + Clone
    + std::fmt::Debug
    + Send
    + Sync
    + Unpin
    + 'static
    + for<'r> sqlx::FromRow<'r, PgRow>
{
    /// Request body type for create/update.
    type Draft: EntityDraft<Entity = Self>;

    const KIND: EntityKind;

    /// Column names in table order, primary key first.
    const COLUMNS: &'static [&'static str];

    fn id(&self) -> i32;

    /// Referenced system, for kinds that carry `systemid`.
    fn system_id(&self) -> Option<i32> {
        None
    }

    fn date_updated(&self) -> Option<NaiveDateTime>;

    /// Values aligned with [`Entity::COLUMNS`].
    fn column_values(&self) -> Vec<ColumnValue>;
}

/// Everything in an entity except its primary key.
pub trait EntityDraft: DeserializeOwned + std::fmt::Debug + Send + Sync + 'static {
    type Entity: Entity;

    fn validate(&self) -> Result<()>;

    /// Referenced system, for kinds that carry `systemid`.
    fn system_id(&self) -> Option<i32> {
        None
    }

    /// Set `date_updated`, and `date_created` when creating and absent.
    fn stamp(&mut self, now: NaiveDateTime, creating: bool);

    /// Values aligned with `Entity::COLUMNS[1..]`.
    fn column_values(&self) -> Vec<ColumnValue>;

    /// Carry over what an update body leaves implicit: the original
    /// `date_created` and any secret the client echoed back redacted.
    fn inherit(&mut self, existing: &Self::Entity);

    fn into_entity(self, id: i32) -> Self::Entity;
}

// ============================================================================
// Errors
// ============================================================================

/// Errors that can occur in metadata operations
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("{0}")]
    RecordNotFound(String),

    #[error("Conflict detected: {0}")]
    ConflictError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Source database error: {0}")]
    SourceError(String),

    #[error("Other error: {0}")]
    Other(String),
}

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        SyncError::SerializationError(err.to_string())
    }
}

/// Result type for metadata operations
pub type Result<T> = std::result::Result<T, SyncError>;

// ============================================================================
// Schema
// ============================================================================

/// DDL for every table, in dependency order.
pub const SCHEMA_STATEMENTS: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS systems (
      systemid SERIAL PRIMARY KEY,
      systemname VARCHAR(255) NOT NULL,
      systemurl VARCHAR(255),
      description TEXT,
      domain TEXT,
      date_created TIMESTAMP,
      date_updated TIMESTAMP,
      status VARCHAR(50),
      system_preferences JSONB
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS roles (
      roleid SERIAL PRIMARY KEY,
      rolename VARCHAR(255) NOT NULL,
      systemid INTEGER NOT NULL REFERENCES systems(systemid),
      description TEXT,
      role_preferences JSONB,
      date_created TIMESTAMP,
      date_updated TIMESTAMP,
      status VARCHAR(50)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS category (
      categoryid SERIAL PRIMARY KEY,
      categoryname VARCHAR(255) NOT NULL,
      systemid INTEGER NOT NULL REFERENCES systems(systemid),
      description TEXT,
      category_preferences JSONB,
      db_type VARCHAR(50),
      db_creds JSONB,
      date_created TIMESTAMP,
      date_updated TIMESTAMP,
      status VARCHAR(50)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS catalog (
      tableid SERIAL PRIMARY KEY,
      table_vector_id VARCHAR,
      table_name VARCHAR,
      table_description TEXT,
      rules JSONB,
      usage_patterns JSONB,
      columns JSONB,
      date_created TIMESTAMP,
      date_updated TIMESTAMP,
      archive INTEGER
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS context (
      contextid SERIAL PRIMARY KEY,
      context_vector_id VARCHAR,
      context_name VARCHAR,
      context_description TEXT,
      table_descriptions JSONB,
      rules JSONB,
      relevanttables JSONB,
      columns JSONB,
      context_rules JSONB,
      date_created TIMESTAMP,
      date_updated TIMESTAMP,
      archive INTEGER
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS table_audit (
      audit_id SERIAL PRIMARY KEY,
      table_name VARCHAR(100) NOT NULL,
      record_id INTEGER NOT NULL,
      action VARCHAR(20) NOT NULL,
      old_data JSONB,
      new_data JSONB,
      changed_by VARCHAR(255),
      changed_at TIMESTAMP NOT NULL DEFAULT (now() AT TIME ZONE 'utc'),
      change_reason TEXT
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_table_audit_record ON table_audit (table_name, record_id)",
];

/// Initialize the Postgres schema
///
/// Creates all tables if they don't exist:
/// - `systems`, `roles`, `category`, `catalog`, `context`: metadata tables
/// - `table_audit`: change history written by the service
pub async fn init_pg_schema(pool: &sqlx::PgPool) -> Result<()> {
    for statement in SCHEMA_STATEMENTS {
        sqlx::query(statement).execute(pool).await?;
    }
    Ok(())
}

/// Quote a Postgres identifier.
pub fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_kind_parsing() {
        assert_eq!("systems".parse::<EntityKind>().unwrap(), EntityKind::System);
        assert_eq!("Role".parse::<EntityKind>().unwrap(), EntityKind::Role);
        assert_eq!(
            "categories".parse::<EntityKind>().unwrap(),
            EntityKind::Category
        );
        assert_eq!(
            "category".parse::<EntityKind>().unwrap(),
            EntityKind::Category
        );
        assert_eq!("catalog".parse::<EntityKind>().unwrap(), EntityKind::Catalog);
        assert_eq!("CONTEXTS".parse::<EntityKind>().unwrap(), EntityKind::Context);
        assert!("widgets".parse::<EntityKind>().is_err());
    }

    #[test]
    fn test_system_column_kinds() {
        let with_system: Vec<_> = EntityKind::ALL
            .into_iter()
            .filter(|k| k.has_system_column())
            .collect();
        assert_eq!(with_system, vec![EntityKind::Role, EntityKind::Category]);
    }

    #[test]
    fn test_environment_parsing() {
        assert_eq!("dev".parse::<Environment>().unwrap(), Environment::Dev);
        assert_eq!("PROD".parse::<Environment>().unwrap(), Environment::Prod);
        assert_eq!(
            "production".parse::<Environment>().unwrap(),
            Environment::Prod
        );
        assert!("staging".parse::<Environment>().is_err());
        assert_eq!(Environment::default(), Environment::Dev);
    }

    #[test]
    fn test_not_found_message_is_bare() {
        let err = SyncError::RecordNotFound("System not found in dev".to_string());
        assert_eq!(err.to_string(), "System not found in dev");
    }

    #[test]
    fn test_quote_ident() {
        assert_eq!(quote_ident("columns"), "\"columns\"");
        assert_eq!(quote_ident("we\"ird"), "\"we\"\"ird\"");
    }

    #[test]
    fn test_schema_covers_every_table() {
        for kind in EntityKind::ALL {
            let needle = format!("CREATE TABLE IF NOT EXISTS {} (", kind.table_name());
            assert!(
                SCHEMA_STATEMENTS.iter().any(|s| s.contains(&needle)),
                "missing DDL for {}",
                kind.table_name()
            );
        }
        assert!(SCHEMA_STATEMENTS
            .iter()
            .any(|s| s.contains("CREATE TABLE IF NOT EXISTS table_audit")));
    }
}
