//! metasync Storage
//!
//! Storage abstraction for the two metadata databases.
//!
//! Every environment (dev and prod) is reached through a [`MetadataStore`].
//! [`PgStore`] talks to Postgres through a sqlx pool; [`MemoryStore`] keeps
//! typed tables in process and backs the test suites and `METASYNC_STORE=memory`.
//! [`SyncService`] joins a dev store and a prod store and implements the
//! read-both, write-dev, sync-to-prod workflow.

use async_trait::async_trait;
use metasync_core::{Entity, Environment, NewAuditEntry, Result, TableAudit};

pub mod memory;
pub mod postgres;
pub mod service;
pub mod settings;
pub mod source;

pub use memory::MemoryStore;
pub use postgres::PgStore;
pub use service::{EnvListing, EnvRecord, PresenceRow, SyncOutcome, SyncService};
pub use settings::DbSettings;
pub use source::{PgSourceIntrospector, SourceIntrospector};

/// Result of a copy-overwrite by primary key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UpsertOutcome {
    Inserted,
    Updated,
}

/// Backend abstraction for one metadata database
///
/// Implementations:
/// - [`PgStore`]: Postgres via a sqlx connection pool
/// - [`MemoryStore`]: in-process tables
///
/// Methods are generic over [`Entity`], so every table shares one code path.
#[async_trait]
pub trait MetadataStore: Send + Sync + 'static {
    /// Which database this store addresses.
    fn environment(&self) -> Environment;

    /// Cheap round-trip used by readiness checks.
    async fn ping(&self) -> Result<()>;

    /// All rows, ordered by primary key.
    async fn list<T: Entity>(&self) -> Result<Vec<T>>;

    /// Rows whose `systemid` matches.
    ///
    /// Kinds without a `systemid` column return a validation error.
    async fn list_by_system<T: Entity>(&self, system_id: i32) -> Result<Vec<T>>;

    async fn get<T: Entity>(&self, id: i32) -> Result<Option<T>>;

    /// Insert with a store-assigned primary key.
    async fn insert<T: Entity>(&self, draft: T::Draft) -> Result<T>;

    /// Overwrite every non-key column. Returns `None` when the row is missing.
    async fn update<T: Entity>(&self, id: i32, draft: T::Draft) -> Result<Option<T>>;

    /// Copy `record` in with its own primary key, overwriting any existing row.
    async fn upsert<T: Entity>(&self, record: &T) -> Result<UpsertOutcome>;

    /// Delete and return the removed row.
    async fn delete<T: Entity>(&self, id: i32) -> Result<Option<T>>;

    async fn record_audit(&self, entry: NewAuditEntry) -> Result<TableAudit>;

    /// Audit rows for one record, newest first.
    async fn audit_history(&self, table_name: &str, record_id: i32) -> Result<Vec<TableAudit>>;

    /// Latest audit rows across all tables, newest first.
    async fn recent_audit(&self, limit: i64) -> Result<Vec<TableAudit>>;
}
