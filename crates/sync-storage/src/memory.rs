//! In-process backend.
//!
//! Tables are `BTreeMap<i32, T>` keyed by primary key, stored type-erased per
//! [`EntityKind`]. Foreign keys from roles and categories to systems are
//! enforced the way Postgres would, so tests see the same conflicts.

use async_trait::async_trait;
use metasync_core::{
    Category, Entity, EntityDraft, EntityKind, Environment, NewAuditEntry, Result, Role,
    SyncError, System, TableAudit,
};
use parking_lot::RwLock;
use std::any::Any;
use std::collections::{BTreeMap, HashMap};

use crate::{MetadataStore, UpsertOutcome};

type Table<T> = BTreeMap<i32, T>;

#[derive(Default)]
struct Tables {
    by_kind: HashMap<EntityKind, Box<dyn Any + Send + Sync>>,
    /// Per-kind sequence; only ever moves forward, like a SERIAL column.
    next_ids: HashMap<EntityKind, i32>,
}

impl Tables {
    /// Take the next key for `kind` and advance its sequence.
    fn next_id(&mut self, kind: EntityKind) -> i32 {
        let next = self.next_ids.entry(kind).or_insert(1);
        let id = *next;
        *next += 1;
        id
    }

    /// Move the sequence past an explicitly written key.
    fn advance_past(&mut self, kind: EntityKind, id: i32) {
        let next = self.next_ids.entry(kind).or_insert(1);
        *next = (*next).max(id.saturating_add(1));
    }

    fn table<T: Entity>(&self) -> Result<Option<&Table<T>>> {
        match self.by_kind.get(&T::KIND) {
            Some(boxed) => boxed
                .downcast_ref::<Table<T>>()
                .map(Some)
                .ok_or_else(|| type_mismatch(T::KIND)),
            None => Ok(None),
        }
    }

    fn table_mut<T: Entity>(&mut self) -> Result<&mut Table<T>> {
        self.by_kind
            .entry(T::KIND)
            .or_insert_with(|| Box::new(Table::<T>::new()))
            .downcast_mut::<Table<T>>()
            .ok_or_else(|| type_mismatch(T::KIND))
    }

    fn contains<T: Entity>(&self, id: i32) -> Result<bool> {
        Ok(self.table::<T>()?.is_some_and(|t| t.contains_key(&id)))
    }

    fn references_system<T: Entity>(&self, system_id: i32) -> Result<bool> {
        Ok(self
            .table::<T>()?
            .is_some_and(|t| t.values().any(|row| row.system_id() == Some(system_id))))
    }

    /// Reject rows pointing at a missing system.
    fn check_system_exists<T: Entity>(&self, system_id: Option<i32>) -> Result<()> {
        match system_id {
            Some(sid) if !self.contains::<System>(sid)? => Err(SyncError::ConflictError(format!(
                "{} violates a foreign key: system {} does not exist",
                T::KIND.label(),
                sid
            ))),
            _ => Ok(()),
        }
    }

    /// Reject deleting a system that roles or categories still reference.
    fn check_not_referenced<T: Entity>(&self, id: i32) -> Result<()> {
        if T::KIND != EntityKind::System {
            return Ok(());
        }
        if self.references_system::<Role>(id)? || self.references_system::<Category>(id)? {
            return Err(SyncError::ConflictError(format!(
                "System violates a foreign key: system {} is still referenced",
                id
            )));
        }
        Ok(())
    }
}

fn type_mismatch(kind: EntityKind) -> SyncError {
    SyncError::Other(format!("table type mismatch for {}", kind.table_name()))
}

/// In-memory metadata store
pub struct MemoryStore {
    environment: Environment,
    tables: RwLock<Tables>,
    audit: RwLock<Vec<TableAudit>>,
}

impl MemoryStore {
    pub fn new(environment: Environment) -> Self {
        Self {
            environment,
            tables: RwLock::new(Tables::default()),
            audit: RwLock::new(Vec::new()),
        }
    }

    /// Number of rows in `T`'s table.
    pub fn count<T: Entity>(&self) -> usize {
        self.tables
            .read()
            .table::<T>()
            .ok()
            .flatten()
            .map_or(0, |t| t.len())
    }

    /// Number of audit rows written so far.
    pub fn audit_len(&self) -> usize {
        self.audit.read().len()
    }
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStore")
            .field("environment", &self.environment)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl MetadataStore for MemoryStore {
    fn environment(&self) -> Environment {
        self.environment
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    async fn list<T: Entity>(&self) -> Result<Vec<T>> {
        let tables = self.tables.read();
        Ok(tables
            .table::<T>()?
            .map(|t| t.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn list_by_system<T: Entity>(&self, system_id: i32) -> Result<Vec<T>> {
        if !T::KIND.has_system_column() {
            return Err(SyncError::ValidationError(format!(
                "{} records are not scoped to a system",
                T::KIND.label()
            )));
        }
        let tables = self.tables.read();
        Ok(tables
            .table::<T>()?
            .map(|t| {
                t.values()
                    .filter(|row| row.system_id() == Some(system_id))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn get<T: Entity>(&self, id: i32) -> Result<Option<T>> {
        let tables = self.tables.read();
        Ok(tables.table::<T>()?.and_then(|t| t.get(&id).cloned()))
    }

    async fn insert<T: Entity>(&self, draft: T::Draft) -> Result<T> {
        let mut tables = self.tables.write();
        tables.check_system_exists::<T>(draft.system_id())?;

        let id = tables.next_id(T::KIND);
        let row = draft.into_entity(id);
        tables.table_mut::<T>()?.insert(id, row.clone());
        Ok(row)
    }

    async fn update<T: Entity>(&self, id: i32, draft: T::Draft) -> Result<Option<T>> {
        let mut tables = self.tables.write();
        if !tables.contains::<T>(id)? {
            return Ok(None);
        }
        tables.check_system_exists::<T>(draft.system_id())?;

        let row = draft.into_entity(id);
        tables.table_mut::<T>()?.insert(id, row.clone());
        Ok(Some(row))
    }

    async fn upsert<T: Entity>(&self, record: &T) -> Result<UpsertOutcome> {
        let mut tables = self.tables.write();
        tables.check_system_exists::<T>(record.system_id())?;

        let previous = tables.table_mut::<T>()?.insert(record.id(), record.clone());
        tables.advance_past(T::KIND, record.id());
        Ok(match previous {
            Some(_) => UpsertOutcome::Updated,
            None => UpsertOutcome::Inserted,
        })
    }

    async fn delete<T: Entity>(&self, id: i32) -> Result<Option<T>> {
        let mut tables = self.tables.write();
        if !tables.contains::<T>(id)? {
            return Ok(None);
        }
        tables.check_not_referenced::<T>(id)?;
        Ok(tables.table_mut::<T>()?.remove(&id))
    }

    async fn record_audit(&self, entry: NewAuditEntry) -> Result<TableAudit> {
        let mut audit = self.audit.write();
        let audit_id = audit.len() as i32 + 1;
        let row = entry.into_row(audit_id);
        audit.push(row.clone());
        Ok(row)
    }

    async fn audit_history(&self, table_name: &str, record_id: i32) -> Result<Vec<TableAudit>> {
        let audit = self.audit.read();
        let mut rows: Vec<TableAudit> = audit
            .iter()
            .filter(|row| row.table_name == table_name && row.record_id == record_id)
            .cloned()
            .collect();
        sort_newest_first(&mut rows);
        Ok(rows)
    }

    async fn recent_audit(&self, limit: i64) -> Result<Vec<TableAudit>> {
        let mut rows = self.audit.read().clone();
        sort_newest_first(&mut rows);
        rows.truncate(usize::try_from(limit.max(0)).unwrap_or(usize::MAX));
        Ok(rows)
    }
}

fn sort_newest_first(rows: &mut [TableAudit]) {
    rows.sort_by(|a, b| {
        b.changed_at
            .cmp(&a.changed_at)
            .then(b.audit_id.cmp(&a.audit_id))
    });
}
