//! Dev/prod sync service.
//!
//! Reads query both environments concurrently. Create, update and delete
//! only touch dev; prod changes only through [`SyncService::sync`], which
//! copies one dev row over its prod counterpart by primary key.

use chrono::{NaiveDateTime, Utc};
use metasync_core::validation::clamp_audit_limit;
use metasync_core::{
    AuditAction, Entity, EntityDraft, EntityKind, Environment, NewAuditEntry, Result, SyncError,
    System, TableAudit,
};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, warn};

use crate::{MetadataStore, UpsertOutcome};

/// Default number of rows returned by [`SyncService::recent`]
pub const DEFAULT_AUDIT_LIMIT: i64 = 50;

/// Rows from both environments
#[derive(Debug, Clone, Serialize)]
pub struct EnvListing<T> {
    pub dev: Vec<T>,
    pub prod: Vec<T>,
}

/// One record looked up in both environments
#[derive(Debug, Clone, Serialize)]
pub struct EnvRecord<T> {
    pub dev: Option<T>,
    pub prod: Option<T>,
}

/// Where a primary key exists, and when each copy last changed
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PresenceRow {
    pub id: i32,
    pub dev_present: bool,
    pub prod_present: bool,
    pub dev_updated: Option<NaiveDateTime>,
    pub prod_updated: Option<NaiveDateTime>,
}

impl PresenceRow {
    /// Present in both with matching `date_updated`.
    pub fn in_sync(&self) -> bool {
        self.dev_present && self.prod_present && self.dev_updated == self.prod_updated
    }
}

/// Result of copying one record to prod
#[derive(Debug, Clone, Serialize)]
pub struct SyncOutcome<T> {
    pub record: T,
    pub outcome: UpsertOutcome,
}

fn now() -> NaiveDateTime {
    Utc::now().naive_utc()
}

fn not_found<T: Entity>(environment: Environment) -> SyncError {
    SyncError::RecordNotFound(format!("{} not found in {}", T::KIND.label(), environment))
}

/// Dev and prod stores behind one workflow
pub struct SyncService<S> {
    dev: Arc<S>,
    prod: Arc<S>,
}

impl<S> Clone for SyncService<S> {
    fn clone(&self) -> Self {
        Self {
            dev: Arc::clone(&self.dev),
            prod: Arc::clone(&self.prod),
        }
    }
}

impl<S: MetadataStore> SyncService<S> {
    pub fn new(dev: S, prod: S) -> Self {
        Self::from_arcs(Arc::new(dev), Arc::new(prod))
    }

    pub fn from_arcs(dev: Arc<S>, prod: Arc<S>) -> Self {
        Self { dev, prod }
    }

    pub fn store(&self, environment: Environment) -> &S {
        match environment {
            Environment::Dev => &self.dev,
            Environment::Prod => &self.prod,
        }
    }

    /// Ping both databases concurrently.
    pub async fn ping(&self) -> (Result<()>, Result<()>) {
        tokio::join!(self.dev.ping(), self.prod.ping())
    }

    // ------------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------------

    pub async fn list<T: Entity>(&self) -> Result<EnvListing<T>> {
        let (dev, prod) = tokio::try_join!(self.dev.list::<T>(), self.prod.list::<T>())?;
        Ok(EnvListing { dev, prod })
    }

    pub async fn list_by_system<T: Entity>(&self, system_id: i32) -> Result<EnvListing<T>> {
        let (dev, prod) = tokio::try_join!(
            self.dev.list_by_system::<T>(system_id),
            self.prod.list_by_system::<T>(system_id)
        )?;
        Ok(EnvListing { dev, prod })
    }

    /// Look a record up in both environments; not found if it is in neither.
    pub async fn get<T: Entity>(&self, id: i32) -> Result<EnvRecord<T>> {
        let (dev, prod) = tokio::try_join!(self.dev.get::<T>(id), self.prod.get::<T>(id))?;
        if dev.is_none() && prod.is_none() {
            return Err(SyncError::RecordNotFound(format!(
                "{} not found",
                T::KIND.label()
            )));
        }
        Ok(EnvRecord { dev, prod })
    }

    pub async fn find<T: Entity>(&self, environment: Environment, id: i32) -> Result<Option<T>> {
        self.store(environment).get::<T>(id).await
    }

    /// Presence of every primary key across both environments, ordered by id.
    pub async fn status<T: Entity>(&self) -> Result<Vec<PresenceRow>> {
        let listing = self.list::<T>().await?;
        let mut rows: BTreeMap<i32, PresenceRow> = BTreeMap::new();

        for record in &listing.dev {
            let row = rows.entry(record.id()).or_insert_with(|| empty_row(record.id()));
            row.dev_present = true;
            row.dev_updated = record.date_updated();
        }
        for record in &listing.prod {
            let row = rows.entry(record.id()).or_insert_with(|| empty_row(record.id()));
            row.prod_present = true;
            row.prod_updated = record.date_updated();
        }

        Ok(rows.into_values().collect())
    }

    // ------------------------------------------------------------------------
    // Dev writes
    // ------------------------------------------------------------------------

    pub async fn create<T: Entity>(&self, mut draft: T::Draft, actor: Option<&str>) -> Result<T> {
        draft.validate()?;
        self.check_system_in_dev(draft.system_id()).await?;
        draft.stamp(now(), true);

        let created: T = self.dev.insert(draft).await?;
        info!(
            entity = T::KIND.label(),
            id = created.id(),
            actor = actor.unwrap_or("-"),
            "Created record in dev"
        );
        self.audit(
            Environment::Dev,
            AuditAction::Insert,
            created.id(),
            None,
            Some(&created),
            actor,
        )
        .await;
        Ok(created)
    }

    pub async fn update<T: Entity>(
        &self,
        id: i32,
        mut draft: T::Draft,
        actor: Option<&str>,
    ) -> Result<T> {
        let existing = self
            .dev
            .get::<T>(id)
            .await?
            .ok_or_else(|| not_found::<T>(Environment::Dev))?;
        // Restore echoed secrets before validating
        draft.inherit(&existing);
        draft.validate()?;
        self.check_system_in_dev(draft.system_id()).await?;
        draft.stamp(now(), false);

        let updated = self
            .dev
            .update::<T>(id, draft)
            .await?
            .ok_or_else(|| not_found::<T>(Environment::Dev))?;
        info!(
            entity = T::KIND.label(),
            id,
            actor = actor.unwrap_or("-"),
            "Updated record in dev"
        );
        self.audit(
            Environment::Dev,
            AuditAction::Update,
            id,
            Some(&existing),
            Some(&updated),
            actor,
        )
        .await;
        Ok(updated)
    }

    pub async fn delete<T: Entity>(&self, id: i32, actor: Option<&str>) -> Result<T> {
        let removed = self
            .dev
            .delete::<T>(id)
            .await?
            .ok_or_else(|| not_found::<T>(Environment::Dev))?;
        info!(
            entity = T::KIND.label(),
            id,
            actor = actor.unwrap_or("-"),
            "Deleted record from dev"
        );
        self.audit(
            Environment::Dev,
            AuditAction::Delete,
            id,
            Some(&removed),
            None,
            actor,
        )
        .await;
        Ok(removed)
    }

    // ------------------------------------------------------------------------
    // Sync
    // ------------------------------------------------------------------------

    /// Copy the dev row with this primary key over prod, every attribute included.
    ///
    /// Rows that reference a system require that system to exist in prod.
    pub async fn sync<T: Entity>(&self, id: i32, actor: Option<&str>) -> Result<SyncOutcome<T>> {
        let record = self
            .dev
            .get::<T>(id)
            .await?
            .ok_or_else(|| not_found::<T>(Environment::Dev))?;

        if let Some(system_id) = record.system_id() {
            if self.prod.get::<System>(system_id).await?.is_none() {
                return Err(SyncError::ConflictError(format!(
                    "System {} does not exist in prod; sync the system before this {}",
                    system_id,
                    T::KIND.label().to_lowercase()
                )));
            }
        }

        let previous = self.prod.get::<T>(id).await?;
        let outcome = self.prod.upsert(&record).await?;
        info!(
            entity = T::KIND.label(),
            id,
            outcome = ?outcome,
            actor = actor.unwrap_or("-"),
            "Synced record to prod"
        );

        self.audit(
            Environment::Prod,
            AuditAction::Sync,
            id,
            previous.as_ref(),
            Some(&record),
            actor,
        )
        .await;
        Ok(SyncOutcome { record, outcome })
    }

    // ------------------------------------------------------------------------
    // Audit
    // ------------------------------------------------------------------------

    /// Audit rows for one record in one environment, newest first.
    pub async fn history(
        &self,
        environment: Environment,
        kind: EntityKind,
        record_id: i32,
    ) -> Result<Vec<TableAudit>> {
        self.store(environment)
            .audit_history(kind.table_name(), record_id)
            .await
    }

    /// Latest audit rows in one environment, newest first.
    pub async fn recent(&self, environment: Environment, limit: Option<i64>) -> Result<Vec<TableAudit>> {
        let limit = clamp_audit_limit(limit, DEFAULT_AUDIT_LIMIT);
        self.store(environment).recent_audit(limit).await
    }

    async fn check_system_in_dev(&self, system_id: Option<i32>) -> Result<()> {
        if let Some(system_id) = system_id {
            if self.dev.get::<System>(system_id).await?.is_none() {
                return Err(SyncError::ValidationError(format!(
                    "System {} not found in dev",
                    system_id
                )));
            }
        }
        Ok(())
    }

    /// Write an audit row; failures are logged and swallowed.
    async fn audit<T: Entity>(
        &self,
        environment: Environment,
        action: AuditAction,
        record_id: i32,
        old: Option<&T>,
        new: Option<&T>,
        actor: Option<&str>,
    ) {
        let entry = match NewAuditEntry::for_change(action, record_id, old, new, actor, now()) {
            Ok(entry) => match action {
                AuditAction::Sync => entry.with_reason("synced from dev"),
                _ => entry,
            },
            Err(e) => {
                warn!(error = %e, table = T::KIND.table_name(), record_id, "Failed to build audit entry");
                return;
            }
        };

        if let Err(e) = self.store(environment).record_audit(entry).await {
            warn!(
                error = %e,
                environment = %environment,
                table = T::KIND.table_name(),
                record_id,
                action = %action,
                "Failed to write audit row"
            );
        }
    }
}

fn empty_row(id: i32) -> PresenceRow {
    PresenceRow {
        id,
        dev_present: false,
        prod_present: false,
        dev_updated: None,
        prod_updated: None,
    }
}
