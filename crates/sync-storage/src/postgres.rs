//! Postgres backend.

use async_trait::async_trait;
use metasync_core::{
    init_pg_schema, quote_ident, ColumnValue, Entity, EntityDraft, Environment, NewAuditEntry,
    Result, SyncError, TableAudit, AUDIT_TABLE,
};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{Postgres, QueryBuilder, Row};
use std::time::Duration;
use tracing::{debug, info};

use crate::{DbSettings, MetadataStore, UpsertOutcome};

/// How long to wait for a pooled connection before failing a request
const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(10);

const AUDIT_COLUMNS: &str = "audit_id, table_name, record_id, action, old_data, new_data, \
                             changed_by, changed_at, change_reason";

/// Postgres-backed metadata store
#[derive(Clone, Debug)]
pub struct PgStore {
    pool: PgPool,
    environment: Environment,
}

impl PgStore {
    /// Connect lazily: the pool opens connections on first use, so the
    /// server can start while a database is still coming up.
    pub fn connect_lazy(settings: &DbSettings, environment: Environment) -> Self {
        info!(
            environment = %environment,
            url = %settings.redacted_url(),
            max_connections = settings.max_connections,
            "Configuring Postgres pool"
        );
        let pool = PgPoolOptions::new()
            .max_connections(settings.max_connections)
            .acquire_timeout(ACQUIRE_TIMEOUT)
            .connect_lazy_with(settings.connect_options());
        Self { pool, environment }
    }

    /// Connect and verify the database is reachable.
    pub async fn connect(settings: &DbSettings, environment: Environment) -> Result<Self> {
        let store = Self::connect_lazy(settings, environment);
        store.ping().await?;
        Ok(store)
    }

    pub fn from_pool(pool: PgPool, environment: Environment) -> Self {
        Self { pool, environment }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Create every table if absent.
    pub async fn initialize(&self) -> Result<()> {
        init_pg_schema(&self.pool).await?;
        info!(environment = %self.environment, "Schema initialized");
        Ok(())
    }
}

fn column_list(columns: &[&str]) -> String {
    columns
        .iter()
        .map(|c| quote_ident(c))
        .collect::<Vec<_>>()
        .join(", ")
}

fn push_value(qb: &mut QueryBuilder<'_, Postgres>, value: ColumnValue) {
    match value {
        ColumnValue::Int(v) => qb.push_bind(v),
        ColumnValue::Text(v) => qb.push_bind(v),
        ColumnValue::Timestamp(v) => qb.push_bind(v),
        ColumnValue::Json(v) => qb.push_bind(v),
    };
}

fn push_values(qb: &mut QueryBuilder<'_, Postgres>, values: Vec<ColumnValue>) {
    for (i, value) in values.into_iter().enumerate() {
        if i > 0 {
            qb.push(", ");
        }
        push_value(qb, value);
    }
}

/// Map constraint violations to conflicts; everything else stays a database error.
fn map_write_error<T: Entity>(err: sqlx::Error) -> SyncError {
    if let sqlx::Error::Database(db_err) = &err {
        match db_err.code().as_deref() {
            Some("23503") => {
                return SyncError::ConflictError(format!(
                    "{} violates a foreign key: {}",
                    T::KIND.label(),
                    db_err.message()
                ))
            }
            Some("23505") => {
                return SyncError::ConflictError(format!(
                    "{} already exists: {}",
                    T::KIND.label(),
                    db_err.message()
                ))
            }
            _ => {}
        }
    }
    SyncError::Database(err)
}

#[async_trait]
impl MetadataStore for PgStore {
    fn environment(&self) -> Environment {
        self.environment
    }

    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn list<T: Entity>(&self) -> Result<Vec<T>> {
        let kind = T::KIND;
        let sql = format!(
            "SELECT {} FROM {} ORDER BY {}",
            column_list(T::COLUMNS),
            quote_ident(kind.table_name()),
            quote_ident(kind.primary_key())
        );
        let rows = sqlx::query_as::<_, T>(&sql).fetch_all(&self.pool).await?;
        debug!(environment = %self.environment, table = kind.table_name(), count = rows.len(), "Listed rows");
        Ok(rows)
    }

    async fn list_by_system<T: Entity>(&self, system_id: i32) -> Result<Vec<T>> {
        let kind = T::KIND;
        if !kind.has_system_column() {
            return Err(SyncError::ValidationError(format!(
                "{} records are not scoped to a system",
                kind.label()
            )));
        }
        let sql = format!(
            "SELECT {} FROM {} WHERE \"systemid\" = $1 ORDER BY {}",
            column_list(T::COLUMNS),
            quote_ident(kind.table_name()),
            quote_ident(kind.primary_key())
        );
        let rows = sqlx::query_as::<_, T>(&sql)
            .bind(system_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    async fn get<T: Entity>(&self, id: i32) -> Result<Option<T>> {
        let kind = T::KIND;
        let sql = format!(
            "SELECT {} FROM {} WHERE {} = $1",
            column_list(T::COLUMNS),
            quote_ident(kind.table_name()),
            quote_ident(kind.primary_key())
        );
        let row = sqlx::query_as::<_, T>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    async fn insert<T: Entity>(&self, draft: T::Draft) -> Result<T> {
        let kind = T::KIND;
        let mut qb = QueryBuilder::<Postgres>::new(format!(
            "INSERT INTO {} ({}) VALUES (",
            quote_ident(kind.table_name()),
            column_list(&T::COLUMNS[1..])
        ));
        push_values(&mut qb, draft.column_values());
        qb.push(format!(") RETURNING {}", column_list(T::COLUMNS)));

        let row = qb
            .build_query_as::<T>()
            .fetch_one(&self.pool)
            .await
            .map_err(map_write_error::<T>)?;
        Ok(row)
    }

    async fn update<T: Entity>(&self, id: i32, draft: T::Draft) -> Result<Option<T>> {
        let kind = T::KIND;
        let mut qb = QueryBuilder::<Postgres>::new(format!(
            "UPDATE {} SET ",
            quote_ident(kind.table_name())
        ));
        for (i, (column, value)) in T::COLUMNS[1..]
            .iter()
            .zip(draft.column_values())
            .enumerate()
        {
            if i > 0 {
                qb.push(", ");
            }
            qb.push(format!("{} = ", quote_ident(column)));
            push_value(&mut qb, value);
        }
        qb.push(format!(" WHERE {} = ", quote_ident(kind.primary_key())));
        qb.push_bind(id);
        qb.push(format!(" RETURNING {}", column_list(T::COLUMNS)));

        let row = qb
            .build_query_as::<T>()
            .fetch_optional(&self.pool)
            .await
            .map_err(map_write_error::<T>)?;
        Ok(row)
    }

    async fn upsert<T: Entity>(&self, record: &T) -> Result<UpsertOutcome> {
        let kind = T::KIND;
        let updates = T::COLUMNS[1..]
            .iter()
            .map(|c| format!("{col} = EXCLUDED.{col}", col = quote_ident(c)))
            .collect::<Vec<_>>()
            .join(", ");

        let mut qb = QueryBuilder::<Postgres>::new(format!(
            "INSERT INTO {} ({}) VALUES (",
            quote_ident(kind.table_name()),
            column_list(T::COLUMNS)
        ));
        push_values(&mut qb, record.column_values());
        qb.push(format!(
            ") ON CONFLICT ({}) DO UPDATE SET {} RETURNING (xmax = 0) AS inserted",
            quote_ident(kind.primary_key()),
            updates
        ));

        let row = qb
            .build()
            .fetch_one(&self.pool)
            .await
            .map_err(map_write_error::<T>)?;
        let inserted: bool = row.try_get("inserted")?;

        if inserted {
            // Explicit keys bypass the SERIAL sequence; move it past them
            let sql = format!(
                "SELECT setval(pg_get_serial_sequence($1, $2), \
                 GREATEST((SELECT MAX({pk}) FROM {table}), 1))",
                pk = quote_ident(kind.primary_key()),
                table = quote_ident(kind.table_name())
            );
            sqlx::query(&sql)
                .bind(kind.table_name())
                .bind(kind.primary_key())
                .execute(&self.pool)
                .await?;
        }

        Ok(if inserted {
            UpsertOutcome::Inserted
        } else {
            UpsertOutcome::Updated
        })
    }

    async fn delete<T: Entity>(&self, id: i32) -> Result<Option<T>> {
        let kind = T::KIND;
        let sql = format!(
            "DELETE FROM {} WHERE {} = $1 RETURNING {}",
            quote_ident(kind.table_name()),
            quote_ident(kind.primary_key()),
            column_list(T::COLUMNS)
        );
        let row = sqlx::query_as::<_, T>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_write_error::<T>)?;
        Ok(row)
    }

    async fn record_audit(&self, entry: NewAuditEntry) -> Result<TableAudit> {
        let sql = format!(
            "INSERT INTO {} (table_name, record_id, action, old_data, new_data, changed_by, \
             changed_at, change_reason) VALUES ($1, $2, $3, $4, $5, $6, $7, $8) RETURNING {}",
            AUDIT_TABLE, AUDIT_COLUMNS
        );
        let row = sqlx::query_as::<_, TableAudit>(&sql)
            .bind(entry.table_name)
            .bind(entry.record_id)
            .bind(entry.action.as_str())
            .bind(entry.old_data)
            .bind(entry.new_data)
            .bind(entry.changed_by)
            .bind(entry.changed_at)
            .bind(entry.change_reason)
            .fetch_one(&self.pool)
            .await?;
        Ok(row)
    }

    async fn audit_history(&self, table_name: &str, record_id: i32) -> Result<Vec<TableAudit>> {
        let sql = format!(
            "SELECT {} FROM {} WHERE table_name = $1 AND record_id = $2 \
             ORDER BY changed_at DESC, audit_id DESC",
            AUDIT_COLUMNS, AUDIT_TABLE
        );
        let rows = sqlx::query_as::<_, TableAudit>(&sql)
            .bind(table_name)
            .bind(record_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    async fn recent_audit(&self, limit: i64) -> Result<Vec<TableAudit>> {
        let sql = format!(
            "SELECT {} FROM {} ORDER BY changed_at DESC, audit_id DESC LIMIT $1",
            AUDIT_COLUMNS, AUDIT_TABLE
        );
        let rows = sqlx::query_as::<_, TableAudit>(&sql)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use metasync_core::{Catalog, System};

    #[test]
    fn test_column_list_quotes_identifiers() {
        assert_eq!(
            column_list(&["tableid", "columns"]),
            "\"tableid\", \"columns\""
        );
        assert!(column_list(Catalog::COLUMNS).starts_with("\"tableid\""));
    }

    #[test]
    fn test_upsert_statement_shape() {
        let mut qb = QueryBuilder::<Postgres>::new("INSERT INTO \"systems\" (");
        qb.push(column_list(System::COLUMNS));
        qb.push(") VALUES (");
        push_values(
            &mut qb,
            vec![
                ColumnValue::Int(Some(1)),
                ColumnValue::Text(Some("billing".to_string())),
                ColumnValue::Json(None),
            ],
        );
        qb.push(")");
        assert!(qb.sql().ends_with("VALUES ($1, $2, $3)"));
    }
}
