//! Schema and table discovery on source databases.
//!
//! Source databases are arbitrary Postgres instances registered on a
//! category. Each request opens a single connection with the category's
//! credentials, runs one catalog query and closes it.

use async_trait::async_trait;
use metasync_core::validation::validate_pg_identifier;
use metasync_core::{Result, SourceCredentials, SyncError};
use sqlx::postgres::{PgConnectOptions, PgConnection};
use sqlx::Connection;
use std::time::Duration;
use tracing::{debug, warn};

/// Default connect timeout for source databases
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

const LIST_SCHEMAS_SQL: &str = r#"
    SELECT schema_name::text
    FROM information_schema.schemata
    WHERE schema_name NOT IN ('pg_catalog', 'information_schema', 'pg_toast')
      AND schema_name NOT LIKE 'pg\_temp\_%'
      AND schema_name NOT LIKE 'pg\_toast\_temp\_%'
    ORDER BY schema_name
"#;

const LIST_TABLES_SQL: &str = r#"
    SELECT table_name::text
    FROM information_schema.tables
    WHERE table_schema = $1
      AND table_type IN ('BASE TABLE', 'VIEW')
    ORDER BY table_name
"#;

/// Lists schemas and tables of a source database
#[async_trait]
pub trait SourceIntrospector: Send + Sync + 'static {
    async fn list_schemas(&self, creds: &SourceCredentials) -> Result<Vec<String>>;

    async fn list_tables(&self, creds: &SourceCredentials, schema: &str) -> Result<Vec<String>>;
}

/// Postgres implementation of [`SourceIntrospector`]
#[derive(Debug, Clone)]
pub struct PgSourceIntrospector {
    connect_timeout: Duration,
}

impl Default for PgSourceIntrospector {
    fn default() -> Self {
        Self::new(DEFAULT_CONNECT_TIMEOUT)
    }
}

impl PgSourceIntrospector {
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }

    fn connect_options(creds: &SourceCredentials) -> PgConnectOptions {
        let options = PgConnectOptions::new()
            .host(&creds.host)
            .port(creds.port)
            .username(&creds.user)
            .database(&creds.database);
        match creds.password.as_deref() {
            Some(password) if !password.is_empty() => options.password(password),
            _ => options,
        }
    }

    async fn connect(&self, creds: &SourceCredentials) -> Result<PgConnection> {
        debug!(host = %creds.host, port = creds.port, database = %creds.database, "Connecting to source database");
        let options = Self::connect_options(creds);
        match tokio::time::timeout(self.connect_timeout, PgConnection::connect_with(&options)).await
        {
            Ok(Ok(conn)) => Ok(conn),
            Ok(Err(e)) => {
                warn!(host = %creds.host, database = %creds.database, error = %e, "Source database connection failed");
                Err(SyncError::SourceError(format!(
                    "Could not connect to {}:{}/{}: {}",
                    creds.host, creds.port, creds.database, e
                )))
            }
            Err(_) => Err(SyncError::SourceError(format!(
                "Timed out after {}s connecting to {}:{}/{}",
                self.connect_timeout.as_secs(),
                creds.host,
                creds.port,
                creds.database
            ))),
        }
    }
}

async fn close_quietly(conn: PgConnection) {
    if let Err(e) = conn.close().await {
        debug!(error = %e, "Error closing source connection");
    }
}

#[async_trait]
impl SourceIntrospector for PgSourceIntrospector {
    async fn list_schemas(&self, creds: &SourceCredentials) -> Result<Vec<String>> {
        let mut conn = self.connect(creds).await?;
        let result = sqlx::query_scalar::<_, String>(LIST_SCHEMAS_SQL)
            .fetch_all(&mut conn)
            .await
            .map_err(|e| SyncError::SourceError(format!("Failed to list schemas: {}", e)));
        close_quietly(conn).await;
        result
    }

    async fn list_tables(&self, creds: &SourceCredentials, schema: &str) -> Result<Vec<String>> {
        validate_pg_identifier(schema, "schema")?;
        let mut conn = self.connect(creds).await?;
        let result = sqlx::query_scalar::<_, String>(LIST_TABLES_SQL)
            .bind(schema)
            .fetch_all(&mut conn)
            .await
            .map_err(|e| {
                SyncError::SourceError(format!("Failed to list tables in {}: {}", schema, e))
            });
        close_quietly(conn).await;
        result
    }
}
