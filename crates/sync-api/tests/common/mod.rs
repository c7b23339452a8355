//! Shared test infrastructure for the API integration suites.

#![allow(dead_code)]

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use metasync_api::{build_router, AppState, MetadataServiceClient};
use metasync_core::{Environment, Result, SourceCredentials, SyncError};
use metasync_storage::{MemoryStore, SourceIntrospector, SyncService};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

/// Introspector that answers from fixed lists and records what it was asked.
#[derive(Default)]
pub struct StubIntrospector {
    pub schemas: Vec<String>,
    pub tables: Vec<String>,
    pub fail: bool,
    pub seen_hosts: Mutex<Vec<String>>,
}

#[async_trait]
impl SourceIntrospector for StubIntrospector {
    async fn list_schemas(&self, creds: &SourceCredentials) -> Result<Vec<String>> {
        self.seen_hosts.lock().push(creds.host.clone());
        if self.fail {
            return Err(SyncError::SourceError("connection refused".to_string()));
        }
        Ok(self.schemas.clone())
    }

    async fn list_tables(&self, creds: &SourceCredentials, _schema: &str) -> Result<Vec<String>> {
        self.seen_hosts.lock().push(creds.host.clone());
        if self.fail {
            return Err(SyncError::SourceError("connection refused".to_string()));
        }
        Ok(self.tables.clone())
    }
}

/// A test application over fresh in-memory stores.
pub struct TestApp {
    pub sync: SyncService<MemoryStore>,
    pub introspector: Arc<StubIntrospector>,
    metadata_url: Option<String>,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_introspector(StubIntrospector {
            schemas: vec!["public".to_string(), "sales".to_string()],
            tables: vec!["customers".to_string(), "orders".to_string()],
            ..Default::default()
        })
    }

    pub fn with_introspector(introspector: StubIntrospector) -> Self {
        Self {
            sync: SyncService::new(
                MemoryStore::new(Environment::Dev),
                MemoryStore::new(Environment::Prod),
            ),
            introspector: Arc::new(introspector),
            metadata_url: None,
        }
    }

    pub fn with_metadata_service(mut self, url: impl Into<String>) -> Self {
        self.metadata_url = Some(url.into());
        self
    }

    /// A router sharing this app's stores.
    pub fn router(&self) -> Router {
        let mut state = AppState::new(self.sync.clone(), self.introspector.clone());
        if let Some(url) = &self.metadata_url {
            let client = MetadataServiceClient::new(url.as_str(), Duration::from_secs(5)).unwrap();
            state = state.with_metadata_service(client);
        }
        build_router(state)
    }

    pub async fn request(
        &self,
        method: &str,
        path: &str,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        make_request(self.router(), method, path, body, None).await
    }

    /// Create a system in dev and return its id.
    pub async fn create_system(&self, name: &str) -> i64 {
        let (status, body) = self
            .request("POST", "/systems/", Some(json!({ "systemname": name })))
            .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        body["systemid"].as_i64().unwrap()
    }

    /// Create a Postgres-backed category in dev and return its id.
    pub async fn create_category(&self, systemid: i64) -> i64 {
        let (status, body) = self
            .request(
                "POST",
                "/categories/",
                Some(json!({
                    "categoryname": "warehouse",
                    "systemid": systemid,
                    "db_type": "postgres",
                    "db_creds": {
                        "database": "dw",
                        "user": "reader",
                        "password": "hunter2",
                        "host": "dw.internal",
                        "port": "5432"
                    }
                })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        body["categoryid"].as_i64().unwrap()
    }
}

/// Helper to make HTTP requests to the test app
pub async fn make_request(
    app: Router,
    method: &str,
    path: &str,
    body: Option<Value>,
    changed_by: Option<&str>,
) -> (StatusCode, Value) {
    let mut req_builder = Request::builder()
        .uri(path)
        .method(method)
        .header("Content-Type", "application/json");

    if let Some(actor) = changed_by {
        req_builder = req_builder.header("X-Changed-By", actor);
    }

    let body = match body {
        Some(v) => Body::from(serde_json::to_string(&v).unwrap()),
        None => Body::empty(),
    };

    let request = req_builder.body(body).unwrap();
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();

    let body_bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();

    let json: Value = serde_json::from_slice(&body_bytes)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&body_bytes).to_string()));

    (status, json)
}
