//! metasync API Library
//!
//! Router, handlers and configuration for the metasync HTTP server. The
//! binary in `main.rs` only wires configuration to [`build_router`]; tests
//! drive the same router over in-memory stores.

use axum::{
    routing::{get, post},
    Router,
};
use metasync_core::{Catalog, Category, Context, Entity, Role, System};
use metasync_storage::{MetadataStore, SourceIntrospector, SyncService};
use std::sync::Arc;
use tower_http::cors::CorsLayer;

pub mod audit;
pub mod config;
pub mod entities;
pub mod errors;
pub mod health;
pub mod metadata_service;
#[cfg(feature = "metrics")]
pub mod metrics;
pub mod onboarding;

pub use config::{redact_url_userinfo, ConfigError, ServerConfig, StoreBackend};
pub use metadata_service::{MetadataServiceClient, MetadataServiceError};

/// Request header naming who made a change.
pub const CHANGED_BY_HEADER: &str = "x-changed-by";

/// Application state shared across handlers
pub struct AppState<S> {
    pub sync: SyncService<S>,
    pub introspector: Arc<dyn SourceIntrospector>,
    pub metadata_service: Option<Arc<MetadataServiceClient>>,
}

impl<S> Clone for AppState<S> {
    fn clone(&self) -> Self {
        Self {
            sync: self.sync.clone(),
            introspector: Arc::clone(&self.introspector),
            metadata_service: self.metadata_service.clone(),
        }
    }
}

impl<S: MetadataStore> AppState<S> {
    pub fn new(sync: SyncService<S>, introspector: Arc<dyn SourceIntrospector>) -> Self {
        Self {
            sync,
            introspector,
            metadata_service: None,
        }
    }

    pub fn with_metadata_service(mut self, client: MetadataServiceClient) -> Self {
        self.metadata_service = Some(Arc::new(client));
        self
    }
}

/// CRUD, status and sync routes for one entity kind.
fn entity_routes<S: MetadataStore, T: Entity>() -> Router<AppState<S>> {
    let base = format!("/{}", T::KIND.route_segment());

    let router = Router::new()
        .route(
            &format!("{}/", base),
            get(entities::list::<S, T>).post(entities::create::<S, T>),
        )
        .route(&format!("{}/status", base), get(entities::status::<S, T>))
        .route(
            &format!("{}/:id", base),
            get(entities::get_one::<S, T>)
                .put(entities::update::<S, T>)
                .delete(entities::delete::<S, T>),
        )
        .route(&format!("{}/sync/:id", base), post(entities::sync::<S, T>));

    if T::KIND.has_system_column() {
        router.route(
            &format!("{}/by_system/:systemid", base),
            get(entities::list_by_system::<S, T>),
        )
    } else {
        router
    }
}

/// Build the full application router.
pub fn build_router<S: MetadataStore>(state: AppState<S>) -> Router {
    let app = Router::new()
        .route("/health", get(health::health_check))
        .route("/live", get(health::liveness_check))
        .route("/ready", get(health::readiness_check::<S>))
        .merge(entity_routes::<S, System>())
        .merge(entity_routes::<S, Role>())
        .merge(entity_routes::<S, Category>())
        .merge(entity_routes::<S, Catalog>())
        .merge(entity_routes::<S, Context>())
        .route("/audit/", get(audit::recent::<S>))
        .route("/audit/:table/:record_id", get(audit::history::<S>))
        .route("/db/list_schemas/", post(onboarding::list_schemas::<S>))
        .route("/db/list_tables/", post(onboarding::list_tables::<S>))
        .route(
            "/db/generate_metadata/",
            post(onboarding::generate_metadata::<S>),
        );

    #[cfg(feature = "metrics")]
    let app = app
        .route("/metrics", get(metrics::metrics_handler))
        .layer(axum::middleware::from_fn(metrics::track_metrics));

    app.layer(CorsLayer::permissive()).with_state(state)
}
