//! metasync API Server
//!
//! REST API for editing metadata in dev and syncing it to prod.

use metasync_api::{
    build_router, redact_url_userinfo, AppState, MetadataServiceClient, ServerConfig, StoreBackend,
};
use metasync_core::Environment;
use metasync_storage::{MemoryStore, MetadataStore, PgSourceIntrospector, PgStore, SyncService};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = ServerConfig::from_env().unwrap_or_else(|e| {
        tracing::error!("Invalid configuration: {}", e);
        std::process::exit(1);
    });

    match config.store {
        StoreBackend::Memory => {
            tracing::warn!("Using in-memory stores; data is lost on exit");
            let sync = SyncService::new(
                MemoryStore::new(Environment::Dev),
                MemoryStore::new(Environment::Prod),
            );
            serve(&config, sync).await;
        }
        StoreBackend::Postgres => {
            let dev = connect(&config, Environment::Dev).await;
            let prod = connect(&config, Environment::Prod).await;
            serve(&config, SyncService::new(dev, prod)).await;
        }
    }
}

/// Open a lazy pool, creating the schema first when asked to.
async fn connect(config: &ServerConfig, environment: Environment) -> PgStore {
    let store = PgStore::connect_lazy(config.db_settings(environment), environment);

    if config.init_schema {
        if let Err(e) = store.initialize().await {
            tracing::error!(environment = %environment, "Failed to initialize schema: {}", e);
            std::process::exit(1);
        }
        tracing::info!(environment = %environment, "Schema initialized");
    }
    store
}

async fn serve<S: MetadataStore>(config: &ServerConfig, sync: SyncService<S>) {
    let mut state = AppState::new(
        sync,
        Arc::new(PgSourceIntrospector::new(config.source_connect_timeout)),
    );

    match config.metadata_service_url.as_deref() {
        Some(url) => {
            let client = MetadataServiceClient::new(url, config.metadata_service_timeout)
                .unwrap_or_else(|e| {
                    tracing::error!("Failed to build metadata service client: {}", e);
                    std::process::exit(1);
                });
            tracing::info!(
                url = %redact_url_userinfo(url),
                "Metadata generation proxy enabled"
            );
            state = state.with_metadata_service(client);
        }
        None => tracing::info!("METADATA_SERVICE_URL not set; metadata generation disabled"),
    }

    let app = build_router(state);

    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("metasync API listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .unwrap_or_else(|e| {
            tracing::error!("Failed to bind {}: {}", addr, e);
            std::process::exit(1);
        });
    if let Err(e) = axum::serve(listener, app).await {
        tracing::error!("Server error: {}", e);
        std::process::exit(1);
    }
}
