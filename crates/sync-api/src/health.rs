//! Health Check Module
//!
//! Provides Kubernetes-compatible health endpoints:
//! - `/health` - Basic health check (returns "ok")
//! - `/ready` - Readiness check (pings the dev and prod databases)
//! - `/live` - Liveness check (always returns healthy if the process is running)

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use metasync_core::Environment;
use metasync_storage::MetadataStore;
use serde::Serialize;
use std::time::Instant;

use crate::AppState;

/// Health check response with detailed status
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: HealthStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dev: Option<ComponentHealth>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prod: Option<ComponentHealth>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Health status enumeration
#[derive(Debug, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Unhealthy,
}

/// Component health status
#[derive(Debug, Serialize)]
pub struct ComponentHealth {
    pub status: HealthStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ComponentHealth {
    fn from_ping(result: metasync_core::Result<()>, latency_ms: u64) -> Self {
        match result {
            Ok(()) => Self {
                status: HealthStatus::Healthy,
                latency_ms: Some(latency_ms),
                message: None,
            },
            Err(e) => Self {
                status: HealthStatus::Unhealthy,
                latency_ms: None,
                message: Some(e.to_string()),
            },
        }
    }
}

/// Basic health check - always returns "ok" if the server is running
pub async fn health_check() -> &'static str {
    "ok"
}

/// Liveness check - indicates if the application is running
pub async fn liveness_check() -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: HealthStatus::Healthy,
            dev: None,
            prod: None,
            message: Some("Service is alive".to_string()),
        }),
    )
}

/// Readiness check - ready only when both databases answer
pub async fn readiness_check<S: MetadataStore>(
    State(state): State<AppState<S>>,
) -> impl IntoResponse {
    let start = Instant::now();
    let (dev, prod) = state.sync.ping().await;
    let latency_ms = start.elapsed().as_millis() as u64;

    let dev = ComponentHealth::from_ping(dev, latency_ms);
    let prod = ComponentHealth::from_ping(prod, latency_ms);

    let overall_status = if dev.status == HealthStatus::Healthy && prod.status == HealthStatus::Healthy {
        HealthStatus::Healthy
    } else {
        HealthStatus::Unhealthy
    };
    let status_code = match overall_status {
        HealthStatus::Healthy => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    if overall_status == HealthStatus::Unhealthy {
        for (environment, health) in [(Environment::Dev, &dev), (Environment::Prod, &prod)] {
            if let Some(message) = &health.message {
                tracing::warn!(environment = %environment, error = %message, "Database not ready");
            }
        }
    }

    let response = HealthResponse {
        status: overall_status,
        message: if overall_status == HealthStatus::Healthy {
            Some("Service is ready".to_string())
        } else {
            Some("Service is not ready".to_string())
        },
        dev: Some(dev),
        prod: Some(prod),
    };

    tracing::debug!(status = ?overall_status, latency_ms, "Readiness check completed");

    (status_code, Json(response))
}
