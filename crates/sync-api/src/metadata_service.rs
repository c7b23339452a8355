//! Client for the external metadata-generation service.
//!
//! The service receives a category's source credentials plus a schema and
//! table, profiles the table and answers with generated metadata. Responses
//! are passed through to the caller untouched. Requests are sent once with a
//! timeout; there are no retries.

use serde::Serialize;
use std::time::Duration;
use tracing::{debug, info};

/// Path appended to the configured base URL
pub const GENERATE_PATH: &str = "/generate_metadata";

/// Metadata-service errors
#[derive(Debug, thiserror::Error)]
pub enum MetadataServiceError {
    /// `METADATA_SERVICE_URL` is not set
    #[error("Metadata service is not configured (set METADATA_SERVICE_URL)")]
    NotConfigured,

    /// Connection failure or timeout
    #[error("Network error: {0}")]
    Network(String),

    /// Upstream answered with a non-2xx status
    #[error("Metadata service returned HTTP {0}: {1}")]
    HttpStatus(u16, String),

    /// Upstream body was not JSON
    #[error("Invalid response from metadata service: {0}")]
    InvalidResponse(String),
}

/// Body forwarded to the metadata service.
///
/// Holds the raw credentials and has no `Debug` impl.
#[derive(Serialize)]
pub struct GenerateMetadataRequest<'a> {
    pub categoryid: i32,
    pub db_type: &'a str,
    pub db_creds: &'a serde_json::Value,
    pub schema: &'a str,
    pub table: &'a str,
}

/// HTTP client for the metadata service
#[derive(Debug, Clone)]
pub struct MetadataServiceClient {
    client: reqwest::Client,
    base_url: String,
}

impl MetadataServiceClient {
    /// Create a client for `base_url` (scheme, host and optional path prefix).
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, MetadataServiceError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| MetadataServiceError::Network(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn endpoint(&self) -> String {
        format!("{}{}", self.base_url, GENERATE_PATH)
    }

    /// Forward one generation request and return the upstream JSON.
    pub async fn generate(
        &self,
        request: &GenerateMetadataRequest<'_>,
    ) -> Result<serde_json::Value, MetadataServiceError> {
        let start = std::time::Instant::now();
        let endpoint = self.endpoint();
        debug!(
            endpoint = %endpoint,
            categoryid = request.categoryid,
            schema = request.schema,
            table = request.table,
            "Forwarding metadata generation request"
        );

        let response = self
            .client
            .post(&endpoint)
            .json(request)
            .send()
            .await
            .map_err(|e| MetadataServiceError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(MetadataServiceError::HttpStatus(
                status.as_u16(),
                response.text().await.unwrap_or_default(),
            ));
        }

        let body = response
            .json::<serde_json::Value>()
            .await
            .map_err(|e| MetadataServiceError::InvalidResponse(e.to_string()))?;

        info!(
            categoryid = request.categoryid,
            schema = request.schema,
            table = request.table,
            latency_ms = start.elapsed().as_millis() as u64,
            "Metadata generated"
        );
        Ok(body)
    }
}
