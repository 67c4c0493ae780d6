//! Client for the Overpass geodata query service.

mod query;

use std::time::Duration;

use enodia_shared::models::{InfrastructureCategory, RawGeometryElement};
use reqwest::header::CONTENT_TYPE;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use thiserror::Error;

use query::{area_query, infrastructure_query};
pub use query::AreaHandle;

#[derive(Debug, Error)]
pub enum QueryError {
    #[error("no administrative area named \"{name}\" at admin level {admin_level}")]
    AreaNotFound { name: String, admin_level: u8 },

    #[error("upstream query failed with status {status}: {body}")]
    UpstreamQueryFailed { status: u16, body: String },

    #[error("upstream request failed: {0}")]
    Transport(#[from] reqwest::Error),
}

impl QueryError {
    /// Rate limiting, gateway errors and transport failures are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        match self {
            QueryError::AreaNotFound { .. } => false,
            QueryError::UpstreamQueryFailed { status, .. } => matches!(
                StatusCode::from_u16(*status),
                Ok(StatusCode::TOO_MANY_REQUESTS
                    | StatusCode::BAD_GATEWAY
                    | StatusCode::SERVICE_UNAVAILABLE
                    | StatusCode::GATEWAY_TIMEOUT)
            ),
            QueryError::Transport(e) => !e.is_decode(),
        }
    }
}

#[derive(Deserialize)]
struct AreaResponse {
    #[serde(default)]
    elements: Vec<AreaElement>,
}

#[derive(Deserialize)]
struct AreaElement {
    id: u64,
}

// Elements are decoded one by one so a malformed element only loses itself.
#[derive(Deserialize)]
struct ElementsResponse {
    #[serde(default)]
    elements: Vec<serde_json::Value>,
}

#[derive(Debug, Clone)]
pub struct OverpassClient {
    http: reqwest::Client,
    url: String,
    timeout_secs: u64,
}

impl OverpassClient {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, QueryError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("enodia-backend/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(OverpassClient {
            http,
            url: url.into(),
            timeout_secs: timeout.as_secs().max(1),
        })
    }

    async fn post<T: DeserializeOwned>(&self, query: String) -> Result<T, QueryError> {
        let resp = self
            .http
            .post(&self.url)
            .header(CONTENT_TYPE, "text/plain")
            .body(query)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(QueryError::UpstreamQueryFailed {
                status: status.as_u16(),
                body,
            });
        }

        Ok(resp.json().await?)
    }

    /// Look up an administrative boundary and return its area handle.
    pub async fn resolve_area(&self, name: &str, admin_level: u8) -> Result<AreaHandle, QueryError> {
        let resp: AreaResponse = self
            .post(area_query(name, admin_level, self.timeout_secs))
            .await?;

        let first = resp.elements.first().ok_or_else(|| QueryError::AreaNotFound {
            name: name.to_string(),
            admin_level,
        })?;
        if resp.elements.len() > 1 {
            tracing::warn!(
                name,
                admin_level,
                matches = resp.elements.len(),
                "Area lookup is ambiguous, using the first match"
            );
        }

        let handle = AreaHandle::from_raw(first.id);
        tracing::debug!(name, raw_id = first.id, area_id = handle.id(), "Resolved area");
        Ok(handle)
    }

    /// Fetch all ways matching the category filters inside `area`, geometry included.
    pub async fn fetch_elements(
        &self,
        area: AreaHandle,
        categories: &[InfrastructureCategory],
    ) -> Result<Vec<RawGeometryElement>, QueryError> {
        let resp: ElementsResponse = self
            .post(infrastructure_query(area, categories, self.timeout_secs))
            .await?;

        let total = resp.elements.len();
        let mut ways = Vec::new();
        for value in resp.elements {
            let id = value.get("id").cloned();
            match serde_json::from_value::<RawGeometryElement>(value) {
                Ok(el) if el.kind == "way" => ways.push(el),
                Ok(_) => {}
                Err(e) => tracing::warn!(id = ?id, error = %e, "Skipping undecodable element"),
            }
        }
        tracing::debug!(total, ways = ways.len(), "Fetched elements");
        Ok(ways)
    }
}
