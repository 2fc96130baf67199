//! Elasticsearch REST client

use super::{BulkItemStatus, BulkResponse, EngineError, EngineResult, SearchEngine};
use crate::Document;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::json;
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;

/// Default engine address
pub const DEFAULT_URL: &str = "http://localhost:9200";

/// Client for an Elasticsearch-compatible engine
pub struct ElasticClient {
    http: Client,
    base_url: String,
}

impl ElasticClient {
    pub fn new(base_url: Option<&str>, timeout: Duration) -> EngineResult<Self> {
        let base_url = base_url.unwrap_or(DEFAULT_URL).trim_end_matches('/').to_string();
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| EngineError::Connectivity(e.to_string()))?;

        Ok(Self { http, base_url })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    /// Turn a non-success status into an engine error
    async fn check(response: reqwest::Response) -> EngineResult<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        Err(status_error(status, body))
    }
}

/// Map a transport error onto the engine error taxonomy
fn transport_error(e: reqwest::Error) -> EngineError {
    if e.is_connect() || e.is_timeout() || e.is_request() {
        EngineError::Connectivity(e.to_string())
    } else if e.is_decode() {
        EngineError::InvalidResponse(e.to_string())
    } else {
        EngineError::Connectivity(e.to_string())
    }
}

fn status_error(status: StatusCode, body: String) -> EngineError {
    match status {
        StatusCode::TOO_MANY_REQUESTS
        | StatusCode::BAD_GATEWAY
        | StatusCode::SERVICE_UNAVAILABLE
        | StatusCode::GATEWAY_TIMEOUT => {
            EngineError::Connectivity(format!("engine returned {}", status))
        }
        _ => EngineError::Request {
            status: status.as_u16(),
            message: body,
        },
    }
}

/// Build the NDJSON body of a bulk request
fn bulk_body(index: &str, documents: &[Document]) -> EngineResult<String> {
    let mut body = String::new();
    for doc in documents {
        let action = match &doc.id {
            Some(id) => json!({ "index": { "_index": index, "_id": id } }),
            None => json!({ "index": { "_index": index } }),
        };
        let action = serde_json::to_string(&action)
            .map_err(|e| EngineError::InvalidResponse(e.to_string()))?;
        let source = serde_json::to_string(&doc.payload)
            .map_err(|e| EngineError::InvalidResponse(e.to_string()))?;
        body.push_str(&action);
        body.push('\n');
        body.push_str(&source);
        body.push('\n');
    }
    Ok(body)
}

#[derive(Debug, Deserialize)]
struct RawBulkResponse {
    #[serde(default)]
    took: u64,
    #[serde(default)]
    errors: bool,
    #[serde(default)]
    items: Vec<HashMap<String, RawBulkItem>>,
}

#[derive(Debug, Deserialize)]
struct RawBulkItem {
    status: u16,
    error: Option<RawItemError>,
}

#[derive(Debug, Deserialize)]
struct RawItemError {
    #[serde(rename = "type")]
    kind: String,
    reason: Option<String>,
}

impl From<RawBulkResponse> for BulkResponse {
    fn from(raw: RawBulkResponse) -> Self {
        let items = raw
            .items
            .into_iter()
            .map(|mut entry| {
                // Each entry is keyed by its action name ("index", "create", ...)
                let item = entry.drain().next().map(|(_, item)| item);
                match item {
                    Some(RawBulkItem {
                        status,
                        error: None,
                    }) if (200..300).contains(&status) => BulkItemStatus::Indexed,
                    Some(RawBulkItem {
                        error: Some(error), ..
                    }) => BulkItemStatus::Rejected {
                        reason: error.kind,
                        detail: error.reason,
                    },
                    Some(RawBulkItem { status, .. }) => BulkItemStatus::Rejected {
                        reason: format!("status_{}", status),
                        detail: None,
                    },
                    None => BulkItemStatus::Rejected {
                        reason: "empty_item".to_string(),
                        detail: None,
                    },
                }
            })
            .collect();

        BulkResponse {
            took_ms: raw.took,
            errors: raw.errors,
            items,
        }
    }
}

#[async_trait]
impl SearchEngine for ElasticClient {
    async fn index_exists(&self, name: &str) -> EngineResult<bool> {
        let response = self
            .http
            .head(self.url(name))
            .send()
            .await
            .map_err(transport_error)?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(false),
            status if status.is_success() => Ok(true),
            status => Err(status_error(status, String::new())),
        }
    }

    async fn delete_index(&self, name: &str) -> EngineResult<()> {
        let response = self
            .http
            .delete(self.url(name))
            .send()
            .await
            .map_err(transport_error)?;

        if response.status() == StatusCode::NOT_FOUND {
            debug!("Index {} already absent", name);
            return Ok(());
        }
        Self::check(response).await?;
        Ok(())
    }

    async fn create_index(&self, name: &str) -> EngineResult<()> {
        let response = self
            .http
            .put(self.url(name))
            .send()
            .await
            .map_err(transport_error)?;
        Self::check(response).await?;
        Ok(())
    }

    async fn bulk_submit(&self, index: &str, documents: &[Document]) -> EngineResult<BulkResponse> {
        let body = bulk_body(index, documents)?;

        let response = self
            .http
            .post(self.url("_bulk"))
            .header("Content-Type", "application/x-ndjson")
            .body(body)
            .send()
            .await
            .map_err(transport_error)?;
        let response = Self::check(response).await?;

        let raw: RawBulkResponse = response.json().await.map_err(transport_error)?;
        Ok(raw.into())
    }

    async fn refresh_index(&self, name: &str) -> EngineResult<()> {
        let response = self
            .http
            .post(self.url(&format!("{}/_refresh", name)))
            .send()
            .await
            .map_err(transport_error)?;
        Self::check(response).await?;
        Ok(())
    }
}
