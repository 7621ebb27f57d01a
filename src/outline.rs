//! Minimal Outline API client.
//!
//! Outline exposes an RPC-style API: every method is `POST /api/<method>`
//! with a JSON body and answers `{ "data": … }`. Only the four calls the
//! tool needs are wrapped; unknown response fields are kept in `extra` so
//! `--json` output stays faithful to what the server sent.

use crate::config::OutlineConfig;
use crate::error::OutlinePdfError;
use crate::validate::validate_document_id;
use reqwest::header::{ACCEPT, AUTHORIZATION};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::time::Duration;
use tracing::{debug, error, info};

/// An Outline collection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Collection {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// An Outline document. `text` is markdown.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub url_id: Option<String>,
    #[serde(default)]
    pub collection_id: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// One hit of `documents.search`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    /// Highlighted excerpt.
    #[serde(default)]
    pub context: Option<String>,
    #[serde(default)]
    pub ranking: Option<f64>,
    pub document: Document,
}

#[derive(Deserialize)]
struct Envelope<T> {
    data: T,
}

/// Authenticated client for one Outline instance.
#[derive(Debug, Clone)]
pub struct OutlineClient {
    http: reqwest::Client,
    config: OutlineConfig,
}

impl OutlineClient {
    pub fn new(config: OutlineConfig) -> Result<Self, OutlinePdfError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| OutlinePdfError::Internal(format!("HTTP client: {e}")))?;
        info!("Outline client initialised: {}", config.base_url);
        Ok(Self { http, config })
    }

    pub fn base_url(&self) -> &str {
        &self.config.base_url
    }

    /// All collections visible to the token.
    pub async fn collections(&self) -> Result<Vec<Collection>, OutlinePdfError> {
        let collections: Vec<Collection> = self.call("collections.list", json!({})).await?;
        info!("Loaded {} collections", collections.len());
        Ok(collections)
    }

    /// Documents, optionally restricted to one collection.
    pub async fn documents(&self, collection_id: Option<&str>) -> Result<Vec<Document>, OutlinePdfError> {
        let body = match collection_id {
            Some(id) => json!({ "collectionId": validate_document_id(id)? }),
            None => json!({}),
        };
        let documents: Vec<Document> = self.call("documents.list", body).await?;
        info!(
            "Loaded {} documents (collection={})",
            documents.len(),
            collection_id.unwrap_or("*")
        );
        Ok(documents)
    }

    /// One document including its markdown body.
    pub async fn document(&self, id: &str) -> Result<Document, OutlinePdfError> {
        let id = validate_document_id(id)?;
        let document: Document = self.call("documents.info", json!({ "id": id })).await?;
        info!("Loaded document '{}' ({})", document.title, id);
        Ok(document)
    }

    /// Full-text search.
    pub async fn search(&self, query: &str) -> Result<Vec<SearchHit>, OutlinePdfError> {
        let hits: Vec<SearchHit> = self
            .call("documents.search", json!({ "query": query }))
            .await?;
        info!("Search '{}': {} hits", query, hits.len());
        Ok(hits)
    }

    /// HTTP status of `collections.list`, without interpreting it.
    ///
    /// Used by the startup check to tell a bad token from an unreachable host.
    pub async fn api_status(&self) -> Result<u16, OutlinePdfError> {
        let method = "collections.list";
        let response = self.send(method, json!({})).await?;
        Ok(response.status().as_u16())
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, body: Value) -> Result<T, OutlinePdfError> {
        let response = self.send(method, body).await?;
        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            error!("Outline '{}' failed: HTTP {}", method, status);
            return Err(OutlinePdfError::Api {
                method: method.to_string(),
                status: status.as_u16(),
                detail: truncate(&detail, 300),
            });
        }

        let envelope: Envelope<T> =
            response
                .json()
                .await
                .map_err(|e| OutlinePdfError::ApiUnreachable {
                    method: method.to_string(),
                    reason: format!("invalid response body: {e}"),
                })?;
        Ok(envelope.data)
    }

    async fn send(&self, method: &str, body: Value) -> Result<reqwest::Response, OutlinePdfError> {
        let url = format!("{}/api/{}", self.config.base_url, method);
        debug!("API request: POST {} ({})", url, body);

        self.http
            .post(&url)
            .header(AUTHORIZATION, format!("Bearer {}", self.config.api_token))
            .header(ACCEPT, "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                let reason = if e.is_timeout() {
                    format!("timed out after {}s", self.config.timeout_secs)
                } else {
                    e.to_string()
                };
                error!("Outline '{}' unreachable: {}", method, reason);
                OutlinePdfError::ApiUnreachable {
                    method: method.to_string(),
                    reason,
                }
            })
    }
}

fn truncate(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}\u{2026}", &s[..idx]),
        None => s.to_string(),
    }
}
