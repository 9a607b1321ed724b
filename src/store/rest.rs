//! REST table client for the stats store

use reqwest::Client;
use serde::Serialize;

/// Client for a single REST table endpoint (PostgREST-style inserts)
#[derive(Clone)]
pub struct RestClient {
    client: Client,
    table_url: String,
    api_key: Option<String>,
}

impl RestClient {
    pub fn new(table_url: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            client: Client::new(),
            table_url: table_url.into(),
            api_key,
        }
    }

    pub fn table_url(&self) -> &str {
        &self.table_url
    }

    /// Insert one or more rows; the response body is not read on success
    pub async fn insert<T: Serialize + ?Sized>(&self, rows: &T) -> Result<(), StoreError> {
        let mut request = self
            .client
            .post(&self.table_url)
            .header("Content-Type", "application/json")
            .header("Prefer", "return=minimal")
            .json(rows);

        if let Some(key) = &self.api_key {
            request = request
                .header("apikey", key)
                .header("Authorization", format!("Bearer {}", key));
        }

        let response = request.send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(StoreError::Api {
                status: status.as_u16(),
                body,
            });
        }

        Ok(())
    }
}

/// Store errors
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("API error (status {status}): {body}")]
    Api { status: u16, body: String },
}
