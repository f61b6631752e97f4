//! Blocking HTTP client for the embedding service.
//!
//! The service accepts `POST <url>` with `{"text": ...}` and answers
//! `{"embedding": [...]}`; the batch endpoint at `<url>/batch` accepts
//! `{"texts": [...]}` and answers `{"embeddings": [[...], ...]}`. Non-2xx
//! responses and malformed bodies are embedding failures for that input,
//! never process-level errors.

use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::blocking::Client;
use reqwest::header::{HeaderValue, CONTENT_TYPE};
use serde::{Deserialize, Serialize};

use crate::embedder::Embedder;
use crate::error::ItemError;

/// Blocking client for the `{text} -> {embedding}` service.
#[derive(Clone)]
pub struct HttpEmbedder {
    client: Client,
    endpoint: String,
}

impl HttpEmbedder {
    /// Builds a client for the given endpoint with a hard request timeout.
    ///
    /// A timed-out call surfaces as a transient per-item failure; there is
    /// no automatic retry.
    pub fn new(endpoint: String, timeout: Duration) -> Result<Self> {
        anyhow::ensure!(
            !endpoint.trim().is_empty(),
            "missing embedding service URL"
        );
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let client = Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()
            .context("failed to build embedding HTTP client")?;
        Ok(Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
        })
    }

    fn batch_endpoint(&self) -> String {
        format!("{}/batch", self.endpoint)
    }
}

impl Embedder for HttpEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>, ItemError> {
        let request = EmbedRequest { text };
        let response = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .map_err(|err| ItemError::from_http(&err))?;
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .unwrap_or_else(|_| "<body unavailable>".to_string());
            return Err(ItemError::Transient(format!(
                "embedding request failed ({status}): {body}"
            )));
        }
        let parsed: EmbedResponse = response
            .json()
            .map_err(|err| ItemError::Data(format!("malformed embedding response: {err}")))?;
        Ok(parsed.embedding)
    }

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, ItemError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let request = EmbedBatchRequest { texts };
        let response = self
            .client
            .post(self.batch_endpoint())
            .json(&request)
            .send()
            .map_err(|err| ItemError::from_http(&err))?;
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .unwrap_or_else(|_| "<body unavailable>".to_string());
            return Err(ItemError::Transient(format!(
                "batch embedding request failed ({status}): {body}"
            )));
        }
        let parsed: EmbedBatchResponse = response
            .json()
            .map_err(|err| ItemError::Data(format!("malformed batch embedding response: {err}")))?;
        if parsed.embeddings.len() != texts.len() {
            return Err(ItemError::Data(format!(
                "service returned {} embeddings for {} texts",
                parsed.embeddings.len(),
                texts.len()
            )));
        }
        Ok(parsed.embeddings)
    }
}

#[derive(Serialize)]
struct EmbedRequest<'a> {
    text: &'a str,
}

#[derive(Deserialize)]
struct EmbedResponse {
    embedding: Vec<f32>,
}

#[derive(Serialize)]
struct EmbedBatchRequest<'a> {
    texts: &'a [&'a str],
}

#[derive(Deserialize)]
struct EmbedBatchResponse {
    embeddings: Vec<Vec<f32>>,
}
