//! Client seam for the search API under evaluation.

use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::blocking::Client;
use reqwest::header::{HeaderValue, CONTENT_TYPE};
use serde::{Deserialize, Serialize};

use crate::error::ItemError;

/// One ranked search result.
///
/// The order in which hits come back from the API is the ranking of the
/// system under test; graders must never re-sort it.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchHit {
    /// Matched product id.
    pub product_id: String,
    /// Cosine-style similarity reported by the API.
    #[serde(default)]
    pub similarity_score: f64,
}

/// A search API answering free-text queries with ranked product hits.
pub trait SearchClient {
    /// Runs one query, returning at most `limit` hits in rank order.
    fn query(&self, text: &str, limit: usize) -> Result<Vec<SearchHit>, ItemError>;
}

/// Blocking HTTP client for the `POST {query, limit}` search endpoint.
#[derive(Clone)]
pub struct HttpSearchClient {
    client: Client,
    endpoint: String,
}

impl HttpSearchClient {
    /// Builds a client with a hard request timeout; a timed-out query is
    /// skipped by the evaluation runner, not retried.
    pub fn new(endpoint: String, timeout: Duration) -> Result<Self> {
        anyhow::ensure!(!endpoint.trim().is_empty(), "missing search API URL");
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let client = Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()
            .context("failed to build search HTTP client")?;
        Ok(Self {
            client,
            endpoint: endpoint.trim().to_string(),
        })
    }
}

impl SearchClient for HttpSearchClient {
    fn query(&self, text: &str, limit: usize) -> Result<Vec<SearchHit>, ItemError> {
        let request = SearchRequest { query: text, limit };
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
                "search request failed ({status}): {body}"
            )));
        }
        let parsed: SearchResponse = response
            .json()
            .map_err(|err| ItemError::Data(format!("malformed search response: {err}")))?;
        Ok(parsed.results)
    }
}

/// True when similarity scores are non-increasing down the ranking.
///
/// The API promises this ordering by convention; the evaluation runner
/// checks it in tests but never re-sorts live results.
pub fn is_ranked_descending(hits: &[SearchHit]) -> bool {
    hits.windows(2)
        .all(|pair| pair[0].similarity_score >= pair[1].similarity_score)
}

#[derive(Serialize)]
struct SearchRequest<'a> {
    query: &'a str,
    limit: usize,
}

#[derive(Deserialize)]
struct SearchResponse {
    results: Vec<SearchHit>,
    #[serde(default)]
    #[allow(dead_code)]
    total: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn response_parsing_matches_api_contract() {
        let parsed: SearchResponse = serde_json::from_value(json!({
            "results": [
                {"productId": "B1", "similarityScore": 0.92, "title": "ignored"},
                {"productId": "B2", "similarityScore": 0.87},
            ],
            "total": 2,
        }))
        .unwrap();
        assert_eq!(parsed.results.len(), 2);
        assert_eq!(parsed.results[0].product_id, "B1");
        assert!(is_ranked_descending(&parsed.results));
    }

    #[test]
    fn missing_similarity_score_defaults_to_zero() {
        let hit: SearchHit = serde_json::from_value(json!({"productId": "B9"})).unwrap();
        assert_eq!(hit.similarity_score, 0.0);
    }

    #[test]
    fn descending_check_flags_out_of_order_scores() {
        let hits = vec![
            SearchHit {
                product_id: "B1".into(),
                similarity_score: 0.5,
            },
            SearchHit {
                product_id: "B2".into(),
                similarity_score: 0.9,
            },
        ];
        assert!(!is_ranked_descending(&hits));
    }
}
