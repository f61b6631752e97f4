//! Per-item error taxonomy for the ingestion and evaluation pipelines.

use thiserror::Error;

/// Failure affecting a single record or query.
///
/// Item errors are caught at the item boundary and folded into report
/// counters; they never abort a batch or an evaluation run. Run-fatal
/// conditions (missing files, unreachable store at startup, empty K lists)
/// are surfaced as `anyhow` errors before any processing begins.
#[derive(Error, Debug)]
pub enum ItemError {
    /// Network or timeout failure talking to the embedder, store, or
    /// search API. Recoverable at the granularity of one item.
    #[error("transient i/o error: {0}")]
    Transient(String),

    /// Malformed or inconsistent data for one item, e.g. a record without
    /// a resolvable id or an embedding whose dimension differs from the
    /// run's pinned dimension.
    #[error("data error: {0}")]
    Data(String),
}

impl ItemError {
    /// Wraps a `reqwest` failure. Everything that happens at the network
    /// boundary, timeouts included, is transient for the affected item.
    pub fn from_http(err: &reqwest::Error) -> Self {
        ItemError::Transient(err.to_string())
    }
}
