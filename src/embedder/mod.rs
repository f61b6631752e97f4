//! Embedding provider seam.
//!
//! The ingestion batcher only needs "text in, fixed-dimension vector out";
//! everything about the model behind that call is out of scope. The trait
//! keeps the batcher testable against in-memory fakes.

use crate::error::ItemError;

pub mod http;

pub use http::HttpEmbedder;

/// A dense text-embedding provider.
pub trait Embedder {
    /// Embeds one text. An empty returned vector is treated by callers as
    /// a provider failure, equivalent to `Err`.
    fn embed(&self, text: &str) -> Result<Vec<f32>, ItemError>;

    /// Embeds a batch of texts, preserving input order.
    ///
    /// The default implementation loops over [`Embedder::embed`]; providers
    /// with a native batch endpoint should override it.
    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, ItemError> {
        texts.iter().map(|text| self.embed(text)).collect()
    }
}
