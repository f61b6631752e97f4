#![warn(missing_docs)]
//! Core library for the shelfsearch ingestion and evaluation pipelines.
//!
//! Two independent workflows share this crate: batch ingestion of product
//! records into a pgvector-backed semantic index, and retrieval-quality
//! evaluation of a search API against labeled test queries.

pub mod embedder;
pub mod error;
pub mod eval;
pub mod ingest;
pub mod metrics;
pub mod product;
pub mod search;
pub mod store;

pub use embedder::{Embedder, HttpEmbedder};
pub use error::ItemError;
pub use eval::{compare_models, evaluate, load_test_queries, ComparisonReport, TestQuery};
pub use ingest::{IngestionReport, Ingestor};
pub use metrics::AggregatedMetric;
pub use product::ProductRecord;
pub use search::{HttpSearchClient, SearchClient, SearchHit};
pub use store::{PostgresStore, ProductStore, StoreConfig, TableName};
