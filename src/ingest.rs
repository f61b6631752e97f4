//! Ingestion batcher: drives synthesize -> embed -> upsert per record.
//!
//! Records are processed in contiguous batches purely to bound progress
//! reporting granularity; batch boundaries carry no semantics. One record's
//! failure never aborts its batch or the run. Only run-level problems (a
//! zero batch size, store connection establishment handled by the caller)
//! surface as errors from [`Ingestor::ingest`].

use std::io::{self, Write};

use anyhow::Result;
use serde::Serialize;

use crate::embedder::Embedder;
use crate::error::ItemError;
use crate::product::ProductRecord;
use crate::store::ProductStore;

/// Final tally for one ingestion run.
///
/// Every attempted record ends in exactly one of `stored`, `skipped`, or
/// `failed`; `embedded` counts records that obtained a vector, whether or
/// not the subsequent upsert succeeded.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IngestionReport {
    /// Records seen.
    pub attempted: usize,
    /// Records that obtained a non-empty embedding vector.
    pub embedded: usize,
    /// Records upserted into the store.
    pub stored: usize,
    /// Records with no synthesizable text, skipped before embedding.
    pub skipped: usize,
    /// Records dropped by a per-record embedding, dimension, or store
    /// failure.
    pub failed: usize,
}

/// Sequential ingestion pipeline over an embedder and a product store.
pub struct Ingestor<E, S> {
    embedder: E,
    store: S,
    dims: Option<usize>,
}

impl<E: Embedder, S: ProductStore> Ingestor<E, S> {
    /// Builds an ingestor; the embedding dimension is pinned by the first
    /// successful embedding unless set via [`Ingestor::with_dimensions`].
    pub fn new(embedder: E, store: S) -> Self {
        Self {
            embedder,
            store,
            dims: None,
        }
    }

    /// Pins the expected embedding dimension up front.
    pub fn with_dimensions(mut self, dims: usize) -> Self {
        self.dims = Some(dims);
        self
    }

    /// Ingests all records in contiguous batches of `batch_size`.
    ///
    /// Per-record failures are folded into the report and logged; they
    /// never propagate. A zero `batch_size` is a configuration error and
    /// fails before any processing.
    pub fn ingest(
        &mut self,
        records: &[ProductRecord],
        batch_size: usize,
    ) -> Result<IngestionReport> {
        anyhow::ensure!(batch_size > 0, "batch size must be positive");
        let mut report = IngestionReport::default();
        let total = records.len();
        for batch in records.chunks(batch_size) {
            for record in batch {
                report.attempted += 1;
                self.ingest_one(record, &mut report);
            }
            render_progress(&report, total);
        }
        if total > 0 {
            eprintln!();
        }
        Ok(report)
    }

    fn ingest_one(&mut self, record: &ProductRecord, report: &mut IngestionReport) {
        let text = record.searchable_text();
        if text.is_empty() {
            report.skipped += 1;
            return;
        }
        let vector = match self.embedder.embed(&text) {
            Ok(vector) if vector.is_empty() => {
                report.failed += 1;
                eprintln!(
                    "embedding failed for product {}: provider returned an empty vector",
                    record.id
                );
                return;
            }
            Ok(vector) => vector,
            Err(err) => {
                report.failed += 1;
                eprintln!("embedding failed for product {}: {err}", record.id);
                return;
            }
        };
        report.embedded += 1;
        match self.dims {
            None => self.dims = Some(vector.len()),
            Some(dims) if dims != vector.len() => {
                report.failed += 1;
                let err = ItemError::Data(format!(
                    "product {} embedding has {} dimensions, run expects {dims}",
                    record.id,
                    vector.len()
                ));
                eprintln!("{err}");
                return;
            }
            Some(_) => {}
        }
        match self.store.upsert(record, &vector) {
            Ok(()) => report.stored += 1,
            Err(err) => {
                report.failed += 1;
                eprintln!("store upsert failed for product {}: {err}", record.id);
            }
        }
    }
}

fn render_progress(report: &IngestionReport, total: usize) {
    if total == 0 {
        return;
    }
    eprint!(
        "\rIngesting {}/{} ({} stored, {} skipped, {} failed)...",
        report.attempted, total, report.stored, report.skipped, report.failed
    );
    let _ = io::stderr().flush();
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    struct FakeEmbedder {
        dims: usize,
        /// Texts whose embedding call should fail.
        poisoned: Vec<String>,
        /// Texts that should come back with a wrong-sized vector.
        misdimensioned: Vec<String>,
    }

    impl FakeEmbedder {
        fn new(dims: usize) -> Self {
            Self {
                dims,
                poisoned: Vec::new(),
                misdimensioned: Vec::new(),
            }
        }
    }

    impl Embedder for FakeEmbedder {
        fn embed(&self, text: &str) -> Result<Vec<f32>, ItemError> {
            if self.poisoned.iter().any(|t| t == text) {
                return Err(ItemError::Transient("embedding service timeout".into()));
            }
            let dims = if self.misdimensioned.iter().any(|t| t == text) {
                self.dims + 1
            } else {
                self.dims
            };
            Ok(vec![0.5; dims])
        }
    }

    #[derive(Default)]
    struct MemoryStore {
        rows: HashMap<String, (ProductRecord, Vec<f32>)>,
        upserts: usize,
        /// Ids whose upsert should fail.
        rejected: Vec<String>,
    }

    impl ProductStore for MemoryStore {
        fn upsert(&mut self, record: &ProductRecord, embedding: &[f32]) -> Result<(), ItemError> {
            if self.rejected.iter().any(|id| id == &record.id) {
                return Err(ItemError::Transient("connection reset".into()));
            }
            self.upserts += 1;
            self.rows
                .insert(record.id.clone(), (record.clone(), embedding.to_vec()));
            Ok(())
        }
    }

    fn product(id: &str, title: Option<&str>) -> ProductRecord {
        ProductRecord {
            id: id.to_string(),
            title: title.map(str::to_string),
            description: None,
            category: None,
            brand: None,
            price: None,
            unit_price: None,
            rating: None,
            review_count: None,
            ranking: None,
            votes: None,
            image_url: None,
            source_url: None,
        }
    }

    #[test]
    fn textless_records_are_skipped_before_embedding() {
        let mut ingestor = Ingestor::new(FakeEmbedder::new(4), MemoryStore::default());
        let records = vec![product("B1", None), product("B2", Some("Kettle"))];
        let report = ingestor.ingest(&records, 10).unwrap();
        assert_eq!(
            report,
            IngestionReport {
                attempted: 2,
                embedded: 1,
                stored: 1,
                skipped: 1,
                failed: 0,
            }
        );
        assert!(!ingestor.store.rows.contains_key("B1"));
    }

    #[test]
    fn one_failure_never_aborts_the_batch() {
        let mut embedder = FakeEmbedder::new(4);
        embedder.poisoned.push("Broken".to_string());
        let mut ingestor = Ingestor::new(embedder, MemoryStore::default());
        let records = vec![
            product("B1", Some("Broken")),
            product("B2", Some("Kettle")),
            product("B3", Some("Mug")),
        ];
        let report = ingestor.ingest(&records, 2).unwrap();
        assert_eq!(report.failed, 1);
        assert_eq!(report.stored, 2);
        assert_eq!(ingestor.store.rows.len(), 2);
    }

    #[test]
    fn store_rejection_fails_only_that_record() {
        let mut store = MemoryStore::default();
        store.rejected.push("B2".to_string());
        let mut ingestor = Ingestor::new(FakeEmbedder::new(4), store);
        let records = vec![product("B1", Some("Kettle")), product("B2", Some("Mug"))];
        let report = ingestor.ingest(&records, 10).unwrap();
        assert_eq!(report.embedded, 2);
        assert_eq!(report.stored, 1);
        assert_eq!(report.failed, 1);
    }

    #[test]
    fn reingesting_the_same_id_replaces_not_duplicates() {
        let mut ingestor = Ingestor::new(FakeEmbedder::new(4), MemoryStore::default());
        let records = vec![product("B1", Some("Kettle"))];
        let first = ingestor.ingest(&records, 10).unwrap();
        let second = ingestor.ingest(&records, 10).unwrap();
        assert_eq!(first.stored, 1);
        assert_eq!(second.stored, 1);
        assert_eq!(ingestor.store.upserts, 2);
        assert_eq!(ingestor.store.rows.len(), 1);
    }

    #[test]
    fn dimension_mismatch_is_a_per_record_failure() {
        let mut embedder = FakeEmbedder::new(4);
        embedder.misdimensioned.push("Odd one".to_string());
        let mut ingestor = Ingestor::new(embedder, MemoryStore::default()).with_dimensions(4);
        let records = vec![product("B1", Some("Odd one")), product("B2", Some("Mug"))];
        let report = ingestor.ingest(&records, 10).unwrap();
        assert_eq!(report.embedded, 2);
        assert_eq!(report.failed, 1);
        assert_eq!(report.stored, 1);
        assert!(!ingestor.store.rows.contains_key("B1"));
    }

    #[test]
    fn first_embedding_pins_the_run_dimension() {
        let mut embedder = FakeEmbedder::new(4);
        embedder.misdimensioned.push("Bigger".to_string());
        let mut ingestor = Ingestor::new(embedder, MemoryStore::default());
        let records = vec![product("B1", Some("Mug")), product("B2", Some("Bigger"))];
        let report = ingestor.ingest(&records, 10).unwrap();
        assert_eq!(report.stored, 1);
        assert_eq!(report.failed, 1);
    }

    #[test]
    fn zero_batch_size_is_a_configuration_error() {
        let mut ingestor = Ingestor::new(FakeEmbedder::new(4), MemoryStore::default());
        assert!(ingestor.ingest(&[product("B1", Some("Mug"))], 0).is_err());
    }

    #[test]
    fn last_batch_may_be_smaller() {
        let mut ingestor = Ingestor::new(FakeEmbedder::new(4), MemoryStore::default());
        let records: Vec<ProductRecord> = (0..5)
            .map(|i| product(&format!("B{i}"), Some("Mug")))
            .collect();
        let report = ingestor.ingest(&records, 2).unwrap();
        assert_eq!(report.attempted, 5);
        assert_eq!(report.stored, 5);
    }
}
