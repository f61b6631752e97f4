use std::fs::File;
use std::io::{BufReader, Read};
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use serde_json::{Map, Value};
use shelfsearch::{HttpEmbedder, Ingestor, PostgresStore, ProductRecord, StoreConfig};

#[derive(Parser, Debug)]
#[command(
    name = "shelfsearch-ingest",
    about = "Embed product records and upsert them into a pgvector-backed index"
)]
struct IngestCli {
    /// Product data file: JSONL (one object per line) or a JSON array
    #[arg(
        long,
        env = "SHELFSEARCH_DATA_FILE",
        default_value = "data/amazon_products.json"
    )]
    input: PathBuf,

    /// Embedding service endpoint
    #[arg(
        long,
        env = "EMBEDDING_SERVICE_URL",
        default_value = "http://localhost:8080/embed"
    )]
    embedding_url: String,

    /// Postgres connection string (postgres://...)
    #[arg(long, env = "DATABASE_URL")]
    database_url: String,

    /// Target schema for the product table
    #[arg(long, env = "SHELFSEARCH_SCHEMA", default_value = "public")]
    schema: String,

    /// Target table inside the schema
    #[arg(long, env = "SHELFSEARCH_TABLE", default_value = "products")]
    table: String,

    /// Records per ingestion batch
    #[arg(long, env = "SHELFSEARCH_BATCH", default_value_t = 100)]
    batch_size: usize,

    /// Max seconds to wait for each embedding request
    #[arg(long, env = "SHELFSEARCH_EMBED_TIMEOUT_SECS", default_value_t = 30)]
    embed_timeout_secs: u64,

    /// Expected embedding dimension (pinned from the first vector if unset)
    #[arg(long, env = "SHELFSEARCH_DIMENSIONS")]
    dimensions: Option<usize>,

    /// Create the vector extension/table automatically if missing
    #[arg(long, env = "SHELFSEARCH_PREPARE_TABLE", default_value_t = true)]
    prepare_table: bool,
}

fn main() -> Result<()> {
    let cli = IngestCli::parse();
    let records = load_products(&cli.input)?;
    anyhow::ensure!(!records.is_empty(), "product file contains no usable records");
    println!("Loaded {} products from {:?}", records.len(), cli.input);

    let embedder = HttpEmbedder::new(
        cli.embedding_url,
        Duration::from_secs(cli.embed_timeout_secs.max(1)),
    )?;
    let store = PostgresStore::connect(&StoreConfig {
        database_url: cli.database_url,
        schema: cli.schema,
        table: cli.table,
        prepare_table: cli.prepare_table,
    })?;

    let mut ingestor = Ingestor::new(embedder, store);
    if let Some(dims) = cli.dimensions {
        ingestor = ingestor.with_dimensions(dims);
    }
    let report = ingestor.ingest(&records, cli.batch_size.max(1))?;

    println!("Ingestion complete.");
    println!("  attempted: {}", report.attempted);
    println!("  embedded:  {}", report.embedded);
    println!("  stored:    {}", report.stored);
    println!("  skipped:   {}", report.skipped);
    println!("  failed:    {}", report.failed);
    Ok(())
}

/// Loads and resolves product records from a JSONL or JSON-array file.
///
/// Unparseable lines and rows without a resolvable id are logged and
/// dropped here, before the batcher runs.
fn load_products(path: &PathBuf) -> Result<Vec<ProductRecord>> {
    let file =
        File::open(path).with_context(|| format!("failed to open product file {:?}", path))?;
    let mut body = String::new();
    BufReader::new(file)
        .read_to_string(&mut body)
        .with_context(|| format!("failed to read product file {:?}", path))?;

    let mut records = Vec::new();
    let mut rejected = 0usize;
    if body.trim_start().starts_with('[') {
        let entries: Vec<Value> = serde_json::from_str(&body)
            .with_context(|| format!("product file {:?} is not a valid JSON array", path))?;
        for entry in entries {
            collect_record(entry.as_object(), &mut records, &mut rejected);
        }
    } else {
        for (line_no, line) in body.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<Map<String, Value>>(line) {
                Ok(raw) => collect_record(Some(&raw), &mut records, &mut rejected),
                Err(err) => {
                    rejected += 1;
                    eprintln!("skipping unparseable product line {}: {err}", line_no + 1);
                }
            }
        }
    }
    if rejected > 0 {
        eprintln!("dropped {rejected} unusable rows while loading {:?}", path);
    }
    Ok(records)
}

fn collect_record(
    raw: Option<&Map<String, Value>>,
    records: &mut Vec<ProductRecord>,
    rejected: &mut usize,
) {
    match raw.and_then(ProductRecord::from_raw) {
        Some(record) => records.push(record),
        None => {
            *rejected += 1;
            eprintln!("skipping product row without a resolvable id");
        }
    }
}
