//! pgvector-backed Postgres product store.
//!
//! One row per product id. The vector column is sized from the first
//! upserted embedding; later vectors must match that dimension. The store
//! drives its async client through an owned tokio runtime so the ingestion
//! loop stays a plain sequential workflow.

use anyhow::{Context, Result};
use pgvector::Vector;
use tokio::runtime::Runtime;
use tokio_postgres::{Client, NoTls, Statement};

use crate::error::ItemError;
use crate::product::ProductRecord;
use crate::store::{ProductStore, TableName};

/// Connection and table parameters for [`PostgresStore`].
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Postgres connection string (`postgres://...`).
    pub database_url: String,
    /// Target schema.
    pub schema: String,
    /// Target table inside the schema.
    pub table: String,
    /// Create the vector extension and table automatically if missing.
    pub prepare_table: bool,
}

/// Product store writing to a pgvector table keyed by `product_id`.
pub struct PostgresStore {
    runtime: Runtime,
    client: Client,
    table: TableName,
    prepare_table: bool,
    upsert_stmt: Option<Statement>,
    dims: Option<usize>,
}

impl PostgresStore {
    /// Connects to Postgres and spawns the connection driver.
    ///
    /// Connection establishment failures are run-fatal; per-row failures
    /// later are not.
    pub fn connect(config: &StoreConfig) -> Result<Self> {
        let table = TableName::new(config.schema.clone(), config.table.clone())?;
        let runtime = Runtime::new().context("failed to start tokio runtime")?;
        let (client, connection) = runtime
            .block_on(tokio_postgres::connect(&config.database_url, NoTls))
            .with_context(|| {
                format!("failed to connect to Postgres at {}", config.database_url)
            })?;
        runtime.spawn(async move {
            if let Err(err) = connection.await {
                eprintln!("postgres connection error: {err}");
            }
        });
        Ok(Self {
            runtime,
            client,
            table,
            prepare_table: config.prepare_table,
            upsert_stmt: None,
            dims: None,
        })
    }

    /// Pins the vector dimension and prepares the table and statement.
    fn prepare(&mut self, dims: usize) -> Result<(), ItemError> {
        if self.prepare_table {
            self.execute_simple("CREATE EXTENSION IF NOT EXISTS vector")?;
            let ddl = create_table_sql(&self.table, dims);
            self.execute_simple(&ddl)?;
        }
        let sql = upsert_sql(&self.table);
        let statement = self
            .runtime
            .block_on(self.client.prepare(&sql))
            .map_err(|err| ItemError::Transient(format!("failed to prepare upsert: {err}")))?;
        self.upsert_stmt = Some(statement);
        self.dims = Some(dims);
        Ok(())
    }

    fn execute_simple(&mut self, sql: &str) -> Result<(), ItemError> {
        self.runtime
            .block_on(self.client.execute(sql, &[]))
            .map(|_| ())
            .map_err(|err| ItemError::Transient(format!("store preparation failed: {err}")))
    }
}

impl ProductStore for PostgresStore {
    fn upsert(&mut self, record: &ProductRecord, embedding: &[f32]) -> Result<(), ItemError> {
        if embedding.is_empty() {
            return Err(ItemError::Data(format!(
                "product {} has an empty embedding vector",
                record.id
            )));
        }
        match self.dims {
            None => self.prepare(embedding.len())?,
            Some(dims) if dims != embedding.len() => {
                return Err(ItemError::Data(format!(
                    "product {} embedding has {} dimensions, index expects {}",
                    record.id,
                    embedding.len(),
                    dims
                )));
            }
            Some(_) => {}
        }
        let statement = match self.upsert_stmt.clone() {
            Some(statement) => statement,
            None => {
                return Err(ItemError::Data(
                    "store statement missing after preparation".to_string(),
                ))
            }
        };
        let vector = Vector::from(embedding.to_vec());
        self.runtime
            .block_on(self.client.execute(
                &statement,
                &[
                    &record.id,
                    &record.title,
                    &record.description,
                    &record.category,
                    &record.brand,
                    &record.price,
                    &record.unit_price,
                    &record.rating,
                    &record.review_count,
                    &record.ranking,
                    &record.votes,
                    &record.image_url,
                    &record.source_url,
                    &vector,
                ],
            ))
            .map(|_| ())
            .map_err(|err| {
                ItemError::Transient(format!("failed to upsert product {}: {err}", record.id))
            })
    }
}

fn create_table_sql(table: &TableName, dims: usize) -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS {} (
            product_id TEXT PRIMARY KEY,
            title TEXT,
            description TEXT,
            category TEXT,
            brand TEXT,
            price DOUBLE PRECISION,
            unit_price DOUBLE PRECISION,
            rating DOUBLE PRECISION,
            review_count BIGINT,
            ranking BIGINT,
            votes BIGINT,
            image_url TEXT,
            source_url TEXT,
            embedding VECTOR({dims}) NOT NULL,
            updated_at TIMESTAMPTZ NOT NULL DEFAULT CURRENT_TIMESTAMP
        )",
        table.qualified()
    )
}

fn upsert_sql(table: &TableName) -> String {
    format!(
        "INSERT INTO {} \
            (product_id, title, description, category, brand, price, unit_price, rating, \
             review_count, ranking, votes, image_url, source_url, embedding) \
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14) \
            ON CONFLICT (product_id) DO UPDATE SET \
                title = EXCLUDED.title, \
                description = EXCLUDED.description, \
                category = EXCLUDED.category, \
                brand = EXCLUDED.brand, \
                price = EXCLUDED.price, \
                unit_price = EXCLUDED.unit_price, \
                rating = EXCLUDED.rating, \
                review_count = EXCLUDED.review_count, \
                ranking = EXCLUDED.ranking, \
                votes = EXCLUDED.votes, \
                image_url = EXCLUDED.image_url, \
                source_url = EXCLUDED.source_url, \
                embedding = EXCLUDED.embedding, \
                updated_at = CURRENT_TIMESTAMP",
        table.qualified()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upsert_sql_replaces_on_conflict_and_refreshes_timestamp() {
        let table = TableName::new("public", "products").unwrap();
        let sql = upsert_sql(&table);
        assert!(sql.contains("ON CONFLICT (product_id) DO UPDATE SET"));
        assert!(sql.contains("updated_at = CURRENT_TIMESTAMP"));
        assert!(sql.contains("embedding = EXCLUDED.embedding"));
    }

    #[test]
    fn create_table_sql_sizes_vector_column() {
        let table = TableName::new("public", "products").unwrap();
        let ddl = create_table_sql(&table, 384);
        assert!(ddl.contains("embedding VECTOR(384) NOT NULL"));
        assert!(ddl.contains("product_id TEXT PRIMARY KEY"));
    }
}
