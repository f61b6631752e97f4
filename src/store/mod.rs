//! Product store seam and shared Postgres identifier helpers.

use anyhow::Result;

use crate::error::ItemError;
use crate::product::ProductRecord;

pub mod postgres;

pub use postgres::{PostgresStore, StoreConfig};

/// Destination for embedded product records.
///
/// Upsert is keyed by the product id: inserting an id that already exists
/// replaces all mutable fields and refreshes the store-owned `updated_at`
/// timestamp, never duplicating a row. One call covers exactly one record;
/// there is no cross-record transaction.
pub trait ProductStore {
    /// Inserts or replaces one record together with its embedding.
    fn upsert(&mut self, record: &ProductRecord, embedding: &[f32]) -> Result<(), ItemError>;
}

/// Fully-qualified Postgres table name (schema + table).
#[derive(Debug, Clone)]
pub struct TableName {
    schema: String,
    table: String,
}

impl TableName {
    /// Builds a new table identifier.
    pub fn new<S, T>(schema: S, table: T) -> Result<Self>
    where
        S: Into<String>,
        T: Into<String>,
    {
        let schema = schema.into();
        let table = table.into();
        anyhow::ensure!(!schema.trim().is_empty(), "schema name is required");
        anyhow::ensure!(!table.trim().is_empty(), "table name is required");
        Ok(Self { schema, table })
    }

    /// Fully-qualified table reference with quoted identifiers.
    pub fn qualified(&self) -> String {
        format!("{}.{}", quote_ident(&self.schema), quote_ident(&self.table))
    }
}

/// Quotes Postgres identifiers, escaping embedded quotes.
pub fn quote_ident(input: &str) -> String {
    let escaped = input.replace('"', "\"\"");
    format!("\"{}\"", escaped)
}
