// parity-core/src/ports/connector.rs

// What the engine needs from a relational store, without knowing which one.
// Checks are written only against these two traits.

use crate::error::ParityError;
use async_trait::async_trait;
use serde_json::{Map, Value};

/// One result row: column name -> value.
pub type Row = Map<String, Value>;

/// A single live connection to a store.
#[async_trait]
pub trait Connector: Send + Sync {
    /// First column of the first row, `Value::Null` when the query yields nothing.
    async fn scalar(&self, query: &str) -> Result<Value, ParityError>;

    async fn rows(&self, query: &str) -> Result<Vec<Row>, ParityError>;

    /// Non-returning statements. Never used by the checks themselves.
    async fn execute(&self, statement: &str) -> Result<(), ParityError>;

    /// Cheap row-count estimate from catalog metadata, no table scan.
    /// `None` when the store keeps no estimate for this table.
    async fn estimate_row_count(&self, table: &str) -> Result<Option<u64>, ParityError>;

    fn engine_name(&self) -> &str;
}

/// Opens physical connections. One call is one attempt: retrying is the pool's job.
#[async_trait]
pub trait StoreDriver: Send + Sync {
    async fn open(&self) -> Result<Box<dyn Connector>, ParityError>;

    fn engine_name(&self) -> &str;
}
