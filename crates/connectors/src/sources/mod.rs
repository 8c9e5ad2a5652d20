//! Warehouse capabilities.
//!
//! The query layer never talks to a warehouse directly. It needs two narrow
//! capabilities, each expressed as a trait so tests can substitute fakes:
//!
//! | Trait | Used for |
//! |-------|----------|
//! | `QueryExecutor`  | Running a parameterized statement and collecting every row |
//! | `MetadataSource` | Table schemas, dataset and table listings |
//!
//! `BigQueryWarehouse` implements both over the BigQuery REST API.

use anyhow::Result;
use async_trait::async_trait;
use querydeck_common::models::{BoundParams, Row, SchemaField};

pub mod bigquery;

#[async_trait]
pub trait QueryExecutor: Send + Sync {
    /// Runs `sql` with named parameters and returns all rows, in warehouse
    /// order, with values already converted to JSON.
    async fn execute_query(
        &self,
        sql: &str,
        params: &BoundParams,
        location: Option<&str>,
    ) -> Result<Vec<Row>>;
}

#[async_trait]
pub trait MetadataSource: Send + Sync {
    /// Top-level columns of `dataset.table`.
    async fn table_schema(&self, dataset: &str, table: &str) -> Result<Vec<SchemaField>>;

    async fn list_datasets(&self) -> Result<Vec<String>>;

    async fn list_tables(&self, dataset: &str) -> Result<Vec<String>>;
}
