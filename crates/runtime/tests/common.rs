#![allow(dead_code)]

use async_trait::async_trait;
use querydeck_common::config::{QueryDefaults, ResultCacheConfig, SchemaCacheConfig};
use querydeck_common::models::{BoundParams, FieldType, Row, SchemaField};
use querydeck_connectors::{MetadataSource, QueryExecutor};
use querydeck_runtime::{Clock, QueryCatalog, QueryEngine, QueryEngineOptions, RawParams};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone)]
pub struct Execution {
    pub sql: String,
    pub params: BoundParams,
    pub location: Option<String>,
}

/// In-memory warehouse that records every call.
#[derive(Default)]
pub struct FakeWarehouse {
    schemas: Mutex<HashMap<String, Vec<SchemaField>>>,
    rows: Mutex<Vec<Row>>,
    pub executions: Mutex<Vec<Execution>>,
    pub schema_calls: Mutex<Vec<String>>,
    pub fail_execution: AtomicBool,
    pub fail_schema: AtomicBool,
}

impl FakeWarehouse {
    pub fn new() -> Arc<Self> {
        let fake = Self::default();
        fake.set_schema(
            "intentwise_ecommerce_graph.product_summary",
            vec![
                SchemaField::new("sku", FieldType::String),
                SchemaField::new("product", FieldType::String),
                SchemaField::new("total_sales", FieldType::Float64),
                SchemaField::new("units", FieldType::Int64),
                SchemaField::new("report_date", FieldType::Date),
                SchemaField::new("account_id", FieldType::Int64),
            ],
        );
        Arc::new(fake)
    }

    pub fn set_schema(&self, table_id: &str, fields: Vec<SchemaField>) {
        self.schemas
            .lock()
            .unwrap()
            .insert(table_id.to_string(), fields);
    }

    pub fn set_rows(&self, rows: Vec<Value>) {
        *self.rows.lock().unwrap() = rows
            .into_iter()
            .map(|row| match row {
                Value::Object(map) => map,
                other => panic!("row must be an object: {}", other),
            })
            .collect();
    }

    pub fn execution_count(&self) -> usize {
        self.executions.lock().unwrap().len()
    }

    pub fn last_execution(&self) -> Execution {
        self.executions
            .lock()
            .unwrap()
            .last()
            .cloned()
            .expect("no statement executed")
    }
}

#[async_trait]
impl QueryExecutor for FakeWarehouse {
    async fn execute_query(
        &self,
        sql: &str,
        params: &BoundParams,
        location: Option<&str>,
    ) -> anyhow::Result<Vec<Row>> {
        self.executions.lock().unwrap().push(Execution {
            sql: sql.to_string(),
            params: params.clone(),
            location: location.map(String::from),
        });
        if self.fail_execution.load(Ordering::SeqCst) {
            anyhow::bail!("Query error: Resources exceeded during query execution");
        }
        Ok(self.rows.lock().unwrap().clone())
    }
}

#[async_trait]
impl MetadataSource for FakeWarehouse {
    async fn table_schema(&self, dataset: &str, table: &str) -> anyhow::Result<Vec<SchemaField>> {
        let table_id = format!("{}.{}", dataset, table);
        self.schema_calls.lock().unwrap().push(table_id.clone());
        if self.fail_schema.load(Ordering::SeqCst) {
            anyhow::bail!("Not found: Table {}", table_id);
        }
        Ok(self
            .schemas
            .lock()
            .unwrap()
            .get(&table_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn list_datasets(&self) -> anyhow::Result<Vec<String>> {
        let mut datasets: Vec<String> = self
            .schemas
            .lock()
            .unwrap()
            .keys()
            .filter_map(|id| id.split_once('.').map(|(d, _)| d.to_string()))
            .collect();
        datasets.sort();
        datasets.dedup();
        Ok(datasets)
    }

    async fn list_tables(&self, dataset: &str) -> anyhow::Result<Vec<String>> {
        let mut tables: Vec<String> = self
            .schemas
            .lock()
            .unwrap()
            .keys()
            .filter_map(|id| id.split_once('.'))
            .filter(|(d, _)| *d == dataset)
            .map(|(_, t)| t.to_string())
            .collect();
        tables.sort();
        Ok(tables)
    }
}

pub fn engine(fake: &Arc<FakeWarehouse>, clock: Option<Arc<dyn Clock>>) -> QueryEngine {
    QueryEngine::new(QueryEngineOptions {
        catalog: QueryCatalog::builtin().unwrap(),
        executor: fake.clone(),
        metadata: fake.clone(),
        cache: ResultCacheConfig::default(),
        schema_cache: SchemaCacheConfig::default(),
        defaults: QueryDefaults::default(),
        location: Some("US".to_string()),
        clock,
    })
}

pub fn params(pairs: &[(&str, &str)]) -> RawParams {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

/// The base request used by the product scenarios.
pub fn product_request(extra: &[(&str, &str)]) -> RawParams {
    let mut raw = params(&[
        ("queryName", "productBySales"),
        ("startDate", "2025-10-01"),
        ("endDate", "2025-10-10"),
        ("account_id", "1229370"),
    ]);
    raw.extend(params(extra));
    raw
}
