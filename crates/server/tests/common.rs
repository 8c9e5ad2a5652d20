#![allow(dead_code)]

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use querydeck_common::config::{QueryDefaults, ResultCacheConfig, SchemaCacheConfig};
use querydeck_common::models::{BoundParams, FieldType, Row, SchemaField};
use querydeck_connectors::{MetadataSource, QueryExecutor};
use querydeck_runtime::{QueryCatalog, QueryEngine, QueryEngineOptions};
use querydeck_server::{create_router, AppState};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tower::ServiceExt;

/// Warehouse with one product table that returns a single row per query.
#[derive(Default)]
pub struct StubWarehouse {
    pub executions: AtomicUsize,
    pub fail_execution: AtomicBool,
    pub fail_metadata: AtomicBool,
}

#[async_trait]
impl QueryExecutor for StubWarehouse {
    async fn execute_query(
        &self,
        _sql: &str,
        _params: &BoundParams,
        _location: Option<&str>,
    ) -> anyhow::Result<Vec<Row>> {
        self.executions.fetch_add(1, Ordering::SeqCst);
        if self.fail_execution.load(Ordering::SeqCst) {
            anyhow::bail!("Query error: Unrecognized name: bogus");
        }
        let Value::Object(row) = json!({"sku": "ABC-1", "total_sales": 42.0}) else {
            unreachable!()
        };
        Ok(vec![row])
    }
}

#[async_trait]
impl MetadataSource for StubWarehouse {
    async fn table_schema(&self, _dataset: &str, _table: &str) -> anyhow::Result<Vec<SchemaField>> {
        if self.fail_metadata.load(Ordering::SeqCst) {
            anyhow::bail!("Access Denied");
        }
        Ok(vec![
            SchemaField::new("sku", FieldType::String),
            SchemaField::new("total_sales", FieldType::Float64),
        ])
    }

    async fn list_datasets(&self) -> anyhow::Result<Vec<String>> {
        if self.fail_metadata.load(Ordering::SeqCst) {
            anyhow::bail!("Access Denied");
        }
        Ok(vec!["intentwise_ecommerce_graph".to_string()])
    }

    async fn list_tables(&self, _dataset: &str) -> anyhow::Result<Vec<String>> {
        Ok(vec!["product_summary".to_string()])
    }
}

pub fn app(warehouse: &Arc<StubWarehouse>) -> Router {
    let engine = QueryEngine::new(QueryEngineOptions {
        catalog: QueryCatalog::builtin().unwrap(),
        executor: warehouse.clone(),
        metadata: warehouse.clone(),
        cache: ResultCacheConfig::default(),
        schema_cache: SchemaCacheConfig::default(),
        defaults: QueryDefaults::default(),
        location: None,
        clock: None,
    });
    create_router(AppState::new(Arc::new(engine)).unwrap())
}

pub struct TestResponse {
    pub status: StatusCode,
    pub cache: Option<String>,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

impl TestResponse {
    pub fn json(&self) -> Value {
        serde_json::from_slice(&self.body).unwrap()
    }

    pub fn text(&self) -> String {
        String::from_utf8(self.body.clone()).unwrap()
    }
}

pub async fn get(app: &Router, uri: &str) -> TestResponse {
    let response = app
        .clone()
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();

    let header = |name: &str| {
        response
            .headers()
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(String::from)
    };
    let status = response.status();
    let cache = header("x-querydeck-cache");
    let content_type = header("content-type");
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap()
        .to_vec();

    TestResponse {
        status,
        cache,
        content_type,
        body,
    }
}
