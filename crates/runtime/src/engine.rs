//! Request orchestration.
//!
//! `QueryEngine::execute` drives one request through its lifecycle:
//!
//! 1. **Scope**: `account_id` must be present and integral.
//! 2. **Cache**: the fingerprint of the effective parameters is looked up in
//!    the result cache; a hit returns immediately.
//! 3. **Lookup**: the logical name is resolved against the catalog.
//! 4. **Compile**: composites are unioned; fixed queries resolve their table
//!    schema, compile caller filters and render the template.
//! 5. **Execute**: the warehouse runs the statement with named parameters.
//! 6. **Decode**: composite rows are folded into `{member: rows}`.
//! 7. **Store**: the result is cached under the fingerprint from step 2.
//!
//! Failures after step 2 are returned as typed errors and never cached.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use querydeck_common::config::{QueryDefaults, ResultCacheConfig, SchemaCacheConfig};
use querydeck_common::models::{BoundParams, ParamValue, SchemaField};
use querydeck_common::scrubber::scrub_params;
use querydeck_connectors::{BigQueryError, MetadataSource, QueryExecutor};
use querydeck_error::{ErrorCode, ErrorContext, QueryDeckError, Result};
use querydeck_sql::{
    build_composite, compile, decode_composite, render, ClauseRequest, SlotValues, TableRef,
    TailOverrides, Template,
};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, error, info};

use crate::cache::{Clock, ResultCache, SystemClock};
use crate::catalog::{QueryCatalog, QueryDefinition};
use crate::fingerprint::fingerprint;
use crate::request::{EffectiveRequest, RawParams, ACCOUNT_ID, END_DATE, START_DATE};
use crate::schema::{SchemaCacheStats, SchemaResolver};

/// Tenant predicate placed in every slot that scopes a query.
pub const SCOPE_CLAUSE: &str = "AND account_id = @account_id";

pub struct QueryEngineOptions {
    pub catalog: QueryCatalog,
    pub executor: Arc<dyn QueryExecutor>,
    pub metadata: Arc<dyn MetadataSource>,
    pub cache: ResultCacheConfig,
    pub schema_cache: SchemaCacheConfig,
    pub defaults: QueryDefaults,
    /// Processing location forwarded with every statement.
    pub location: Option<String>,
    /// Defaults to the system clock.
    pub clock: Option<Arc<dyn Clock>>,
}

pub struct QueryEngine {
    catalog: Arc<QueryCatalog>,
    executor: Arc<dyn QueryExecutor>,
    metadata: Arc<dyn MetadataSource>,
    schemas: SchemaResolver,
    /// `None` when result caching is disabled.
    results: Option<ResultCache>,
    defaults: QueryDefaults,
    location: Option<String>,
    active_queries: Arc<AtomicUsize>,
}

/// A query result and whether it came from the result cache.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExecutionOutcome {
    pub result: Value,
    pub cache_hit: bool,
}

/// Everything that would be sent to the warehouse for a request.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompiledQuery {
    pub query_name: String,
    pub sql: String,
    pub params: BoundParams,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub table: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub composite_members: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableDescription {
    pub table: String,
    pub columns: Vec<SchemaField>,
}

struct ActiveQueryGuard(Arc<AtomicUsize>);

impl ActiveQueryGuard {
    fn enter(counter: &Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::Relaxed);
        Self(counter.clone())
    }
}

impl Drop for ActiveQueryGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::Relaxed);
    }
}

impl QueryEngine {
    pub fn new(options: QueryEngineOptions) -> Self {
        let clock = options
            .clock
            .unwrap_or_else(|| Arc::new(SystemClock) as Arc<dyn Clock>);
        let results = options
            .cache
            .enabled
            .then(|| ResultCache::with_clock(&options.cache, clock));

        Self {
            catalog: Arc::new(options.catalog),
            schemas: SchemaResolver::new(options.metadata.clone(), &options.schema_cache),
            executor: options.executor,
            metadata: options.metadata,
            results,
            defaults: options.defaults,
            location: options.location,
            active_queries: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn catalog(&self) -> &QueryCatalog {
        &self.catalog
    }

    pub fn active_queries(&self) -> usize {
        self.active_queries.load(Ordering::Relaxed)
    }

    /// Number of stored results, expired or not.
    pub fn cached_results(&self) -> usize {
        self.results.as_ref().map_or(0, ResultCache::len)
    }

    pub async fn schema_stats(&self) -> SchemaCacheStats {
        self.schemas.stats().await
    }

    pub async fn invalidate_schema(&self, table_id: &str) {
        self.schemas.invalidate(table_id).await;
    }

    pub async fn execute(&self, query_name: &str, raw: &RawParams) -> Result<ExecutionOutcome> {
        let _guard = ActiveQueryGuard::enter(&self.active_queries);
        let start = Instant::now();

        let result = self.execute_with_cache(query_name, raw, start).await;
        if let Err(e) = &result {
            error!(
                target: "errors",
                query_name = %query_name,
                code = %e.code,
                duration_ms = start.elapsed().as_millis() as u64,
                "{}",
                e
            );
        }
        result
    }

    async fn execute_with_cache(
        &self,
        query_name: &str,
        raw: &RawParams,
        start: Instant,
    ) -> Result<ExecutionOutcome> {
        let request = EffectiveRequest::from_raw(query_name, raw, &self.defaults)?;
        let key = fingerprint(&request.query_name, &request.params);

        if let Some(value) = self.results.as_ref().and_then(|c| c.get(&key)) {
            info!(
                target: "queries",
                query_name = %request.query_name,
                account_id = request.account_id,
                duration_ms = start.elapsed().as_millis() as u64,
                rows_returned = count_rows(&value),
                cache_hit = true,
                success = true
            );
            return Ok(ExecutionOutcome {
                result: value,
                cache_hit: true,
            });
        }

        let compiled = self.compile(&request).await?;
        debug!(
            target: "queries",
            query_name = %compiled.query_name,
            sql = %compiled.sql,
            params = %scrub_params(&compiled.params),
            "Compiled query"
        );

        let rows = self
            .executor
            .execute_query(&compiled.sql, &compiled.params, self.location.as_deref())
            .await
            .map_err(|e| self.execution_failure(&compiled.query_name, e))?;

        let result = match &compiled.composite_members {
            Some(members) => {
                let members: Vec<&str> = members.iter().map(String::as_str).collect();
                let decoded = decode_composite(&members, &rows)
                    .map_err(|e| e.to_querydeck_error(&compiled.query_name))?;
                Value::Object(decoded)
            }
            None => Value::Array(rows.into_iter().map(Value::Object).collect()),
        };

        if let Some(cache) = &self.results {
            cache.put(key, result.clone(), None);
        }

        info!(
            target: "queries",
            query_name = %compiled.query_name,
            account_id = request.account_id,
            duration_ms = start.elapsed().as_millis() as u64,
            rows_returned = count_rows(&result),
            cache_hit = false,
            success = true
        );

        Ok(ExecutionOutcome {
            result,
            cache_hit: false,
        })
    }

    /// Compiles a request without executing it or touching the result cache.
    /// Table schemas are still resolved, and cached, for fixed queries.
    pub async fn explain(&self, query_name: &str, raw: &RawParams) -> Result<CompiledQuery> {
        let request = EffectiveRequest::from_raw(query_name, raw, &self.defaults)?;
        self.compile(&request).await
    }

    async fn compile(&self, request: &EffectiveRequest) -> Result<CompiledQuery> {
        let definition = self.catalog.lookup(&request.query_name)?;

        let mut params = BoundParams::new();
        params.insert(START_DATE.to_string(), ParamValue::from(request.start_date.as_str()));
        params.insert(END_DATE.to_string(), ParamValue::from(request.end_date.as_str()));
        params.insert(ACCOUNT_ID.to_string(), ParamValue::Int64(request.account_id));

        match definition {
            QueryDefinition::Composite(composite) => {
                let members: Vec<(&str, &Template)> = composite
                    .members
                    .iter()
                    .map(|m| (m.name.as_str(), &m.template))
                    .collect();
                let sql = build_composite(&composite.name, &members, SCOPE_CLAUSE)
                    .map_err(|e| e.to_querydeck_error(&composite.name))?;

                Ok(CompiledQuery {
                    query_name: composite.name.clone(),
                    sql,
                    params,
                    table: None,
                    composite_members: Some(
                        composite.member_names().into_iter().map(String::from).collect(),
                    ),
                })
            }
            QueryDefinition::Fixed(query) => {
                let table = TableRef::from_template(&query.template)
                    .map_err(|e| e.to_querydeck_error(&query.name))?;
                let fields = self
                    .schemas
                    .resolve(&table.to_string())
                    .await
                    .map_err(|e| with_query_name(e, &query.name))?;

                let clauses = compile(&ClauseRequest::from_raw(&request.params), &fields);
                let where_clause = clauses.scoped_where(SCOPE_CLAUSE);
                let slots = SlotValues {
                    where_clause: &where_clause,
                    account_id_clause: SCOPE_CLAUSE,
                };
                let sql = render(&query.template, &slots, TailOverrides::from(&clauses));

                params.extend(clauses.params.clone());
                params.extend(clauses.paging_params());

                Ok(CompiledQuery {
                    query_name: query.name.clone(),
                    sql,
                    params,
                    table: Some(table.to_string()),
                    composite_members: None,
                })
            }
        }
    }

    /// Dataset names visible to the configured project.
    pub async fn list_datasets(&self) -> Result<Vec<String>> {
        self.metadata
            .list_datasets()
            .await
            .map_err(|e| warehouse_error(ErrorCode::SchemaUnavailable, "datasets.list", None, e))
    }

    /// Every table in `dataset` with its columns. Schemas go through the
    /// schema cache.
    pub async fn describe_dataset(&self, dataset: &str) -> Result<Vec<TableDescription>> {
        let tables = self.metadata.list_tables(dataset).await.map_err(|e| {
            warehouse_error(
                ErrorCode::SchemaUnavailable,
                &format!("tables.list {}", dataset),
                None,
                e,
            )
        })?;

        let mut described = Vec::with_capacity(tables.len());
        for table in tables {
            let fields = self
                .schemas
                .resolve(&format!("{}.{}", dataset, table))
                .await?;
            described.push(TableDescription {
                table,
                columns: fields.as_ref().clone(),
            });
        }
        Ok(described)
    }

    fn execution_failure(&self, query_name: &str, e: anyhow::Error) -> QueryDeckError {
        warehouse_error(
            ErrorCode::ExecutionFailure,
            &format!("jobs.query {}", query_name),
            self.location.clone(),
            e,
        )
    }
}

fn warehouse_error(
    code: ErrorCode,
    operation: &str,
    location: Option<String>,
    e: anyhow::Error,
) -> QueryDeckError {
    let status = e.downcast_ref::<BigQueryError>().and_then(BigQueryError::status);
    QueryDeckError::new(code, format!("{:#}", e)).with_context(ErrorContext::Warehouse {
        operation: operation.to_string(),
        location,
        status,
    })
}

fn with_query_name(mut e: QueryDeckError, name: &str) -> QueryDeckError {
    if let Some(ErrorContext::Table { query_name, .. }) = &mut e.context {
        query_name.get_or_insert_with(|| name.to_string());
    }
    e
}

fn count_rows(value: &Value) -> usize {
    match value {
        Value::Array(rows) => rows.len(),
        Value::Object(members) => members
            .values()
            .map(|v| v.as_array().map_or(0, Vec::len))
            .sum(),
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_count_rows() {
        assert_eq!(count_rows(&json!([{"a": 1}, {"a": 2}])), 2);
        assert_eq!(count_rows(&json!({"x": [{"a": 1}], "y": []})), 1);
        assert_eq!(count_rows(&json!(null)), 0);
    }

    #[test]
    fn test_active_query_guard() {
        let counter = Arc::new(AtomicUsize::new(0));
        {
            let _a = ActiveQueryGuard::enter(&counter);
            let _b = ActiveQueryGuard::enter(&counter);
            assert_eq!(counter.load(Ordering::Relaxed), 2);
        }
        assert_eq!(counter.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn test_execution_failure_keeps_message() {
        let err = warehouse_error(
            ErrorCode::ExecutionFailure,
            "jobs.query q",
            Some("US".into()),
            anyhow::anyhow!("Syntax error at [3:1]"),
        );
        assert_eq!(err.code, ErrorCode::ExecutionFailure);
        assert!(err.message.contains("Syntax error at [3:1]"));
        assert!(err.is_transient());
    }
}
