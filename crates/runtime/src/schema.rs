use moka::future::Cache;
use querydeck_common::config::SchemaCacheConfig;
use querydeck_common::models::SchemaField;
use querydeck_connectors::{BigQueryError, MetadataSource};
use querydeck_error::{ErrorCode, ErrorContext, QueryDeckError, Result};
use querydeck_sql::TableRef;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SchemaCacheStats {
    pub entry_count: u64,
    pub hits: u64,
    pub misses: u64,
}

/// Table schemas by `dataset.table`, fetched once and then served from
/// memory. Failed fetches are never stored.
pub struct SchemaResolver {
    metadata: Arc<dyn MetadataSource>,
    cache: Cache<String, Arc<Vec<SchemaField>>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl SchemaResolver {
    pub fn new(metadata: Arc<dyn MetadataSource>, config: &SchemaCacheConfig) -> Self {
        let mut builder = Cache::builder();
        if let Some(capacity) = config.max_capacity {
            builder = builder.max_capacity(capacity);
        }
        if let Some(ttl) = config.ttl_seconds {
            builder = builder.time_to_live(Duration::from_secs(ttl));
        }

        Self {
            metadata,
            cache: builder.build(),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub async fn resolve(&self, table_id: &str) -> Result<Arc<Vec<SchemaField>>> {
        let table = TableRef::parse(table_id).map_err(|e| {
            QueryDeckError::new(ErrorCode::MalformedTableIdentifier, e.to_string())
                .with_context(ErrorContext::Table {
                    query_name: None,
                    table_id: Some(table_id.to_string()),
                })
                .with_hint("Expected format dataset.table")
        })?;
        let key = table.to_string();

        if let Some(fields) = self.cache.get(&key).await {
            self.hits.fetch_add(1, Ordering::Relaxed);
            debug!(target: "cache", table = %key, "Schema cache hit");
            return Ok(fields);
        }
        self.misses.fetch_add(1, Ordering::Relaxed);

        let fields = self
            .metadata
            .table_schema(&table.dataset, &table.table)
            .await
            .map_err(|e| {
                warn!(target: "cache", table = %key, "Schema fetch failed: {:#}", e);
                QueryDeckError::new(
                    ErrorCode::SchemaUnavailable,
                    format!("Failed to fetch schema for {}: {:#}", key, e),
                )
                .with_context(ErrorContext::Warehouse {
                    operation: format!("tables.get {}", key),
                    location: None,
                    status: e.downcast_ref::<BigQueryError>().and_then(BigQueryError::status),
                })
            })?;

        let fields = Arc::new(fields);
        self.cache.insert(key.clone(), fields.clone()).await;
        debug!(target: "cache", table = %key, columns = fields.len(), "Schema cached");
        Ok(fields)
    }

    /// Forgets a table so the next `resolve` refetches it.
    pub async fn invalidate(&self, table_id: &str) {
        let key = match TableRef::parse(table_id) {
            Ok(table) => table.to_string(),
            Err(_) => table_id.to_string(),
        };
        self.cache.invalidate(&key).await;
    }

    pub async fn stats(&self) -> SchemaCacheStats {
        self.cache.run_pending_tasks().await;
        SchemaCacheStats {
            entry_count: self.cache.entry_count(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}
