//! QueryDeck Server: the HTTP API layer.
//!
//! Exposes the query engine via:
//! - **REST**: `/api/v1/*` query, explain, catalog and warehouse introspection.
//! - **Observability**: `/health`, `/ready`, Prometheus `/metrics`, JSONL
//!   query/error logs and optional OpenTelemetry tracing.
use anyhow::Context;
use querydeck_common::config::AppConfig;
use querydeck_connectors::BigQueryWarehouse;
use querydeck_runtime::{QueryCatalog, QueryEngine, QueryEngineOptions};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{info, Level, Subscriber};
use tracing_subscriber::{
    fmt::MakeWriter, layer::SubscriberExt, registry::LookupSpan, util::SubscriberInitExt,
    EnvFilter, Layer,
};

pub mod api;
pub mod metrics;

pub use api::{create_router, AppState};
pub use metrics::ServerMetrics;

pub struct QueryDeckServer {
    config_path: String,
    engine: Option<Arc<QueryEngine>>,
}

impl Default for QueryDeckServer {
    fn default() -> Self {
        Self {
            config_path: "config/querydeck.yaml".to_string(),
            engine: None,
        }
    }
}

impl QueryDeckServer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(mut self, config_path: &str) -> Self {
        self.config_path = config_path.to_string();
        self
    }

    /// Serve a prebuilt engine instead of one built from the configured
    /// warehouse.
    pub fn with_engine(mut self, engine: Arc<QueryEngine>) -> Self {
        self.engine = Some(engine);
        self
    }

    pub async fn run(self) -> anyhow::Result<()> {
        let app_config = AppConfig::from_file(&self.config_path)?;
        init_tracing(&app_config)?;

        let engine = match self.engine {
            Some(engine) => engine,
            None => Arc::new(build_engine(&app_config)?),
        };
        info!(
            queries = engine.catalog().len(),
            project = %app_config.warehouse.project_id,
            "Query engine ready"
        );

        let app = create_router(AppState::new(engine)?);

        let addr: SocketAddr = app_config
            .server
            .listen_addr
            .parse()
            .with_context(|| format!("Invalid listen address: {}", app_config.server.listen_addr))?;
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .with_context(|| format!("Failed to bind to {}", addr))?;
        info!("{} listening on {}", app_config.server.name, addr);

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .context("HTTP server error")?;

        querydeck_common::telemetry::shutdown_telemetry();
        Ok(())
    }
}

/// Engine over the configured BigQuery project. `catalog_path` replaces the
/// built-in catalog when set.
pub fn build_engine(config: &AppConfig) -> anyhow::Result<QueryEngine> {
    let catalog = match &config.catalog_path {
        Some(path) => QueryCatalog::from_file(path)?,
        None => QueryCatalog::builtin()?,
    };
    let warehouse = Arc::new(
        BigQueryWarehouse::new(&config.warehouse, config.retry)
            .context("Failed to create BigQuery client")?,
    );

    Ok(QueryEngine::new(QueryEngineOptions {
        catalog,
        executor: warehouse.clone(),
        metadata: warehouse,
        cache: config.cache.clone(),
        schema_cache: config.schema_cache.clone(),
        defaults: config.defaults.clone(),
        location: config.warehouse.location.clone(),
        clock: None,
    }))
}

/// Stdout logging filtered by `RUST_LOG`, plus daily-rolling JSONL files for
/// the `queries` and `errors` targets when `server.log_dir` is set.
fn init_tracing(config: &AppConfig) -> anyhow::Result<()> {
    let otel_layer = querydeck_common::telemetry::telemetry_layer(&config.telemetry)?;

    let stdout_layer = tracing_subscriber::fmt::layer().with_filter(
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    );

    let (queries_layer, errors_layer) = match &config.server.log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create log directory {}", dir))?;

            let queries_appender = tracing_appender::rolling::daily(dir, "queries.jsonl");
            let errors_appender = tracing_appender::rolling::daily(dir, "errors.jsonl");

            (
                Some(audit_layer("queries", queries_appender)),
                Some(audit_layer("errors", errors_appender)),
            )
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(stdout_layer)
        .with(otel_layer)
        .with(queries_layer)
        .with(errors_layer)
        .try_init()
        .ok();
    Ok(())
}

/// JSONL layer for one log target. Only info and above is written, so debug
/// events such as compiled SQL stay on stdout.
fn audit_layer<S, W>(target: &'static str, writer: W) -> impl Layer<S>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    tracing_subscriber::fmt::layer()
        .json()
        .with_writer(writer)
        .with_filter(tracing_subscriber::filter::filter_fn(move |metadata| {
            metadata.target() == target && *metadata.level() <= Level::INFO
        }))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
