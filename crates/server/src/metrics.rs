use prometheus::{Encoder, IntCounter, IntGauge, Opts, Registry, TextEncoder};

/// Request counters exported at `/metrics`. Each server owns its registry.
pub struct ServerMetrics {
    registry: Registry,
    pub queries_total: IntCounter,
    pub cache_hits_total: IntCounter,
    pub query_errors_total: IntCounter,
    pub active_queries: IntGauge,
}

impl ServerMetrics {
    pub fn new() -> prometheus::Result<Self> {
        let registry = Registry::new();

        let queries_total = IntCounter::with_opts(Opts::new(
            "querydeck_queries_total",
            "Total number of query requests",
        ))?;
        let cache_hits_total = IntCounter::with_opts(Opts::new(
            "querydeck_cache_hits_total",
            "Query requests served from the result cache",
        ))?;
        let query_errors_total = IntCounter::with_opts(Opts::new(
            "querydeck_query_errors_total",
            "Query requests that returned an error",
        ))?;
        let active_queries = IntGauge::with_opts(Opts::new(
            "querydeck_active_queries",
            "Number of currently executing queries",
        ))?;

        registry.register(Box::new(queries_total.clone()))?;
        registry.register(Box::new(cache_hits_total.clone()))?;
        registry.register(Box::new(query_errors_total.clone()))?;
        registry.register(Box::new(active_queries.clone()))?;

        Ok(Self {
            registry,
            queries_total,
            cache_hits_total,
            query_errors_total,
            active_queries,
        })
    }

    /// Prometheus text exposition of every registered metric.
    pub fn render(&self) -> anyhow::Result<(String, Vec<u8>)> {
        let encoder = TextEncoder::new();
        let mut buffer = vec![];
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        Ok((encoder.format_type().to_string(), buffer))
    }
}
