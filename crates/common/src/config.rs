use anyhow::{Context, Result};
use secrecy::SecretString;
use serde::Deserialize;
use validator::Validate;

// Default constants
pub const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:8080";
pub const DEFAULT_SERVER_NAME: &str = "QueryDeck";
pub const DEFAULT_LOG_DIR: &str = "logs";

pub const DEFAULT_BIGQUERY_BASE_URL: &str = "https://bigquery.googleapis.com/bigquery/v2";
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 30_000;
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 500;
pub const DEFAULT_MAX_RESULTS_PER_PAGE: u32 = 10_000;

pub const DEFAULT_RESULT_CACHE_TTL_SECS: u64 = 15 * 60;

pub const DEFAULT_START_DATE: &str = "2025-10-01";
pub const DEFAULT_END_DATE: &str = "2025-10-10";

pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_BASE_DELAY_MS: u64 = 250;
pub const DEFAULT_MAX_DELAY_MS: u64 = 5_000;

pub const DEFAULT_TELEMETRY_ENABLED: bool = false;
pub const DEFAULT_OTLP_ENDPOINT: &str = "http://localhost:4317";

#[derive(Debug, Deserialize, Default, Clone, Validate)]
pub struct AppConfig {
    #[serde(default)]
    #[validate(nested)]
    pub server: ServerSettings,
    #[serde(default)]
    #[validate(nested)]
    pub warehouse: WarehouseConfig,
    #[serde(default)]
    #[validate(nested)]
    pub cache: ResultCacheConfig,
    #[serde(default)]
    pub schema_cache: SchemaCacheConfig,
    #[serde(default)]
    #[validate(nested)]
    pub defaults: QueryDefaults,
    #[serde(default)]
    pub retry: RetrySettings,
    #[serde(default)]
    #[validate(nested)]
    pub telemetry: TelemetryConfig,
    /// Optional YAML catalog replacing the built-in query catalog.
    #[serde(default)]
    pub catalog_path: Option<String>,
}

#[derive(Debug, Deserialize, Clone, Validate)]
pub struct ServerSettings {
    #[serde(default = "default_listen_addr")]
    #[validate(length(min = 1))]
    pub listen_addr: String,

    #[serde(default = "default_server_name")]
    pub name: String,

    /// Directory for the JSONL query and error logs. Disabled when unset.
    #[serde(default)]
    pub log_dir: Option<String>,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            name: default_server_name(),
            log_dir: None,
        }
    }
}

fn default_listen_addr() -> String {
    DEFAULT_LISTEN_ADDR.to_string()
}

fn default_server_name() -> String {
    DEFAULT_SERVER_NAME.to_string()
}

/// Connection settings for the BigQuery REST API.
#[derive(Debug, Deserialize, Clone, Validate)]
pub struct WarehouseConfig {
    #[serde(default = "default_base_url")]
    #[validate(custom(function = "validate_base_url"))]
    pub base_url: String,

    #[serde(default)]
    #[validate(length(min = 1, message = "warehouse.project_id is required"))]
    pub project_id: String,

    /// Processing location hint passed with every query (e.g. "US").
    #[serde(default)]
    pub location: Option<String>,

    #[serde(default, deserialize_with = "crate::models::deserialize_secret")]
    pub access_token: Option<SecretString>,

    #[serde(default = "default_request_timeout_ms")]
    #[validate(range(min = 1))]
    pub timeout_ms: u64,

    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    #[serde(default = "default_max_results_per_page")]
    #[validate(range(min = 1))]
    pub max_results_per_page: u32,
}

impl Default for WarehouseConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            project_id: String::new(),
            location: None,
            access_token: None,
            timeout_ms: default_request_timeout_ms(),
            poll_interval_ms: default_poll_interval_ms(),
            max_results_per_page: default_max_results_per_page(),
        }
    }
}

fn default_base_url() -> String {
    DEFAULT_BIGQUERY_BASE_URL.to_string()
}

fn default_request_timeout_ms() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_MS
}

fn default_poll_interval_ms() -> u64 {
    DEFAULT_POLL_INTERVAL_MS
}

fn default_max_results_per_page() -> u32 {
    DEFAULT_MAX_RESULTS_PER_PAGE
}

fn validate_base_url(url: &str) -> Result<(), validator::ValidationError> {
    match url::Url::parse(url) {
        Ok(parsed) if matches!(parsed.scheme(), "http" | "https") => Ok(()),
        _ => Err(validator::ValidationError::new("invalid_url")),
    }
}

/// Policy knobs for the response cache.
#[derive(Debug, Deserialize, Clone, Validate)]
pub struct ResultCacheConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_result_ttl")]
    #[validate(range(min = 1))]
    pub ttl_seconds: u64,

    /// Unbounded when unset.
    #[serde(default)]
    pub max_entries: Option<usize>,
}

impl Default for ResultCacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl_seconds: default_result_ttl(),
            max_entries: None,
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_result_ttl() -> u64 {
    DEFAULT_RESULT_CACHE_TTL_SECS
}

/// Policy knobs for the per-table schema cache. Both unset means entries live
/// for the whole process.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct SchemaCacheConfig {
    #[serde(default)]
    pub max_capacity: Option<u64>,
    #[serde(default)]
    pub ttl_seconds: Option<u64>,
}

/// Fallback date window applied when a request omits `startDate`/`endDate`.
#[derive(Debug, Deserialize, Clone, Validate)]
pub struct QueryDefaults {
    #[serde(default = "default_start_date")]
    #[validate(custom(function = "validate_iso_date"))]
    pub start_date: String,

    #[serde(default = "default_end_date")]
    #[validate(custom(function = "validate_iso_date"))]
    pub end_date: String,
}

impl Default for QueryDefaults {
    fn default() -> Self {
        Self {
            start_date: default_start_date(),
            end_date: default_end_date(),
        }
    }
}

fn default_start_date() -> String {
    DEFAULT_START_DATE.to_string()
}

fn default_end_date() -> String {
    DEFAULT_END_DATE.to_string()
}

fn validate_iso_date(value: &str) -> Result<(), validator::ValidationError> {
    let bytes = value.as_bytes();
    let shaped = bytes.len() == 10
        && bytes[4] == b'-'
        && bytes[7] == b'-'
        && bytes
            .iter()
            .enumerate()
            .all(|(i, b)| i == 4 || i == 7 || b.is_ascii_digit());
    if shaped {
        Ok(())
    } else {
        Err(validator::ValidationError::new("invalid_date"))
    }
}

#[derive(Debug, Deserialize, Clone, Copy)]
pub struct RetrySettings {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

fn default_max_attempts() -> u32 {
    DEFAULT_MAX_ATTEMPTS
}
fn default_base_delay_ms() -> u64 {
    DEFAULT_BASE_DELAY_MS
}
fn default_max_delay_ms() -> u64 {
    DEFAULT_MAX_DELAY_MS
}

#[derive(Debug, Deserialize, Clone, Validate)]
pub struct TelemetryConfig {
    #[serde(default = "default_telemetry_enabled")]
    pub enabled: bool,

    #[serde(default = "default_otlp_endpoint")]
    #[validate(url)]
    pub endpoint: String,

    #[serde(default = "default_server_name")]
    pub service_name: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            enabled: default_telemetry_enabled(),
            endpoint: default_otlp_endpoint(),
            service_name: default_server_name(),
        }
    }
}

fn default_telemetry_enabled() -> bool {
    DEFAULT_TELEMETRY_ENABLED
}

fn default_otlp_endpoint() -> String {
    DEFAULT_OTLP_ENDPOINT.to_string()
}

impl AppConfig {
    pub fn from_file(path: &str) -> Result<Self> {
        let builder = config::Config::builder();

        let builder = if std::path::Path::new(path).exists() {
            builder.add_source(config::File::with_name(path))
        } else {
            builder
        };

        // QUERYDECK_WAREHOUSE__PROJECT_ID maps to warehouse.project_id, etc.
        let builder = builder.add_source(
            config::Environment::with_prefix("QUERYDECK")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let cfg = builder.build().context("Failed to build configuration")?;

        let app_config: AppConfig = cfg
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        app_config
            .validate()
            .map_err(|e| anyhow::anyhow!("Configuration validation failed: {:?}", e))?;

        Ok(app_config)
    }
}
