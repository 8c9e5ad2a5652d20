//! BigQuery over its REST API (v2).
//!
//! Queries go through `jobs.query` with named parameters. When the job has not
//! finished inside the synchronous window the client polls
//! `jobs.getQueryResults`, then follows `pageToken` until every row is
//! collected. Cells arrive in the `{"f": [{"v": ...}]}` encoding and are
//! converted to JSON values according to the result schema.

use anyhow::{Context, Result};
use async_trait::async_trait;
use querydeck_common::config::{RetrySettings, WarehouseConfig};
use querydeck_common::models::{BoundParams, FieldType, Row, SchemaField};
use querydeck_common::retry::retry_async_if;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::{Client, RequestBuilder, Response};
use secrecy::ExposeSecret;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;
use url::Url;

use super::{MetadataSource, QueryExecutor};

/// Upper bound for how long one `jobs.query`/`getQueryResults` call waits
/// server-side for the job to finish.
const JOB_WAIT_MS: u64 = 10_000;

#[derive(Debug, Error)]
pub enum BigQueryError {
    #[error("BigQuery request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("BigQuery returned HTTP {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Unexpected BigQuery response: {0}")]
    Decode(String),

    #[error("Cannot build BigQuery endpoint from {0}")]
    Endpoint(String),
}

impl BigQueryError {
    /// Transport failures, throttling and server errors are worth another
    /// attempt; anything the service rejected on its merits is not.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(_) => true,
            Self::Api { status, .. } => *status == 429 || *status >= 500,
            Self::Decode(_) | Self::Endpoint(_) => false,
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } => Some(*status),
            Self::Transport(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

pub struct BigQueryWarehouse {
    client: Client,
    base_url: Url,
    project_id: String,
    location: Option<String>,
    poll_interval: Duration,
    job_wait_ms: u64,
    max_results: u32,
    retry: RetrySettings,
}

impl BigQueryWarehouse {
    pub fn new(config: &WarehouseConfig, retry: RetrySettings) -> Result<Self> {
        let base_url = Url::parse(&config.base_url)
            .with_context(|| format!("Invalid BigQuery base URL: {}", config.base_url))?;
        if base_url.cannot_be_a_base() {
            anyhow::bail!("BigQuery base URL must be hierarchical: {}", config.base_url);
        }

        let mut headers = HeaderMap::new();
        if let Some(token) = &config.access_token {
            let mut value = HeaderValue::from_str(&format!("Bearer {}", token.expose_secret()))
                .context("Access token is not a valid header value")?;
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
        }

        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            base_url,
            project_id: config.project_id.clone(),
            location: config.location.clone(),
            poll_interval: Duration::from_millis(config.poll_interval_ms),
            job_wait_ms: JOB_WAIT_MS.min(config.timeout_ms),
            max_results: config.max_results_per_page,
            retry,
        })
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, BigQueryError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| BigQueryError::Endpoint(self.base_url.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// Sends the request built by `build`, retrying transient failures, and
    /// decodes a successful body as `T`.
    async fn send_json<T, B>(&self, operation: &str, build: B) -> Result<T, BigQueryError>
    where
        T: DeserializeOwned,
        B: Fn() -> RequestBuilder,
    {
        let build = &build;
        retry_async_if(operation, self.retry, BigQueryError::is_retryable, move || async move {
            let response = build().send().await?;
            read_json(response).await
        })
        .await
    }

    async fn get_query_results(
        &self,
        job_id: &str,
        location: Option<&str>,
        page_token: Option<&str>,
    ) -> Result<QueryResponse, BigQueryError> {
        let url = self.endpoint(&["projects", &self.project_id, "queries", job_id])?;
        let mut query = vec![
            ("maxResults", self.max_results.to_string()),
            ("timeoutMs", self.job_wait_ms.to_string()),
        ];
        if let Some(location) = location {
            query.push(("location", location.to_string()));
        }
        if let Some(token) = page_token {
            query.push(("pageToken", token.to_string()));
        }
        self.send_json("bigquery.getQueryResults", || {
            self.client.get(url.clone()).query(&query)
        })
        .await
    }
}

#[async_trait]
impl QueryExecutor for BigQueryWarehouse {
    async fn execute_query(
        &self,
        sql: &str,
        params: &BoundParams,
        location: Option<&str>,
    ) -> Result<Vec<Row>> {
        let location = location.or(self.location.as_deref());
        let request = QueryRequest {
            query: sql,
            use_legacy_sql: false,
            parameter_mode: "NAMED",
            query_parameters: params
                .iter()
                .map(|(name, value)| QueryParameter {
                    name: name.clone(),
                    parameter_type: ParameterType {
                        kind: value.type_name(),
                    },
                    parameter_value: ParameterValue {
                        value: value.to_wire_string(),
                    },
                })
                .collect(),
            location,
            timeout_ms: self.job_wait_ms,
            max_results: self.max_results,
        };

        let url = self.endpoint(&["projects", &self.project_id, "queries"])?;
        let mut response: QueryResponse = self
            .send_json("bigquery.query", || self.client.post(url.clone()).json(&request))
            .await?;

        let job = response.job_reference.take();
        let job_location = job
            .as_ref()
            .and_then(|j| j.location.clone())
            .or_else(|| location.map(str::to_string));

        while !response.job_complete {
            tokio::time::sleep(self.poll_interval).await;
            response = self
                .get_query_results(job_id(&job)?, job_location.as_deref(), None)
                .await?;
        }

        let fields = response.schema.take().map(|s| s.fields).unwrap_or_default();
        let mut rows = decode_rows(&fields, &response.rows);
        let mut page_token = response.page_token.take();
        let mut pages = 1;
        while let Some(token) = page_token {
            let page = self
                .get_query_results(job_id(&job)?, job_location.as_deref(), Some(&token))
                .await?;
            rows.extend(decode_rows(&fields, &page.rows));
            page_token = page.page_token;
            pages += 1;
        }

        debug!(rows = rows.len(), pages, "BigQuery query complete");
        Ok(rows)
    }
}

#[async_trait]
impl MetadataSource for BigQueryWarehouse {
    async fn table_schema(&self, dataset: &str, table: &str) -> Result<Vec<SchemaField>> {
        let url = self.endpoint(&["projects", &self.project_id, "datasets", dataset, "tables", table])?;
        let resource: TableResource = self
            .send_json("bigquery.tables.get", || self.client.get(url.clone()))
            .await?;

        Ok(resource
            .schema
            .map(|s| s.fields)
            .unwrap_or_default()
            .into_iter()
            .map(|field| SchemaField {
                field_type: FieldType::parse(&field.field_type),
                name: field.name,
                mode: field.mode,
                description: field.description,
            })
            .collect())
    }

    async fn list_datasets(&self) -> Result<Vec<String>> {
        let url = self.endpoint(&["projects", &self.project_id, "datasets"])?;
        let mut names = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            let page: DatasetList = self
                .send_json("bigquery.datasets.list", || {
                    with_page_token(self.client.get(url.clone()), page_token.as_deref())
                })
                .await?;
            names.extend(page.datasets.into_iter().map(|d| d.dataset_reference.dataset_id));
            match page.next_page_token {
                Some(token) => page_token = Some(token),
                None => return Ok(names),
            }
        }
    }

    async fn list_tables(&self, dataset: &str) -> Result<Vec<String>> {
        let url = self.endpoint(&["projects", &self.project_id, "datasets", dataset, "tables"])?;
        let mut names = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            let page: TableList = self
                .send_json("bigquery.tables.list", || {
                    with_page_token(self.client.get(url.clone()), page_token.as_deref())
                })
                .await?;
            names.extend(page.tables.into_iter().map(|t| t.table_reference.table_id));
            match page.next_page_token {
                Some(token) => page_token = Some(token),
                None => return Ok(names),
            }
        }
    }
}

fn with_page_token(request: RequestBuilder, token: Option<&str>) -> RequestBuilder {
    match token {
        Some(token) => request.query(&[("pageToken", token)]),
        None => request,
    }
}

fn job_id(job: &Option<JobReference>) -> Result<&str, BigQueryError> {
    job.as_ref()
        .map(|j| j.job_id.as_str())
        .ok_or_else(|| BigQueryError::Decode("incomplete job without jobReference".to_string()))
}

async fn read_json<T: DeserializeOwned>(response: Response) -> Result<T, BigQueryError> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(BigQueryError::Api {
            status: status.as_u16(),
            message: api_message(&body),
        });
    }
    let body = response.bytes().await?;
    serde_json::from_slice(&body).map_err(|e| BigQueryError::Decode(e.to_string()))
}

/// Pulls `error.message` out of a Google API error body, falling back to the
/// raw text.
fn api_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v.pointer("/error/message").and_then(Value::as_str).map(str::to_string))
        .unwrap_or_else(|| body.trim().chars().take(512).collect())
}

fn decode_rows(fields: &[WireField], rows: &[WireRow]) -> Vec<Row> {
    rows.iter().map(|row| decode_record(fields, &row.f)).collect()
}

/// `cells` are `{"v": ...}` objects, positionally matching `fields`.
fn decode_record(fields: &[WireField], cells: &[Value]) -> Row {
    fields
        .iter()
        .enumerate()
        .map(|(i, field)| {
            let raw = cells.get(i).and_then(|c| c.get("v")).unwrap_or(&Value::Null);
            (field.name.clone(), decode_cell(field, raw))
        })
        .collect()
}

fn decode_cell(field: &WireField, raw: &Value) -> Value {
    if field.is_repeated() {
        return match raw {
            Value::Array(items) => Value::Array(
                items
                    .iter()
                    .map(|item| decode_scalar(field, item.get("v").unwrap_or(&Value::Null)))
                    .collect(),
            ),
            Value::Null => Value::Array(Vec::new()),
            other => other.clone(),
        };
    }
    decode_scalar(field, raw)
}

fn decode_scalar(field: &WireField, raw: &Value) -> Value {
    let text = match raw {
        Value::Null => return Value::Null,
        Value::Object(record) => {
            let cells = record.get("f").and_then(Value::as_array);
            return match cells {
                Some(cells) => Value::Object(decode_record(&field.fields, cells)),
                None => raw.clone(),
            };
        }
        Value::String(text) => text,
        other => return other.clone(),
    };

    match FieldType::parse(&field.field_type) {
        FieldType::Int64 => text.parse::<i64>().map(Value::from).ok(),
        FieldType::Float64 | FieldType::Numeric | FieldType::BigNumeric => text
            .parse::<f64>()
            .ok()
            .and_then(Number::from_f64)
            .map(Value::Number),
        FieldType::Bool => match text.as_str() {
            "true" => Some(Value::Bool(true)),
            "false" => Some(Value::Bool(false)),
            _ => None,
        },
        _ => None,
    }
    .unwrap_or_else(|| raw.clone())
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct QueryRequest<'a> {
    query: &'a str,
    use_legacy_sql: bool,
    parameter_mode: &'static str,
    query_parameters: Vec<QueryParameter>,
    #[serde(skip_serializing_if = "Option::is_none")]
    location: Option<&'a str>,
    timeout_ms: u64,
    max_results: u32,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct QueryParameter {
    name: String,
    parameter_type: ParameterType,
    parameter_value: ParameterValue,
}

#[derive(Debug, Serialize)]
struct ParameterType {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Serialize)]
struct ParameterValue {
    value: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueryResponse {
    job_reference: Option<JobReference>,
    #[serde(default)]
    job_complete: bool,
    schema: Option<TableSchema>,
    #[serde(default)]
    rows: Vec<WireRow>,
    page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JobReference {
    job_id: String,
    location: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TableSchema {
    #[serde(default)]
    fields: Vec<WireField>,
}

#[derive(Debug, Deserialize)]
struct WireField {
    name: String,
    #[serde(rename = "type")]
    field_type: String,
    mode: Option<String>,
    description: Option<String>,
    #[serde(default)]
    fields: Vec<WireField>,
}

impl WireField {
    fn is_repeated(&self) -> bool {
        self.mode
            .as_deref()
            .is_some_and(|m| m.eq_ignore_ascii_case("REPEATED"))
    }
}

#[derive(Debug, Deserialize)]
struct WireRow {
    #[serde(default)]
    f: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct TableResource {
    schema: Option<TableSchema>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DatasetList {
    #[serde(default)]
    datasets: Vec<DatasetEntry>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DatasetEntry {
    dataset_reference: DatasetReference,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DatasetReference {
    dataset_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TableList {
    #[serde(default)]
    tables: Vec<TableEntry>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TableEntry {
    table_reference: TableReference,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TableReference {
    table_id: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn field(name: &str, kind: &str) -> WireField {
        WireField {
            name: name.to_string(),
            field_type: kind.to_string(),
            mode: None,
            description: None,
            fields: Vec::new(),
        }
    }

    #[test]
    fn test_decode_scalars() {
        let fields = vec![
            field("units", "INTEGER"),
            field("sales", "FLOAT"),
            field("margin", "NUMERIC"),
            field("active", "BOOLEAN"),
            field("sku", "STRING"),
            field("report_date", "DATE"),
            field("missing", "INTEGER"),
        ];
        let cells = vec![
            json!({"v": "42"}),
            json!({"v": "12.5"}),
            json!({"v": "0.25"}),
            json!({"v": "true"}),
            json!({"v": "A-1"}),
            json!({"v": "2025-10-01"}),
            json!({"v": null}),
        ];

        let row = decode_record(&fields, &cells);
        assert_eq!(
            Value::Object(row),
            json!({
                "units": 42,
                "sales": 12.5,
                "margin": 0.25,
                "active": true,
                "sku": "A-1",
                "report_date": "2025-10-01",
                "missing": null
            })
        );
    }

    #[test]
    fn test_decode_repeated_and_record() {
        let mut tags = field("tags", "STRING");
        tags.mode = Some("REPEATED".to_string());
        let mut totals = field("totals", "RECORD");
        totals.fields = vec![field("units", "INT64"), field("label", "STRING")];

        let cells = vec![
            json!({"v": [{"v": "a"}, {"v": "b"}]}),
            json!({"v": {"f": [{"v": "7"}, {"v": "x"}]}}),
        ];
        let row = decode_record(&[tags, totals], &cells);
        assert_eq!(row["tags"], json!(["a", "b"]));
        assert_eq!(row["totals"], json!({"units": 7, "label": "x"}));
    }

    #[test]
    fn test_unparseable_values_kept_as_text() {
        let cells = vec![json!({"v": "not-a-number"}), json!({"v": "Infinity"})];
        let row = decode_record(&[field("a", "INTEGER"), field("b", "FLOAT")], &cells);
        assert_eq!(row["a"], json!("not-a-number"));
        assert_eq!(row["b"], json!("Infinity"));
    }

    #[test]
    fn test_short_rows_pad_with_null() {
        let row = decode_record(&[field("a", "STRING"), field("b", "STRING")], &[json!({"v": "x"})]);
        assert_eq!(row["b"], Value::Null);
    }

    #[test]
    fn test_api_message() {
        let body = r#"{"error": {"code": 400, "message": "Syntax error: Unexpected keyword"}}"#;
        assert_eq!(api_message(body), "Syntax error: Unexpected keyword");
        assert_eq!(api_message("  upstream timeout \n"), "upstream timeout");
    }

    #[test]
    fn test_retryable_statuses() {
        let api = |status| BigQueryError::Api {
            status,
            message: String::new(),
        };
        assert!(api(503).is_retryable());
        assert!(api(429).is_retryable());
        assert!(!api(400).is_retryable());
        assert!(!api(404).is_retryable());
        assert!(!BigQueryError::Decode("x".into()).is_retryable());
        assert_eq!(api(403).status(), Some(403));
    }
}
