use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use querydeck_common::models::ApiResponse;
use querydeck_error::{ErrorCategory, ErrorCode, QueryDeckError};
use querydeck_runtime::{QueryEngine, RawParams};
use serde_json::json;
use std::sync::Arc;

use crate::metrics::ServerMetrics;

/// Response header reporting whether a query was served from the result
/// cache (`hit` or `miss`).
pub const CACHE_HEADER: &str = "x-querydeck-cache";

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<QueryEngine>,
    pub metrics: Arc<ServerMetrics>,
}

impl AppState {
    pub fn new(engine: Arc<QueryEngine>) -> anyhow::Result<Self> {
        Ok(Self {
            engine,
            metrics: Arc::new(ServerMetrics::new()?),
        })
    }
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/ready", get(ready_handler))
        .route("/metrics", get(metrics_handler))
        .nest("/api/v1", create_api_router())
        .with_state(state)
}

fn create_api_router() -> Router<AppState> {
    Router::new()
        .route("/query", get(run_query))
        .route("/query/{query_name}", get(run_named_query))
        .route("/explain", get(explain_query))
        .route("/queries", get(list_queries))
        .route("/test-connection", get(test_connection))
        .route("/tables/{dataset}", get(list_tables))
}

/// A `QueryDeckError` rendered as a failure envelope.
pub struct ApiError(pub QueryDeckError);

impl From<QueryDeckError> for ApiError {
    fn from(err: QueryDeckError) -> Self {
        Self(err)
    }
}

pub fn status_for(err: &QueryDeckError) -> StatusCode {
    match (err.code, err.code.category()) {
        (ErrorCode::UnknownQuery, _) => StatusCode::NOT_FOUND,
        (_, ErrorCategory::Request) => StatusCode::BAD_REQUEST,
        (_, ErrorCategory::Warehouse) => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_for(&self.0);
        let body = ApiResponse::<()>::failure(self.0.message.clone(), serde_json::to_value(&self.0).ok());
        (status, Json(body)).into_response()
    }
}

async fn run_query(State(state): State<AppState>, Query(params): Query<RawParams>) -> Response {
    let query_name = params.get("queryName").cloned().unwrap_or_default();
    execute(&state, &query_name, &params).await
}

/// Same as `/query`, with the logical name in the path. The name is folded
/// into the parameters so both forms share cache entries.
async fn run_named_query(
    State(state): State<AppState>,
    Path(query_name): Path<String>,
    Query(mut params): Query<RawParams>,
) -> Response {
    params.insert("queryName".to_string(), query_name.clone());
    execute(&state, &query_name, &params).await
}

async fn execute(state: &AppState, query_name: &str, params: &RawParams) -> Response {
    state.metrics.queries_total.inc();

    match state.engine.execute(query_name, params).await {
        Ok(outcome) => {
            let cache_status = if outcome.cache_hit {
                state.metrics.cache_hits_total.inc();
                "hit"
            } else {
                "miss"
            };
            let mut response = Json(ApiResponse::ok(outcome.result)).into_response();
            response
                .headers_mut()
                .insert(CACHE_HEADER, HeaderValue::from_static(cache_status));
            response
        }
        Err(e) => {
            state.metrics.query_errors_total.inc();
            ApiError(e).into_response()
        }
    }
}

async fn explain_query(
    State(state): State<AppState>,
    Query(params): Query<RawParams>,
) -> Result<Response, ApiError> {
    let query_name = params.get("queryName").cloned().unwrap_or_default();
    let compiled = state.engine.explain(&query_name, &params).await?;
    Ok(Json(ApiResponse::ok(compiled)).into_response())
}

async fn list_queries(State(state): State<AppState>) -> Response {
    Json(ApiResponse::ok(state.engine.catalog().summaries())).into_response()
}

async fn test_connection(State(state): State<AppState>) -> Result<Response, ApiError> {
    let datasets = state.engine.list_datasets().await?;
    Ok(Json(ApiResponse::ok(json!({
        "connected": true,
        "datasets": datasets,
    })))
    .into_response())
}

async fn list_tables(
    State(state): State<AppState>,
    Path(dataset): Path<String>,
) -> Result<Response, ApiError> {
    let tables = state.engine.describe_dataset(&dataset).await?;
    Ok(Json(ApiResponse::ok(json!({
        "dataset": dataset,
        "tables": tables,
    })))
    .into_response())
}

async fn health_handler() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

async fn ready_handler(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "ready",
        "queries": state.engine.catalog().len(),
    }))
}

async fn metrics_handler(State(state): State<AppState>) -> Response {
    state
        .metrics
        .active_queries
        .set(state.engine.active_queries() as i64);

    match state.metrics.render() {
        Ok((content_type, body)) => {
            ([(header::CONTENT_TYPE, content_type)], body).into_response()
        }
        Err(e) => {
            tracing::error!(target: "errors", "Failed to encode metrics: {:#}", e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (ErrorCode::MissingScope, StatusCode::BAD_REQUEST),
            (ErrorCode::InvalidParameter, StatusCode::BAD_REQUEST),
            (ErrorCode::UnknownQuery, StatusCode::NOT_FOUND),
            (ErrorCode::TableNotDetected, StatusCode::INTERNAL_SERVER_ERROR),
            (ErrorCode::InvalidConfig, StatusCode::INTERNAL_SERVER_ERROR),
            (ErrorCode::SchemaUnavailable, StatusCode::BAD_GATEWAY),
            (ErrorCode::ExecutionFailure, StatusCode::BAD_GATEWAY),
            (ErrorCode::MalformedResult, StatusCode::BAD_GATEWAY),
            (ErrorCode::Internal, StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (code, status) in cases {
            assert_eq!(status_for(&QueryDeckError::new(code, "x")), status, "{}", code);
        }
    }
}
