mod common;

use axum::http::StatusCode;
use common::{app, get, StubWarehouse};
use serde_json::json;
use std::sync::atomic::Ordering;
use std::sync::Arc;

const PRODUCT_QUERY: &str =
    "/api/v1/query?queryName=productBySales&account_id=1229370&startDate=2025-10-01&endDate=2025-10-10&sku=ABC";

#[tokio::test]
async fn test_query_reports_cache_status() {
    let warehouse = Arc::new(StubWarehouse::default());
    let app = app(&warehouse);

    let first = get(&app, PRODUCT_QUERY).await;
    assert_eq!(first.status, StatusCode::OK);
    assert_eq!(first.cache.as_deref(), Some("miss"));
    assert_eq!(
        first.json(),
        json!({"success": true, "data": [{"sku": "ABC-1", "total_sales": 42.0}]})
    );

    let second = get(&app, PRODUCT_QUERY).await;
    assert_eq!(second.cache.as_deref(), Some("hit"));
    assert_eq!(second.json(), first.json());
    assert_eq!(warehouse.executions.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_path_form_shares_cache_with_query_form() {
    let warehouse = Arc::new(StubWarehouse::default());
    let app = app(&warehouse);

    get(&app, PRODUCT_QUERY).await;
    let response = get(
        &app,
        "/api/v1/query/productBySales?account_id=1229370&startDate=2025-10-01&endDate=2025-10-10&sku=ABC",
    )
    .await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.cache.as_deref(), Some("hit"));
}

#[tokio::test]
async fn test_missing_scope_is_bad_request() {
    let warehouse = Arc::new(StubWarehouse::default());
    let app = app(&warehouse);

    let response = get(&app, "/api/v1/query?queryName=productBySales").await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    let body = response.json();
    assert_eq!(body["success"], json!(false));
    assert_eq!(body["error"]["code"], json!("QD-1001"));
    assert!(body["message"].as_str().unwrap().contains("account_id"));
}

#[tokio::test]
async fn test_unknown_query_is_not_found() {
    let warehouse = Arc::new(StubWarehouse::default());
    let app = app(&warehouse);

    let response = get(&app, "/api/v1/query?queryName=nope&account_id=1").await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);
    assert_eq!(response.json()["error"]["code"], json!("QD-2001"));

    let response = get(&app, "/api/v1/query?account_id=1").await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_warehouse_failure_is_bad_gateway() {
    let warehouse = Arc::new(StubWarehouse::default());
    warehouse.fail_execution.store(true, Ordering::SeqCst);
    let app = app(&warehouse);

    let response = get(&app, PRODUCT_QUERY).await;
    assert_eq!(response.status, StatusCode::BAD_GATEWAY);
    let body = response.json();
    assert_eq!(body["error"]["code"], json!("QD-4002"));
    assert!(body["message"].as_str().unwrap().contains("Unrecognized name"));
    assert!(response.cache.is_none());
}

#[tokio::test]
async fn test_explain_returns_sql_without_executing() {
    let warehouse = Arc::new(StubWarehouse::default());
    let app = app(&warehouse);

    let response = get(
        &app,
        "/api/v1/explain?queryName=productBySales&account_id=7&sku=AB&page=1&pageSize=25",
    )
    .await;
    assert_eq!(response.status, StatusCode::OK);

    let data = &response.json()["data"];
    assert_eq!(data["queryName"], json!("productBySales"));
    assert_eq!(data["table"], json!("intentwise_ecommerce_graph.product_summary"));
    assert_eq!(data["params"]["sku"], json!("%AB%"));
    assert_eq!(data["params"]["account_id"], json!(7));
    assert_eq!(data["params"]["limit"], json!(25));
    assert_eq!(data["params"]["offset"], json!(0));
    assert!(data["sql"].as_str().unwrap().contains("LIMIT @limit OFFSET @offset"));
    assert_eq!(warehouse.executions.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_catalog_listing() {
    let warehouse = Arc::new(StubWarehouse::default());
    let app = app(&warehouse);

    let response = get(&app, "/api/v1/queries").await;
    assert_eq!(response.status, StatusCode::OK);
    let entries = response.json()["data"].as_array().unwrap().clone();

    let product = entries
        .iter()
        .find(|e| e["name"] == json!("productBySales"))
        .unwrap();
    assert_eq!(product["kind"], json!("fixed"));
    assert_eq!(product["table"], json!("intentwise_ecommerce_graph.product_summary"));

    let bundle = entries
        .iter()
        .find(|e| e["name"] == json!("orderDashboard"))
        .unwrap();
    assert_eq!(bundle["kind"], json!("composite"));
    assert_eq!(bundle["members"].as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn test_introspection_routes() {
    let warehouse = Arc::new(StubWarehouse::default());
    let app = app(&warehouse);

    let response = get(&app, "/api/v1/test-connection").await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(
        response.json()["data"]["datasets"],
        json!(["intentwise_ecommerce_graph"])
    );

    let response = get(&app, "/api/v1/tables/intentwise_ecommerce_graph").await;
    assert_eq!(response.status, StatusCode::OK);
    let tables = &response.json()["data"]["tables"];
    assert_eq!(tables[0]["table"], json!("product_summary"));
    assert_eq!(tables[0]["columns"][0], json!({"name": "sku", "type": "STRING"}));

    warehouse.fail_metadata.store(true, Ordering::SeqCst);
    let response = get(&app, "/api/v1/test-connection").await;
    assert_eq!(response.status, StatusCode::BAD_GATEWAY);
    assert_eq!(response.json()["error"]["code"], json!("QD-4001"));
}

#[tokio::test]
async fn test_health_ready_and_metrics() {
    let warehouse = Arc::new(StubWarehouse::default());
    let app = app(&warehouse);

    assert_eq!(get(&app, "/health").await.json(), json!({"status": "ok"}));
    let ready = get(&app, "/ready").await.json();
    assert_eq!(ready["status"], json!("ready"));
    assert!(ready["queries"].as_u64().unwrap() > 0);

    get(&app, PRODUCT_QUERY).await;
    get(&app, PRODUCT_QUERY).await;
    get(&app, "/api/v1/query?queryName=productBySales").await;

    let metrics = get(&app, "/metrics").await;
    assert_eq!(metrics.status, StatusCode::OK);
    assert!(metrics.content_type.as_ref().unwrap().starts_with("text/plain"));
    let text = metrics.text();
    assert!(text.contains("querydeck_queries_total 3"));
    assert!(text.contains("querydeck_cache_hits_total 1"));
    assert!(text.contains("querydeck_query_errors_total 1"));
    assert!(text.contains("querydeck_active_queries 0"));
}
