use querydeck_error::{ErrorCode, ErrorContext, QueryDeckError};
use serde_json::Value;

#[test]
fn test_json_serialization() {
    let error = QueryDeckError::new(
        ErrorCode::MalformedTableIdentifier,
        "Invalid table identifier: product_summary",
    )
    .with_context(ErrorContext::Table {
        query_name: Some("productSummary".to_string()),
        table_id: Some("product_summary".to_string()),
    })
    .with_hint("Expected format dataset.table");

    let json = error.to_json();
    let v: Value = serde_json::from_str(&json).expect("valid json");

    assert_eq!(v["code"], "QD-2002");
    assert_eq!(v["message"], "Invalid table identifier: product_summary");
    assert_eq!(v["hint"], "Expected format dataset.table");
    assert_eq!(v["context"]["type"], "table");
    assert_eq!(v["context"]["table_id"], "product_summary");
}

#[test]
fn test_error_roundtrip_preserves_code() {
    let error = QueryDeckError::new(ErrorCode::ExecutionFailure, "quota exceeded");
    let back: QueryDeckError = serde_json::from_str(&error.to_json()).unwrap();
    assert_eq!(back.code, ErrorCode::ExecutionFailure);
    assert_eq!(back.message, "quota exceeded");
}

#[test]
fn test_error_code_parsing() {
    let code: ErrorCode = "QD-1001".to_string().try_into().unwrap();
    assert_eq!(code, ErrorCode::MissingScope);
}
