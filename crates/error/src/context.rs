//! # Error Contexts
//!
//! Structured metadata attached to errors for programmatic handling.

use serde::{Deserialize, Serialize};

/// Structured context for machine-readable errors.
///
/// Each variant provides the fields relevant to that error type.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ErrorContext {
    /// Context for QD-2001 (UnknownQuery)
    UnknownQuery {
        query_name: String,
        available_queries: Vec<String>,
    },

    /// Context for QD-2002 / QD-2003 / QD-4001 (table resolution)
    Table {
        query_name: Option<String>,
        table_id: Option<String>,
    },

    /// Context for QD-2004 (InvalidTemplate)
    Template {
        query_name: String,
        slot: Option<String>,
        reason: String,
    },

    /// Context for warehouse round trips (QD-4001, 4002, 4003)
    Warehouse {
        operation: String,
        location: Option<String>,
        status: Option<u16>,
    },

    /// Context for QD-3001 (config errors)
    Config {
        file_path: Option<String>,
        field: Option<String>,
    },

    /// Generic key-value context for extensibility
    Generic {
        #[serde(flatten)]
        data: std::collections::HashMap<String, serde_json::Value>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_warehouse_context_serde_roundtrip() {
        let ctx = ErrorContext::Warehouse {
            operation: "jobs.query".to_string(),
            location: Some("us-west2".to_string()),
            status: Some(400),
        };

        let json = serde_json::to_string(&ctx).unwrap();
        assert!(json.contains("\"type\":\"warehouse\""));
        let de: ErrorContext = serde_json::from_str(&json).unwrap();

        match de {
            ErrorContext::Warehouse {
                operation, status, ..
            } => {
                assert_eq!(operation, "jobs.query");
                assert_eq!(status, Some(400));
            }
            _ => panic!("Wrong variant"),
        }
    }
}
