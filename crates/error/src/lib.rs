//! # querydeck-error
//!
//! Unified error types for the QueryDeck query service.
//!
//! Every error carries:
//! - A stable numeric code (QD-XXXX)
//! - Structured JSON context
//! - An optional hint the caller can act on

mod code;
mod context;
mod convert;

pub use code::{ErrorCategory, ErrorCode};
pub use context::ErrorContext;
pub use convert::find_closest_match;

use serde::{Deserialize, Serialize};
use std::fmt;

/// The unified error type for all QueryDeck operations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryDeckError {
    /// Numeric error code (e.g., "QD-2001")
    pub code: ErrorCode,

    /// Human-readable error message
    pub message: String,

    /// Structured context for programmatic handling
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<ErrorContext>,

    /// Suggestion for self-correction
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

impl QueryDeckError {
    /// Create a new error with code and message
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            context: None,
            hint: None,
        }
    }

    /// Add structured context
    pub fn with_context(mut self, context: ErrorContext) -> Self {
        self.context = Some(context);
        self
    }

    /// Add a hint
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    /// The required `account_id` scope is absent or unusable.
    pub fn missing_scope(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::MissingScope, message)
            .with_hint("Pass the tenant's numeric account_id with every request")
    }

    /// No catalog entry matches `name`. Suggests the closest known name.
    pub fn unknown_query(name: &str, available: Vec<String>) -> Self {
        let hint = find_closest_match(name, &available);
        let mut err = Self::new(
            ErrorCode::UnknownQuery,
            format!("Invalid or missing query name '{}'", name),
        )
        .with_context(ErrorContext::UnknownQuery {
            query_name: name.to_string(),
            available_queries: available,
        });
        if let Some(closest) = hint {
            err = err.with_hint(format!("Did you mean '{}'?", closest));
        }
        err
    }

    /// True when the failure may succeed on a later attempt.
    pub fn is_transient(&self) -> bool {
        self.code.is_transient()
    }

    /// Serialize to JSON for API responses
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|e| {
            tracing::warn!("Failed to serialize QueryDeckError: {}", e);
            format!(
                r#"{{"code":"{}","message":"Serialization failed"}}"#,
                self.code
            )
        })
    }
}

impl fmt::Display for QueryDeckError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)?;
        if let Some(hint) = &self.hint {
            write!(f, " (Hint: {})", hint)?;
        }
        Ok(())
    }
}

impl std::error::Error for QueryDeckError {}

/// Result type alias for QueryDeck operations
pub type Result<T> = std::result::Result<T, QueryDeckError>;
