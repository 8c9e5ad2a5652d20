use serde::{Deserialize, Serialize};
use std::fmt;

/// Numeric error codes following QD-XXXX format.
///
/// ## Code Ranges
/// - **1000-1999**: Request validation errors
/// - **2000-2999**: Query composition errors
/// - **3000-3999**: Configuration errors
/// - **4000-4999**: Warehouse errors
/// - **5000-5999**: Internal/System errors
///
/// Codes are stable across versions (semver contract).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
#[non_exhaustive]
pub enum ErrorCode {
    // === Request Errors (1000-1999) ===
    /// QD-1001: Tenant scope (account_id) missing or unusable
    MissingScope = 1001,
    /// QD-1002: Request parameter rejected at the boundary
    InvalidParameter = 1002,

    // === Query Errors (2000-2999) ===
    /// QD-2001: Logical query name not in catalog
    UnknownQuery = 2001,
    /// QD-2002: Table identifier is not `dataset.table`
    MalformedTableIdentifier = 2002,
    /// QD-2003: No table identifier found in template
    TableNotDetected = 2003,
    /// QD-2004: Template failed to parse or references unknown slots
    InvalidTemplate = 2004,

    // === Configuration Errors (3000-3999) ===
    /// QD-3001: Configuration or catalog document invalid
    InvalidConfig = 3001,

    // === Warehouse Errors (4000-4999) ===
    /// QD-4001: Table metadata could not be fetched
    SchemaUnavailable = 4001,
    /// QD-4002: Warehouse rejected or failed the query
    ExecutionFailure = 4002,
    /// QD-4003: Warehouse response could not be decoded
    MalformedResult = 4003,

    // === Internal Errors (5000-5999) ===
    /// QD-5001: Serialization/deserialization failed
    SerializationFailed = 5001,
    /// QD-5002: Unexpected internal state
    Internal = 5002,

    /// QD-9999: Unknown/unclassified error
    Unknown = 9999,
}

/// Error categories for grouping
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    Request,
    Query,
    Config,
    Warehouse,
    Internal,
}

impl ErrorCode {
    /// Get the numeric code value
    pub fn as_u16(&self) -> u16 {
        *self as u16
    }

    /// Get the formatted code string (e.g., "QD-2001")
    pub fn as_str(&self) -> String {
        format!("QD-{:04}", self.as_u16())
    }

    /// Get the error category
    pub fn category(&self) -> ErrorCategory {
        match self.as_u16() {
            1000..=1999 => ErrorCategory::Request,
            2000..=2999 => ErrorCategory::Query,
            3000..=3999 => ErrorCategory::Config,
            4000..=4999 => ErrorCategory::Warehouse,
            _ => ErrorCategory::Internal,
        }
    }

    /// Only warehouse round trips are expected to be transient. The core
    /// never retries; the flag informs callers.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::SchemaUnavailable | Self::ExecutionFailure)
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl From<ErrorCode> for String {
    fn from(code: ErrorCode) -> String {
        code.as_str()
    }
}

impl TryFrom<String> for ErrorCode {
    type Error = String;

    fn try_from(s: String) -> std::result::Result<Self, Self::Error> {
        let num: u16 = s
            .strip_prefix("QD-")
            .and_then(|n| n.parse().ok())
            .ok_or_else(|| "Invalid format".to_string())?;
        Self::try_from(num).map_err(|_| "Unknown code".to_string())
    }
}

impl TryFrom<u16> for ErrorCode {
    type Error = String;

    fn try_from(n: u16) -> std::result::Result<Self, Self::Error> {
        match n {
            1001 => Ok(Self::MissingScope),
            1002 => Ok(Self::InvalidParameter),
            2001 => Ok(Self::UnknownQuery),
            2002 => Ok(Self::MalformedTableIdentifier),
            2003 => Ok(Self::TableNotDetected),
            2004 => Ok(Self::InvalidTemplate),
            3001 => Ok(Self::InvalidConfig),
            4001 => Ok(Self::SchemaUnavailable),
            4002 => Ok(Self::ExecutionFailure),
            4003 => Ok(Self::MalformedResult),
            5001 => Ok(Self::SerializationFailed),
            5002 => Ok(Self::Internal),
            9999 => Ok(Self::Unknown),
            _ => Err(format!("Unknown error code: {}", n)),
        }
    }
}
