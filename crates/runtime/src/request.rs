//! Boundary validation of the raw request parameters.

use querydeck_common::config::QueryDefaults;
use querydeck_error::{ErrorCode, ErrorContext, QueryDeckError, Result};
use std::collections::BTreeMap;

/// Parameters as received: every value is text.
pub type RawParams = BTreeMap<String, String>;

pub const ACCOUNT_ID: &str = "account_id";
pub const START_DATE: &str = "startDate";
pub const END_DATE: &str = "endDate";
pub const QUERY_NAME: &str = "queryName";

/// A request with its scope checked and the date window defaulted.
#[derive(Debug, Clone, PartialEq)]
pub struct EffectiveRequest {
    pub query_name: String,
    pub account_id: i64,
    pub start_date: String,
    pub end_date: String,
    /// The caller's parameters plus defaulted dates. This is what the cache
    /// fingerprint covers.
    pub params: RawParams,
}

impl EffectiveRequest {
    pub fn from_raw(query_name: &str, raw: &RawParams, defaults: &QueryDefaults) -> Result<Self> {
        let account_id = parse_scope(raw)?;

        let mut params = raw.clone();
        let start_date = date_param(&mut params, START_DATE, &defaults.start_date)?;
        let end_date = date_param(&mut params, END_DATE, &defaults.end_date)?;

        Ok(Self {
            query_name: query_name.trim().to_string(),
            account_id,
            start_date,
            end_date,
            params,
        })
    }
}

/// The tenant scope is mandatory and must be an integer, since it is bound as
/// INT64 in `account_id = @account_id`.
pub fn parse_scope(raw: &RawParams) -> Result<i64> {
    let value = raw
        .get(ACCOUNT_ID)
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| QueryDeckError::missing_scope("account_id is a required parameter"))?;

    value.parse::<i64>().map_err(|_| {
        QueryDeckError::missing_scope(format!(
            "account_id must be an integer, got '{}'",
            value
        ))
    })
}

/// Fills an absent or empty date with its default and checks the
/// `YYYY-MM-DD` shape.
fn date_param(params: &mut RawParams, key: &str, default: &str) -> Result<String> {
    let value = match params.get(key).map(|v| v.trim()) {
        Some(v) if !v.is_empty() => v.to_string(),
        _ => default.to_string(),
    };
    if !is_iso_date(&value) {
        return Err(QueryDeckError::new(
            ErrorCode::InvalidParameter,
            format!("{} must be a date in YYYY-MM-DD format, got '{}'", key, value),
        )
        .with_context(ErrorContext::Generic {
            data: [("parameter".to_string(), serde_json::json!(key))].into(),
        }));
    }
    params.insert(key.to_string(), value.clone());
    Ok(value)
}

fn is_iso_date(value: &str) -> bool {
    let bytes = value.as_bytes();
    bytes.len() == 10
        && bytes.iter().enumerate().all(|(i, b)| match i {
            4 | 7 => *b == b'-',
            _ => b.is_ascii_digit(),
        })
}
