//! Compiles loosely-typed request parameters into bound SQL clauses.
//!
//! Nothing here fails. Unknown columns, empty values, bad sort directions and
//! unparsable paging all degrade to a smaller query.

use crate::sanitize::safe_column;
use querydeck_common::models::{BoundParams, ParamValue, SchemaField};
use std::collections::BTreeMap;
use tracing::warn;

/// Request keys that are never treated as column filters.
pub const RESERVED_KEYS: [&str; 8] = [
    "queryName",
    "startDate",
    "endDate",
    "page",
    "pageSize",
    "sortBy",
    "sortOrder",
    "account_id",
];

/// Parameter names the compiler binds itself.
const PAGING_PARAMS: [&str; 2] = ["limit", "offset"];

pub fn is_reserved_key(key: &str) -> bool {
    RESERVED_KEYS.contains(&key)
}

/// A caller-supplied filter value after boundary validation.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterValue {
    Text(String),
    /// A finite number. `literal` keeps the caller's text for STRING columns.
    Number { value: f64, literal: String },
    Missing,
}

impl FilterValue {
    /// Only the empty string is `Missing`; "0" and "false" are real values.
    pub fn from_raw(raw: &str) -> Self {
        if raw.is_empty() {
            return FilterValue::Missing;
        }
        match raw.trim().parse::<f64>() {
            Ok(value) if value.is_finite() => FilterValue::Number {
                value,
                literal: raw.to_string(),
            },
            _ => FilterValue::Text(raw.to_string()),
        }
    }

    fn raw_text(&self) -> Option<&str> {
        match self {
            FilterValue::Text(text) => Some(text),
            FilterValue::Number { literal, .. } => Some(literal),
            FilterValue::Missing => None,
        }
    }

    /// Binding for an equality predicate: integral numbers become INT64.
    fn equality_param(&self) -> Option<ParamValue> {
        match self {
            FilterValue::Text(text) => Some(ParamValue::String(text.clone())),
            FilterValue::Number { value, literal } => Some(
                match literal.trim().parse::<i64>() {
                    Ok(int) => ParamValue::Int64(int),
                    Err(_) if value.fract() == 0.0 && value.abs() < MAX_SAFE_INTEGER => {
                        ParamValue::Int64(*value as i64)
                    }
                    Err(_) => ParamValue::Float64(*value),
                },
            ),
            FilterValue::Missing => None,
        }
    }
}

const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_992.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    /// Exactly `asc` or `desc`, any case. Everything else sorts descending.
    pub fn parse(raw: Option<&str>) -> Self {
        match raw {
            Some(s) if s.eq_ignore_ascii_case("asc") => SortDirection::Asc,
            _ => SortDirection::Desc,
        }
    }

    pub fn as_sql(&self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Paging {
    pub limit: i64,
    pub offset: i64,
}

impl Paging {
    /// Both values must be positive integers and the offset must fit in i64.
    pub fn parse(page: Option<&str>, page_size: Option<&str>) -> Option<Self> {
        let page = parse_positive(page?)?;
        let limit = parse_positive(page_size?)?;
        let offset = (page - 1).checked_mul(limit)?;
        Some(Paging { limit, offset })
    }
}

fn parse_positive(raw: &str) -> Option<i64> {
    raw.trim().parse::<i64>().ok().filter(|n| *n > 0)
}

/// Filter, sort and paging input for one request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClauseRequest {
    pub filters: BTreeMap<String, FilterValue>,
    pub sort_by: Option<String>,
    pub sort_order: Option<String>,
    pub page: Option<String>,
    pub page_size: Option<String>,
}

impl ClauseRequest {
    /// Splits a flat request into filters and the sort/paging keys.
    pub fn from_raw(raw: &BTreeMap<String, String>) -> Self {
        let get = |key: &str| raw.get(key).cloned();
        Self {
            filters: raw
                .iter()
                .filter(|(key, _)| !is_reserved_key(key))
                .map(|(key, value)| (key.clone(), FilterValue::from_raw(value)))
                .collect(),
            sort_by: get("sortBy"),
            sort_order: get("sortOrder"),
            page: get("page"),
            page_size: get("pageSize"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompiledClauses {
    /// Caller filter predicates, each with a leading `AND`. Empty if none.
    pub where_fragment: String,
    /// `ORDER BY <col> <dir>` when a valid sort column was supplied.
    pub order_fragment: Option<String>,
    pub params: BoundParams,
    pub paging: Option<Paging>,
}

impl CompiledClauses {
    /// The scope predicate followed by the caller's filters.
    pub fn scoped_where(&self, scope_clause: &str) -> String {
        if self.where_fragment.is_empty() {
            scope_clause.to_string()
        } else {
            format!("{} {}", scope_clause, self.where_fragment)
        }
    }

    /// Paging bindings, present only when paging was requested.
    pub fn paging_params(&self) -> BoundParams {
        self.paging
            .map(|p| {
                BoundParams::from([
                    ("limit".to_string(), ParamValue::Int64(p.limit)),
                    ("offset".to_string(), ParamValue::Int64(p.offset)),
                ])
            })
            .unwrap_or_default()
    }
}

pub fn compile(request: &ClauseRequest, fields: &[SchemaField]) -> CompiledClauses {
    let columns = allowed_columns(fields);

    let mut predicates = Vec::new();
    let mut params = BoundParams::new();
    for (key, value) in &request.filters {
        if is_reserved_key(key) {
            continue;
        }
        let Some(field) = columns.get(key.as_str()) else {
            continue;
        };
        let Some(raw) = value.raw_text() else {
            continue;
        };

        if field.field_type.is_string() {
            predicates.push(format!("AND {} LIKE @{}", key, key));
            params.insert(key.clone(), ParamValue::String(format!("%{}%", raw)));
        } else if let Some(param) = value.equality_param() {
            predicates.push(format!("AND {} = @{}", key, key));
            params.insert(key.clone(), param);
        }
    }

    let order_fragment = request
        .sort_by
        .as_deref()
        .filter(|col| columns.contains_key(col))
        .map(|col| {
            let direction = SortDirection::parse(request.sort_order.as_deref());
            format!("ORDER BY {} {}", col, direction.as_sql())
        });

    CompiledClauses {
        where_fragment: predicates.join(" "),
        order_fragment,
        params,
        paging: Paging::parse(request.page.as_deref(), request.page_size.as_deref()),
    }
}

/// Schema columns usable as filter/sort keys. Names that are not plain SQL
/// identifiers, or that collide with the paging parameters, are dropped.
fn allowed_columns(fields: &[SchemaField]) -> BTreeMap<&str, &SchemaField> {
    fields
        .iter()
        .filter(|field| {
            if PAGING_PARAMS
                .iter()
                .any(|p| field.name.eq_ignore_ascii_case(p))
            {
                return false;
            }
            match safe_column(&field.name) {
                Ok(_) => true,
                Err(e) => {
                    warn!(target: "queries", column = %field.name, "Skipping unsafe column: {}", e);
                    false
                }
            }
        })
        .map(|field| (field.name.as_str(), field))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use querydeck_common::models::FieldType;

    fn fields() -> Vec<SchemaField> {
        vec![
            SchemaField::new("sku", FieldType::String),
            SchemaField::new("units", FieldType::Int64),
            SchemaField::new("price", FieldType::Float64),
            SchemaField::new("report_date", FieldType::Date),
            SchemaField::new("total_sales", FieldType::Float64),
        ]
    }

    fn request(pairs: &[(&str, &str)]) -> ClauseRequest {
        let raw: BTreeMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ClauseRequest::from_raw(&raw)
    }

    #[test]
    fn test_filter_value_classification() {
        assert_eq!(FilterValue::from_raw(""), FilterValue::Missing);
        assert_eq!(
            FilterValue::from_raw("0"),
            FilterValue::Number {
                value: 0.0,
                literal: "0".to_string()
            }
        );
        assert_eq!(
            FilterValue::from_raw("false"),
            FilterValue::Text("false".to_string())
        );
        assert_eq!(
            FilterValue::from_raw("NaN"),
            FilterValue::Text("NaN".to_string())
        );
        assert_eq!(
            FilterValue::from_raw("inf"),
            FilterValue::Text("inf".to_string())
        );
    }

    #[test]
    fn test_string_column_uses_like() {
        let compiled = compile(&request(&[("sku", "ABC")]), &fields());
        assert_eq!(compiled.where_fragment, "AND sku LIKE @sku");
        assert_eq!(compiled.params["sku"], ParamValue::String("%ABC%".into()));
    }

    #[test]
    fn test_numeric_string_on_string_column_keeps_literal() {
        let compiled = compile(&request(&[("sku", "007")]), &fields());
        assert_eq!(compiled.params["sku"], ParamValue::String("%007%".into()));
    }

    #[test]
    fn test_non_string_column_uses_equality() {
        let compiled = compile(
            &request(&[("units", "12"), ("price", "9.5"), ("report_date", "2025-10-02")]),
            &fields(),
        );
        assert_eq!(
            compiled.where_fragment,
            "AND price = @price AND report_date = @report_date AND units = @units"
        );
        assert_eq!(compiled.params["units"], ParamValue::Int64(12));
        assert_eq!(compiled.params["price"], ParamValue::Float64(9.5));
        assert_eq!(
            compiled.params["report_date"],
            ParamValue::String("2025-10-02".into())
        );
    }

    #[test]
    fn test_zero_is_a_real_filter() {
        let compiled = compile(&request(&[("units", "0")]), &fields());
        assert_eq!(compiled.params["units"], ParamValue::Int64(0));
    }

    #[test]
    fn test_empty_value_is_skipped() {
        let compiled = compile(&request(&[("sku", "")]), &fields());
        assert!(compiled.where_fragment.is_empty());
        assert!(compiled.params.is_empty());
    }

    #[test]
    fn test_unknown_and_reserved_keys_dropped() {
        let compiled = compile(
            &request(&[
                ("bogus", "1; DROP TABLE x"),
                ("account_id", "5"),
                ("startDate", "2025-01-01"),
            ]),
            &fields(),
        );
        assert_eq!(compiled, CompiledClauses::default());
    }

    #[test]
    fn test_unsafe_schema_columns_never_emitted() {
        let fields = vec![
            SchemaField::new("bad name", FieldType::String),
            SchemaField::new("limit", FieldType::Int64),
        ];
        let mut req = request(&[("limit", "3")]);
        req.filters
            .insert("bad name".to_string(), FilterValue::Text("x".into()));
        req.sort_by = Some("bad name".to_string());
        let compiled = compile(&req, &fields);
        assert!(compiled.where_fragment.is_empty());
        assert!(compiled.order_fragment.is_none());
    }

    #[test]
    fn test_sort_direction() {
        let compiled = compile(
            &request(&[("sortBy", "total_sales"), ("sortOrder", "ASC")]),
            &fields(),
        );
        assert_eq!(
            compiled.order_fragment.as_deref(),
            Some("ORDER BY total_sales ASC")
        );

        let compiled = compile(
            &request(&[("sortBy", "total_sales"), ("sortOrder", "sideways")]),
            &fields(),
        );
        assert_eq!(
            compiled.order_fragment.as_deref(),
            Some("ORDER BY total_sales DESC")
        );

        let compiled = compile(&request(&[("sortBy", "nope")]), &fields());
        assert!(compiled.order_fragment.is_none());
    }

    #[test]
    fn test_paging() {
        assert_eq!(
            Paging::parse(Some("2"), Some("10")),
            Some(Paging {
                limit: 10,
                offset: 10
            })
        );
        assert_eq!(
            Paging::parse(Some("1"), Some("25")),
            Some(Paging {
                limit: 25,
                offset: 0
            })
        );
        assert_eq!(Paging::parse(Some("0"), Some("10")), None);
        assert_eq!(Paging::parse(Some("2"), None), None);
        assert_eq!(Paging::parse(Some("two"), Some("10")), None);
        assert_eq!(Paging::parse(Some("-1"), Some("10")), None);
        assert_eq!(
            Paging::parse(Some(&i64::MAX.to_string()), Some("10")),
            None
        );
    }

    #[test]
    fn test_scoped_where() {
        let compiled = compile(&request(&[("sku", "A")]), &fields());
        assert_eq!(
            compiled.scoped_where("AND account_id = @account_id"),
            "AND account_id = @account_id AND sku LIKE @sku"
        );
        assert_eq!(
            CompiledClauses::default().scoped_where("AND account_id = @account_id"),
            "AND account_id = @account_id"
        );
    }
}
