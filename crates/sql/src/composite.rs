//! Bundled queries: several members executed as one `UNION ALL` statement,
//! each branch folding its rows into a JSON array.

use crate::error::TemplateError;
use crate::render::{render, SlotValues, TailOverrides};
use crate::sanitize::{is_plain_identifier, validate_identifier};
use crate::template::Template;
use querydeck_common::models::Row;
use serde_json::{Map, Value};

/// Column carrying the member name in each branch.
pub const NAME_COLUMN: &str = "queryName";
/// Column carrying the member's rows as JSON text.
pub const RESULTS_COLUMN: &str = "results";

/// Member names are spliced into SQL as string literals.
pub fn validate_member_name(name: &str) -> Result<(), TemplateError> {
    validate_identifier(name)?;
    if is_plain_identifier(name) {
        Ok(())
    } else {
        Err(TemplateError::InvalidIdentifier(format!(
            "composite member name: {}",
            name
        )))
    }
}

/// Renders every member with `scope_clause` in each slot and unions the
/// branches.
pub fn build_composite(
    name: &str,
    members: &[(&str, &Template)],
    scope_clause: &str,
) -> Result<String, TemplateError> {
    if members.is_empty() {
        return Err(TemplateError::EmptyComposite(name.to_string()));
    }

    let slots = SlotValues::uniform(scope_clause);
    let branches = members
        .iter()
        .map(|(member, template)| {
            validate_member_name(member)?;
            let sub = render(template, &slots, TailOverrides::default());
            let agg = match template.order_by_tail().and_then(aggregate_order) {
                Some(keys) => format!("ARRAY_AGG(t ORDER BY {keys})"),
                None => "ARRAY_AGG(t)".to_string(),
            };
            Ok(format!(
                "SELECT '{member}' AS {NAME_COLUMN}, TO_JSON_STRING({agg}) AS {RESULTS_COLUMN} FROM (\n{sub}\n) AS t"
            ))
        })
        .collect::<Result<Vec<_>, TemplateError>>()?;

    Ok(branches.join("\nUNION ALL\n"))
}

/// `ARRAY_AGG` ignores subquery order, so a member's `ORDER BY` is repeated
/// inside the aggregate. Keys must be plain columns with an optional
/// direction; a qualifier is dropped since only output columns are in scope.
/// Anything else leaves the array unordered.
fn aggregate_order(order_tail: &str) -> Option<String> {
    let keys = order_tail
        .get(..8)
        .filter(|head| head.eq_ignore_ascii_case("ORDER BY"))
        .map(|_| &order_tail[8..])?;

    keys.split(',')
        .map(|key| {
            let mut tokens = key.split_whitespace();
            let column = tokens.next()?.rsplit('.').next()?;
            if !is_plain_identifier(column) {
                return None;
            }
            match (tokens.next(), tokens.next()) {
                (None, _) => Some(column.to_string()),
                (Some(dir), None)
                    if dir.eq_ignore_ascii_case("ASC") || dir.eq_ignore_ascii_case("DESC") =>
                {
                    Some(format!("{} {}", column, dir.to_ascii_uppercase()))
                }
                _ => None,
            }
        })
        .collect::<Option<Vec<_>>>()
        .map(|keys| keys.join(", "))
}

/// Turns `(queryName, results)` rows into `{member: [rows...]}`.
///
/// Every declared member is present; an empty branch (no row, NULL, `"null"`
/// or empty text) decodes to `[]`. Rows naming an undeclared member are kept.
pub fn decode_composite(
    members: &[&str],
    rows: &[Row],
) -> Result<Map<String, Value>, TemplateError> {
    let mut out: Map<String, Value> = members
        .iter()
        .map(|name| (name.to_string(), Value::Array(Vec::new())))
        .collect();

    for row in rows {
        let name = match row.get(NAME_COLUMN) {
            Some(Value::String(name)) => name.clone(),
            other => {
                return Err(TemplateError::MalformedResult(format!(
                    "expected string {} column, got {}",
                    NAME_COLUMN,
                    other.map_or("nothing".to_string(), Value::to_string)
                )))
            }
        };
        let rows = decode_results(&name, row.get(RESULTS_COLUMN))?;
        out.insert(name, Value::Array(rows));
    }

    Ok(out)
}

fn decode_results(name: &str, value: Option<&Value>) -> Result<Vec<Value>, TemplateError> {
    match value {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::Array(items)) => Ok(items.clone()),
        Some(Value::String(text)) => {
            let text = text.trim();
            if text.is_empty() || text == "null" {
                return Ok(Vec::new());
            }
            match serde_json::from_str::<Value>(text) {
                Ok(Value::Array(items)) => Ok(items),
                Ok(other) => Err(TemplateError::MalformedResult(format!(
                    "{} results are not a JSON array: {}",
                    name, other
                ))),
                Err(e) => Err(TemplateError::MalformedResult(format!(
                    "{} results are not valid JSON: {}",
                    name, e
                ))),
            }
        }
        Some(other) => Err(TemplateError::MalformedResult(format!(
            "{} results have unexpected type: {}",
            name, other
        ))),
    }
}
