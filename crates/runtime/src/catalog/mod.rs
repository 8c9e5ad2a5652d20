//! The query catalog: logical query names mapped to parsed templates or to
//! bundles of other queries.
//!
//! Catalogs are YAML documents:
//!
//! ```yaml
//! queries:
//!   productBySales:
//!     description: Sales per product
//!     sql: |
//!       SELECT ... FROM `dataset.table` WHERE ... {{where_clause}}
//! composites:
//!   timeSeriesMetrics:
//!     members: [addRevenueTotalSalesTrend, acosTacosTrend]
//! ```
//!
//! Everything is validated at load time, so a running catalog never holds an
//! unparseable template or a dangling bundle member.

use querydeck_error::{ErrorCode, ErrorContext, QueryDeckError, Result};
use querydeck_sql::{validate_member_name, TemplateError, Template};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

const BUILTIN_CATALOG: &str = include_str!("queries.yaml");

#[derive(Debug, Clone)]
pub struct FixedQuery {
    pub name: String,
    pub description: Option<String>,
    pub template: Template,
}

#[derive(Debug, Clone)]
pub struct CompositeQuery {
    pub name: String,
    pub description: Option<String>,
    /// Members in declaration order.
    pub members: Vec<Arc<FixedQuery>>,
}

impl CompositeQuery {
    pub fn member_names(&self) -> Vec<&str> {
        self.members.iter().map(|m| m.name.as_str()).collect()
    }
}

#[derive(Debug, Clone)]
pub enum QueryDefinition {
    Fixed(Arc<FixedQuery>),
    Composite(Arc<CompositeQuery>),
}

impl QueryDefinition {
    pub fn name(&self) -> &str {
        match self {
            QueryDefinition::Fixed(q) => &q.name,
            QueryDefinition::Composite(c) => &c.name,
        }
    }
}

/// Listing entry for one catalog name.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuerySummary {
    pub name: String,
    pub kind: QueryKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub table: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub members: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryKind {
    Fixed,
    Composite,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct CatalogDocument {
    #[serde(default)]
    queries: BTreeMap<String, QueryEntry>,
    #[serde(default)]
    composites: BTreeMap<String, CompositeEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct QueryEntry {
    sql: String,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct CompositeEntry {
    members: Vec<String>,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Debug, Clone)]
pub struct QueryCatalog {
    entries: BTreeMap<String, QueryDefinition>,
}

impl QueryCatalog {
    /// The catalog compiled into the binary.
    pub fn builtin() -> Result<Self> {
        Self::from_yaml_str(BUILTIN_CATALOG)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            QueryDeckError::new(
                ErrorCode::InvalidConfig,
                format!("Failed to read query catalog {}: {}", path.display(), e),
            )
            .with_context(ErrorContext::Config {
                file_path: Some(path.display().to_string()),
                field: None,
            })
        })?;
        Self::from_yaml_str(&text).map_err(|mut e| {
            let file = Some(path.display().to_string());
            match e.context {
                Some(ErrorContext::Config {
                    ref mut file_path, ..
                }) => *file_path = file,
                None if e.code == ErrorCode::InvalidConfig => {
                    e.context = Some(ErrorContext::Config {
                        file_path: file,
                        field: None,
                    });
                }
                _ => {}
            }
            e
        })
    }

    pub fn from_yaml_str(text: &str) -> Result<Self> {
        let document: CatalogDocument = serde_yaml::from_str(text)?;
        let mut entries = BTreeMap::new();

        for (name, entry) in document.queries {
            let template =
                Template::parse(&entry.sql).map_err(|e| e.to_querydeck_error(&name))?;
            if template.slots().next().is_none() {
                return Err(invalid_template(
                    &name,
                    "Template has no {{where_clause}} or {{account_id_clause}} slot, so the account scope cannot be applied",
                ));
            }
            let query = FixedQuery {
                name: name.clone(),
                description: entry.description,
                template,
            };
            entries.insert(name, QueryDefinition::Fixed(Arc::new(query)));
        }

        for (name, entry) in document.composites {
            if entries.contains_key(&name) {
                return Err(QueryDeckError::new(
                    ErrorCode::InvalidConfig,
                    format!("'{}' is defined both as a query and as a composite", name),
                ));
            }
            if entry.members.is_empty() {
                return Err(TemplateError::EmptyComposite(name.clone()).to_querydeck_error(&name));
            }

            let mut members = Vec::with_capacity(entry.members.len());
            for member in &entry.members {
                validate_member_name(member).map_err(|e| e.to_querydeck_error(&name))?;
                match entries.get(member) {
                    Some(QueryDefinition::Fixed(query)) => members.push(Arc::clone(query)),
                    _ => {
                        return Err(invalid_template(
                            &name,
                            &format!("Composite member '{}' is not a defined query", member),
                        ))
                    }
                }
            }

            let composite = CompositeQuery {
                name: name.clone(),
                description: entry.description,
                members,
            };
            entries.insert(name, QueryDefinition::Composite(Arc::new(composite)));
        }

        Ok(Self { entries })
    }

    /// Finds a query by its logical name.
    pub fn lookup(&self, name: &str) -> Result<&QueryDefinition> {
        self.entries
            .get(name)
            .ok_or_else(|| QueryDeckError::unknown_query(name, self.names()))
    }

    /// All logical names, sorted.
    pub fn names(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn summaries(&self) -> Vec<QuerySummary> {
        self.entries
            .values()
            .map(|definition| match definition {
                QueryDefinition::Fixed(q) => QuerySummary {
                    name: q.name.clone(),
                    kind: QueryKind::Fixed,
                    description: q.description.clone(),
                    table: q.template.table_ref().map(str::to_string),
                    members: Vec::new(),
                },
                QueryDefinition::Composite(c) => QuerySummary {
                    name: c.name.clone(),
                    kind: QueryKind::Composite,
                    description: c.description.clone(),
                    table: None,
                    members: c.members.iter().map(|m| m.name.clone()).collect(),
                },
            })
            .collect()
    }
}

fn invalid_template(query_name: &str, reason: &str) -> QueryDeckError {
    QueryDeckError::new(ErrorCode::InvalidTemplate, reason.to_string()).with_context(
        ErrorContext::Template {
            query_name: query_name.to_string(),
            slot: None,
            reason: reason.to_string(),
        },
    )
}
