use querydeck_error::{ErrorCode, ErrorContext, QueryDeckError};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TemplateError {
    #[error("Unterminated {what} starting at byte {offset}")]
    Unterminated { what: &'static str, offset: usize },

    #[error("Unknown slot '{{{{{0}}}}}'")]
    UnknownSlot(String),

    #[error("Slot '{0}' appears inside the trailing ORDER BY/LIMIT clause")]
    SlotInTail(String),

    #[error("Template contains more than one statement")]
    MultipleStatements,

    #[error("Unable to detect table name in template")]
    TableNotDetected,

    #[error("Invalid table identifier: {0}. Expected format dataset.table")]
    MalformedTableIdentifier(String),

    #[error("Invalid identifier: {0}")]
    InvalidIdentifier(String),

    #[error("Composite '{0}' has no members")]
    EmptyComposite(String),

    #[error("Malformed composite result: {0}")]
    MalformedResult(String),
}

impl TemplateError {
    pub fn to_querydeck_error(self, query_name: &str) -> QueryDeckError {
        let message = self.to_string();
        match self {
            TemplateError::TableNotDetected => {
                QueryDeckError::new(ErrorCode::TableNotDetected, message)
                    .with_context(ErrorContext::Table {
                        query_name: Some(query_name.to_string()),
                        table_id: None,
                    })
                    .with_hint("Wrap the dataset.table reference in backticks")
            }
            TemplateError::MalformedTableIdentifier(table_id) => {
                QueryDeckError::new(ErrorCode::MalformedTableIdentifier, message)
                    .with_context(ErrorContext::Table {
                        query_name: Some(query_name.to_string()),
                        table_id: Some(table_id),
                    })
                    .with_hint("Expected format dataset.table")
            }
            TemplateError::MalformedResult(_) => {
                QueryDeckError::new(ErrorCode::MalformedResult, message).with_context(
                    ErrorContext::Warehouse {
                        operation: format!("decode composite '{}'", query_name),
                        location: None,
                        status: None,
                    },
                )
            }
            TemplateError::UnknownSlot(ref slot) | TemplateError::SlotInTail(ref slot) => {
                let slot = Some(slot.clone());
                QueryDeckError::new(ErrorCode::InvalidTemplate, message.clone())
                    .with_context(ErrorContext::Template {
                        query_name: query_name.to_string(),
                        slot,
                        reason: message,
                    })
                    .with_hint("Known slots are {{where_clause}} and {{account_id_clause}}")
            }
            _ => QueryDeckError::new(ErrorCode::InvalidTemplate, message.clone()).with_context(
                ErrorContext::Template {
                    query_name: query_name.to_string(),
                    slot: None,
                    reason: message,
                },
            ),
        }
    }
}
