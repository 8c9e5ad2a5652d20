use crate::error::TemplateError;

pub fn validate_identifier(name: &str) -> Result<(), TemplateError> {
    if name.is_empty() {
        return Err(TemplateError::InvalidIdentifier("empty".to_string()));
    }
    if name.len() > 128 {
        return Err(TemplateError::InvalidIdentifier(format!(
            "too long: {}",
            name.len()
        )));
    }
    if name.contains(['"', '\'', '\x00', ';', '`', '\\']) {
        return Err(TemplateError::InvalidIdentifier(format!(
            "forbidden characters in: {}",
            name
        )));
    }
    Ok(())
}

/// `[A-Za-z_][A-Za-z0-9_]*`: safe to splice into SQL unquoted.
pub fn is_plain_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Column names reach the SQL text as bare identifiers and parameter names,
/// so both checks must pass.
pub fn safe_column(name: &str) -> Result<&str, TemplateError> {
    validate_identifier(name)?;
    if !is_plain_identifier(name) {
        return Err(TemplateError::InvalidIdentifier(format!(
            "not a plain identifier: {}",
            name
        )));
    }
    Ok(name)
}
