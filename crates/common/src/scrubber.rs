use crate::models::{BoundParams, ParamValue};
use once_cell::sync::Lazy;
use regex::Regex;

// Best-effort regex masking for values that end up in logs. Not a guarantee.
static EMAIL_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)[A-Z0-9._%+-]+@[A-Z0-9.-]+\.[A-Z]{2,}").unwrap());

static SSN_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b\d{3}-\d{2}-\d{4}\b").unwrap());

static CREDIT_CARD_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(?:\d[ -]*?){13,16}\b").unwrap());

static PHONE_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?:\+?1[-. ]?)?\(?\d{3}\)?[-. ]?\d{3}[-. ]?\d{4}").unwrap());

pub fn scrub(input: &str) -> String {
    let scrubbed = EMAIL_REGEX.replace_all(input, "[EMAIL]");
    let scrubbed = SSN_REGEX.replace_all(&scrubbed, "[SSN]");
    let scrubbed = CREDIT_CARD_REGEX.replace_all(&scrubbed, "[CREDIT_CARD]");
    PHONE_REGEX.replace_all(&scrubbed, "[PHONE]").into_owned()
}

/// Render bound parameters for a log line, masking PII in string values.
/// Numeric values are emitted as-is.
pub fn scrub_params(params: &BoundParams) -> String {
    let rendered: Vec<String> = params
        .iter()
        .map(|(name, value)| match value {
            ParamValue::String(s) => format!("{}={:?}", name, scrub(s)),
            other => format!("{}={}", name, other.to_wire_string()),
        })
        .collect();
    format!("{{{}}}", rendered.join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scrub_email() {
        assert_eq!(scrub("contact jane@example.com"), "contact [EMAIL]");
    }

    #[test]
    fn test_scrub_ssn() {
        assert_eq!(scrub("ssn 123-45-6789"), "ssn [SSN]");
    }

    #[test]
    fn test_scrub_credit_card() {
        assert_eq!(
            scrub("The card number is 1234-5678-9012-3456."),
            "The card number is [CREDIT_CARD]."
        );
    }

    #[test]
    fn test_scrub_phone() {
        assert_eq!(
            scrub("Call me at 123-456-7890 or (555) 123-4567"),
            "Call me at [PHONE] or [PHONE]"
        );
    }

    #[test]
    fn test_scrub_params_masks_strings_only() {
        let mut params = BoundParams::new();
        params.insert("account_id".to_string(), ParamValue::Int64(1229370));
        params.insert(
            "customer_email".to_string(),
            ParamValue::String("bob@shop.io".to_string()),
        );
        params.insert("startDate".to_string(), ParamValue::from("2025-10-01"));

        assert_eq!(
            scrub_params(&params),
            r#"{account_id=1229370, customer_email="[EMAIL]", startDate="2025-10-01"}"#
        );
    }
}
