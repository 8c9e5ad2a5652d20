use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// Cache key for a request: SHA-256 over the query name and every effective
/// parameter, serialized in key order.
///
/// `BTreeMap` iteration order makes the serialization canonical, so the same
/// parameters always produce the same key regardless of how they arrived.
pub fn fingerprint(query_name: &str, params: &BTreeMap<String, String>) -> String {
    let canonical = serde_json::json!({
        "queryName": query_name,
        "params": params,
    });

    let mut hasher = Sha256::new();
    hasher.update(canonical.to_string().as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_same_request_same_key() {
        let a = params(&[("account_id", "1"), ("sku", "A")]);
        let b = params(&[("sku", "A"), ("account_id", "1")]);
        assert_eq!(fingerprint("q", &a), fingerprint("q", &b));
        assert_eq!(fingerprint("q", &a).len(), 64);
    }

    #[test]
    fn test_any_difference_changes_key() {
        let base = params(&[("account_id", "1"), ("sku", "A")]);
        let other_value = params(&[("account_id", "1"), ("sku", "B")]);
        let extra_key = params(&[("account_id", "1"), ("sku", "A"), ("page", "1")]);

        let key = fingerprint("q", &base);
        assert_ne!(key, fingerprint("q", &other_value));
        assert_ne!(key, fingerprint("q", &extra_key));
        assert_ne!(key, fingerprint("other", &base));
    }

    #[test]
    fn test_no_delimiter_collisions() {
        let a = params(&[("a", "b=c")]);
        let b = params(&[("a=b", "c")]);
        assert_ne!(fingerprint("q", &a), fingerprint("q", &b));
    }
}
