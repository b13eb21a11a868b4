//! List-field codec: a semantic list of strings (tags, attachment paths)
//! stored as one JSON-array text column. An empty list is stored as NULL,
//! and anything unreadable decodes to an empty list instead of an error.

/// Encodes a list for storage. Empty list -> no stored value.
pub fn encode(values: &[String]) -> Option<String> {
    if values.is_empty() {
        return None;
    }
    // Serializing a Vec<String> cannot fail.
    serde_json::to_string(values).ok()
}

/// Decodes a stored value. Absent, blank, or malformed -> empty list.
pub fn decode(stored: Option<&str>) -> Vec<String> {
    match stored {
        Some(s) if !s.trim().is_empty() => serde_json::from_str(s).unwrap_or_default(),
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_list_roundtrip() {
        let encoded = encode(&[]);
        assert_eq!(encoded, None);
        assert_eq!(decode(encoded.as_deref()), Vec::<String>::new());
    }

    #[test]
    fn test_roundtrip_preserves_order() {
        let values = vec!["x".to_string(), "y".to_string()];
        let encoded = encode(&values);
        assert_eq!(encoded.as_deref(), Some(r#"["x","y"]"#));
        assert_eq!(decode(encoded.as_deref()), values);
    }

    #[test]
    fn test_absent_decodes_empty() {
        assert!(decode(None).is_empty());
    }

    #[test]
    fn test_blank_decodes_empty() {
        assert!(decode(Some("   ")).is_empty());
    }

    #[test]
    fn test_malformed_decodes_empty() {
        assert!(decode(Some("not json")).is_empty());
        assert!(decode(Some("{\"a\":1}")).is_empty());
        assert!(decode(Some("[1,2,3]")).is_empty());
    }
}
