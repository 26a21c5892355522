//! Content fingerprints for change detection.
//!
//! A fingerprint is the SHA256 of a JSON object built from a declared,
//! ordered list of field names. The declared order drives serialization,
//! so two records with equal values always hash the same no matter how
//! their fields are stored in memory.

use sha2::{Digest, Sha256};

/// Serialize the declared fields as a JSON object, keys in declared order.
///
/// Values come from `value_of` and are trimmed. A name declared twice keeps
/// its first position.
///
/// # Example
///
/// ```
/// use sheetsync::sync::canonical_json;
///
/// let fields = vec!["Nom".to_string(), "Id".to_string()];
/// let json = canonical_json(&fields, |f| if f == "Nom" { " Pikachu ".into() } else { "25".into() });
/// assert_eq!(json, r#"{"Nom":"Pikachu","Id":"25"}"#);
/// ```
#[must_use]
pub fn canonical_json(fields: &[String], value_of: impl Fn(&str) -> String) -> String {
    let mut seen: Vec<&str> = Vec::with_capacity(fields.len());
    let mut out = String::from("{");

    for name in fields {
        if seen.contains(&name.as_str()) {
            continue;
        }
        if !seen.is_empty() {
            out.push(',');
        }
        seen.push(name);

        let value = value_of(name);
        out.push_str(&json_string(name));
        out.push(':');
        out.push_str(&json_string(value.trim()));
    }

    out.push('}');
    out
}

fn json_string(s: &str) -> String {
    // serializing a &str cannot fail
    serde_json::to_string(s).unwrap_or_else(|_| String::from("\"\""))
}

/// Lowercase hex SHA256 of a UTF-8 string.
#[must_use]
pub fn sha256_hex(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Fingerprint of the declared fields.
#[must_use]
pub fn fingerprint(fields: &[String], value_of: impl Fn(&str) -> String) -> String {
    sha256_hex(&canonical_json(fields, value_of))
}

/// Check if a row has changed since its last sync.
///
/// An empty stored fingerprint (never synced) always counts as changed.
#[must_use]
pub fn has_changed(current: &str, stored: &str) -> bool {
    stored.is_empty() || stored != current
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{BTreeMap, HashMap};

    fn fields(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| (*s).to_string()).collect()
    }

    #[test]
    fn test_fingerprint_deterministic() {
        let f = fields(&["Nom", "Id"]);
        let hash1 = fingerprint(&f, |n| n.to_uppercase());
        let hash2 = fingerprint(&f, |n| n.to_uppercase());

        assert_eq!(hash1, hash2);
        assert_eq!(hash1.len(), 64); // SHA256 produces 64 hex chars
        assert!(hash1.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn test_fingerprint_independent_of_map_order() {
        let f = fields(&["Nom", "Gen", "Statut"]);
        let hashed: HashMap<&str, &str> = [("Statut", "Base"), ("Nom", "Pikachu"), ("Gen", "1")]
            .into_iter()
            .collect();
        let sorted: BTreeMap<&str, &str> = hashed.iter().map(|(k, v)| (*k, *v)).collect();

        let a = fingerprint(&f, |n| hashed.get(n).unwrap_or(&"").to_string());
        let b = fingerprint(&f, |n| sorted.get(n).unwrap_or(&"").to_string());
        assert_eq!(a, b);
    }

    #[test]
    fn test_declared_order_drives_serialization() {
        let values = |n: &str| if n == "a" { "1".to_string() } else { "2".to_string() };
        assert_eq!(canonical_json(&fields(&["a", "b"]), values), r#"{"a":"1","b":"2"}"#);
        assert_eq!(canonical_json(&fields(&["b", "a"]), values), r#"{"b":"2","a":"1"}"#);
    }

    #[test]
    fn test_fingerprint_sensitive_to_declared_fields_only() {
        let f = fields(&["Nom", "Id"]);
        let base: HashMap<&str, &str> =
            [("Nom", "Pikachu"), ("Id", "25"), ("Notes", "x")].into_iter().collect();
        let hash = |m: &HashMap<&str, &str>| fingerprint(&f, |n| m.get(n).unwrap_or(&"").to_string());

        let mut changed_declared = base.clone();
        changed_declared.insert("Id", "26");
        assert_ne!(hash(&base), hash(&changed_declared));

        let mut changed_other = base.clone();
        changed_other.insert("Notes", "y");
        assert_eq!(hash(&base), hash(&changed_other));
    }

    #[test]
    fn test_values_trimmed_and_escaped() {
        let json = canonical_json(&fields(&["q"]), |_| "  say \"hi\"\n ".to_string());
        assert_eq!(json, r#"{"q":"say \"hi\""}"#);
    }

    #[test]
    fn test_duplicate_names_keep_first_position() {
        let json = canonical_json(&fields(&["a", "b", "a"]), |n| n.to_string());
        assert_eq!(json, r#"{"a":"a","b":"b"}"#);
    }

    #[test]
    fn test_empty_field_list() {
        assert_eq!(canonical_json(&[], |_| String::new()), "{}");
    }

    #[test]
    fn test_has_changed_no_stored_hash() {
        assert!(has_changed("abc123", ""));
    }

    #[test]
    fn test_has_changed_different_hash() {
        assert!(has_changed("abc123", "xyz789"));
    }

    #[test]
    fn test_has_changed_same_hash() {
        assert!(!has_changed("abc123", "abc123"));
    }
}
