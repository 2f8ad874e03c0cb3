// src/models/core.rs

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A single input record: a unique id plus a flat map of string fields.
///
/// Records are constructed by a loader and never mutated afterwards. A field
/// that is absent from the map is treated as the empty string everywhere in
/// the engine; fields are never null.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Record {
    pub id: String,
    #[serde(default)]
    pub fields: HashMap<String, String>,
}

impl Record {
    pub fn new(id: impl Into<String>, fields: HashMap<String, String>) -> Self {
        Self {
            id: id.into(),
            fields,
        }
    }

    /// Field value, with missing fields read as the empty string.
    pub fn field(&self, name: &str) -> &str {
        self.fields.get(name).map(String::as_str).unwrap_or("")
    }
}

/// An unordered candidate pair, stored as indices into the shared record
/// list. Invariant: `records[a].id < records[b].id`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CandidatePair {
    pub a: usize,
    pub b: usize,
}

/// A candidate pair together with its log-likelihood-ratio score.
///
/// `a_id < b_id` lexicographically; the score may be negative but is always
/// finite.
#[derive(Debug, Clone, Serialize)]
pub struct ScoredPair {
    pub a_id: String,
    pub b_id: String,
    pub score: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_field_is_empty() {
        let rec = Record::new("r1", HashMap::new());
        assert_eq!(rec.field("name"), "");

        let mut fields = HashMap::new();
        fields.insert("name".to_string(), "Alice".to_string());
        let rec = Record::new("r2", fields);
        assert_eq!(rec.field("name"), "Alice");
        assert_eq!(rec.field("city"), "");
    }

    #[test]
    fn test_record_deserializes_without_fields() {
        let rec: Record = serde_json::from_str(r#"{"id": "r1"}"#).unwrap();
        assert_eq!(rec.id, "r1");
        assert!(rec.fields.is_empty());
    }
}
