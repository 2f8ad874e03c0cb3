//! Token-level string similarity with inverse-document-frequency weighting.
//!
//! All three kernels share one contract: both inputs are lowercased and split
//! on single spaces, the non-empty substrings are the tokens, and the result
//! is in [0, 1]. If exactly one side tokenizes to nothing the similarity is
//! 0; if both sides do, it is 1.

pub mod edit_distance;
pub mod jaro;
pub mod tfidf;

use log::warn;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::models::core::Record;

/// Lowercase and split on single spaces, keeping non-empty tokens.
pub fn tokenize(s: &str) -> Vec<String> {
    s.to_lowercase()
        .split(' ')
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

/// Token → weight map. Read-only once constructed and shared freely across
/// worker threads.
///
/// The edit-distance and Jaro kernels read missing tokens at weight 1.0; the
/// TF-IDF kernel reads them at 0.0.
#[derive(Debug, Clone, Default)]
pub struct IdfMap {
    weights: HashMap<String, f64>,
}

impl IdfMap {
    /// An empty map: every token weighs 1.0 for the edit-distance and Jaro
    /// kernels.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from externally supplied weights. Non-finite entries are
    /// discarded and negative entries floored at zero so that every stored
    /// weight is a non-negative finite double.
    pub fn from_weights(weights: HashMap<String, f64>) -> Self {
        let mut clean = HashMap::with_capacity(weights.len());
        for (token, w) in weights {
            if !w.is_finite() {
                warn!("discarding non-finite idf weight for token {:?}", token);
                continue;
            }
            clean.insert(token, w.max(0.0));
        }
        Self { weights: clean }
    }

    /// Compute `ln(N / df(token))` over the given fields of a record corpus.
    /// A token's document frequency counts records in which it appears at
    /// least once in any of the fields.
    pub fn from_corpus(records: &[Record], fields: &[String]) -> Self {
        let n = records.len();
        if n == 0 {
            return Self::default();
        }

        let mut df: HashMap<String, usize> = HashMap::new();
        for record in records {
            let mut seen: HashSet<String> = HashSet::new();
            for field in fields {
                for token in tokenize(record.field(field)) {
                    seen.insert(token);
                }
            }
            for token in seen {
                *df.entry(token).or_insert(0) += 1;
            }
        }

        let weights = df
            .into_iter()
            .map(|(token, count)| {
                let idf = (n as f64 / count as f64).ln().max(0.0);
                (token, idf)
            })
            .collect();
        Self { weights }
    }

    /// Weight of a token, defaulting to 1.0 when absent.
    pub fn weight(&self, token: &str) -> f64 {
        self.weights.get(token).copied().unwrap_or(1.0)
    }

    /// Weight of a token, defaulting to 0.0 when absent.
    pub fn weight_or_zero(&self, token: &str) -> f64 {
        self.weights.get(token).copied().unwrap_or(0.0)
    }

    pub fn len(&self) -> usize {
        self.weights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }
}

/// Which of the three kernels a similarity function applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SimilarityKernel {
    TokenEditDistance,
    TokenJaro,
    TfIdfCosine,
}

/// A kernel bound to a record field and an IDF map.
///
/// Stateless aside from the captured map; `compute` is a pure function of
/// its two records.
#[derive(Debug, Clone)]
pub struct SimilarityFunction {
    pub field: String,
    pub kernel: SimilarityKernel,
    idf: Arc<IdfMap>,
}

impl SimilarityFunction {
    pub fn new(field: impl Into<String>, kernel: SimilarityKernel, idf: Arc<IdfMap>) -> Self {
        Self {
            field: field.into(),
            kernel,
            idf,
        }
    }

    /// Similarity of the bound field across two records, in [0, 1]. Missing
    /// fields read as the empty string.
    pub fn compute(&self, a: &Record, b: &Record) -> f64 {
        let left = a.field(&self.field);
        let right = b.field(&self.field);
        match self.kernel {
            SimilarityKernel::TokenEditDistance => {
                edit_distance::token_edit_similarity(left, right, &self.idf)
            }
            SimilarityKernel::TokenJaro => jaro::token_jaro_similarity(left, right, &self.idf),
            SimilarityKernel::TfIdfCosine => tfidf::tfidf_cosine_similarity(left, right, &self.idf),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn record(id: &str, name: &str) -> Record {
        let mut fields = HashMap::new();
        fields.insert("name".to_string(), name.to_string());
        Record::new(id, fields)
    }

    #[test]
    fn test_tokenize_lowercases_and_drops_empties() {
        assert_eq!(tokenize("Alice  Smith"), vec!["alice", "smith"]);
        assert_eq!(tokenize(""), Vec::<String>::new());
        assert_eq!(tokenize("   "), Vec::<String>::new());
    }

    #[test]
    fn test_idf_defaults() {
        let idf = IdfMap::new();
        assert_eq!(idf.weight("anything"), 1.0);
        assert_eq!(idf.weight_or_zero("anything"), 0.0);
    }

    #[test]
    fn test_idf_from_weights_sanitizes() {
        let mut weights = HashMap::new();
        weights.insert("ok".to_string(), 2.5);
        weights.insert("neg".to_string(), -1.0);
        weights.insert("nan".to_string(), f64::NAN);
        let idf = IdfMap::from_weights(weights);
        assert_eq!(idf.weight("ok"), 2.5);
        assert_eq!(idf.weight("neg"), 0.0);
        // the NaN entry was discarded entirely, so the default applies
        assert_eq!(idf.weight("nan"), 1.0);
    }

    #[test]
    fn test_idf_from_corpus() {
        let records = vec![
            record("1", "alice smith"),
            record("2", "alice jones"),
            record("3", "bob jones"),
            record("4", "carol king"),
        ];
        let idf = IdfMap::from_corpus(&records, &["name".to_string()]);
        // "alice" appears in 2 of 4 records: ln(4/2)
        assert!((idf.weight("alice") - (2.0f64).ln()).abs() < 1e-12);
        // "king" appears once: ln(4)
        assert!((idf.weight("king") - (4.0f64).ln()).abs() < 1e-12);
        // a token in every record weighs ln(1) = 0, not negative
        let everywhere = vec![
            record("1", "acme"),
            record("2", "acme"),
        ];
        let idf = IdfMap::from_corpus(&everywhere, &["name".to_string()]);
        assert_eq!(idf.weight("acme"), 0.0);
    }

    #[test]
    fn test_similarity_function_reads_bound_field() {
        let idf = Arc::new(IdfMap::new());
        let f = SimilarityFunction::new("name", SimilarityKernel::TokenEditDistance, idf);
        let a = record("1", "Alice Smith");
        let b = record("2", "Alice Smith");
        assert_eq!(f.compute(&a, &b), 1.0);

        // a record without the field compares as empty
        let c = Record::new("3", HashMap::new());
        assert_eq!(f.compute(&a, &c), 0.0);
        assert_eq!(f.compute(&c, &c), 1.0);
    }
}
