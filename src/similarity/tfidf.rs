//! TF-IDF cosine similarity over token vectors.
//!
//! Reference: Salton, G. & McGill, M. J. (1983). "Introduction to Modern
//!            Information Retrieval"
//!
//! Each side becomes a sparse vector over the union of its tokens, with
//! components `tf · idf`. Unlike the other two kernels, a token absent from
//! the IDF map contributes weight 0 here: a token nobody has measured
//! carries no discriminating signal in a vector-space model.

use super::{tokenize, IdfMap};
use std::collections::HashMap;

/// Cosine of the TF-IDF vectors, in [0, 1].
///
/// Identical token sequences are a perfect match regardless of weights;
/// otherwise a zero norm on either side yields 0.
pub fn tfidf_cosine_similarity(a: &str, b: &str, idf: &IdfMap) -> f64 {
    let a_tokens = tokenize(a);
    let b_tokens = tokenize(b);

    if a_tokens.is_empty() && b_tokens.is_empty() {
        return 1.0;
    }
    if a_tokens.is_empty() || b_tokens.is_empty() {
        return 0.0;
    }
    if a_tokens == b_tokens {
        return 1.0;
    }

    let tf_a = term_frequencies(&a_tokens);
    let tf_b = term_frequencies(&b_tokens);

    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;

    for (token, tf) in &tf_a {
        let component = tf * idf.weight_or_zero(token);
        norm_a += component * component;
        if let Some(tf_other) = tf_b.get(token) {
            dot += component * (tf_other * idf.weight_or_zero(token));
        }
    }
    for (token, tf) in &tf_b {
        let component = tf * idf.weight_or_zero(token);
        norm_b += component * component;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    (dot / (norm_a.sqrt() * norm_b.sqrt())).clamp(0.0, 1.0)
}

fn term_frequencies(tokens: &[String]) -> HashMap<&str, f64> {
    let mut counts: HashMap<&str, f64> = HashMap::new();
    for token in tokens {
        *counts.entry(token.as_str()).or_insert(0.0) += 1.0;
    }
    let total = tokens.len() as f64;
    for tf in counts.values_mut() {
        *tf /= total;
    }
    counts
}
