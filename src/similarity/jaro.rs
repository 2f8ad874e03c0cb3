//! Token-weighted Jaro similarity.
//!
//! Reference: Winkler, W. E. (1990). "String Comparator Metrics and Enhanced
//!            Decision Rules in the Fellegi-Sunter Model of Record Linkage"
//!
//! The classical character algorithm lifted to token sequences: matches are
//! whole tokens found inside the Jaro window, and every count (matches,
//! transpositions, lengths) becomes a sum of IDF weights instead of a tally.
//!
//! # Time Complexity
//! O(m × n) worst case for the window scan
//!
//! # Space Complexity
//! O(m + n)

use super::{tokenize, IdfMap};

/// Weighted Jaro similarity in [0, 1].
pub fn token_jaro_similarity(a: &str, b: &str, idf: &IdfMap) -> f64 {
    let a_tokens = tokenize(a);
    let b_tokens = tokenize(b);

    if a_tokens.is_empty() && b_tokens.is_empty() {
        return 1.0;
    }
    if a_tokens.is_empty() || b_tokens.is_empty() {
        return 0.0;
    }

    let len1 = a_tokens.len();
    let len2 = b_tokens.len();

    let a_weights: Vec<f64> = a_tokens.iter().map(|t| idf.weight(t)).collect();
    let b_weights: Vec<f64> = b_tokens.iter().map(|t| idf.weight(t)).collect();

    // Match window: max(m, n)/2 − 1, floored at zero.
    let window = (len1.max(len2) / 2).saturating_sub(1);

    let mut a_matched = vec![false; len1];
    let mut b_matched = vec![false; len2];
    let mut matched_weight = 0.0f64;

    for i in 0..len1 {
        let start = i.saturating_sub(window);
        let end = (i + window + 1).min(len2);
        for j in start..end {
            if b_matched[j] || a_tokens[i] != b_tokens[j] {
                continue;
            }
            a_matched[i] = true;
            b_matched[j] = true;
            matched_weight += a_weights[i];
            break;
        }
    }

    if matched_weight == 0.0 {
        return 0.0;
    }

    // Transpositions: walk matched tokens on both sides in order. The walker
    // stops at len2; matched left tokens always have a right counterpart, so
    // leftovers past that point are unmatched and non-transposing.
    let mut transposed_weight = 0.0f64;
    let mut k = 0usize;
    for i in 0..len1 {
        if !a_matched[i] {
            continue;
        }
        while k < len2 && !b_matched[k] {
            k += 1;
        }
        if k >= len2 {
            break;
        }
        if a_tokens[i] != b_tokens[k] {
            transposed_weight += a_weights[i];
        }
        k += 1;
    }

    let total_a: f64 = a_weights.iter().sum();
    let total_b: f64 = b_weights.iter().sum();

    (matched_weight / total_a
        + matched_weight / total_b
        + (matched_weight - transposed_weight / 2.0) / matched_weight)
        / 3.0
}
