//! Token-weighted edit distance similarity.
//!
//! A Levenshtein-style dynamic program over token sequences where the cost
//! of inserting or deleting a token is its IDF weight and the cost of
//! substituting two distinct tokens is the larger of their weights. The
//! distance is normalized by the combined weight of both sides, so rare
//! tokens dominate the score.
//!
//! # Time Complexity
//! O(m × n) table fill over token counts
//!
//! # Space Complexity
//! O(m × n)

use super::{tokenize, IdfMap};

/// Similarity in [0, 1]: `1 − dist / (Σ idf(a) + Σ idf(b))`.
///
/// If the denominator is 0 (all tokens weightless) the inputs are
/// indistinguishable under the weighting and the similarity is 1.
pub fn token_edit_similarity(a: &str, b: &str, idf: &IdfMap) -> f64 {
    let a_tokens = tokenize(a);
    let b_tokens = tokenize(b);

    if a_tokens.is_empty() && b_tokens.is_empty() {
        return 1.0;
    }
    if a_tokens.is_empty() || b_tokens.is_empty() {
        return 0.0;
    }

    let a_weights: Vec<f64> = a_tokens.iter().map(|t| idf.weight(t)).collect();
    let b_weights: Vec<f64> = b_tokens.iter().map(|t| idf.weight(t)).collect();

    let m = a_tokens.len();
    let n = b_tokens.len();

    let mut dp = vec![vec![0.0f64; n + 1]; m + 1];
    for i in 1..=m {
        dp[i][0] = dp[i - 1][0] + a_weights[i - 1];
    }
    for j in 1..=n {
        dp[0][j] = dp[0][j - 1] + b_weights[j - 1];
    }

    for i in 1..=m {
        for j in 1..=n {
            let sub_cost = if a_tokens[i - 1] == b_tokens[j - 1] {
                0.0
            } else {
                a_weights[i - 1].max(b_weights[j - 1])
            };
            let delete = dp[i - 1][j] + a_weights[i - 1];
            let insert = dp[i][j - 1] + b_weights[j - 1];
            let substitute = dp[i - 1][j - 1] + sub_cost;
            dp[i][j] = delete.min(insert).min(substitute);
        }
    }

    let total: f64 = a_weights.iter().sum::<f64>() + b_weights.iter().sum::<f64>();
    if total == 0.0 {
        return 1.0;
    }
    (1.0 - dp[m][n] / total).clamp(0.0, 1.0)
}
