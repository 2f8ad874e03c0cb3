// src/em.rs
//
// Expectation-maximization for the per-field m/u probabilities of a
// two-component Fellegi-Sunter mixture. Each iteration recomputes pair
// similarities in parallel batches; every task carries private partial
// accumulators that are combined when the batch set joins.

use anyhow::{bail, Context, Result};
use futures::future::join_all;
use log::{debug, info};
use serde::Serialize;
use std::sync::Arc;

use crate::models::core::{CandidatePair, Record};
use crate::scoring::{clamp_probabilities, PROB_EPSILON};
use crate::similarity::SimilarityFunction;

const PAIRS_PER_TASK: usize = 2048;

/// Estimator knobs.
#[derive(Debug, Clone)]
pub struct EmConfig {
    pub max_iter: usize,
    pub tolerance: f64,
    /// Per-field weights applied to the numerator accumulators; `None`
    /// means all 1.0.
    pub field_weights: Option<Vec<f64>>,
}

impl Default for EmConfig {
    fn default() -> Self {
        Self {
            max_iter: 20,
            tolerance: 1e-4,
            field_weights: None,
        }
    }
}

/// What the estimator did: how many iterations ran, whether the tolerance
/// was met, and the final mixture log-likelihood.
#[derive(Debug, Clone, Serialize)]
pub struct EmReport {
    pub iterations: usize,
    pub converged: bool,
    pub log_likelihood: f64,
}

#[derive(Debug, Clone)]
struct Partials {
    m_num: Vec<f64>,
    u_num: Vec<f64>,
    m_den: f64,
    u_den: f64,
    log_likelihood: f64,
}

impl Partials {
    fn zero(n: usize) -> Self {
        Self {
            m_num: vec![0.0; n],
            u_num: vec![0.0; n],
            m_den: 0.0,
            u_den: 0.0,
            log_likelihood: 0.0,
        }
    }

    fn absorb(&mut self, other: &Partials) {
        for i in 0..self.m_num.len() {
            self.m_num[i] += other.m_num[i];
            self.u_num[i] += other.u_num[i];
        }
        self.m_den += other.m_den;
        self.u_den += other.u_den;
        self.log_likelihood += other.log_likelihood;
    }
}

/// Refine `(m, u)` over the candidate pairs until every per-field delta is
/// within tolerance or `max_iter` is reached.
///
/// `max_iter = 0` returns the initial parameters untouched. The returned
/// probabilities stay inside (0, 1).
pub async fn estimate_parameters(
    records: Arc<Vec<Record>>,
    pairs: Arc<Vec<CandidatePair>>,
    functions: Arc<Vec<SimilarityFunction>>,
    initial_m: &[f64],
    initial_u: &[f64],
    config: &EmConfig,
) -> Result<(Vec<f64>, Vec<f64>, EmReport)> {
    let n = functions.len();
    if initial_m.len() != n || initial_u.len() != n {
        bail!(
            "m/u probability vectors must match the {} similarity function(s): got {} and {}",
            n,
            initial_m.len(),
            initial_u.len()
        );
    }
    let weights = Arc::new(
        config
            .field_weights
            .clone()
            .unwrap_or_else(|| vec![1.0; n]),
    );
    if weights.len() != n {
        bail!(
            "field weights must match the {} similarity function(s): got {}",
            n,
            weights.len()
        );
    }

    let mut m = clamp_probabilities(initial_m);
    let mut u = clamp_probabilities(initial_u);
    let mut report = EmReport {
        iterations: 0,
        converged: false,
        log_likelihood: f64::NEG_INFINITY,
    };

    if config.max_iter == 0 || pairs.is_empty() {
        return Ok((m, u, report));
    }

    for iter in 0..config.max_iter {
        let totals = accumulate(&records, &pairs, &functions, &m, &u, &weights).await?;

        let mut next_m = Vec::with_capacity(n);
        let mut next_u = Vec::with_capacity(n);
        for i in 0..n {
            next_m.push(totals.m_num[i] / (totals.m_den + PROB_EPSILON));
            next_u.push(totals.u_num[i] / (totals.u_den + PROB_EPSILON));
        }
        let next_m = clamp_probabilities(&next_m);
        let next_u = clamp_probabilities(&next_u);

        let max_delta = m
            .iter()
            .zip(&next_m)
            .chain(u.iter().zip(&next_u))
            .map(|(old, new)| (old - new).abs())
            .fold(0.0f64, f64::max);

        m = next_m;
        u = next_u;
        report.iterations = iter + 1;
        report.log_likelihood = totals.log_likelihood;
        debug!(
            "em iteration {}: max delta {:.2e}, log-likelihood {:.4}",
            report.iterations, max_delta, report.log_likelihood
        );

        if max_delta <= config.tolerance {
            report.converged = true;
            break;
        }
    }

    info!(
        "em finished after {} iteration(s), converged={}",
        report.iterations, report.converged
    );
    Ok((m, u, report))
}

async fn accumulate(
    records: &Arc<Vec<Record>>,
    pairs: &Arc<Vec<CandidatePair>>,
    functions: &Arc<Vec<SimilarityFunction>>,
    m: &[f64],
    u: &[f64],
    weights: &Arc<Vec<f64>>,
) -> Result<Partials> {
    let m = Arc::new(m.to_vec());
    let u = Arc::new(u.to_vec());
    let n = functions.len();

    let mut tasks = Vec::new();
    let mut start = 0usize;
    while start < pairs.len() {
        let end = (start + PAIRS_PER_TASK).min(pairs.len());
        let records = Arc::clone(records);
        let pairs = Arc::clone(pairs);
        let functions = Arc::clone(functions);
        let m = Arc::clone(&m);
        let u = Arc::clone(&u);
        let weights = Arc::clone(weights);
        tasks.push(tokio::spawn(async move {
            accumulate_range(&records, &pairs[start..end], &functions, &m, &u, &weights)
        }));
        start = end;
    }

    let mut totals = Partials::zero(n);
    for task in join_all(tasks).await {
        let partial = task.context("em accumulation task panicked")?;
        totals.absorb(&partial);
    }
    Ok(totals)
}

fn accumulate_range(
    records: &[Record],
    pairs: &[CandidatePair],
    functions: &[SimilarityFunction],
    m: &[f64],
    u: &[f64],
    weights: &[f64],
) -> Partials {
    let mut partial = Partials::zero(functions.len());

    for pair in pairs {
        let a = &records[pair.a];
        let b = &records[pair.b];

        let sims: Vec<f64> = functions.iter().map(|f| f.compute(a, b)).collect();

        let mut p_match = 1.0f64;
        let mut p_unmatch = 1.0f64;
        for i in 0..sims.len() {
            p_match *= m[i] * sims[i] + (1.0 - m[i]) * (1.0 - sims[i]);
            p_unmatch *= u[i] * sims[i] + (1.0 - u[i]) * (1.0 - sims[i]);
        }

        // soft posterior; the clamped probabilities keep both components
        // strictly positive
        let w = p_match / (p_match + p_unmatch);

        for i in 0..sims.len() {
            partial.m_num[i] += w * sims[i] * weights[i];
            partial.u_num[i] += (1.0 - w) * sims[i] * weights[i];
        }
        partial.m_den += w;
        partial.u_den += 1.0 - w;
        partial.log_likelihood += (p_match + p_unmatch).ln();
    }

    partial
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::similarity::{IdfMap, SimilarityFunction, SimilarityKernel};
    use std::collections::HashMap;

    fn record(id: &str, name: &str, city: &str) -> Record {
        let mut fields = HashMap::new();
        fields.insert("name".to_string(), name.to_string());
        fields.insert("city".to_string(), city.to_string());
        Record::new(id, fields)
    }

    fn functions() -> Arc<Vec<SimilarityFunction>> {
        let idf = Arc::new(IdfMap::new());
        Arc::new(vec![
            SimilarityFunction::new("name", SimilarityKernel::TokenEditDistance, Arc::clone(&idf)),
            SimilarityFunction::new("city", SimilarityKernel::TokenEditDistance, idf),
        ])
    }

    /// Half the pairs agree on every field, half agree on none.
    fn separable_corpus() -> (Arc<Vec<Record>>, Arc<Vec<CandidatePair>>) {
        let mut records = Vec::new();
        let mut pairs = Vec::new();
        for i in 0..30 {
            let base = records.len();
            if i % 2 == 0 {
                records.push(record(&format!("a{i:03}"), "alice smith", "seattle"));
                records.push(record(&format!("b{i:03}"), "alice smith", "seattle"));
            } else {
                records.push(record(&format!("a{i:03}"), "alice smith", "seattle"));
                records.push(record(&format!("b{i:03}"), "pat jones", "portland"));
            }
            pairs.push(CandidatePair { a: base, b: base + 1 });
        }
        (Arc::new(records), Arc::new(pairs))
    }

    #[tokio::test]
    async fn test_zero_iterations_returns_initial_parameters() {
        let (records, pairs) = separable_corpus();
        let config = EmConfig {
            max_iter: 0,
            ..Default::default()
        };
        let (m, u, report) =
            estimate_parameters(records, pairs, functions(), &[0.9, 0.9], &[0.1, 0.1], &config)
                .await
                .unwrap();
        assert_eq!(report.iterations, 0);
        assert!(!report.converged);
        assert!((m[0] - 0.9).abs() < 1e-9);
        assert!((u[1] - 0.1).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_recovers_separation() {
        let (records, pairs) = separable_corpus();
        let (m, u, report) = estimate_parameters(
            records,
            pairs,
            functions(),
            &[0.9, 0.9],
            &[0.1, 0.1],
            &EmConfig::default(),
        )
        .await
        .unwrap();
        assert!(report.converged, "no convergence in 20 iterations");
        for i in 0..2 {
            assert!(m[i] > 0.8, "m[{i}] = {}", m[i]);
            assert!(u[i] < 0.2, "u[{i}] = {}", u[i]);
        }
    }

    #[tokio::test]
    async fn test_log_likelihood_does_not_decrease() {
        let (records, pairs) = separable_corpus();
        let functions = functions();
        let mut m = vec![0.7, 0.6];
        let mut u = vec![0.3, 0.4];
        let mut previous = f64::NEG_INFINITY;
        for _ in 0..6 {
            let config = EmConfig {
                max_iter: 1,
                tolerance: 0.0,
                field_weights: None,
            };
            let (next_m, next_u, report) = estimate_parameters(
                Arc::clone(&records),
                Arc::clone(&pairs),
                Arc::clone(&functions),
                &m,
                &u,
                &config,
            )
            .await
            .unwrap();
            assert!(
                report.log_likelihood >= previous - 1e-9,
                "log-likelihood fell: {} -> {}",
                previous,
                report.log_likelihood
            );
            previous = report.log_likelihood;
            m = next_m;
            u = next_u;
        }
    }

    #[tokio::test]
    async fn test_parameters_stay_in_open_interval() {
        let (records, pairs) = separable_corpus();
        let (m, u, _) = estimate_parameters(
            records,
            pairs,
            functions(),
            &[0.99, 0.99],
            &[0.01, 0.01],
            &EmConfig::default(),
        )
        .await
        .unwrap();
        for value in m.iter().chain(&u) {
            assert!(*value > 0.0 && *value < 1.0);
        }
    }

    #[tokio::test]
    async fn test_separation_survives_label_noise() {
        use rand::rngs::StdRng;
        use rand::{Rng, SeedableRng};

        let mut rng = StdRng::seed_from_u64(17);
        let mut records = Vec::new();
        let mut pairs = Vec::new();
        for i in 0..60 {
            let base = records.len();
            let matched = i % 2 == 0;
            records.push(record(&format!("a{i:03}"), "alice smith", "seattle"));
            // matched pairs occasionally disagree on one field, unmatched
            // pairs occasionally agree on one
            let (name, city) = if matched {
                if rng.gen_range(0..20) == 0 {
                    ("alice smith", "portland")
                } else {
                    ("alice smith", "seattle")
                }
            } else if rng.gen_range(0..20) == 0 {
                ("pat jones", "seattle")
            } else {
                ("pat jones", "portland")
            };
            records.push(record(&format!("b{i:03}"), name, city));
            pairs.push(CandidatePair { a: base, b: base + 1 });
        }

        let (m, u, _) = estimate_parameters(
            Arc::new(records),
            Arc::new(pairs),
            functions(),
            &[0.9, 0.9],
            &[0.1, 0.1],
            &EmConfig::default(),
        )
        .await
        .unwrap();
        for i in 0..2 {
            assert!(m[i] > 0.8, "m[{i}] = {}", m[i]);
            assert!(u[i] < 0.2, "u[{i}] = {}", u[i]);
        }
    }

    #[tokio::test]
    async fn test_empty_pair_set_is_a_no_op() {
        let records: Arc<Vec<Record>> = Arc::new(vec![]);
        let pairs: Arc<Vec<CandidatePair>> = Arc::new(vec![]);
        let (m, u, report) = estimate_parameters(
            records,
            pairs,
            functions(),
            &[0.9, 0.9],
            &[0.1, 0.1],
            &EmConfig::default(),
        )
        .await
        .unwrap();
        assert_eq!(report.iterations, 0);
        assert!((m[0] - 0.9).abs() < 1e-9 && (u[0] - 0.1).abs() < 1e-9);
    }
}
