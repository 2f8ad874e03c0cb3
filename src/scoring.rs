// src/scoring.rs
//
// Fellegi-Sunter log-likelihood-ratio scoring over a stream of candidate
// pairs. Batches are scored concurrently; each task fills a private buffer
// that is combined at join, so no pair is lost or duplicated.

use anyhow::{Context, Result};
use futures::future::join_all;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use log::{debug, warn};
use std::sync::Arc;

use crate::models::core::{CandidatePair, Record, ScoredPair};
use crate::models::stats::ScoringStats;
use crate::similarity::SimilarityFunction;

/// Floor applied to probabilities before they feed a logarithm.
pub const PROB_EPSILON: f64 = 1e-10;

const MAX_CONCURRENT_BATCHES: usize = 8;

/// Clamp each probability into [ε, 1 − ε].
pub fn clamp_probabilities(probs: &[f64]) -> Vec<f64> {
    probs
        .iter()
        .map(|p| p.clamp(PROB_EPSILON, 1.0 - PROB_EPSILON))
        .collect()
}

/// Log-likelihood ratio of one pair's field similarities, plus the number
/// of terms skipped for a non-positive numerator or denominator.
pub fn log_likelihood_ratio(sims: &[f64], m_probs: &[f64], u_probs: &[f64]) -> (f64, usize) {
    let mut llr = 0.0;
    let mut skipped = 0usize;
    for ((s, m), u) in sims.iter().zip(m_probs).zip(u_probs) {
        let agree_match = m * s + (1.0 - m) * (1.0 - s);
        let agree_unmatch = u * s + (1.0 - u) * (1.0 - s);
        if agree_match <= 0.0 || agree_unmatch <= 0.0 {
            skipped += 1;
            continue;
        }
        llr += (agree_match / agree_unmatch).ln();
    }
    (llr, skipped)
}

/// Score every pair in the stream. Output order is unspecified.
pub async fn score_pairs(
    records: Arc<Vec<Record>>,
    batches: impl Iterator<Item = Vec<CandidatePair>>,
    functions: Arc<Vec<SimilarityFunction>>,
    m_probs: &[f64],
    u_probs: &[f64],
    multi_progress: Option<&MultiProgress>,
) -> Result<(Vec<ScoredPair>, ScoringStats)> {
    let m_probs = Arc::new(clamp_probabilities(m_probs));
    let u_probs = Arc::new(clamp_probabilities(u_probs));

    let progress = multi_progress.map(|mp| {
        let pb = mp.add(ProgressBar::new_spinner());
        pb.set_style(
            ProgressStyle::default_spinner()
                .template("    {spinner:.green} [{elapsed_precise}] {msg}")
                .unwrap(),
        );
        pb.set_message("Scoring candidate pairs...");
        pb
    });

    let mut scored: Vec<ScoredPair> = Vec::new();
    let mut stats = ScoringStats::default();

    let mut pending = Vec::with_capacity(MAX_CONCURRENT_BATCHES);
    let mut batches = batches.peekable();
    while batches.peek().is_some() {
        pending.clear();
        for batch in batches.by_ref().take(MAX_CONCURRENT_BATCHES) {
            if batch.is_empty() {
                continue;
            }
            let records = Arc::clone(&records);
            let functions = Arc::clone(&functions);
            let m_probs = Arc::clone(&m_probs);
            let u_probs = Arc::clone(&u_probs);
            pending.push(tokio::spawn(async move {
                score_batch(&records, &batch, &functions, &m_probs, &u_probs)
            }));
        }

        for task in join_all(pending.drain(..)).await {
            let (batch_scored, batch_stats) = task.context("scoring task panicked")?;
            stats.absorb(&batch_stats);
            scored.extend(batch_scored);
        }

        if let Some(pb) = &progress {
            pb.set_message(format!("Scored {} pairs...", stats.pairs_scored));
        }
    }

    if let Some(pb) = &progress {
        pb.finish_with_message(format!("Scored {} pairs", stats.pairs_scored));
    }
    if stats.degenerate_terms > 0 {
        warn!(
            "skipped {} degenerate likelihood terms while scoring {} pairs",
            stats.degenerate_terms, stats.pairs_scored
        );
    }
    debug!(
        "scoring complete: {} pairs, {} degenerate terms",
        stats.pairs_scored, stats.degenerate_terms
    );

    Ok((scored, stats))
}

fn score_batch(
    records: &[Record],
    batch: &[CandidatePair],
    functions: &[SimilarityFunction],
    m_probs: &[f64],
    u_probs: &[f64],
) -> (Vec<ScoredPair>, ScoringStats) {
    let mut scored = Vec::with_capacity(batch.len());
    let mut stats = ScoringStats::default();

    for pair in batch {
        let a = &records[pair.a];
        let b = &records[pair.b];
        let sims: Vec<f64> = functions.iter().map(|f| f.compute(a, b)).collect();
        let (score, skipped) = log_likelihood_ratio(&sims, m_probs, u_probs);
        stats.pairs_scored += 1;
        stats.degenerate_terms += skipped;
        scored.push(ScoredPair {
            a_id: a.id.clone(),
            b_id: b.id.clone(),
            score,
        });
    }

    (scored, stats)
}
