// src/pipeline.rs - phase sequencing for the full linkage run

use anyhow::{bail, Result};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use log::{debug, info, warn};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;

use crate::blocking::{rules_from_fields, CandidateBatches};
use crate::clustering::DisjointSetForest;
use crate::em::{self, EmConfig, EmReport};
use crate::models::core::{CandidatePair, Record, ScoredPair};
use crate::models::stats::PipelineStats;
use crate::scoring::score_pairs;
use crate::similarity::SimilarityFunction;

/// Everything one linkage run needs. Length of `similarity_functions`
/// defines `n`; the probability vectors and optional field weights must
/// match it.
#[derive(Debug, Clone)]
pub struct MatchOptions {
    pub blocking_fields: Vec<String>,
    pub similarity_functions: Vec<SimilarityFunction>,
    pub m_probs: Vec<f64>,
    pub u_probs: Vec<f64>,
    pub batch_size: usize,
    /// Pairs scoring strictly greater are merged. Scores are log-likelihood
    /// ratios, so any finite real is a legal threshold, including values far
    /// outside [0, 1].
    pub match_threshold: f64,
    pub run_em: bool,
    pub em: EmConfig,
}

impl MatchOptions {
    /// Options with the customary starting probabilities (m 0.9, u 0.1 per
    /// field), batch size 500, threshold 0, and EM refinement enabled.
    pub fn new(
        blocking_fields: Vec<String>,
        similarity_functions: Vec<SimilarityFunction>,
    ) -> Self {
        let n = similarity_functions.len();
        Self {
            blocking_fields,
            similarity_functions,
            m_probs: vec![0.9; n],
            u_probs: vec![0.1; n],
            batch_size: 500,
            match_threshold: 0.0,
            run_em: true,
            em: EmConfig::default(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        let n = self.similarity_functions.len();
        if n == 0 {
            bail!("at least one similarity function is required");
        }
        if self.m_probs.len() != n || self.u_probs.len() != n {
            bail!(
                "m/u probability vectors must match the {} similarity function(s): got {} and {}",
                n,
                self.m_probs.len(),
                self.u_probs.len()
            );
        }
        for (name, probs) in [("m", &self.m_probs), ("u", &self.u_probs)] {
            if let Some(p) = probs.iter().find(|p| !(0.0 < **p && **p < 1.0)) {
                bail!("{name} probabilities must lie strictly between 0 and 1: got {p}");
            }
        }
        if self.batch_size == 0 {
            bail!("batch size must be positive");
        }
        if !self.match_threshold.is_finite() {
            bail!("match threshold must be finite");
        }
        if !(self.em.tolerance.is_finite() && self.em.tolerance > 0.0) {
            bail!("em tolerance must be a positive finite number");
        }
        if let Some(weights) = &self.em.field_weights {
            if weights.len() != n {
                bail!(
                    "field weights must match the {} similarity function(s): got {}",
                    n,
                    weights.len()
                );
            }
            if let Some(w) = weights.iter().find(|w| !w.is_finite() || **w < 0.0) {
                bail!("field weights must be finite and non-negative: got {w}");
            }
        }
        Ok(())
    }
}

/// Fail fast on inconsistent options, before any work starts.
pub fn validate_options(options: &MatchOptions) -> Result<()> {
    options.validate()
}

/// Blocking only: the lazy candidate-pair stream.
pub fn generate_candidate_pairs(
    records: Arc<Vec<Record>>,
    options: &MatchOptions,
) -> Result<CandidateBatches> {
    options.validate()?;
    let rules = Arc::new(rules_from_fields(&options.blocking_fields));
    Ok(CandidateBatches::new(records, rules, options.batch_size))
}

/// Blocking + scoring with the options' current m/u probabilities.
pub async fn score_candidate_pairs(
    records: Arc<Vec<Record>>,
    options: &MatchOptions,
    multi_progress: Option<&MultiProgress>,
) -> Result<Vec<ScoredPair>> {
    let batches = generate_candidate_pairs(Arc::clone(&records), options)?;
    let functions = Arc::new(options.similarity_functions.clone());
    let (scored, _) = score_pairs(
        records,
        batches,
        functions,
        &options.m_probs,
        &options.u_probs,
        multi_progress,
    )
    .await?;
    Ok(scored)
}

/// Blocking + EM: refined (m, u) plus the convergence report.
pub async fn estimate_parameters(
    records: Arc<Vec<Record>>,
    options: &MatchOptions,
) -> Result<(Vec<f64>, Vec<f64>, EmReport)> {
    options.validate()?;
    let pairs: Vec<CandidatePair> = generate_candidate_pairs(Arc::clone(&records), options)?
        .pairs()
        .collect();
    debug!("estimating parameters over {} candidate pairs", pairs.len());
    em::estimate_parameters(
        records,
        Arc::new(pairs),
        Arc::new(options.similarity_functions.clone()),
        &options.m_probs,
        &options.u_probs,
        &options.em,
    )
    .await
}

/// Merge every pair scoring strictly above the threshold into a fresh
/// forest. Only records that appear in some accepted pair enter the forest.
pub fn merge_matches(scored: &[ScoredPair], threshold: f64) -> DisjointSetForest {
    let mut forest = DisjointSetForest::new();
    for pair in scored {
        if pair.score > threshold {
            forest.merge(&pair.a_id, &pair.b_id);
        }
    }
    forest
}

/// Full pipeline: block, score, optionally refine with EM and rescore,
/// threshold, and cluster. Every input record appears in the snapshot,
/// singletons as one-element clusters.
pub async fn link_records(
    records: Vec<Record>,
    options: &MatchOptions,
    multi_progress: Option<MultiProgress>,
) -> Result<HashMap<String, Vec<String>>> {
    let (clusters, _) = link_records_with_stats(records, options, multi_progress).await?;
    Ok(clusters)
}

/// `link_records` plus the per-phase stats block.
pub async fn link_records_with_stats(
    records: Vec<Record>,
    options: &MatchOptions,
    multi_progress: Option<MultiProgress>,
) -> Result<(HashMap<String, Vec<String>>, PipelineStats)> {
    options.validate()?;
    let records = sanitize_records(records);
    let mut stats = PipelineStats::new(records.len());
    info!(
        "linkage run {} starting: {} records, {} blocking rule(s), {} similarity function(s)",
        stats.run_id,
        records.len(),
        options.blocking_fields.len(),
        options.similarity_functions.len()
    );

    let main_pb = multi_progress.as_ref().map(|mp| {
        let pb = mp.add(ProgressBar::new(4));
        pb.set_style(
            ProgressStyle::default_bar()
                .template(
                    "{spinner:.green} [{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}",
                )
                .unwrap()
                .progress_chars("█▉▊▋▌▍▎▏  "),
        );
        pb.set_message("Generating candidate pairs...");
        pb
    });

    let records = Arc::new(records);
    let functions = Arc::new(options.similarity_functions.clone());

    // Phase 1: blocking
    let blocking_start = Instant::now();
    let pairs: Vec<CandidatePair> = generate_candidate_pairs(Arc::clone(&records), options)?
        .pairs()
        .collect();
    stats.pairs_generated = pairs.len();
    stats.blocking_time_secs = blocking_start.elapsed().as_secs_f64();
    info!(
        "blocking produced {} candidate pairs in {:.2?}",
        pairs.len(),
        blocking_start.elapsed()
    );
    if let Some(pb) = &main_pb {
        pb.inc(1);
        pb.set_message("Estimating parameters...");
    }

    // Phase 2: optional EM refinement
    let (m_probs, u_probs) = if options.run_em && !pairs.is_empty() {
        let em_start = Instant::now();
        let (m, u, report) = em::estimate_parameters(
            Arc::clone(&records),
            Arc::new(pairs.clone()),
            Arc::clone(&functions),
            &options.m_probs,
            &options.u_probs,
            &options.em,
        )
        .await?;
        stats.em_time_secs = em_start.elapsed().as_secs_f64();
        stats.em = Some(report);
        (m, u)
    } else {
        (options.m_probs.clone(), options.u_probs.clone())
    };
    if let Some(pb) = &main_pb {
        pb.inc(1);
        pb.set_message("Scoring candidate pairs...");
    }

    // Phase 3: scoring with the (possibly refined) parameters
    let scoring_start = Instant::now();
    let batches = pairs
        .chunks(options.batch_size)
        .map(<[CandidatePair]>::to_vec);
    let (scored, scoring_stats) = score_pairs(
        Arc::clone(&records),
        batches,
        functions,
        &m_probs,
        &u_probs,
        multi_progress.as_ref(),
    )
    .await?;
    stats.scoring = scoring_stats;
    stats.scoring_time_secs = scoring_start.elapsed().as_secs_f64();
    if let Some(pb) = &main_pb {
        pb.inc(1);
        pb.set_message("Clustering matches...");
    }

    // Phase 4: threshold + transitive closure. Seeding every record first
    // keeps never-matched records visible as singletons.
    let clustering_start = Instant::now();
    let mut forest = DisjointSetForest::new();
    for record in records.iter() {
        forest.find(&record.id);
    }
    let mut matched = 0usize;
    for pair in &scored {
        if pair.score > options.match_threshold {
            forest.merge(&pair.a_id, &pair.b_id);
            matched += 1;
        }
    }
    let clusters = forest.snapshot();
    stats.pairs_matched = matched;
    stats.clusters = clusters.len();
    stats.clustering_time_secs = clustering_start.elapsed().as_secs_f64();

    if let Some(pb) = &main_pb {
        pb.inc(1);
        pb.finish_with_message(format!("Linked into {} clusters", clusters.len()));
    }
    info!(
        "linkage run {} complete: {} pairs generated, {} matched, {} clusters",
        stats.run_id, stats.pairs_generated, stats.pairs_matched, stats.clusters
    );

    Ok((clusters, stats))
}

/// Convenience view: the clusters as lists of full records.
pub async fn link_records_with_details(
    records: Vec<Record>,
    options: &MatchOptions,
    multi_progress: Option<MultiProgress>,
) -> Result<Vec<Vec<Record>>> {
    let by_id: HashMap<String, Record> = records
        .iter()
        .map(|r| (r.id.clone(), r.clone()))
        .collect();
    let clusters = link_records(records, options, multi_progress).await?;
    Ok(clusters
        .into_values()
        .map(|members| {
            members
                .into_iter()
                .filter_map(|id| by_id.get(&id).cloned())
                .collect()
        })
        .collect())
}

/// Drop records the engine cannot pair safely: empty ids and later copies
/// of a duplicated id.
fn sanitize_records(records: Vec<Record>) -> Vec<Record> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut clean = Vec::with_capacity(records.len());
    for record in records {
        if record.id.is_empty() {
            warn!("skipping record with empty id");
            continue;
        }
        if !seen.insert(record.id.clone()) {
            warn!("skipping record with duplicate id {:?}", record.id);
            continue;
        }
        clean.push(record);
    }
    clean
}
