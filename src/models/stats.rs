// src/models/stats.rs

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::em::EmReport;

/// Counters accumulated while scoring a pair stream.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ScoringStats {
    /// Pairs that received a score.
    pub pairs_scored: usize,
    /// Per-field LLR terms skipped because the numerator or denominator was
    /// non-positive.
    pub degenerate_terms: usize,
}

impl ScoringStats {
    pub fn absorb(&mut self, other: &ScoringStats) {
        self.pairs_scored += other.pairs_scored;
        self.degenerate_terms += other.degenerate_terms;
    }
}

/// Summary of one full linkage run.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineStats {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub total_records: usize,
    pub pairs_generated: usize,
    pub pairs_matched: usize,
    pub clusters: usize,
    pub scoring: ScoringStats,
    pub em: Option<EmReport>,
    pub blocking_time_secs: f64,
    pub scoring_time_secs: f64,
    pub em_time_secs: f64,
    pub clustering_time_secs: f64,
}

impl PipelineStats {
    pub fn new(total_records: usize) -> Self {
        Self {
            run_id: Uuid::new_v4().to_string(),
            started_at: Utc::now(),
            total_records,
            pairs_generated: 0,
            pairs_matched: 0,
            clusters: 0,
            scoring: ScoringStats::default(),
            em: None,
            blocking_time_secs: 0.0,
            scoring_time_secs: 0.0,
            em_time_secs: 0.0,
            clustering_time_secs: 0.0,
        }
    }
}
