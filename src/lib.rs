// src/lib.rs

pub mod blocking;
pub mod clustering;
pub mod em;
pub mod loaders;
pub mod models;
pub mod pipeline;
pub mod scoring;
pub mod similarity;
pub mod utils;

pub use blocking::{rules_from_fields, BlockingRule, CandidateBatches};
pub use clustering::DisjointSetForest;
pub use em::{EmConfig, EmReport};
pub use models::core::{CandidatePair, Record, ScoredPair};
pub use models::stats::{PipelineStats, ScoringStats};
pub use pipeline::{
    generate_candidate_pairs, link_records, link_records_with_details, link_records_with_stats,
    score_candidate_pairs, validate_options, MatchOptions,
};
pub use similarity::{IdfMap, SimilarityFunction, SimilarityKernel};
