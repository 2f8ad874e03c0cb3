// src/main.rs

use anyhow::{bail, Context, Result};
use log::info;
use std::env;
use std::sync::Arc;
use std::time::Instant;

use linkage_lib::loaders;
use linkage_lib::pipeline::{link_records_with_stats, MatchOptions};
use linkage_lib::similarity::{IdfMap, SimilarityFunction, SimilarityKernel};
use linkage_lib::utils::progress::ProgressConfig;

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    info!("Starting record linkage pipeline");

    let records_path = env::args()
        .nth(1)
        .context("usage: record_linkage <records.json> (options via env, see below)\n\
                  BLOCKING_FIELDS=city,zip SIMILARITY_FIELDS=name=edit,name=jaro \n\
                  MATCH_THRESHOLD=2.0 BATCH_SIZE=500 RUN_EM=true")?;

    let blocking_fields = env_list("BLOCKING_FIELDS")
        .context("BLOCKING_FIELDS must name at least one field, comma-separated")?;
    let similarity_specs = env_list("SIMILARITY_FIELDS")
        .context("SIMILARITY_FIELDS must name at least one field[=kernel], comma-separated")?;

    let progress_config = ProgressConfig::from_env();
    let multi_progress = progress_config.create_multi_progress();

    let load_start = Instant::now();
    let records = loaders::load_all(&records_path).await?;
    info!(
        "Loaded {} records from {} in {:.2?}",
        records.len(),
        records_path,
        load_start.elapsed()
    );

    // One corpus-wide IDF map over every field a similarity function reads.
    let similarity_fields: Vec<String> = similarity_specs
        .iter()
        .map(|spec| spec.split('=').next().unwrap_or(spec).to_string())
        .collect();
    let idf = Arc::new(IdfMap::from_corpus(&records, &similarity_fields));
    info!("Computed idf weights for {} distinct tokens", idf.len());

    let similarity_functions = similarity_specs
        .iter()
        .map(|spec| parse_similarity_spec(spec, Arc::clone(&idf)))
        .collect::<Result<Vec<SimilarityFunction>>>()?;

    let mut options = MatchOptions::new(blocking_fields, similarity_functions);
    if let Ok(raw) = env::var("MATCH_THRESHOLD") {
        options.match_threshold = raw.parse().context("MATCH_THRESHOLD must be a number")?;
    }
    if let Ok(raw) = env::var("BATCH_SIZE") {
        options.batch_size = raw.parse().context("BATCH_SIZE must be a positive integer")?;
    }
    if let Ok(raw) = env::var("RUN_EM") {
        options.run_em = raw.parse().context("RUN_EM must be true or false")?;
    }
    if let Ok(raw) = env::var("EM_MAX_ITER") {
        options.em.max_iter = raw.parse().context("EM_MAX_ITER must be an integer")?;
    }
    if let Ok(raw) = env::var("EM_TOLERANCE") {
        options.em.tolerance = raw.parse().context("EM_TOLERANCE must be a number")?;
    }

    let run_start = Instant::now();
    let (clusters, stats) = link_records_with_stats(records, &options, multi_progress)
        .await
        .context("linkage pipeline failed")?;

    println!("{}", serde_json::to_string_pretty(&clusters)?);

    info!("=== Linkage Summary ===");
    info!("Run ID: {}", stats.run_id);
    info!("Records: {}", stats.total_records);
    info!("Candidate pairs: {}", stats.pairs_generated);
    info!("Matched pairs: {}", stats.pairs_matched);
    info!("Clusters: {}", stats.clusters);
    if stats.scoring.degenerate_terms > 0 {
        info!("Degenerate likelihood terms: {}", stats.scoring.degenerate_terms);
    }
    if let Some(em) = &stats.em {
        info!(
            "EM: {} iteration(s), converged={}, log-likelihood {:.4}",
            em.iterations, em.converged, em.log_likelihood
        );
    }
    info!("=== Timing Breakdown ===");
    info!("Blocking: {:.3}s", stats.blocking_time_secs);
    info!("EM: {:.3}s", stats.em_time_secs);
    info!("Scoring: {:.3}s", stats.scoring_time_secs);
    info!("Clustering: {:.3}s", stats.clustering_time_secs);
    info!("Total: {:.2?}", run_start.elapsed());
    info!("Pipeline completed successfully!");
    Ok(())
}

fn env_list(name: &str) -> Result<Vec<String>> {
    let raw = env::var(name).unwrap_or_default();
    let items: Vec<String> = raw
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect();
    if items.is_empty() {
        bail!("{name} is empty");
    }
    Ok(items)
}

/// `field` or `field=kernel` with kernel one of `edit`, `jaro`, `cosine`.
fn parse_similarity_spec(spec: &str, idf: Arc<IdfMap>) -> Result<SimilarityFunction> {
    let (field, kernel_name) = match spec.split_once('=') {
        Some((field, kernel)) => (field, kernel),
        None => (spec, "edit"),
    };
    let kernel = match kernel_name {
        "edit" => SimilarityKernel::TokenEditDistance,
        "jaro" => SimilarityKernel::TokenJaro,
        "cosine" => SimilarityKernel::TfIdfCosine,
        other => bail!("unknown similarity kernel {other:?} in {spec:?} (expected edit, jaro, or cosine)"),
    };
    Ok(SimilarityFunction::new(field, kernel, idf))
}
