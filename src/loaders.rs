//! Record loading. The engine itself is storage-agnostic; this module
//! provides the JSON-file loader the binary uses and the batch contract
//! external providers follow. Loader failures are reported to the caller
//! unchanged.

use anyhow::{Context, Result};
use log::debug;
use std::path::Path;

use crate::models::core::Record;

/// Read every record from a JSON array file.
pub async fn load_all(path: impl AsRef<Path>) -> Result<Vec<Record>> {
    let path = path.as_ref();
    let raw = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("failed to read records from {}", path.display()))?;
    let records: Vec<Record> = serde_json::from_str(&raw)
        .with_context(|| format!("failed to parse records in {}", path.display()))?;
    debug!("loaded {} records from {}", records.len(), path.display());
    Ok(records)
}

/// Read one batch of records: `size` of them, starting at `offset`. Each
/// record appears in exactly one batch; the final batch may be short.
pub async fn load_batch(
    path: impl AsRef<Path>,
    size: usize,
    offset: usize,
) -> Result<Vec<Record>> {
    let all = load_all(path).await?;
    Ok(all.into_iter().skip(offset).take(size).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn fixture() -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"[
                {{"id": "r1", "fields": {{"name": "Alice Smith"}}}},
                {{"id": "r2", "fields": {{"name": "Bob Jones"}}}},
                {{"id": "r3"}}
            ]"#
        )
        .unwrap();
        file
    }

    #[tokio::test]
    async fn test_load_all() {
        let file = fixture();
        let records = load_all(file.path()).await.unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].field("name"), "Alice Smith");
        assert_eq!(records[2].field("name"), "");
    }

    #[tokio::test]
    async fn test_load_batch_windows() {
        let file = fixture();
        let batch = load_batch(file.path(), 2, 1).await.unwrap();
        assert_eq!(batch.len(), 2);
        assert_eq!(batch[0].id, "r2");

        let tail = load_batch(file.path(), 10, 2).await.unwrap();
        assert_eq!(tail.len(), 1);
    }

    #[tokio::test]
    async fn test_missing_file_reports_path() {
        let err = load_all("/nonexistent/records.json").await.unwrap_err();
        assert!(format!("{err:#}").contains("/nonexistent/records.json"));
    }
}
