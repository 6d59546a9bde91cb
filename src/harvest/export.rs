//! Default exporter: timestamped JSON files in a directory.

use std::path::PathBuf;

use chrono::Utc;
use tracing::info;

use super::collaborators::{ExportError, Exporter};
use crate::persistence::write_json_atomic;
use crate::types::{Category, ResultRecord};

/// Writes each export to `<dir>/results_<category>_<timestamp>.json`.
#[derive(Debug, Clone)]
pub struct JsonFileExporter {
    dir: PathBuf,
}

impl JsonFileExporter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        JsonFileExporter { dir: dir.into() }
    }

    fn path_for(&self, category: &Category) -> PathBuf {
        let stamp = Utc::now().format("%Y%m%d_%H%M%S_%3f");
        self.dir.join(format!("results_{category}_{stamp}.json"))
    }
}

impl Exporter for JsonFileExporter {
    async fn export(
        &self,
        category: &Category,
        records: &[ResultRecord],
    ) -> Result<Option<String>, ExportError> {
        if records.is_empty() {
            return Ok(None);
        }
        let path = self.path_for(category);
        write_json_atomic(&path, records)?;
        info!(category = %category, records = records.len(), path = %path.display(), "Exported records");
        Ok(Some(path.display().to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn writes_records_and_returns_path() {
        let dir = tempdir().unwrap();
        let exporter = JsonFileExporter::new(dir.path().join("exports"));
        let category = Category::parse("optometry").unwrap();
        let records = vec![ResultRecord::new().with("company_name", "Acme")];

        let handle = exporter.export(&category, &records).await.unwrap().unwrap();

        assert!(handle.contains("results_optometry_"));
        let written: Vec<ResultRecord> = serde_json::from_slice(&std::fs::read(&handle).unwrap()).unwrap();
        assert_eq!(written, records);
    }

    #[tokio::test]
    async fn nothing_to_export_creates_nothing() {
        let dir = tempdir().unwrap();
        let exporter = JsonFileExporter::new(dir.path().join("exports"));
        let category = Category::parse("optometry").unwrap();

        assert!(exporter.export(&category, &[]).await.unwrap().is_none());
        assert!(!dir.path().join("exports").exists());
    }
}
