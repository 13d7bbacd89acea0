//! JSON summary file shared by every batch run.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::info;

use crate::contract::{BatchSummary, SummarySink};
use crate::error::SummaryError;

pub const SUMMARY_FILE_NAME: &str = "upload_summary.json";

/// Appends one `{"<folder>": {"uploaded_documents": "N", "failed_documents": "M"}}`
/// line per batch. Earlier runs are never overwritten.
#[derive(Debug, Clone)]
pub struct JsonSummaryFile {
    path: PathBuf,
}

impl JsonSummaryFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `<dir>/upload_summary.json`
    pub fn in_dir(dir: &Path) -> Self {
        Self::new(dir.join(SUMMARY_FILE_NAME))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

pub fn summary_json(summary: &BatchSummary) -> serde_json::Value {
    let counts = serde_json::json!({
        "uploaded_documents": summary.uploaded.to_string(),
        "failed_documents": summary.failed.to_string(),
    });
    let mut entry = serde_json::Map::new();
    entry.insert(summary.folder_name.clone(), counts);
    serde_json::Value::Object(entry)
}

impl SummarySink for JsonSummaryFile {
    fn append(&self, summary: &BatchSummary) -> Result<(), SummaryError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut line = serde_json::to_string(&summary_json(summary))?;
        line.push('\n');

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(line.as_bytes())?;

        info!(path = %self.path.display(), %summary, "Generated JSON summary");
        Ok(())
    }
}
