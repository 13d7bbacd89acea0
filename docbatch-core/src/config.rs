use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::retry::{RetryPolicy, DEFAULT_MAX_ATTEMPTS};
use crate::spreadsheet::REPORT_FILE_NAME;
use crate::summary::SUMMARY_FILE_NAME;

pub const DEFAULT_WORKERS: usize = 4;
pub const DEFAULT_DOCUMENTS_DIR: &str = "Documents";

/// Workflow roots: where batches wait, where summaries and reports go.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PathsConfig {
    pub to_be_processed: PathBuf,
    pub in_progress: PathBuf,
    pub processed: PathBuf,
    pub failed: PathBuf,
}

impl PathsConfig {
    pub fn processed_report(&self, batch_name: &str) -> PathBuf {
        self.processed.join(batch_name).join(REPORT_FILE_NAME)
    }

    pub fn failed_report(&self, batch_name: &str) -> PathBuf {
        self.failed.join(batch_name).join(REPORT_FILE_NAME)
    }

    /// `<failed>/<batch>/<documents_dir>`, the mirror failed files are moved to.
    pub fn failed_documents_dir(&self, batch_name: &str, documents_dir: &str) -> PathBuf {
        self.failed.join(batch_name).join(documents_dir)
    }

    pub fn summary_file(&self) -> PathBuf {
        self.in_progress.join(SUMMARY_FILE_NAME)
    }
}

/// How a batch is processed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PipelineConfig {
    /// Worker pool width; bounds concurrent uploads.
    pub workers: usize,
    pub max_attempts: u32,
    pub retry_delay_ms: u64,
    /// Upper bound on how long a batch waits for its workers before aborting
    /// the rest. Unset: every upload runs to its terminal outcome.
    pub drain_timeout_secs: Option<u64>,
    pub documents_dir: String,
    pub document_extensions: Vec<String>,
    pub metadata_extension: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            retry_delay_ms: 0,
            drain_timeout_secs: None,
            documents_dir: DEFAULT_DOCUMENTS_DIR.to_string(),
            document_extensions: vec!["pdf".to_string()],
            metadata_extension: "xlsx".to_string(),
        }
    }
}

impl PipelineConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_attempts, Duration::from_millis(self.retry_delay_ms))
    }

    pub fn drain_timeout(&self) -> Option<Duration> {
        self.drain_timeout_secs.map(Duration::from_secs)
    }

    pub fn worker_count(&self) -> usize {
        self.workers.max(1)
    }

    /// Case-insensitive extension match against `document_extensions`.
    pub fn is_document(&self, path: &Path) -> bool {
        has_extension(path, &self.document_extensions)
    }

    pub fn is_metadata_source(&self, path: &Path) -> bool {
        has_extension(path, std::slice::from_ref(&self.metadata_extension))
    }

    pub fn trace_loaded(&self) {
        info!(
            workers = self.worker_count(),
            max_attempts = self.max_attempts,
            retry_delay_ms = self.retry_delay_ms,
            documents_dir = %self.documents_dir,
            "Loaded pipeline config"
        );
        debug!(?self, "Pipeline config (full debug)");
    }
}

fn has_extension(path: &Path, allowed: &[String]) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| allowed.iter().any(|a| a.eq_ignore_ascii_case(ext)))
}
