//! # contract: the pipeline's data types and its collaborator seams
//!
//! The batch pipeline talks to the outside world through the traits below:
//!
//! - [`MetadataSource`] reads the batch spreadsheet into raw rows.
//! - [`UploadClient`] performs exactly one upload attempt, no retries.
//! - [`AuditSink`] records one audit row per terminal outcome.
//! - [`ReportSink`] and [`SummarySink`] persist what the batch did.
//!
//! Each trait is annotated for `mockall`, so tests can drive the dispatcher
//! deterministically. The default file/HTTP/SQLite implementations live in
//! sibling modules and in the CLI crate.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
#[cfg(any(test, feature = "test-export-mocks"))]
use mockall::automock;

use crate::error::{AuditError, MetadataError, ReportError, SummaryError, UploadFailure};
use crate::metadata::MetadataRecord;

/// One raw sheet row: document identifier plus `column -> cell text`.
pub type MetadataRow = (String, HashMap<String, String>);

/// One document and its record, handed to exactly one worker.
#[derive(Debug, Clone)]
pub struct UploadTask {
    pub document: PathBuf,
    pub record: MetadataRecord,
    pub batch_folder: PathBuf,
}

impl UploadTask {
    pub fn file_name(&self) -> String {
        self.document
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

/// What the repository told us about an accepted upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadReceipt {
    pub status: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutcomeStatus {
    Succeeded,
    FailedAfterRetries,
}

impl OutcomeStatus {
    /// Status string used in the audit trail.
    pub fn audit_label(self) -> &'static str {
        match self {
            OutcomeStatus::Succeeded => "Success",
            OutcomeStatus::FailedAfterRetries => "Fail",
        }
    }
}

/// Terminal result for one [`UploadTask`]. Produced exactly once per task.
#[derive(Debug, Clone)]
pub struct UploadOutcome {
    pub status: OutcomeStatus,
    pub record: MetadataRecord,
    pub document: PathBuf,
    pub batch_folder: PathBuf,
    pub attempts: u32,
    pub last_failure: Option<UploadFailure>,
}

impl UploadOutcome {
    pub fn is_success(&self) -> bool {
        self.status == OutcomeStatus::Succeeded
    }
}

/// Input for one audit row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditEntry {
    pub document_type: String,
    pub affected_customer: String,
    pub status: OutcomeStatus,
}

impl AuditEntry {
    pub fn for_outcome(outcome: &UploadOutcome) -> Self {
        Self {
            document_type: outcome.record.document_type.clone(),
            affected_customer: outcome.record.affected_customer(),
            status: outcome.status,
        }
    }
}

/// Final counters for one batch, keyed by the batch folder name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchSummary {
    pub folder_name: String,
    pub uploaded: usize,
    pub failed: usize,
}

impl fmt::Display for BatchSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} uploaded, {} failed",
            self.folder_name, self.uploaded, self.failed
        )
    }
}

/// Reads the metadata spreadsheet of a batch.
///
/// The first row is the header; column 0 of each following row is the
/// document identifier (case-sensitive, trimmed).
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
pub trait MetadataSource: Send + Sync {
    fn read_rows(&self, path: &Path) -> Result<Vec<MetadataRow>, MetadataError>;
}

/// One upload attempt against the remote document repository.
///
/// Implementations may share a pooled connection across workers; they must not
/// retry on their own.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait UploadClient: Send + Sync {
    async fn upload(
        &self,
        document: &Path,
        record: &MetadataRecord,
    ) -> Result<UploadReceipt, UploadFailure>;
}

/// Audit trail of terminal outcomes. Failures are logged by the caller and never
/// fail the batch.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record(&self, entry: AuditEntry) -> Result<(), AuditError>;

    /// Release the underlying resource once no batch needs it any more.
    async fn close(&self);
}

/// Writes the spreadsheet report for one outcome list.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
pub trait ReportSink: Send + Sync {
    /// With no outcomes, implementations write nothing and warn.
    fn write_report(&self, outcomes: &[UploadOutcome], destination: &Path)
        -> Result<(), ReportError>;
}

/// Appends per-batch counters to the shared summary file.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
pub trait SummarySink: Send + Sync {
    fn append(&self, summary: &BatchSummary) -> Result<(), SummaryError>;
}
