//! Error types shared across the batch pipeline.
//!
//! Only [`BatchError`] can abort a batch. Every other error here is logged by the
//! component that hits it and the batch carries on.

use std::path::PathBuf;

use thiserror::Error;

/// Fatal errors for one batch run.
#[derive(Debug, Error)]
pub enum BatchError {
    #[error("invalid batch folder: {}", .0.display())]
    InvalidBatchFolder(PathBuf),
    #[error("metadata source could not be read: {0}")]
    Metadata(#[from] MetadataError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("worker task failed to join: {0}")]
    Join(String),
}

/// The spreadsheet (or other metadata source) is missing or malformed.
#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("failed to open metadata source {}: {message}", .path.display())]
    Open { path: PathBuf, message: String },
    #[error("metadata source {} has no sheets", .0.display())]
    EmptySheet(PathBuf),
    #[error("metadata source {} has no header row", .0.display())]
    MissingHeader(PathBuf),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Why a single upload attempt did not succeed.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum UploadFailure {
    #[error("repository answered with status {code}: {body}")]
    Status { code: u16, body: String },
    #[error("transport error: {0}")]
    Transport(String),
    #[error("request timed out")]
    Timeout,
    #[error("could not read document: {0}")]
    Io(String),
}

#[derive(Debug, Error)]
#[error("failed to relocate {}: {source}", .path.display())]
pub struct RelocationError {
    pub path: PathBuf,
    #[source]
    pub source: std::io::Error,
}

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("spreadsheet error: {0}")]
    Spreadsheet(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum SummaryError {
    #[error("failed to serialise summary: {0}")]
    Json(#[from] serde_json::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum AuditError {
    #[error("audit database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// The to-be-processed root could not be scanned.
#[derive(Debug, Error)]
pub enum ScanError {
    #[error("invalid folder path: {}", .0.display())]
    InvalidRoot(PathBuf),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
