//! Thread-safe accumulation of per-document outcomes for one batch.
//!
//! [`OutcomeAggregator::record`] is the only way to mutate the ledgers and
//! counters. It also moves the document on disk so that the report and the
//! file's location agree: accepted files leave the `Documents` folder, failed
//! files land in the failure mirror of the batch.

use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::{error, info};

use crate::contract::{BatchSummary, OutcomeStatus, UploadOutcome};
use crate::error::RelocationError;

/// Succeeded/failed counters, only ever incremented.
#[derive(Debug, Default)]
pub struct BatchCounters {
    succeeded: AtomicUsize,
    failed: AtomicUsize,
}

impl BatchCounters {
    pub fn succeeded(&self) -> usize {
        self.succeeded.load(Ordering::SeqCst)
    }

    pub fn failed(&self) -> usize {
        self.failed.load(Ordering::SeqCst)
    }
}

/// Append-only outcome lists in completion order.
#[derive(Debug, Default, Clone)]
pub struct OutcomeLedger {
    pub succeeded: Vec<UploadOutcome>,
    pub failed: Vec<UploadOutcome>,
}

#[derive(Debug)]
pub struct OutcomeAggregator {
    failed_documents_dir: PathBuf,
    ledger: Mutex<OutcomeLedger>,
    counters: BatchCounters,
}

impl OutcomeAggregator {
    /// `failed_documents_dir` is where failed files are moved, e.g.
    /// `<failed root>/<batch>/Documents`.
    pub fn new(failed_documents_dir: impl Into<PathBuf>) -> Self {
        Self {
            failed_documents_dir: failed_documents_dir.into(),
            ledger: Mutex::new(OutcomeLedger::default()),
            counters: BatchCounters::default(),
        }
    }

    /// Classify one terminal outcome.
    ///
    /// The file side effect runs first. If it fails the error is logged and the
    /// outcome is still recorded as classified.
    pub fn record(&self, outcome: UploadOutcome) {
        let relocation = match outcome.status {
            OutcomeStatus::Succeeded => remove_processed(&outcome.document),
            OutcomeStatus::FailedAfterRetries => {
                move_replacing(&outcome.document, &self.failed_documents_dir).map(|target| {
                    info!(
                        from = %outcome.document.display(),
                        to = %target.display(),
                        "Moved failed document"
                    );
                })
            }
        };
        if let Err(e) = relocation {
            error!(
                error = %e,
                document = %outcome.document.display(),
                "File relocation failed; outcome stays recorded"
            );
        }

        let mut ledger = self.lock();
        match outcome.status {
            OutcomeStatus::Succeeded => {
                ledger.succeeded.push(outcome);
                self.counters.succeeded.fetch_add(1, Ordering::SeqCst);
            }
            OutcomeStatus::FailedAfterRetries => {
                ledger.failed.push(outcome);
                self.counters.failed.fetch_add(1, Ordering::SeqCst);
            }
        }
    }

    pub fn counters(&self) -> &BatchCounters {
        &self.counters
    }

    pub fn snapshot(&self) -> OutcomeLedger {
        self.lock().clone()
    }

    /// Documents that already reached a terminal outcome.
    pub fn recorded_documents(&self) -> HashSet<PathBuf> {
        let ledger = self.lock();
        ledger
            .succeeded
            .iter()
            .chain(ledger.failed.iter())
            .map(|o| o.document.clone())
            .collect()
    }

    pub fn summary(&self, folder_name: &str) -> BatchSummary {
        let _ledger = self.lock();
        BatchSummary {
            folder_name: folder_name.to_string(),
            uploaded: self.counters.succeeded(),
            failed: self.counters.failed(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, OutcomeLedger> {
        self.ledger.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Delete an uploaded file. A file that is already gone is fine.
pub fn remove_processed(path: &Path) -> Result<(), RelocationError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(source) => Err(RelocationError {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Move `file` into `target_dir`, creating it if needed and replacing a file of
/// the same name. Falls back to copy + delete when a rename is not possible
/// (e.g. across filesystems).
pub fn move_replacing(file: &Path, target_dir: &Path) -> Result<PathBuf, RelocationError> {
    let wrap = |source: io::Error| RelocationError {
        path: file.to_path_buf(),
        source,
    };
    let name = file
        .file_name()
        .ok_or_else(|| wrap(io::Error::new(io::ErrorKind::InvalidInput, "no file name")))?;
    fs::create_dir_all(target_dir).map_err(wrap)?;
    let target = target_dir.join(name);

    if let Err(rename_err) = fs::rename(file, &target) {
        if !file.exists() {
            return Err(wrap(rename_err));
        }
        fs::copy(file, &target).map_err(wrap)?;
        fs::remove_file(file).map_err(wrap)?;
    }
    Ok(target)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::MetadataRecord;
    use tempfile::tempdir;

    fn outcome(document: PathBuf, status: OutcomeStatus) -> UploadOutcome {
        UploadOutcome {
            status,
            record: MetadataRecord::default(),
            batch_folder: document.parent().map(Path::to_path_buf).unwrap_or_default(),
            document,
            attempts: 1,
            last_failure: None,
        }
    }

    #[test]
    fn success_deletes_file_and_tolerates_missing_one() {
        let dir = tempdir().unwrap();
        let doc = dir.path().join("A.pdf");
        fs::write(&doc, b"pdf").unwrap();

        let aggregator = OutcomeAggregator::new(dir.path().join("failed"));
        aggregator.record(outcome(doc.clone(), OutcomeStatus::Succeeded));
        assert!(!doc.exists());

        // Recording again for a file that no longer exists must not blow up.
        aggregator.record(outcome(doc, OutcomeStatus::Succeeded));
        assert_eq!(aggregator.counters().succeeded(), 2);
    }

    #[test]
    fn failure_moves_file_and_overwrites_existing_target() {
        let dir = tempdir().unwrap();
        let doc = dir.path().join("B.pdf");
        fs::write(&doc, b"new").unwrap();
        let failed_dir = dir.path().join("failed/01-02-2024/Documents");
        fs::create_dir_all(&failed_dir).unwrap();
        fs::write(failed_dir.join("B.pdf"), b"old").unwrap();

        let aggregator = OutcomeAggregator::new(&failed_dir);
        aggregator.record(outcome(doc.clone(), OutcomeStatus::FailedAfterRetries));

        assert!(!doc.exists());
        assert_eq!(fs::read(failed_dir.join("B.pdf")).unwrap(), b"new");
        assert_eq!(aggregator.counters().failed(), 1);
        assert_eq!(aggregator.snapshot().failed.len(), 1);
    }

    #[test]
    fn relocation_failure_keeps_the_outcome() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("ghost.pdf");

        let aggregator = OutcomeAggregator::new(dir.path().join("failed"));
        aggregator.record(outcome(missing.clone(), OutcomeStatus::FailedAfterRetries));

        let ledger = aggregator.snapshot();
        assert_eq!(ledger.failed.len(), 1);
        assert!(aggregator.recorded_documents().contains(&missing));
    }

    #[test]
    fn summary_reflects_counters() {
        let dir = tempdir().unwrap();
        let aggregator = OutcomeAggregator::new(dir.path().join("failed"));
        aggregator.record(outcome(dir.path().join("x.pdf"), OutcomeStatus::Succeeded));
        aggregator.record(outcome(dir.path().join("y.pdf"), OutcomeStatus::FailedAfterRetries));

        let summary = aggregator.summary("05-06-2024");
        assert_eq!(summary.uploaded, 1);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.folder_name, "05-06-2024");
    }
}
