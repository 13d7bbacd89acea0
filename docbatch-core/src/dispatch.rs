//! Batch orchestration: folder → metadata index → worker pool → outcomes → reports.
//!
//! [`BatchDispatcher::run`] processes one dated batch folder:
//!   - validates the folder and locates its metadata spreadsheet
//!   - builds the [`MetadataIndex`] and pairs every document with its record
//!   - fans the uploads out over a fixed number of workers, each running a
//!     [`RetryingUploader`] and handing the terminal outcome to the batch's
//!     [`OutcomeAggregator`]
//!   - waits for every worker (optionally bounded by a drain timeout), then writes the
//!     processed/failed reports and appends the summary line
//!
//! Only an invalid folder or an unreadable metadata source fails the batch.
//! Report, summary and audit errors are logged and the batch still completes.
//!
//! [`BatchDispatcher::run_all`] walks the to-be-processed root and runs each
//! dated folder in name order, then releases the audit sink.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::aggregate::{OutcomeAggregator, OutcomeLedger};
use crate::config::{PathsConfig, PipelineConfig};
use crate::contract::{
    AuditEntry, AuditSink, BatchSummary, MetadataSource, OutcomeStatus, ReportSink, SummarySink,
    UploadClient, UploadOutcome, UploadTask,
};
use crate::error::{BatchError, ScanError, UploadFailure};
use crate::layout::{self, batch_name, document_id};
use crate::metadata::MetadataIndex;
use crate::retry::RetryingUploader;

/// External collaborators one dispatcher talks to. All of them are shared by
/// the workers of a batch.
#[derive(Clone)]
pub struct Collaborators {
    pub metadata: Arc<dyn MetadataSource>,
    pub client: Arc<dyn UploadClient>,
    pub audit: Arc<dyn AuditSink>,
    pub reports: Arc<dyn ReportSink>,
    pub summary: Arc<dyn SummarySink>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchStatus {
    /// Every submitted document reached a terminal outcome.
    Completed,
    /// Nothing to do: no metadata spreadsheet or no documents.
    NoOp,
}

#[derive(Debug, Clone)]
pub struct BatchResult {
    pub folder_name: String,
    pub status: BatchStatus,
    pub uploaded: usize,
    pub failed: usize,
    /// Document identifiers without a metadata row. Not uploaded, not moved.
    pub skipped: Vec<String>,
    pub ledger: OutcomeLedger,
}

impl BatchResult {
    fn no_op(folder_name: String) -> Self {
        Self {
            folder_name,
            status: BatchStatus::NoOp,
            uploaded: 0,
            failed: 0,
            skipped: Vec::new(),
            ledger: OutcomeLedger::default(),
        }
    }

    pub fn summary(&self) -> BatchSummary {
        BatchSummary {
            folder_name: self.folder_name.clone(),
            uploaded: self.uploaded,
            failed: self.failed,
        }
    }
}

/// Per-folder results of [`BatchDispatcher::run_all`].
#[derive(Debug, Default)]
pub struct RunReport {
    pub completed: Vec<BatchResult>,
    pub failed: Vec<(PathBuf, BatchError)>,
}

pub struct BatchDispatcher {
    pipeline: PipelineConfig,
    paths: PathsConfig,
    collaborators: Collaborators,
}

impl BatchDispatcher {
    pub fn new(pipeline: PipelineConfig, paths: PathsConfig, collaborators: Collaborators) -> Self {
        Self {
            pipeline,
            paths,
            collaborators,
        }
    }

    pub fn pipeline(&self) -> &PipelineConfig {
        &self.pipeline
    }

    /// Process every dated folder under the to-be-processed root, one at a
    /// time. A fatal error in one batch does not stop the others.
    pub async fn run_all(&self) -> Result<RunReport, ScanError> {
        let batches = layout::scan_batches(&self.paths.to_be_processed)?;
        info!(count = batches.len(), "Batch folders to process");

        let mut report = RunReport::default();
        for folder in batches {
            match self.run(&folder).await {
                Ok(result) => report.completed.push(result),
                Err(e) => {
                    error!(folder = %folder.display(), error = %e, "Batch failed");
                    report.failed.push((folder, e));
                }
            }
        }

        self.close().await;
        Ok(report)
    }

    /// Release the audit sink. Call once after the last batch.
    pub async fn close(&self) {
        self.collaborators.audit.close().await;
    }

    pub async fn run(&self, folder: &Path) -> Result<BatchResult, BatchError> {
        let span = info_span!(
            "batch",
            run_id = %Uuid::new_v4(),
            folder = %batch_name(folder)
        );
        self.run_batch(folder).instrument(span).await
    }

    async fn run_batch(&self, folder: &Path) -> Result<BatchResult, BatchError> {
        if !folder.is_dir() {
            error!(folder = %folder.display(), "Invalid batch folder");
            return Err(BatchError::InvalidBatchFolder(folder.to_path_buf()));
        }
        let name = batch_name(folder);
        info!("Processing batch");

        let sources = layout::metadata_sources(folder, &self.pipeline)?;
        let Some(source) = sources.first().cloned() else {
            warn!("No metadata spreadsheet found; nothing to do");
            return Ok(BatchResult::no_op(name));
        };
        if sources.len() > 1 {
            warn!(
                count = sources.len(),
                using = %source.display(),
                "More than one metadata spreadsheet; using the first"
            );
        }

        let index = self.load_index(source).await?;
        info!(records = index.len(), "Metadata index built");

        let documents = layout::pending_documents(folder, &self.pipeline)?;
        if documents.is_empty() {
            warn!("No documents to upload; nothing to do");
            return Ok(BatchResult::no_op(name));
        }

        let mut tasks = Vec::with_capacity(documents.len());
        let mut skipped = Vec::new();
        for document in documents {
            let id = document_id(&document);
            match index.lookup(&id) {
                Some(record) => tasks.push(UploadTask {
                    document,
                    record: record.clone(),
                    batch_folder: folder.to_path_buf(),
                }),
                None => {
                    warn!(document = %id, "No metadata found for document; skipping");
                    skipped.push(id);
                }
            }
        }

        let aggregator = Arc::new(OutcomeAggregator::new(
            self.paths
                .failed_documents_dir(&name, &self.pipeline.documents_dir),
        ));
        self.dispatch(tasks, &aggregator).await;

        let ledger = aggregator.snapshot();
        self.write_reports(&name, &ledger);
        let summary = aggregator.summary(&name);
        if let Err(e) = self.collaborators.summary.append(&summary) {
            error!(error = %e, "Failed to write summary");
        }
        info!(
            uploaded = summary.uploaded,
            failed = summary.failed,
            skipped = skipped.len(),
            "Batch complete"
        );

        Ok(BatchResult {
            folder_name: name,
            status: BatchStatus::Completed,
            uploaded: summary.uploaded,
            failed: summary.failed,
            skipped,
            ledger,
        })
    }

    async fn load_index(&self, source: PathBuf) -> Result<MetadataIndex, BatchError> {
        let reader = Arc::clone(&self.collaborators.metadata);
        let rows = tokio::task::spawn_blocking(move || reader.read_rows(&source))
            .await
            .map_err(|e| BatchError::Join(e.to_string()))??;
        Ok(MetadataIndex::build(rows))
    }

    /// Run every task on the worker pool and wait for all of them. Tasks that
    /// never reached a terminal outcome are recorded as failed.
    async fn dispatch(&self, tasks: Vec<UploadTask>, aggregator: &Arc<OutcomeAggregator>) {
        let uploader = RetryingUploader::new(
            Arc::clone(&self.collaborators.client),
            self.pipeline.retry_policy(),
        );
        let permits = Arc::new(Semaphore::new(self.pipeline.worker_count()));
        let mut submitted = Vec::with_capacity(tasks.len());
        let mut uploads = JoinSet::new();

        info!(
            tasks = tasks.len(),
            workers = self.pipeline.worker_count(),
            "Dispatching uploads"
        );
        for task in tasks {
            submitted.push((task.document.clone(), task.record.clone(), task.batch_folder.clone()));
            let permits = Arc::clone(&permits);
            let uploader = uploader.clone();
            uploads.spawn(
                async move {
                    let _permit = permits.acquire_owned().await;
                    uploader.upload(task).await
                }
                .in_current_span(),
            );
        }

        let mut recorders = Recorders::new(aggregator, &self.collaborators.audit);
        let limit = self.pipeline.drain_timeout();
        if !recorders.collect(&mut uploads, limit).await {
            warn!(
                pending = uploads.len(),
                "Uploads still running after drain timeout; aborting"
            );
            uploads.abort_all();
            if !recorders.collect(&mut uploads, limit).await {
                error!(pending = uploads.len(), "Worker pool did not terminate");
            }
        }

        for (document, record, batch_folder) in submitted {
            if recorders.finished.contains(&document) {
                continue;
            }
            error!(document = %document.display(), "Upload interrupted; recording as failed");
            recorders.spawn(UploadOutcome {
                status: OutcomeStatus::FailedAfterRetries,
                record,
                document,
                batch_folder,
                attempts: 0,
                last_failure: Some(UploadFailure::Timeout),
            });
        }
        recorders.join().await;
    }

    fn write_reports(&self, name: &str, ledger: &OutcomeLedger) {
        let targets = [
            (&ledger.succeeded, self.paths.processed_report(name)),
            (&ledger.failed, self.paths.failed_report(name)),
        ];
        for (outcomes, destination) in targets {
            if let Err(e) = self.collaborators.reports.write_report(outcomes, &destination) {
                error!(report = %destination.display(), error = %e, "Failed to write report");
            }
        }
    }
}

/// Hands terminal outcomes to the aggregator and the audit sink. File moves
/// run on the blocking pool, never on the upload workers.
struct Recorders {
    aggregator: Arc<OutcomeAggregator>,
    audit: Arc<dyn AuditSink>,
    tasks: JoinSet<()>,
    /// Documents whose outcome has been handed over.
    finished: HashSet<PathBuf>,
}

impl Recorders {
    fn new(aggregator: &Arc<OutcomeAggregator>, audit: &Arc<dyn AuditSink>) -> Self {
        Self {
            aggregator: Arc::clone(aggregator),
            audit: Arc::clone(audit),
            tasks: JoinSet::new(),
            finished: HashSet::new(),
        }
    }

    fn spawn(&mut self, outcome: UploadOutcome) {
        self.finished.insert(outcome.document.clone());
        let aggregator = Arc::clone(&self.aggregator);
        let audit = Arc::clone(&self.audit);
        self.tasks.spawn(
            async move {
                let entry = AuditEntry::for_outcome(&outcome);
                let recorded = tokio::task::spawn_blocking(move || aggregator.record(outcome)).await;
                if let Err(e) = recorded {
                    error!(error = %e, "Recording outcome failed");
                }
                if let Err(e) = audit.record(entry).await {
                    error!(error = %e, "Audit write failed");
                }
            }
            .in_current_span(),
        );
    }

    /// Join uploads as they finish and record each outcome, until none are
    /// left or `limit` expires. Returns whether the uploads drained.
    async fn collect(
        &mut self,
        uploads: &mut JoinSet<UploadOutcome>,
        limit: Option<Duration>,
    ) -> bool {
        let joining = async {
            while let Some(joined) = uploads.join_next().await {
                match joined {
                    Ok(outcome) => self.spawn(outcome),
                    Err(e) if e.is_cancelled() => debug!("Upload aborted"),
                    Err(e) => error!(error = %e, "Upload worker panicked"),
                }
            }
        };
        match limit {
            None => {
                joining.await;
                true
            }
            Some(limit) => tokio::time::timeout(limit, joining).await.is_ok(),
        }
    }

    async fn join(mut self) {
        while let Some(joined) = self.tasks.join_next().await {
            if let Err(e) = joined {
                error!(error = %e, "Recorder task failed");
            }
        }
    }
}
