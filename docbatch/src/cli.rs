//! Command line interface for docbatch.
//!
//! All pipeline logic lives in `docbatch-core`; this module parses arguments,
//! wires the concrete collaborators (HTTP client, spreadsheet reader/writer,
//! summary file, audit sink) into a [`BatchDispatcher`] and prints one summary
//! line per batch.
//!
//! For programmatic and integration use, call [`run`] with a constructed [`Cli`].
use crate::load_config::{load_config, CliConfig};
use crate::upload::HttpUploadClient;
use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use docbatch_core::audit::{LogAuditSink, SqliteAuditLog};
use docbatch_core::contract::AuditSink;
use docbatch_core::dispatch::{BatchDispatcher, BatchResult, BatchStatus, Collaborators};
use docbatch_core::spreadsheet::{XlsxMetadataSource, XlsxReportWriter};
use docbatch_core::summary::JsonSummaryFile;
use std::path::PathBuf;
use std::sync::Arc;

/// CLI for docbatch: upload dated document batches with their spreadsheet metadata.
#[derive(Parser)]
#[clap(
    name = "docbatch",
    version,
    about = "Upload dated folders of documents and spreadsheet metadata to a document repository"
)]
pub struct Cli {
    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Process every dated batch folder under the configured to-be-processed root
    Run {
        /// Path to the YAML config file
        #[clap(long)]
        config: PathBuf,
    },
    /// Process a single batch folder
    Batch {
        /// Path to the YAML config file
        #[clap(long)]
        config: PathBuf,
        /// The batch folder, e.g. `/data/to_be_processed/17-10-2024`
        #[clap(long)]
        folder: PathBuf,
    },
}

pub async fn run(cli: Cli) -> Result<()> {
    tracing::info!("trace_initialised");

    match cli.command {
        Commands::Run { config } => {
            let config = load_config(config)?;
            tracing::info!(command = "run", "Starting batch processing");
            let dispatcher = build_dispatcher(&config).await?;
            let report = dispatcher.run_all().await?;

            for result in &report.completed {
                print_result(result);
            }
            for (folder, e) in &report.failed {
                eprintln!("{}: failed: {e}", folder.display());
            }
            if !report.failed.is_empty() {
                bail!("{} batch folder(s) failed", report.failed.len());
            }
            Ok(())
        }
        Commands::Batch { config, folder } => {
            let config = load_config(config)?;
            tracing::info!(command = "batch", folder = %folder.display(), "Starting batch processing");
            let dispatcher = build_dispatcher(&config).await?;
            let result = dispatcher.run(&folder).await;
            dispatcher.close().await;
            print_result(&result?);
            Ok(())
        }
    }
}

/// Wire the concrete collaborators from config.
pub async fn build_dispatcher(config: &CliConfig) -> Result<BatchDispatcher> {
    config.pipeline.trace_loaded();

    let client = HttpUploadClient::from_config(&config.upload)?;
    let audit: Arc<dyn AuditSink> = match &config.audit.database_url {
        Some(url) => {
            let pool_size = u32::try_from(config.pipeline.worker_count()).unwrap_or(u32::MAX);
            Arc::new(SqliteAuditLog::connect(url, pool_size).await?)
        }
        None => {
            tracing::info!("No audit database configured; audit entries go to the log");
            Arc::new(LogAuditSink::new())
        }
    };

    Ok(BatchDispatcher::new(
        config.pipeline.clone(),
        config.paths.clone(),
        Collaborators {
            metadata: Arc::new(XlsxMetadataSource),
            client: Arc::new(client),
            audit,
            reports: Arc::new(XlsxReportWriter),
            summary: Arc::new(JsonSummaryFile::new(config.paths.summary_file())),
        },
    ))
}

fn print_result(result: &BatchResult) {
    match result.status {
        BatchStatus::Completed => {
            println!("{}", result.summary());
            if !result.skipped.is_empty() {
                println!(
                    "{}: {} without metadata: {}",
                    result.folder_name,
                    result.skipped.len(),
                    result.skipped.join(", ")
                );
            }
        }
        BatchStatus::NoOp => println!("{}: nothing to process", result.folder_name),
    }
}
