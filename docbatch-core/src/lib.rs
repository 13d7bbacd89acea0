#![doc = "docbatch-core: the batch upload pipeline behind docbatch."]

//! Matches the documents of a dated batch folder to their spreadsheet
//! metadata, uploads them over a bounded worker pool with bounded retries, and
//! records each terminal outcome (ledgers, counters, file relocation, audit,
//! reports, summary).
//!
//! The HTTP upload client and config loading live in the `docbatch` CLI crate;
//! everything here is reachable through the [`contract`] traits so tests can
//! swap in mocks.
//!
//! # Navigation
//! - Entrypoint: [`dispatch::BatchDispatcher`]
//! - Per-document retries: [`retry::RetryingUploader`]
//! - Shared batch state: [`aggregate::OutcomeAggregator`]

pub mod aggregate;
pub mod audit;
pub mod config;
pub mod contract;
pub mod dispatch;
pub mod error;
pub mod layout;
pub mod metadata;
pub mod retry;
pub mod spreadsheet;
pub mod summary;
