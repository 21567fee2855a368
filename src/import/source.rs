//! Core error and report types for the ingestion pipeline

use super::authors::AuthorScanStats;
use super::sample::SampleStats;
use super::works::WorkScanStats;
use super::writer::{VerificationReport, WriteStats};
use crate::store::StoreError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur during ingestion.
///
/// `Io`, `NotFound`, `Format`, `Store` and a `Decode` raised by the reader's
/// corruption threshold abort a run. `Parse` and `Write` describe a single
/// record or batch and are counted by the stage that sees them.
#[derive(Debug, Error)]
pub enum ImportError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Input file not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("Unrecognized input format: {0}")]
    Format(String),

    #[error("Write error: {0}")]
    Write(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Per-record parse failure. Never fatal on its own.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("expected at least {expected} columns, found {found}")]
    TooFewColumns { expected: usize, found: usize },

    #[error("payload is not valid JSON: {0}")]
    InvalidPayload(String),

    #[error("expected {expected} record, found {found:?}")]
    KindMismatch { expected: &'static str, found: Option<String> },
}

/// Counters for a whole ingestion run, reported at the end
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestReport {
    /// Wall clock start of the run
    pub started_at: DateTime<Utc>,
    /// Processing time in seconds
    pub elapsed_seconds: f64,
    /// Author index phase (dump runs only)
    pub authors: Option<AuthorScanStats>,
    /// Works phase (dump runs only)
    pub works: Option<WorkScanStats>,
    /// JSON sample phase
    pub sample: Option<SampleStats>,
    /// Writer counters
    pub write: WriteStats,
    /// Post-run verification, if requested
    pub verification: Option<VerificationReport>,
    /// Run stopped early by an interrupt
    pub cancelled: bool,
    /// Fatal error that ended the run, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aborted: Option<String>,
}

impl IngestReport {
    pub fn new(started_at: DateTime<Utc>) -> Self {
        Self {
            started_at,
            elapsed_seconds: 0.0,
            authors: None,
            works: None,
            sample: None,
            write: WriteStats::default(),
            verification: None,
            cancelled: false,
            aborted: None,
        }
    }

    /// Documents written per second over the whole run
    pub fn docs_per_second(&self) -> f64 {
        if self.elapsed_seconds > 0.0 {
            self.write.submitted as f64 / self.elapsed_seconds
        } else {
            0.0
        }
    }

    /// Print summary to console
    pub fn print_summary(&self) {
        println!("\nIngest Summary");
        println!("==============");
        if let Some(ref a) = self.authors {
            println!("Author lines scanned:   {}", a.lines_scanned);
            println!("Authors indexed:        {}", a.indexed);
            println!("Author parse failures:  {}", a.parse_failures);
            println!("Author decode errors:   {}", a.decode_errors);
        }
        if let Some(ref w) = self.works {
            println!("Work lines scanned:     {}", w.lines_scanned);
            println!("Works parsed:           {}", w.parsed);
            println!("Work parse failures:    {}", w.parse_failures);
            println!("Works skipped (title):  {}", w.skipped_blank_title);
            println!("Works skipped (author): {}", w.skipped_unattributed);
            println!("Unresolved author ids:  {}", w.unresolved_author_ids);
            println!("Work decode errors:     {}", w.decode_errors);
        }
        if let Some(ref s) = self.sample {
            println!("Sample records read:    {}", s.records);
            println!("Sample parse failures:  {}", s.parse_failures);
            println!("Sample skipped (title): {}", s.skipped_blank_title);
        }
        println!("Documents submitted:    {}", self.write.submitted);
        println!("Documents inserted:     {}", self.write.inserted);
        println!("Documents updated:      {}", self.write.updated);
        println!("Batches flushed:        {}", self.write.batches_flushed);
        println!("Batches retried:        {}", self.write.batches_retried);
        println!("Batches lost:           {}", self.write.batches_lost);
        println!("Documents lost:         {}", self.write.documents_lost);
        if let Some(ref v) = self.verification {
            let status = if v.mismatch { "MISMATCH" } else { "ok" };
            println!(
                "Verification:           {} (expected {}, found {})",
                status, v.expected_count, v.actual_count
            );
        }
        if self.cancelled {
            println!("Run interrupted:        yes (store holds every batch flushed so far)");
        }
        if let Some(ref reason) = self.aborted {
            println!("Run aborted:            {}", reason);
        }
        println!("Elapsed time:           {:.1}s", self.elapsed_seconds);
        println!("Processing rate:        {:.1} docs/s", self.docs_per_second());
    }
}

/// A run that stopped on a fatal error. `report` holds every counter
/// gathered up to that point; batches it counts as flushed are committed.
#[derive(Debug, Error)]
#[error("Ingest aborted after {} documents submitted", .report.write.submitted)]
pub struct IngestAborted {
    #[source]
    pub error: ImportError,
    pub report: Box<IngestReport>,
}

impl IngestAborted {
    pub fn new(error: ImportError, mut report: IngestReport) -> Self {
        report.aborted = Some(error.to_string());
        Self {
            error,
            report: Box::new(report),
        }
    }
}
