//! Ingest coordinator that orchestrates a whole run

use super::authors::{AuthorIndexBuilder, AuthorScanStats};
use super::progress::ImportProgress;
use super::reader::{DecodePolicy, LineReader};
use super::sample::SampleDocuments;
use super::source::{ImportError, IngestAborted, IngestReport};
use super::works::{NormalizeOptions, WorkDocuments};
use super::writer::{verify, BatchWriter};
use crate::store::DocumentStore;
use crate::util::format_bytes;
use chrono::Utc;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};

/// What a run reads from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestSource {
    /// JSON array or JSON Lines sample
    JsonSample(PathBuf),
    /// Open Library authors + works dumps
    Dumps { authors: PathBuf, works: PathBuf },
}

impl IngestSource {
    /// Pick the source from the three optional input paths.
    ///
    /// Exactly one of `json_sample` or the `authors`/`works` pair must be given.
    pub fn from_paths(
        json_sample: Option<PathBuf>,
        authors: Option<PathBuf>,
        works: Option<PathBuf>,
    ) -> Result<Self, ImportError> {
        match (json_sample, authors, works) {
            (Some(sample), None, None) => Ok(Self::JsonSample(sample)),
            (None, Some(authors), Some(works)) => Ok(Self::Dumps { authors, works }),
            (Some(_), _, _) => Err(ImportError::Config(
                "--json-sample cannot be combined with --authors/--works".to_string(),
            )),
            (None, Some(_), None) => Err(ImportError::Config(
                "--authors requires --works".to_string(),
            )),
            (None, None, Some(_)) => Err(ImportError::Config(
                "--works requires --authors".to_string(),
            )),
            (None, None, None) => Err(ImportError::Config(
                "nothing to ingest: pass --json-sample or --authors and --works".to_string(),
            )),
        }
    }

    fn paths(&self) -> Vec<&Path> {
        match self {
            Self::JsonSample(path) => vec![path.as_path()],
            Self::Dumps { authors, works } => vec![authors.as_path(), works.as_path()],
        }
    }
}

/// Settings for one run
#[derive(Debug, Clone, PartialEq)]
pub struct IngestOptions {
    pub batch_size: usize,
    /// Cap on author lines read
    pub authors_scan_limit: Option<u64>,
    /// Cap on work documents emitted
    pub works_limit: Option<u64>,
    pub normalize: NormalizeOptions,
    pub decode: DecodePolicy,
    /// Drop the collection before writing
    pub drop_first: bool,
    /// Count and spot-check the collection after writing
    pub verify_after: bool,
    /// Documents fetched back by the spot check
    pub sample_size: usize,
}

impl Default for IngestOptions {
    fn default() -> Self {
        Self {
            batch_size: 1000,
            authors_scan_limit: None,
            works_limit: None,
            normalize: NormalizeOptions::default(),
            decode: DecodePolicy::default(),
            drop_first: false,
            verify_after: false,
            sample_size: 1,
        }
    }
}

/// Runs the two-phase pipeline against a store.
///
/// Dump runs build the complete author index before the first work line is
/// read; the index is then only borrowed by the work normalizer.
pub struct IngestCoordinator<'s, S: DocumentStore + ?Sized> {
    store: &'s mut S,
    options: IngestOptions,
    quiet: bool,
    cancelled: Arc<AtomicBool>,
}

impl<'s, S: DocumentStore + ?Sized> IngestCoordinator<'s, S> {
    pub fn new(store: &'s mut S, options: IngestOptions) -> Self {
        Self {
            store,
            options,
            quiet: false,
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Set quiet mode (no progress output)
    pub fn with_quiet(mut self, quiet: bool) -> Self {
        self.quiet = quiet;
        self
    }

    /// Share a cancel flag (set from the Ctrl-C handler)
    pub fn with_cancel_flag(mut self, cancelled: Arc<AtomicBool>) -> Self {
        self.cancelled = cancelled;
        self
    }

    /// Run the whole ingestion.
    ///
    /// On a fatal error the returned [`IngestAborted`] carries every counter
    /// gathered so far; batches flushed before the failure stay committed.
    pub fn run(&mut self, source: &IngestSource) -> Result<IngestReport, IngestAborted> {
        let started = Instant::now();
        let mut report = IngestReport::new(Utc::now());

        let outcome = self.execute(source, &mut report);
        report.elapsed_seconds = started.elapsed().as_secs_f64();
        report.cancelled = self.cancelled.load(Ordering::Relaxed);

        match outcome {
            Ok(()) => {
                info!(
                    submitted = report.write.submitted,
                    inserted = report.write.inserted,
                    updated = report.write.updated,
                    batches_lost = report.write.batches_lost,
                    elapsed_seconds = report.elapsed_seconds,
                    "Ingest finished"
                );
                Ok(report)
            }
            Err(e) => {
                error!(
                    submitted = report.write.submitted,
                    inserted = report.write.inserted,
                    updated = report.write.updated,
                    batches_flushed = report.write.batches_flushed,
                    batches_lost = report.write.batches_lost,
                    author_lines = report.authors.map(|a| a.lines_scanned),
                    work_lines = report.works.map(|w| w.lines_scanned),
                    sample_records = report.sample.map(|s| s.records),
                    elapsed_seconds = report.elapsed_seconds,
                    "Ingest aborted: {}",
                    e
                );
                Err(IngestAborted::new(e, report))
            }
        }
    }

    fn execute(&mut self, source: &IngestSource, report: &mut IngestReport) -> Result<(), ImportError> {
        for path in source.paths() {
            let metadata = std::fs::metadata(path).map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => ImportError::NotFound(path.to_path_buf()),
                _ => ImportError::Io(e),
            })?;
            info!("Input {} ({})", path.display(), format_bytes(metadata.len()));
        }

        info!("Target: {}", self.store.name());
        let pre_count = self.store.count()?;
        info!("Pre-count: {}", pre_count);
        let baseline = if self.options.drop_first {
            self.store.drop_collection()?;
            self.store.count()?
        } else {
            pre_count
        };

        let mut writer = BatchWriter::new(&mut *self.store, self.options.batch_size);
        let written = write_source(
            &mut writer,
            source,
            &self.options,
            self.quiet,
            &self.cancelled,
            report,
        );
        report.write = writer.stats();
        if let Err(e) = written {
            if let Err(flush_error) = writer.finish() {
                warn!("Final flush after abort failed: {}", flush_error);
            }
            return Err(e);
        }
        report.write = writer.finish()?;

        if self.cancelled.load(Ordering::Relaxed) {
            warn!("Run interrupted; {} holds every batch flushed so far", self.store.name());
        }

        if self.options.verify_after {
            report.verification = Some(verify(
                &*self.store,
                baseline,
                &report.write,
                self.options.sample_size,
            )?);
        }
        Ok(())
    }
}

/// Stream `source` into `writer`. Phase counters are stored in `report`
/// before any error is returned.
fn write_source<S: DocumentStore + ?Sized>(
    writer: &mut BatchWriter<'_, S>,
    source: &IngestSource,
    options: &IngestOptions,
    quiet: bool,
    cancelled: &Arc<AtomicBool>,
    report: &mut IngestReport,
) -> Result<(), ImportError> {
    match source {
        IngestSource::JsonSample(path) => {
            let progress = ImportProgress::new("json sample", None, quiet, cancelled.clone());
            let mut docs = SampleDocuments::open(path, options.decode, &progress)?;
            let written = writer.write_all(&mut docs);
            report.sample = Some(docs.stats());
            written
        }
        IngestSource::Dumps { authors, works } => {
            let reader = LineReader::open_with_policy(authors, options.decode)?;
            let progress = ImportProgress::new(
                "authors",
                Some(reader.total_bytes()),
                quiet,
                cancelled.clone(),
            );
            let mut author_stats = AuthorScanStats::default();
            let built = AuthorIndexBuilder::new()
                .with_scan_limit(options.authors_scan_limit)
                .build_into(reader, &progress, &mut author_stats);
            report.authors = Some(author_stats);
            let index = built?;

            if progress.is_cancelled() {
                return Ok(());
            }

            let reader = LineReader::open_with_policy(works, options.decode)?;
            let progress = ImportProgress::new(
                "works",
                Some(reader.total_bytes()),
                quiet,
                cancelled.clone(),
            );
            let mut docs = WorkDocuments::new(
                reader,
                &index,
                options.normalize,
                options.works_limit,
                &progress,
            );
            let written = writer.write_all(&mut docs);
            report.works = Some(docs.stats());
            written
        }
    }
}
