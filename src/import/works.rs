//! Work normalizer: works dump -> book documents

use super::authors::AuthorIndex;
use super::progress::ImportProgress;
use super::reader::LineReader;
use super::record::{parse_work, WorkRecord};
use super::source::ImportError;
use crate::types::{BookDocument, BookSource};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// What to do with an author key that is not in the [`AuthorIndex`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnresolvedAuthors {
    /// Leave the author out of the document
    #[default]
    Drop,
    /// Keep the bare key (`/authors/OL1A` -> `OL1A`) in place of a name
    Placeholder,
}

impl UnresolvedAuthors {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Drop => "drop",
            Self::Placeholder => "placeholder",
        }
    }
}

impl std::str::FromStr for UnresolvedAuthors {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "drop" => Ok(Self::Drop),
            "placeholder" => Ok(Self::Placeholder),
            other => Err(format!(
                "unknown unresolved-author policy '{}' (expected drop or placeholder)",
                other
            )),
        }
    }
}

/// Normalization settings
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NormalizeOptions {
    pub unresolved_authors: UnresolvedAuthors,
    /// Skip works that end up with no author at all
    pub skip_unattributed: bool,
}

/// Result of normalizing one work
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkOutcome {
    Document {
        doc: BookDocument,
        unresolved: usize,
    },
    /// Title empty after trimming
    BlankTitle,
    /// No author left and `skip_unattributed` is set
    Unattributed { unresolved: usize },
}

/// Resolves a [`WorkRecord`] against an [`AuthorIndex`]
#[derive(Debug, Clone, Copy)]
pub struct WorkNormalizer<'a> {
    index: &'a AuthorIndex,
    options: NormalizeOptions,
}

impl<'a> WorkNormalizer<'a> {
    pub fn new(index: &'a AuthorIndex, options: NormalizeOptions) -> Self {
        Self { index, options }
    }

    /// Map author keys to names, counting keys missing from the index
    fn resolve_authors(&self, ids: &[String]) -> (Vec<String>, usize) {
        let mut names = Vec::with_capacity(ids.len());
        let mut unresolved = 0;
        for id in ids {
            match self.index.get(id) {
                Some(name) => names.push(name.to_string()),
                None => {
                    unresolved += 1;
                    if self.options.unresolved_authors == UnresolvedAuthors::Placeholder {
                        names.push(placeholder_for(id).to_string());
                    }
                }
            }
        }
        (names, unresolved)
    }

    /// Build the unified document for one work
    pub fn normalize(&self, work: &WorkRecord) -> WorkOutcome {
        let (names, unresolved) = self.resolve_authors(&work.author_ids);

        let Some(doc) = BookDocument::new(&work.title, BookSource::OpenLibrary) else {
            return WorkOutcome::BlankTitle;
        };
        let doc = doc.with_authors(names).with_subjects(&work.subjects);

        if self.options.skip_unattributed && doc.authors.is_empty() {
            return WorkOutcome::Unattributed { unresolved };
        }
        WorkOutcome::Document { doc, unresolved }
    }
}

/// Bare author key used when a name cannot be resolved
fn placeholder_for(id: &str) -> &str {
    id.strip_prefix("/authors/").unwrap_or(id)
}

/// Counters from a works scan
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkScanStats {
    /// Non-blank lines pulled from the dump
    pub lines_scanned: u64,
    /// Lines that parsed as works
    pub parsed: u64,
    /// Lines that did not parse as works
    pub parse_failures: u64,
    /// Works dropped for an empty title
    pub skipped_blank_title: u64,
    /// Works dropped for having no author
    pub skipped_unattributed: u64,
    /// Author keys not found in the index
    pub unresolved_author_ids: u64,
    /// Documents handed downstream
    pub emitted: u64,
    /// Lines skipped as undecodable text
    pub decode_errors: u64,
    /// Bytes consumed from disk
    pub bytes_read: u64,
}

/// Lazy sequence of documents from a works dump.
///
/// Stops once `limit` documents have been emitted (not `limit` lines read), at
/// end of file, or when the run is cancelled. There is no resume: restarting
/// means scanning again from the beginning.
pub struct WorkDocuments<'a> {
    reader: LineReader,
    normalizer: WorkNormalizer<'a>,
    limit: Option<u64>,
    progress: &'a ImportProgress,
    stats: WorkScanStats,
    finished: bool,
}

impl<'a> WorkDocuments<'a> {
    pub fn new(
        reader: LineReader,
        index: &'a AuthorIndex,
        options: NormalizeOptions,
        limit: Option<u64>,
        progress: &'a ImportProgress,
    ) -> Self {
        info!("Normalizing works from: {}", reader.path().display());
        Self {
            reader,
            normalizer: WorkNormalizer::new(index, options),
            limit,
            progress,
            stats: WorkScanStats::default(),
            finished: false,
        }
    }

    pub fn stats(&self) -> WorkScanStats {
        self.stats
    }

    fn limit_reached(&self) -> bool {
        self.limit.is_some_and(|limit| self.stats.emitted >= limit)
    }

    fn finish(&mut self) {
        if self.finished {
            return;
        }
        self.finished = true;

        let reader_stats = self.reader.stats();
        self.stats.lines_scanned = reader_stats.lines_read;
        self.stats.decode_errors = reader_stats.decode_errors;
        self.stats.bytes_read = reader_stats.bytes_read;
        self.progress
            .finish(self.stats.lines_scanned, self.stats.bytes_read, self.stats.emitted);

        info!(
            lines_scanned = self.stats.lines_scanned,
            parsed = self.stats.parsed,
            emitted = self.stats.emitted,
            parse_failures = self.stats.parse_failures,
            skipped_blank_title = self.stats.skipped_blank_title,
            skipped_unattributed = self.stats.skipped_unattributed,
            unresolved_author_ids = self.stats.unresolved_author_ids,
            "Works scan finished"
        );
    }
}

impl Iterator for WorkDocuments<'_> {
    type Item = Result<BookDocument, ImportError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.finished {
                return None;
            }
            if self.limit_reached() {
                info!("Reached works limit: {}", self.stats.emitted);
                self.finish();
                return None;
            }
            if self.progress.is_cancelled() {
                info!("Works scan cancelled");
                self.finish();
                return None;
            }

            let line = match self.reader.next() {
                Some(Ok(line)) => line,
                Some(Err(e)) => {
                    self.finish();
                    return Some(Err(e));
                }
                None => {
                    self.finish();
                    return None;
                }
            };
            self.stats.lines_scanned = self.reader.lines_read();
            self.progress.line_scanned(
                self.stats.lines_scanned,
                self.reader.bytes_read(),
                self.stats.emitted,
            );

            let work = match parse_work(&line) {
                Ok(work) => work,
                Err(e) => {
                    debug!("Skipping work line {}: {}", self.stats.lines_scanned, e);
                    self.stats.parse_failures += 1;
                    continue;
                }
            };
            self.stats.parsed += 1;

            match self.normalizer.normalize(&work) {
                WorkOutcome::Document { doc, unresolved } => {
                    self.stats.unresolved_author_ids += unresolved as u64;
                    self.stats.emitted += 1;
                    return Some(Ok(doc));
                }
                WorkOutcome::BlankTitle => {
                    debug!("Skipping work {} with blank title", work.id);
                    self.stats.skipped_blank_title += 1;
                }
                WorkOutcome::Unattributed { unresolved } => {
                    self.stats.unresolved_author_ids += unresolved as u64;
                    self.stats.skipped_unattributed += 1;
                }
            }
        }
    }
}
