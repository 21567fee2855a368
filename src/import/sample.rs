//! JSON sample loader
//!
//! A sample is a JSON array of book objects or one object per line, plain or
//! compressed. The first non-blank line decides: `[` means array, anything else
//! is read as JSON Lines.

use super::progress::ImportProgress;
use super::reader::{DecodePolicy, LineReader};
use super::source::{ImportError, ParseError};
use crate::types::{BookDocument, BookSource};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;
use tracing::{debug, info, warn};

/// `"authors": "Doyle"` and `"authors": ["Doyle", "Bell"]` are both accepted
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

impl OneOrMany {
    fn into_vec(self) -> Vec<String> {
        match self {
            OneOrMany::One(s) => vec![s],
            OneOrMany::Many(v) => v,
        }
    }
}

#[derive(Debug, Deserialize)]
struct SampleRecord {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    authors: Option<OneOrMany>,
    #[serde(default)]
    author: Option<OneOrMany>,
    #[serde(default)]
    subjects: Option<OneOrMany>,
}

/// Convert one sample object. `Ok(None)` means the title was blank.
pub fn sample_document(value: Value) -> Result<Option<BookDocument>, ParseError> {
    let record: SampleRecord =
        serde_json::from_value(value).map_err(|e| ParseError::InvalidPayload(e.to_string()))?;

    let Some(doc) = BookDocument::new(record.title.as_deref().unwrap_or(""), BookSource::Json)
    else {
        return Ok(None);
    };

    let mut authors = record.authors.map(OneOrMany::into_vec).unwrap_or_default();
    if authors.iter().all(|a| a.trim().is_empty()) {
        authors = record.author.map(OneOrMany::into_vec).unwrap_or_default();
    }
    let subjects = record.subjects.map(OneOrMany::into_vec).unwrap_or_default();

    Ok(Some(doc.with_authors(authors).with_subjects(subjects)))
}

/// Counters from a sample load
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SampleStats {
    /// Objects (array elements or non-blank lines) examined
    pub records: u64,
    /// Objects that could not be read as a book
    pub parse_failures: u64,
    /// Objects dropped for an empty title
    pub skipped_blank_title: u64,
    /// Documents handed downstream
    pub emitted: u64,
    /// Lines skipped as undecodable text
    pub decode_errors: u64,
    /// Bytes consumed from disk
    pub bytes_read: u64,
}

/// Layout detected from the first non-blank line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleLayout {
    Array,
    Lines,
}

enum Records {
    Array(std::vec::IntoIter<Value>),
    Lines {
        reader: LineReader,
        first: Option<Value>,
    },
}

/// Lazy sequence of documents from a JSON sample
pub struct SampleDocuments<'a> {
    records: Records,
    layout: SampleLayout,
    progress: &'a ImportProgress,
    stats: SampleStats,
    reader_stats: Option<(u64, u64)>,
    finished: bool,
}

impl<'a> SampleDocuments<'a> {
    /// Open a sample and detect its layout.
    ///
    /// Fails with [`ImportError::Format`] when the file is an array that does
    /// not parse, or when its first line is not JSON at all.
    pub fn open(
        path: impl AsRef<Path>,
        policy: DecodePolicy,
        progress: &'a ImportProgress,
    ) -> Result<Self, ImportError> {
        let mut reader = LineReader::open_with_policy(path.as_ref(), policy)?;
        info!("Loading JSON sample from: {}", reader.path().display());

        // A UTF-8 byte order mark may precede the first value
        let mut first = None;
        for line in reader.by_ref() {
            let line = line?;
            let line = match line.strip_prefix('\u{feff}') {
                Some(rest) => rest.to_string(),
                None => line,
            };
            if !line.trim().is_empty() {
                first = Some(line);
                break;
            }
        }
        let first = match first {
            Some(line) => line,
            None => {
                warn!("JSON sample {} is empty", reader.path().display());
                return Ok(Self::new(
                    Records::Array(Vec::new().into_iter()),
                    SampleLayout::Array,
                    progress,
                    Some((reader.stats().decode_errors, reader.bytes_read())),
                ));
            }
        };

        if first.trim_start().starts_with('[') {
            let mut text = first;
            for line in reader.by_ref() {
                text.push('\n');
                text.push_str(&line?);
            }
            let values: Vec<Value> = serde_json::from_str(&text).map_err(|e| {
                ImportError::Format(format!(
                    "{} starts like a JSON array but does not parse: {}",
                    reader.path().display(),
                    e
                ))
            })?;
            debug!("Detected JSON array with {} elements", values.len());
            let stats = Some((reader.stats().decode_errors, reader.bytes_read()));
            return Ok(Self::new(
                Records::Array(values.into_iter()),
                SampleLayout::Array,
                progress,
                stats,
            ));
        }

        let first_value: Value = serde_json::from_str(first.trim()).map_err(|e| {
            ImportError::Format(format!(
                "{} is neither a JSON array nor JSON Lines: {}",
                reader.path().display(),
                e
            ))
        })?;
        debug!("Detected JSON Lines");
        Ok(Self::new(
            Records::Lines {
                reader,
                first: Some(first_value),
            },
            SampleLayout::Lines,
            progress,
            None,
        ))
    }

    fn new(
        records: Records,
        layout: SampleLayout,
        progress: &'a ImportProgress,
        reader_stats: Option<(u64, u64)>,
    ) -> Self {
        Self {
            records,
            layout,
            progress,
            stats: SampleStats::default(),
            reader_stats,
            finished: false,
        }
    }

    pub fn layout(&self) -> SampleLayout {
        self.layout
    }

    pub fn stats(&self) -> SampleStats {
        self.stats
    }

    /// Next raw value, or a parse failure for an undecodable JSON line
    fn next_value(&mut self) -> Option<Result<Result<Value, ParseError>, ImportError>> {
        match &mut self.records {
            Records::Array(values) => values.next().map(|v| Ok(Ok(v))),
            Records::Lines { reader, first } => {
                if let Some(value) = first.take() {
                    return Some(Ok(Ok(value)));
                }
                let line = match reader.next()? {
                    Ok(line) => line,
                    Err(e) => return Some(Err(e)),
                };
                Some(Ok(serde_json::from_str(line.trim())
                    .map_err(|e| ParseError::InvalidPayload(e.to_string()))))
            }
        }
    }

    fn finish(&mut self) {
        if self.finished {
            return;
        }
        self.finished = true;

        let (decode_errors, bytes_read) = match (&self.records, self.reader_stats) {
            (Records::Lines { reader, .. }, _) => {
                (reader.stats().decode_errors, reader.bytes_read())
            }
            (_, Some(stats)) => stats,
            _ => (0, 0),
        };
        self.stats.decode_errors = decode_errors;
        self.stats.bytes_read = bytes_read;
        self.progress
            .finish(self.stats.records, self.stats.bytes_read, self.stats.emitted);

        info!(
            records = self.stats.records,
            emitted = self.stats.emitted,
            parse_failures = self.stats.parse_failures,
            skipped_blank_title = self.stats.skipped_blank_title,
            "JSON sample loaded"
        );
    }
}

impl Iterator for SampleDocuments<'_> {
    type Item = Result<BookDocument, ImportError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.finished {
                return None;
            }
            if self.progress.is_cancelled() {
                info!("JSON sample load cancelled");
                self.finish();
                return None;
            }

            let value = match self.next_value() {
                Some(Ok(value)) => value,
                Some(Err(e)) => {
                    self.finish();
                    return Some(Err(e));
                }
                None => {
                    self.finish();
                    return None;
                }
            };
            self.stats.records += 1;
            self.progress
                .line_scanned(self.stats.records, 0, self.stats.emitted);

            match value.and_then(sample_document) {
                Ok(Some(doc)) => {
                    self.stats.emitted += 1;
                    return Some(Ok(doc));
                }
                Ok(None) => self.stats.skipped_blank_title += 1,
                Err(e) => {
                    debug!("Skipping sample record {}: {}", self.stats.records, e);
                    self.stats.parse_failures += 1;
                }
            }
        }
    }
}
