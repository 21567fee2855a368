//! Author index: author key -> display name

use super::progress::ImportProgress;
use super::reader::LineReader;
use super::record::{parse_author, AuthorRecord};
use super::source::ImportError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, info, warn};

/// In-memory mapping from author key to display name.
///
/// Built once per run, before any work is resolved, and only read afterwards.
#[derive(Debug, Clone, Default)]
pub struct AuthorIndex {
    names: HashMap<String, String>,
}

impl AuthorIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a name. Later entries win, so a dump that carries
    /// several revisions of an author ends up with the last one scanned.
    pub fn insert(&mut self, id: impl Into<String>, name: impl Into<String>) -> Option<String> {
        self.names.insert(id.into(), name.into())
    }

    /// Look up the display name for an author key
    pub fn get(&self, id: &str) -> Option<&str> {
        self.names.get(id).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

impl FromIterator<AuthorRecord> for AuthorIndex {
    fn from_iter<I: IntoIterator<Item = AuthorRecord>>(iter: I) -> Self {
        let mut index = AuthorIndex::new();
        for record in iter {
            if !record.id.is_empty() && !record.name.is_empty() {
                index.insert(record.id, record.name);
            }
        }
        index
    }
}

/// Counters from building an [`AuthorIndex`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorScanStats {
    /// Non-blank lines read from the dump
    pub lines_scanned: u64,
    /// Records inserted into the index (including replacements)
    pub indexed: u64,
    /// Distinct author keys in the finished index
    pub distinct: u64,
    /// Lines that did not parse as an author
    pub parse_failures: u64,
    /// Parsed authors without a key or a name
    pub incomplete: u64,
    /// Lines skipped as undecodable text
    pub decode_errors: u64,
    /// Bytes consumed from disk
    pub bytes_read: u64,
}

/// Scans an authors dump into an [`AuthorIndex`]
#[derive(Debug, Clone, Default)]
pub struct AuthorIndexBuilder {
    /// Stop after this many lines have been read (not indexed)
    scan_limit: Option<u64>,
}

impl AuthorIndexBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cap the number of lines read
    pub fn with_scan_limit(mut self, limit: Option<u64>) -> Self {
        self.scan_limit = limit;
        self
    }

    /// Scan until end of file or the scan limit, whichever comes first.
    ///
    /// Malformed lines are counted and skipped. Only reader failures (I/O,
    /// corrupt compression, decode threshold) abort the scan.
    pub fn build(
        &self,
        reader: LineReader,
        progress: &ImportProgress,
    ) -> Result<(AuthorIndex, AuthorScanStats), ImportError> {
        let mut stats = AuthorScanStats::default();
        let index = self.build_into(reader, progress, &mut stats)?;
        Ok((index, stats))
    }

    /// Like [`build`](Self::build), but counters land in `stats` even when
    /// the scan fails part way.
    pub fn build_into(
        &self,
        mut reader: LineReader,
        progress: &ImportProgress,
        stats: &mut AuthorScanStats,
    ) -> Result<AuthorIndex, ImportError> {
        info!("Building author index from: {}", reader.path().display());

        let mut index = AuthorIndex::new();
        *stats = AuthorScanStats::default();

        loop {
            if let Some(limit) = self.scan_limit {
                if reader.lines_read() >= limit {
                    info!("Reached authors scan limit: {}", limit);
                    break;
                }
            }
            if progress.is_cancelled() {
                info!("Author scan cancelled");
                break;
            }

            let line = match reader.next() {
                Some(Ok(line)) => line,
                Some(Err(e)) => {
                    record_reader(stats, &reader, &index);
                    return Err(e);
                }
                None => break,
            };

            match parse_author(&line) {
                Ok(author) if author.id.is_empty() || author.name.is_empty() => {
                    stats.incomplete += 1;
                }
                Ok(author) => {
                    index.insert(author.id, author.name);
                    stats.indexed += 1;
                }
                Err(e) => {
                    debug!("Skipping author line {}: {}", reader.lines_read(), e);
                    stats.parse_failures += 1;
                }
            }

            progress.line_scanned(reader.lines_read(), reader.bytes_read(), stats.indexed);
        }

        record_reader(stats, &reader, &index);
        progress.finish(stats.lines_scanned, stats.bytes_read, stats.indexed);

        info!(
            lines_scanned = stats.lines_scanned,
            indexed = stats.indexed,
            distinct = stats.distinct,
            parse_failures = stats.parse_failures,
            "Author index built"
        );
        if index.is_empty() {
            warn!("Author index is empty; no work will resolve to an author name");
        }

        Ok(index)
    }
}

fn record_reader(stats: &mut AuthorScanStats, reader: &LineReader, index: &AuthorIndex) {
    let reader_stats = reader.stats();
    stats.lines_scanned = reader_stats.lines_read;
    stats.decode_errors = reader_stats.decode_errors;
    stats.bytes_read = reader_stats.bytes_read;
    stats.distinct = index.len() as u64;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn dump(lines: &[&str]) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        for line in lines {
            writeln!(file, "{}", line).unwrap();
        }
        file.flush().unwrap();
        file
    }

    fn author_line(key: &str, name: &str) -> String {
        format!(
            "/type/author\t{key}\t1\t2020-01-01T00:00:00\t{{\"key\": \"{key}\", \"type\": {{\"key\": \"/type/author\"}}, \"name\": \"{name}\"}}"
        )
    }

    #[test]
    fn test_index_from_records() {
        let index: AuthorIndex = vec![
            AuthorRecord { id: "A1".into(), name: "Doyle".into() },
            AuthorRecord { id: "".into(), name: "Nobody".into() },
            AuthorRecord { id: "A2".into(), name: "".into() },
        ]
        .into_iter()
        .collect();
        assert_eq!(index.len(), 1);
        assert_eq!(index.get("A1"), Some("Doyle"));
        assert_eq!(index.get("A2"), None);
    }

    #[test]
    fn test_build_counts_everything() {
        let a1 = author_line("/authors/OL1A", "Doyle");
        let a2 = author_line("/authors/OL2A", "Christie");
        let file = dump(&[
            &a1,
            "not a dump line",
            "/type/author\t/authors/OL3A\t{broken",
            "/type/work\t/works/OL1W\t1\t2020\t{\"type\": \"/type/work\", \"title\": \"x\"}",
            "/type/author\t/authors/OL4A\t1\t2020\t{\"key\": \"/authors/OL4A\", \"type\": \"/type/author\"}",
            &a2,
        ]);

        let reader = LineReader::open(file.path()).unwrap();
        let (index, stats) = AuthorIndexBuilder::new()
            .build(reader, &ImportProgress::hidden())
            .unwrap();

        assert_eq!(index.len(), 2);
        assert_eq!(index.get("/authors/OL1A"), Some("Doyle"));
        assert_eq!(index.get("/authors/OL2A"), Some("Christie"));
        assert_eq!(stats.lines_scanned, 6);
        assert_eq!(stats.indexed, 2);
        assert_eq!(stats.parse_failures, 3);
        assert_eq!(stats.incomplete, 1);
    }

    #[test]
    fn test_last_write_wins() {
        let old = author_line("/authors/OL1A", "A. C. Doyle");
        let new = author_line("/authors/OL1A", "Arthur Conan Doyle");
        let file = dump(&[&old, &new]);

        let reader = LineReader::open(file.path()).unwrap();
        let (index, stats) = AuthorIndexBuilder::new()
            .build(reader, &ImportProgress::hidden())
            .unwrap();

        assert_eq!(index.get("/authors/OL1A"), Some("Arthur Conan Doyle"));
        assert_eq!(stats.indexed, 2);
        assert_eq!(stats.distinct, 1);
    }

    #[test]
    fn test_scan_limit_caps_lines_not_authors() {
        let a1 = author_line("/authors/OL1A", "Doyle");
        let a2 = author_line("/authors/OL2A", "Christie");
        let file = dump(&["garbage", "more garbage", &a1, &a2]);

        let reader = LineReader::open(file.path()).unwrap();
        let (index, stats) = AuthorIndexBuilder::new()
            .with_scan_limit(Some(3))
            .build(reader, &ImportProgress::hidden())
            .unwrap();

        assert_eq!(stats.lines_scanned, 3);
        assert_eq!(index.len(), 1);
        assert_eq!(index.get("/authors/OL2A"), None);
    }

    #[test]
    fn test_failed_scan_keeps_counters() {
        let lines: Vec<String> = (0..500)
            .map(|i| author_line(&format!("/authors/OL{i}A"), "Someone"))
            .collect();
        let mut encoder =
            flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
        for line in &lines {
            writeln!(encoder, "{}", line).unwrap();
        }
        let mut bytes = encoder.finish().unwrap();
        bytes.truncate(bytes.len() - 20);
        let mut file = tempfile::Builder::new().suffix(".gz").tempfile().unwrap();
        file.write_all(&bytes).unwrap();
        file.flush().unwrap();

        let reader = LineReader::open(file.path()).unwrap();
        let mut stats = AuthorScanStats::default();
        let result =
            AuthorIndexBuilder::new().build_into(reader, &ImportProgress::hidden(), &mut stats);

        assert!(result.is_err());
        assert!(stats.indexed > 0);
        assert_eq!(stats.lines_scanned, stats.indexed);
        assert!(stats.bytes_read > 0);
    }

    #[test]
    fn test_cancelled_scan_stops_early() {
        let a1 = author_line("/authors/OL1A", "Doyle");
        let file = dump(&[&a1]);
        let progress = ImportProgress::hidden();
        progress.cancel();

        let reader = LineReader::open(file.path()).unwrap();
        let (index, stats) = AuthorIndexBuilder::new().build(reader, &progress).unwrap();
        assert!(index.is_empty());
        assert_eq!(stats.lines_scanned, 0);
    }
}
