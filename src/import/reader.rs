//! Decompressing line reader for dump and sample files
//!
//! Opens plain, gzip, or bzip2 input and yields one text line at a time without
//! ever holding more than a read buffer in memory. Compression is detected from
//! the leading magic bytes; the file extension is only consulted to warn when
//! the two disagree.

use super::source::ImportError;
use bzip2::read::BzDecoder;
use flate2::read::MultiGzDecoder;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// Read buffer size for both the raw file and the decompressed stream
const BUFFER_CAPACITY: usize = 1024 * 1024;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];
const BZIP2_MAGIC: [u8; 3] = *b"BZh";

/// Extensions that mark a file as uncompressed text
const PLAIN_TEXT_EXTENSIONS: [&str; 5] = ["txt", "json", "jsonl", "ndjson", "tsv"];

/// Compression applied to an input file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Compression {
    Plain,
    Gzip,
    Bzip2,
}

impl Compression {
    /// Guess from the file name
    pub fn from_extension(path: &Path) -> Self {
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .map(str::to_lowercase)
            .unwrap_or_default();
        if name.ends_with(".gz") {
            Compression::Gzip
        } else if name.ends_with(".bz2") {
            Compression::Bzip2
        } else {
            Compression::Plain
        }
    }

    /// Identify from the first bytes of the file. A bzip2 stream starts with
    /// `BZh` followed by the block size digit.
    pub fn from_magic(head: &[u8]) -> Self {
        if head.starts_with(&GZIP_MAGIC) {
            Compression::Gzip
        } else if head.starts_with(&BZIP2_MAGIC)
            && matches!(head.get(BZIP2_MAGIC.len()), Some(b'1'..=b'9'))
        {
            Compression::Bzip2
        } else {
            Compression::Plain
        }
    }

    /// Pick the codec for a file. The bzip2 magic is printable text, so it is
    /// not trusted on a file whose name says it is plain text.
    pub fn detect(path: &Path, head: &[u8]) -> Self {
        match Self::from_magic(head) {
            Compression::Bzip2 if names_plain_text(path) => Compression::Plain,
            sniffed => sniffed,
        }
    }
}

fn names_plain_text(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| PLAIN_TEXT_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

/// When undecodable lines stop being skipped and start failing the stream
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DecodePolicy {
    /// Fraction of undecodable lines tolerated
    pub max_error_rate: f64,
    /// Lines read before the rate is enforced
    pub grace_lines: u64,
}

impl Default for DecodePolicy {
    fn default() -> Self {
        Self {
            max_error_rate: 0.01,
            grace_lines: 1000,
        }
    }
}

impl DecodePolicy {
    fn exceeded(&self, lines_read: u64, decode_errors: u64) -> bool {
        lines_read >= self.grace_lines
            && lines_read > 0
            && (decode_errors as f64 / lines_read as f64) > self.max_error_rate
    }

    /// Final verdict once the stream is exhausted. Short files never reach the
    /// grace period, so a file with no decodable line at all fails outright.
    fn exceeded_at_end(&self, lines_read: u64, decode_errors: u64) -> bool {
        self.exceeded(lines_read, decode_errors)
            || (decode_errors > 0 && decode_errors == lines_read)
    }
}

/// Counters exposed by a [`LineReader`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReaderStats {
    /// Non-blank lines read (decoded or not)
    pub lines_read: u64,
    /// Lines skipped because they were not valid UTF-8
    pub decode_errors: u64,
    /// Bytes consumed from the file on disk (compressed bytes for .gz/.bz2)
    pub bytes_read: u64,
}

/// Counts bytes pulled from the underlying file
struct CountingReader<R> {
    inner: R,
    count: Arc<AtomicU64>,
}

impl<R: Read> Read for CountingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.count.fetch_add(n as u64, Ordering::Relaxed);
        Ok(n)
    }
}

/// Lazy, forward-only sequence of text lines from a possibly compressed file.
///
/// Blank lines are skipped and not counted. Lines that are not valid UTF-8 are
/// skipped and counted as decode errors until the [`DecodePolicy`] threshold is
/// crossed, at which point a single [`ImportError::Decode`] is yielded and the
/// stream ends. The file handle is released when the reader is dropped.
pub struct LineReader {
    path: PathBuf,
    inner: Box<dyn BufRead + Send>,
    compression: Compression,
    total_bytes: u64,
    bytes: Arc<AtomicU64>,
    policy: DecodePolicy,
    lines_read: u64,
    decode_errors: u64,
    buf: Vec<u8>,
    finished: bool,
}

impl LineReader {
    /// Open a file with the default decode policy
    pub fn open(path: impl AsRef<Path>) -> Result<Self, ImportError> {
        Self::open_with_policy(path, DecodePolicy::default())
    }

    /// Open a file, detecting compression from its magic bytes
    pub fn open_with_policy(path: impl AsRef<Path>, policy: DecodePolicy) -> Result<Self, ImportError> {
        let path = path.as_ref().to_path_buf();
        let file = match File::open(&path) {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ImportError::NotFound(path));
            }
            Err(e) => return Err(ImportError::Io(e)),
        };
        let total_bytes = file.metadata()?.len();

        let bytes = Arc::new(AtomicU64::new(0));
        let counting = CountingReader {
            inner: file,
            count: bytes.clone(),
        };
        let mut raw = BufReader::with_capacity(BUFFER_CAPACITY, counting);

        // Peek without consuming
        let compression = Compression::detect(&path, raw.fill_buf()?);
        let by_name = Compression::from_extension(&path);
        if by_name != compression && total_bytes > 0 {
            warn!(
                "{}: extension suggests {:?} but content is {:?}; using content",
                path.display(),
                by_name,
                compression
            );
        }

        let inner: Box<dyn BufRead + Send> = match compression {
            Compression::Gzip => Box::new(BufReader::with_capacity(
                BUFFER_CAPACITY,
                MultiGzDecoder::new(raw),
            )),
            Compression::Bzip2 => Box::new(BufReader::with_capacity(
                BUFFER_CAPACITY,
                BzDecoder::new(raw),
            )),
            Compression::Plain => Box::new(raw),
        };

        debug!(
            "Opened {} ({:?}, {} bytes)",
            path.display(),
            compression,
            total_bytes
        );

        Ok(Self {
            path,
            inner,
            compression,
            total_bytes,
            bytes,
            policy,
            lines_read: 0,
            decode_errors: 0,
            buf: Vec::with_capacity(8192),
            finished: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn compression(&self) -> Compression {
        self.compression
    }

    /// Size of the file on disk
    pub fn total_bytes(&self) -> u64 {
        self.total_bytes
    }

    /// Bytes consumed from disk so far (monotonic)
    pub fn bytes_read(&self) -> u64 {
        self.bytes.load(Ordering::Relaxed)
    }

    /// Non-blank lines read so far (monotonic)
    pub fn lines_read(&self) -> u64 {
        self.lines_read
    }

    pub fn stats(&self) -> ReaderStats {
        ReaderStats {
            lines_read: self.lines_read,
            decode_errors: self.decode_errors,
            bytes_read: self.bytes_read(),
        }
    }

    /// Display name for progress output
    pub fn source_name(&self) -> &str {
        self.path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("input")
    }

    fn decode_error(&self) -> ImportError {
        ImportError::Decode(format!(
            "{}: {} of {} lines are not valid UTF-8 (limit {:.2}%)",
            self.path.display(),
            self.decode_errors,
            self.lines_read,
            self.policy.max_error_rate * 100.0
        ))
    }

    fn next_line(&mut self) -> Option<Result<String, ImportError>> {
        loop {
            if self.finished {
                return None;
            }

            self.buf.clear();
            match self.inner.read_until(b'\n', &mut self.buf) {
                Ok(0) => {
                    self.finished = true;
                    if self
                        .policy
                        .exceeded_at_end(self.lines_read, self.decode_errors)
                    {
                        return Some(Err(self.decode_error()));
                    }
                    return None;
                }
                Ok(_) => {}
                Err(e) => {
                    // Truncated or corrupt compressed streams surface here
                    self.finished = true;
                    return Some(Err(ImportError::Io(e)));
                }
            }

            while matches!(self.buf.last(), Some(b'\n') | Some(b'\r')) {
                self.buf.pop();
            }
            if self.buf.iter().all(u8::is_ascii_whitespace) {
                continue;
            }

            self.lines_read += 1;
            match std::str::from_utf8(&self.buf) {
                Ok(line) => return Some(Ok(line.to_string())),
                Err(e) => {
                    self.decode_errors += 1;
                    debug!(
                        "{}: skipping undecodable line {}: {}",
                        self.source_name(),
                        self.lines_read,
                        e
                    );
                    if self.policy.exceeded(self.lines_read, self.decode_errors) {
                        self.finished = true;
                        return Some(Err(self.decode_error()));
                    }
                }
            }
        }
    }
}

impl Iterator for LineReader {
    type Item = Result<String, ImportError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_line()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_temp(suffix: &str, bytes: &[u8]) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(suffix).tempfile().unwrap();
        file.write_all(bytes).unwrap();
        file.flush().unwrap();
        file
    }

    fn gzip(bytes: &[u8]) -> Vec<u8> {
        let mut enc = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
        enc.write_all(bytes).unwrap();
        enc.finish().unwrap()
    }

    fn collect_lines(reader: LineReader) -> Vec<String> {
        reader.map(|l| l.unwrap()).collect()
    }

    #[test]
    fn test_plain_lines_skip_blanks() {
        let file = write_temp(".txt", b"one\r\n\n  \ntwo\nthree");
        let reader = LineReader::open(file.path()).unwrap();
        assert_eq!(reader.compression(), Compression::Plain);
        assert_eq!(collect_lines(reader), vec!["one", "two", "three"]);
    }

    #[test]
    fn test_gzip_detected_by_magic() {
        // No .gz suffix on purpose
        let file = write_temp(".txt", &gzip(b"alpha\nbeta\n"));
        let mut reader = LineReader::open(file.path()).unwrap();
        assert_eq!(reader.compression(), Compression::Gzip);
        assert_eq!(reader.next().unwrap().unwrap(), "alpha");
        assert_eq!(reader.next().unwrap().unwrap(), "beta");
        assert!(reader.next().is_none());
        assert_eq!(reader.lines_read(), 2);
        assert_eq!(reader.bytes_read(), reader.total_bytes());
    }

    #[test]
    fn test_bzip2_detected_by_magic() {
        let mut enc = bzip2::write::BzEncoder::new(Vec::new(), bzip2::Compression::default());
        enc.write_all(b"x\ny\n").unwrap();
        let file = write_temp(".bz2", &enc.finish().unwrap());
        let reader = LineReader::open(file.path()).unwrap();
        assert_eq!(reader.compression(), Compression::Bzip2);
        assert_eq!(collect_lines(reader), vec!["x", "y"]);
    }

    #[test]
    fn test_text_starting_with_bzip2_magic_stays_plain() {
        let file = write_temp(".txt", b"BZh is a title prefix\nnext\n");
        let reader = LineReader::open(file.path()).unwrap();
        assert_eq!(reader.compression(), Compression::Plain);
        assert_eq!(collect_lines(reader), vec!["BZh is a title prefix", "next"]);

        let file = write_temp(".json", b"BZh9 looks like a header\n");
        let reader = LineReader::open(file.path()).unwrap();
        assert_eq!(reader.compression(), Compression::Plain);
        assert_eq!(collect_lines(reader), vec!["BZh9 looks like a header"]);
    }

    #[test]
    fn test_bzip2_magic_needs_block_size() {
        assert_eq!(Compression::from_magic(b"BZh9\x31\x41"), Compression::Bzip2);
        assert_eq!(Compression::from_magic(b"BZh "), Compression::Plain);
        assert_eq!(Compression::from_magic(b"BZh"), Compression::Plain);
        assert_eq!(
            Compression::detect(Path::new("works.txt"), b"BZh9"),
            Compression::Plain
        );
        assert_eq!(
            Compression::detect(Path::new("works.dump"), b"BZh9"),
            Compression::Bzip2
        );
    }

    #[test]
    fn test_multi_member_gzip() {
        let mut bytes = gzip(b"first\n");
        bytes.extend(gzip(b"second\n"));
        let file = write_temp(".gz", &bytes);
        let reader = LineReader::open(file.path()).unwrap();
        assert_eq!(collect_lines(reader), vec!["first", "second"]);
    }

    #[test]
    fn test_missing_file_is_not_found() {
        let result = LineReader::open("/definitely/not/here.txt.gz");
        assert!(matches!(result, Err(ImportError::NotFound(_))));
    }

    #[test]
    fn test_invalid_utf8_skipped_and_counted() {
        let file = write_temp(".txt", b"good\n\xff\xfe bad\nalso good\n");
        let mut reader = LineReader::open(file.path()).unwrap();
        let lines: Vec<_> = reader.by_ref().map(|l| l.unwrap()).collect();
        assert_eq!(lines, vec!["good", "also good"]);
        let stats = reader.stats();
        assert_eq!(stats.lines_read, 3);
        assert_eq!(stats.decode_errors, 1);
    }

    #[test]
    fn test_decode_threshold_aborts_stream() {
        let mut content = Vec::new();
        for _ in 0..5 {
            content.extend_from_slice(b"\xff\xff\n");
        }
        content.extend_from_slice(b"never reached\n");
        let file = write_temp(".txt", &content);
        let policy = DecodePolicy {
            max_error_rate: 0.5,
            grace_lines: 2,
        };
        let mut reader = LineReader::open_with_policy(file.path(), policy).unwrap();
        assert!(matches!(reader.next(), Some(Err(ImportError::Decode(_)))));
        assert!(reader.next().is_none());
    }

    #[test]
    fn test_short_file_with_no_decodable_line_fails_at_eof() {
        let mut content = Vec::new();
        for i in 0..50 {
            content.extend_from_slice(b"{\"title\": \"Caf");
            content.push(0xe9);
            content.extend_from_slice(format!(" {}\"}}\n", i).as_bytes());
        }
        let file = write_temp(".jsonl", &content);
        let mut reader = LineReader::open(file.path()).unwrap();
        assert!(matches!(reader.next(), Some(Err(ImportError::Decode(_)))));
        assert!(reader.next().is_none());
        assert_eq!(reader.stats().decode_errors, 50);
    }

    #[test]
    fn test_early_corruption_checked_at_eof() {
        let mut content = Vec::new();
        for _ in 0..3 {
            content.extend_from_slice(b"\xff\xff\n");
        }
        for _ in 0..7 {
            content.extend_from_slice(b"fine\n");
        }
        let file = write_temp(".txt", &content);
        let policy = DecodePolicy {
            max_error_rate: 0.2,
            grace_lines: 5,
        };
        let mut reader = LineReader::open_with_policy(file.path(), policy).unwrap();
        let results: Vec<_> = reader.by_ref().collect();
        assert_eq!(results.len(), 8);
        assert!(results[..7].iter().all(|r| r.is_ok()));
        assert!(matches!(results[7], Err(ImportError::Decode(_))));
    }

    #[test]
    fn test_compression_from_extension() {
        assert_eq!(
            Compression::from_extension(Path::new("ol_dump_works.txt.gz")),
            Compression::Gzip
        );
        assert_eq!(
            Compression::from_extension(Path::new("dump.BZ2")),
            Compression::Bzip2
        );
        assert_eq!(
            Compression::from_extension(Path::new("sample_books.json")),
            Compression::Plain
        );
    }
}
