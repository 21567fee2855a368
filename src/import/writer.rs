//! Batched upsert writer and post-run verification

use super::source::ImportError;
use crate::store::{DocumentStore, UpsertOutcome};
use crate::types::BookDocument;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

/// Counters from the writer
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteStats {
    /// Documents handed to the writer
    pub submitted: u64,
    /// Batches committed (first try or retry)
    pub batches_flushed: u64,
    /// Batches that failed once and were retried
    pub batches_retried: u64,
    /// Batches that failed twice and were given up
    pub batches_lost: u64,
    /// Documents in lost batches
    pub documents_lost: u64,
    /// New natural keys created
    pub inserted: u64,
    /// Existing natural keys replaced
    pub updated: u64,
}

impl WriteStats {
    fn record(&mut self, outcome: UpsertOutcome) {
        self.batches_flushed += 1;
        self.inserted += outcome.inserted;
        self.updated += outcome.updated;
    }
}

/// Accumulates documents into fixed-size batches and upserts them.
///
/// A failed batch is retried once with the same documents. If the retry also
/// fails the batch is counted as lost and writing continues with the next one.
pub struct BatchWriter<'s, S: DocumentStore + ?Sized> {
    store: &'s mut S,
    batch_size: usize,
    buffer: Vec<BookDocument>,
    stats: WriteStats,
}

impl<'s, S: DocumentStore + ?Sized> BatchWriter<'s, S> {
    pub fn new(store: &'s mut S, batch_size: usize) -> Self {
        let batch_size = batch_size.max(1);
        Self {
            store,
            batch_size,
            buffer: Vec::with_capacity(batch_size),
            stats: WriteStats::default(),
        }
    }

    pub fn stats(&self) -> WriteStats {
        self.stats
    }

    /// Buffer one document, flushing when the batch is full
    pub fn push(&mut self, doc: BookDocument) {
        self.stats.submitted += 1;
        self.buffer.push(doc);
        if self.buffer.len() >= self.batch_size {
            self.flush();
        }
    }

    /// Drain a document sequence.
    ///
    /// An `Err` from the sequence is fatal: whatever is buffered is flushed
    /// first, then the error is returned.
    pub fn write_all<I>(&mut self, docs: I) -> Result<(), ImportError>
    where
        I: IntoIterator<Item = Result<BookDocument, ImportError>>,
    {
        for doc in docs {
            match doc {
                Ok(doc) => self.push(doc),
                Err(e) => {
                    self.flush();
                    return Err(e);
                }
            }
        }
        Ok(())
    }

    /// Write the buffered documents as one batch
    pub fn flush(&mut self) {
        if self.buffer.is_empty() {
            return;
        }
        let batch_number = self.stats.batches_flushed + self.stats.batches_lost + 1;

        match self.store.upsert_batch(&self.buffer) {
            Ok(outcome) => {
                debug!(
                    batch = batch_number,
                    size = self.buffer.len(),
                    inserted = outcome.inserted,
                    updated = outcome.updated,
                    "Batch committed"
                );
                self.stats.record(outcome);
            }
            Err(first) => {
                warn!(
                    "Batch {} ({} documents) failed, retrying: {}",
                    batch_number,
                    self.buffer.len(),
                    first
                );
                self.stats.batches_retried += 1;

                match self.store.upsert_batch(&self.buffer) {
                    Ok(outcome) => self.stats.record(outcome),
                    Err(second) => {
                        let err = ImportError::Write(format!(
                            "batch {} ({} documents) lost after retry: {}",
                            batch_number,
                            self.buffer.len(),
                            second
                        ));
                        error!("{}", err);
                        self.stats.batches_lost += 1;
                        self.stats.documents_lost += self.buffer.len() as u64;
                    }
                }
            }
        }
        self.buffer.clear();
    }

    /// Flush the final partial batch and make everything durable
    pub fn finish(mut self) -> Result<WriteStats, ImportError> {
        self.flush();
        self.store.flush()?;
        info!(
            submitted = self.stats.submitted,
            batches_flushed = self.stats.batches_flushed,
            batches_lost = self.stats.batches_lost,
            inserted = self.stats.inserted,
            updated = self.stats.updated,
            "Writer finished on {}",
            self.store.name()
        );
        Ok(self.stats)
    }
}

/// Result of comparing the store against what the writer reported
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationReport {
    /// Count before the first batch (after any drop)
    pub pre_count: u64,
    /// `pre_count` plus new keys inserted
    pub expected_count: u64,
    /// Count after the run
    pub actual_count: u64,
    pub submitted: u64,
    pub updated: u64,
    pub documents_lost: u64,
    /// Stored documents fetched back for inspection
    pub spot_check: Vec<BookDocument>,
    /// Spot-checked documents that could not be fetched again by key
    pub spot_check_missing: u64,
    pub mismatch: bool,
}

/// Count the collection and spot-check a few documents.
///
/// A mismatch is logged as a warning and returned in the report; it never
/// fails the run because the data is already committed.
pub fn verify<S: DocumentStore + ?Sized>(
    store: &S,
    pre_count: u64,
    stats: &WriteStats,
    sample_size: usize,
) -> Result<VerificationReport, ImportError> {
    let actual_count = store.count()?;
    let expected_count = pre_count + stats.inserted;

    let spot_check = store.sample(sample_size)?;
    let mut spot_check_missing = 0;
    for doc in &spot_check {
        if store.get(&doc.natural_key())?.is_none() {
            spot_check_missing += 1;
        }
        info!(
            title = %doc.title,
            authors = ?doc.authors,
            subjects = ?doc.subjects,
            "Spot check"
        );
    }

    let mismatch = actual_count != expected_count || spot_check_missing > 0;
    let report = VerificationReport {
        pre_count,
        expected_count,
        actual_count,
        submitted: stats.submitted,
        updated: stats.updated,
        documents_lost: stats.documents_lost,
        spot_check,
        spot_check_missing,
        mismatch,
    };

    if mismatch {
        warn!(
            expected = expected_count,
            actual = actual_count,
            spot_check_missing,
            "Verification mismatch on {}",
            store.name()
        );
    } else {
        info!(
            count = actual_count,
            submitted = stats.submitted,
            updated = stats.updated,
            "Verification ok on {}",
            store.name()
        );
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryStore, StoreError, StoreResult};
    use crate::types::{BookSource, NaturalKey};
    use std::collections::VecDeque;

    /// Records batch sizes and fails the calls scripted in `failures`
    struct ScriptedStore {
        inner: MemoryStore,
        sizes: Vec<usize>,
        failures: VecDeque<bool>,
    }

    impl ScriptedStore {
        fn new(failures: &[bool]) -> Self {
            Self {
                inner: MemoryStore::new("test.books"),
                sizes: Vec::new(),
                failures: failures.iter().copied().collect(),
            }
        }
    }

    impl DocumentStore for ScriptedStore {
        fn name(&self) -> String {
            self.inner.name()
        }

        fn upsert_batch(&mut self, docs: &[BookDocument]) -> StoreResult<UpsertOutcome> {
            if self.failures.pop_front().unwrap_or(false) {
                return Err(StoreError::Unavailable("scripted failure".to_string()));
            }
            self.sizes.push(docs.len());
            self.inner.upsert_batch(docs)
        }

        fn count(&self) -> StoreResult<u64> {
            self.inner.count()
        }

        fn get(&self, key: &NaturalKey) -> StoreResult<Option<BookDocument>> {
            self.inner.get(key)
        }

        fn sample(&self, limit: usize) -> StoreResult<Vec<BookDocument>> {
            self.inner.sample(limit)
        }

        fn search_title(&self, text: &str, limit: usize) -> StoreResult<Vec<BookDocument>> {
            self.inner.search_title(text, limit)
        }

        fn find_by_author(&self, name: &str, limit: usize) -> StoreResult<Vec<BookDocument>> {
            self.inner.find_by_author(name, limit)
        }

        fn ensure_title_index(&mut self) -> StoreResult<bool> {
            self.inner.ensure_title_index()
        }

        fn has_title_index(&self) -> bool {
            self.inner.has_title_index()
        }

        fn drop_collection(&mut self) -> StoreResult<()> {
            self.inner.drop_collection()
        }
    }

    fn books(n: usize) -> Vec<Result<BookDocument, ImportError>> {
        (0..n)
            .map(|i| Ok(BookDocument::new(&format!("Book {}", i), BookSource::Json).unwrap()))
            .collect()
    }

    #[test]
    fn test_batch_boundaries() {
        let mut store = ScriptedStore::new(&[]);
        let mut writer = BatchWriter::new(&mut store, 3);
        writer.write_all(books(7)).unwrap();
        let stats = writer.finish().unwrap();

        assert_eq!(store.sizes, vec![3, 3, 1]);
        assert_eq!(stats.submitted, 7);
        assert_eq!(stats.batches_flushed, 3);
        assert_eq!(stats.inserted, 7);
    }

    #[test]
    fn test_exact_multiple_has_no_empty_batch() {
        let mut store = ScriptedStore::new(&[]);
        let mut writer = BatchWriter::new(&mut store, 3);
        writer.write_all(books(6)).unwrap();
        writer.finish().unwrap();
        assert_eq!(store.sizes, vec![3, 3]);
    }

    #[test]
    fn test_retry_succeeds() {
        // First call fails, its retry succeeds
        let mut store = ScriptedStore::new(&[true, false]);
        let mut writer = BatchWriter::new(&mut store, 2);
        writer.write_all(books(4)).unwrap();
        let stats = writer.finish().unwrap();

        assert_eq!(stats.batches_retried, 1);
        assert_eq!(stats.batches_lost, 0);
        assert_eq!(stats.batches_flushed, 2);
        assert_eq!(store.sizes, vec![2, 2]);
        assert_eq!(store.count().unwrap(), 4);
    }

    #[test]
    fn test_lost_batch_does_not_stop_run() {
        // Batch 1 ok, batch 2 fails twice, batch 3 ok
        let mut store = ScriptedStore::new(&[false, true, true, false]);
        let mut writer = BatchWriter::new(&mut store, 2);
        writer.write_all(books(5)).unwrap();
        let stats = writer.finish().unwrap();

        assert_eq!(stats.submitted, 5);
        assert_eq!(stats.batches_flushed, 2);
        assert_eq!(stats.batches_retried, 1);
        assert_eq!(stats.batches_lost, 1);
        assert_eq!(stats.documents_lost, 2);
        assert_eq!(store.count().unwrap(), 3);
    }

    #[test]
    fn test_source_error_flushes_then_fails() {
        let mut store = ScriptedStore::new(&[]);
        let mut docs = books(2);
        docs.push(Err(ImportError::Decode("too many bad lines".to_string())));
        docs.extend(books(1));

        let mut writer = BatchWriter::new(&mut store, 10);
        let result = writer.write_all(docs);
        assert!(matches!(result, Err(ImportError::Decode(_))));
        assert_eq!(writer.stats().batches_flushed, 1);
        assert_eq!(store.sizes, vec![2]);
    }

    #[test]
    fn test_rerun_is_idempotent() {
        let mut store = MemoryStore::new("test.books");

        let mut writer = BatchWriter::new(&mut store, 3);
        writer.write_all(books(5)).unwrap();
        let first = writer.finish().unwrap();
        let after_first = store.count().unwrap();

        let mut writer = BatchWriter::new(&mut store, 3);
        writer.write_all(books(5)).unwrap();
        let second = writer.finish().unwrap();

        assert_eq!(first.inserted, 5);
        assert_eq!(second.inserted, 0);
        assert_eq!(second.updated, 5);
        assert_eq!(store.count().unwrap(), after_first);
    }

    #[test]
    fn test_verify_counts_inserts() {
        let mut store = MemoryStore::new("test.books");
        store
            .upsert_batch(&[BookDocument::new("Existing", BookSource::Json).unwrap()])
            .unwrap();
        let pre_count = store.count().unwrap();

        let mut writer = BatchWriter::new(&mut store, 2);
        writer.write_all(books(3)).unwrap();
        let stats = writer.finish().unwrap();

        let report = verify(&store, pre_count, &stats, 2).unwrap();
        assert!(!report.mismatch);
        assert_eq!(report.expected_count, 4);
        assert_eq!(report.actual_count, 4);
        assert_eq!(report.spot_check.len(), 2);
        assert_eq!(report.spot_check_missing, 0);
    }

    #[test]
    fn test_verify_reports_mismatch() {
        let mut store = MemoryStore::new("test.books");
        store.upsert_batch(&[BookDocument::new("A", BookSource::Json).unwrap()]).unwrap();

        let stats = WriteStats {
            submitted: 3,
            inserted: 3,
            batches_flushed: 1,
            ..WriteStats::default()
        };
        let report = verify(&store, 0, &stats, 1).unwrap();
        assert!(report.mismatch);
        assert_eq!(report.expected_count, 3);
        assert_eq!(report.actual_count, 1);
    }
}
