//! sled-backed document store
//!
//! One sled database per `database` name under the data directory, one tree
//! per collection. Documents are bincode-encoded and keyed by their natural
//! key. The title index lives in a sibling tree with `token \0 natural_key`
//! entries so a text search is a handful of prefix scans.

use super::{rank_by_hits, DocumentStore, StoreError, StoreResult, UpsertOutcome};
use crate::types::{BookDocument, NaturalKey};
use crate::util::title_tokens;
use sled::transaction::{ConflictableTransactionResult, TransactionError};
use sled::Transactional;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Marker key in the meta tree once the title index exists
const TITLE_INDEX_FLAG: &[u8] = b"title_index";

/// Separates the token from the natural key in title index entries
const TOKEN_SEPARATOR: u8 = 0;

/// Document collection stored in sled
pub struct SledStore {
    db: sled::Db,
    path: PathBuf,
    database: String,
    collection: String,
    /// natural key -> bincode(BookDocument)
    docs: sled::Tree,
    /// token \0 natural key -> ()
    titles: sled::Tree,
    /// collection-level flags
    meta: sled::Tree,
    title_indexed: bool,
}

impl SledStore {
    /// Open (or create) `<data_dir>/<database>` and the named collection
    pub fn open(
        data_dir: impl AsRef<Path>,
        database: &str,
        collection: &str,
    ) -> StoreResult<Self> {
        let path = data_dir.as_ref().join(database);
        let db = sled::open(&path).map_err(|e| {
            StoreError::Unavailable(format!("cannot open database at {}: {}", path.display(), e))
        })?;

        let docs = db.open_tree(collection)?;
        let titles = db.open_tree(format!("{}.title_index", collection))?;
        let meta = db.open_tree(format!("{}.meta", collection))?;
        let title_indexed = meta.contains_key(TITLE_INDEX_FLAG)?;

        debug!(
            "Opened {}.{} at {} (title index: {})",
            database,
            collection,
            path.display(),
            title_indexed
        );

        Ok(Self {
            db,
            path,
            database: database.to_string(),
            collection: collection.to_string(),
            docs,
            titles,
            meta,
            title_indexed,
        })
    }

    /// Directory holding the sled database
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Bytes used on disk by the whole database
    pub fn size_on_disk(&self) -> StoreResult<u64> {
        Ok(self.db.size_on_disk()?)
    }

    fn decode(&self, bytes: &[u8]) -> StoreResult<BookDocument> {
        Ok(bincode::deserialize(bytes)?)
    }

    /// Read documents in key order, skipping (and logging) undecodable values
    fn scan(&self) -> impl Iterator<Item = StoreResult<BookDocument>> + '_ {
        self.docs.iter().values().filter_map(move |value| match value {
            Ok(bytes) => match self.decode(&bytes) {
                Ok(doc) => Some(Ok(doc)),
                Err(e) => {
                    warn!("Skipping undecodable document in {}: {}", self.name(), e);
                    None
                }
            },
            Err(e) => Some(Err(e.into())),
        })
    }
}

fn title_entry(token: &str, key: &NaturalKey) -> Vec<u8> {
    let mut entry = Vec::with_capacity(token.len() + 1 + key.as_bytes().len());
    entry.extend_from_slice(token.as_bytes());
    entry.push(TOKEN_SEPARATOR);
    entry.extend_from_slice(key.as_bytes());
    entry
}

fn token_prefix(token: &str) -> Vec<u8> {
    let mut prefix = token.as_bytes().to_vec();
    prefix.push(TOKEN_SEPARATOR);
    prefix
}

impl DocumentStore for SledStore {
    fn name(&self) -> String {
        format!("{}.{}", self.database, self.collection)
    }

    fn upsert_batch(&mut self, docs: &[BookDocument]) -> StoreResult<UpsertOutcome> {
        let encoded = docs
            .iter()
            .map(|doc| -> StoreResult<_> {
                let key = doc.natural_key();
                let entries: Vec<Vec<u8>> = if self.title_indexed {
                    title_tokens(&doc.title)
                        .iter()
                        .map(|token| title_entry(token, &key))
                        .collect()
                } else {
                    Vec::new()
                };
                Ok((key, bincode::serialize(doc)?, entries))
            })
            .collect::<StoreResult<Vec<_>>>()?;

        let result = (&self.docs, &self.titles).transaction(
            |(docs, titles)| -> ConflictableTransactionResult<UpsertOutcome> {
                let mut outcome = UpsertOutcome::default();
                for (key, value, entries) in &encoded {
                    match docs.insert(key.as_bytes(), value.as_slice())? {
                        Some(_) => outcome.updated += 1,
                        None => outcome.inserted += 1,
                    }
                    for entry in entries {
                        titles.insert(entry.as_slice(), Vec::<u8>::new())?;
                    }
                }
                Ok(outcome)
            },
        );

        result.map_err(|e| match e {
            TransactionError::Abort(()) => {
                StoreError::Unavailable(format!("batch aborted on {}", self.name()))
            }
            TransactionError::Storage(e) => StoreError::Sled(e),
        })
    }

    fn count(&self) -> StoreResult<u64> {
        Ok(self.docs.len() as u64)
    }

    fn get(&self, key: &NaturalKey) -> StoreResult<Option<BookDocument>> {
        match self.docs.get(key.as_bytes())? {
            Some(bytes) => Ok(Some(self.decode(&bytes)?)),
            None => Ok(None),
        }
    }

    fn sample(&self, limit: usize) -> StoreResult<Vec<BookDocument>> {
        self.scan().take(limit).collect()
    }

    fn search_title(&self, text: &str, limit: usize) -> StoreResult<Vec<BookDocument>> {
        if !self.title_indexed {
            return Err(StoreError::MissingIndex(self.name()));
        }

        let tokens: HashSet<String> = title_tokens(text).into_iter().collect();
        let mut hits: HashMap<NaturalKey, usize> = HashMap::new();
        for token in &tokens {
            let prefix = token_prefix(token);
            for entry in self.titles.scan_prefix(&prefix).keys() {
                let entry = entry?;
                if let Some(key) = NaturalKey::from_stored(&entry[prefix.len()..]) {
                    *hits.entry(key).or_default() += 1;
                }
            }
        }

        let mut found = Vec::new();
        for key in rank_by_hits(hits, limit) {
            if let Some(doc) = self.get(&key)? {
                found.push(doc);
            }
        }
        Ok(found)
    }

    fn find_by_author(&self, name: &str, limit: usize) -> StoreResult<Vec<BookDocument>> {
        let mut found = Vec::new();
        for doc in self.scan() {
            if found.len() >= limit {
                break;
            }
            let doc = doc?;
            if doc.authors.iter().any(|a| a == name) {
                found.push(doc);
            }
        }
        Ok(found)
    }

    fn ensure_title_index(&mut self) -> StoreResult<bool> {
        if self.title_indexed {
            return Ok(false);
        }

        info!("Building title index on {}", self.name());
        let mut batch = sled::Batch::default();
        let mut entries = 0u64;
        for item in self.docs.iter() {
            let (key_bytes, value) = item?;
            let Some(key) = NaturalKey::from_stored(&key_bytes) else {
                warn!("Skipping non-UTF-8 key in {}", self.name());
                continue;
            };
            let doc = self.decode(&value)?;
            for token in title_tokens(&doc.title) {
                batch.insert(title_entry(&token, &key), Vec::<u8>::new());
                entries += 1;
            }
        }
        self.titles.apply_batch(batch)?;
        self.meta.insert(TITLE_INDEX_FLAG, Vec::<u8>::new())?;
        self.title_indexed = true;

        info!(entries, "Title index built on {}", self.name());
        Ok(true)
    }

    fn has_title_index(&self) -> bool {
        self.title_indexed
    }

    fn drop_collection(&mut self) -> StoreResult<()> {
        self.docs.clear()?;
        self.titles.clear()?;
        self.meta.clear()?;
        self.title_indexed = false;
        info!("Dropped collection {}", self.name());
        Ok(())
    }

    fn flush(&self) -> StoreResult<()> {
        self.db.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::BookSource;
    use tempfile::TempDir;

    fn book(title: &str, authors: &[&str]) -> BookDocument {
        BookDocument::new(title, BookSource::OpenLibrary)
            .unwrap()
            .with_authors(authors.iter().copied())
            .with_subjects(["Fiction"])
    }

    #[test]
    fn test_upsert_and_get() {
        let temp_dir = TempDir::new().unwrap();
        let mut store = SledStore::open(temp_dir.path(), "library_db", "books").unwrap();
        assert_eq!(store.name(), "library_db.books");

        let doc = book("A Study in Scarlet", &["Arthur Conan Doyle"]);
        let outcome = store.upsert_batch(&[doc.clone()]).unwrap();
        assert_eq!(outcome, UpsertOutcome { inserted: 1, updated: 0 });
        assert_eq!(store.get(&doc.natural_key()).unwrap(), Some(doc));
    }

    #[test]
    fn test_rerun_updates_in_place() {
        let temp_dir = TempDir::new().unwrap();
        let mut store = SledStore::open(temp_dir.path(), "library_db", "books").unwrap();
        let batch = vec![book("Dune", &["Frank Herbert"]), book("Emma", &["Jane Austen"])];

        store.upsert_batch(&batch).unwrap();
        let outcome = store.upsert_batch(&batch).unwrap();
        assert_eq!(outcome, UpsertOutcome { inserted: 0, updated: 2 });
        assert_eq!(store.count().unwrap(), 2);
    }

    #[test]
    fn test_duplicate_key_within_batch() {
        let temp_dir = TempDir::new().unwrap();
        let mut store = SledStore::open(temp_dir.path(), "db", "books").unwrap();
        let outcome = store
            .upsert_batch(&[book("Dune", &["Frank Herbert"]), book("dune", &["Frank Herbert"])])
            .unwrap();
        assert_eq!(outcome, UpsertOutcome { inserted: 1, updated: 1 });
        assert_eq!(store.count().unwrap(), 1);
        assert_eq!(store.sample(5).unwrap()[0].title, "dune");
    }

    #[test]
    fn test_persistence() {
        let temp_dir = TempDir::new().unwrap();
        {
            let mut store = SledStore::open(temp_dir.path(), "db", "books").unwrap();
            store.upsert_batch(&[book("Dune", &[])]).unwrap();
            store.ensure_title_index().unwrap();
            store.flush().unwrap();
        }

        let store = SledStore::open(temp_dir.path(), "db", "books").unwrap();
        assert_eq!(store.count().unwrap(), 1);
        assert!(store.has_title_index());
        assert_eq!(store.search_title("dune", 5).unwrap().len(), 1);
    }

    #[test]
    fn test_title_search() {
        let temp_dir = TempDir::new().unwrap();
        let mut store = SledStore::open(temp_dir.path(), "db", "books").unwrap();
        store
            .upsert_batch(&[
                book("The Hound of the Baskervilles", &["Arthur Conan Doyle"]),
                book("The Sign of the Four", &["Arthur Conan Doyle"]),
            ])
            .unwrap();

        assert!(matches!(
            store.search_title("hound", 10),
            Err(StoreError::MissingIndex(_))
        ));
        assert!(store.ensure_title_index().unwrap());

        // Written after the index exists, so indexed on upsert
        store.upsert_batch(&[book("Hound Dog", &[])]).unwrap();

        let found = store.search_title("Hound Baskervilles", 10).unwrap();
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].title, "The Hound of the Baskervilles");
        assert_eq!(found[1].title, "Hound Dog");

        assert!(store.search_title("zebra", 10).unwrap().is_empty());
    }

    #[test]
    fn test_find_by_author() {
        let temp_dir = TempDir::new().unwrap();
        let mut store = SledStore::open(temp_dir.path(), "db", "books").unwrap();
        store
            .upsert_batch(&[
                book("Emma", &["Jane Austen"]),
                book("Persuasion", &["Jane Austen"]),
                book("Dune", &["Frank Herbert"]),
            ])
            .unwrap();

        assert_eq!(store.find_by_author("Jane Austen", 10).unwrap().len(), 2);
        assert_eq!(store.find_by_author("Jane Austen", 1).unwrap().len(), 1);
        assert!(store.find_by_author("jane austen", 10).unwrap().is_empty());
    }

    #[test]
    fn test_drop_collection() {
        let temp_dir = TempDir::new().unwrap();
        let mut store = SledStore::open(temp_dir.path(), "db", "books").unwrap();
        store.upsert_batch(&[book("Dune", &[])]).unwrap();
        store.ensure_title_index().unwrap();

        store.drop_collection().unwrap();
        assert_eq!(store.count().unwrap(), 0);
        assert!(!store.has_title_index());
    }

    #[test]
    fn test_collections_are_separate() {
        let temp_dir = TempDir::new().unwrap();
        let mut books = SledStore::open(temp_dir.path(), "db", "books").unwrap();
        books.upsert_batch(&[book("Dune", &[])]).unwrap();
        drop(books);

        let other = SledStore::open(temp_dir.path(), "db", "other").unwrap();
        assert_eq!(other.count().unwrap(), 0);
    }
}
