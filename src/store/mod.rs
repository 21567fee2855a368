//! Document store boundary
//!
//! Ingestion only needs [`DocumentStore::upsert_batch`] and
//! [`DocumentStore::count`]; the query side (`search_title`, `find_by_author`,
//! `ensure_title_index`) backs the `query` and `stats` commands.
//!
//! - [`SledStore`]: on-disk collection in a sled database
//! - [`MemoryStore`]: in-process collection for tests and dry runs

mod memory;
mod sled_store;

pub use memory::*;
pub use sled_store::*;

use crate::types::{BookDocument, NaturalKey};
use serde::{Deserialize, Serialize};

/// Errors that can occur at the store boundary
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Underlying database failure
    #[error("Database error: {0}")]
    Sled(#[from] sled::Error),

    /// A stored value could not be encoded or decoded
    #[error("Codec error: {0}")]
    Codec(#[from] bincode::Error),

    /// The store cannot take writes right now
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// A text search was issued before the title index exists
    #[error("No title index on {0}")]
    MissingIndex(String),
}

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// What a committed batch did to the collection
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpsertOutcome {
    /// Natural keys that were not present before
    pub inserted: u64,
    /// Natural keys that were replaced in place
    pub updated: u64,
}

impl std::ops::AddAssign for UpsertOutcome {
    fn add_assign(&mut self, other: Self) {
        self.inserted += other.inserted;
        self.updated += other.updated;
    }
}

/// A named collection of [`BookDocument`]s keyed by [`NaturalKey`].
///
/// `upsert_batch` must be all-or-nothing: on `Err` nothing from the batch is
/// visible, so the caller can retry the same slice.
pub trait DocumentStore {
    /// `database.collection`, for log lines
    fn name(&self) -> String;

    /// Insert or replace every document under its natural key
    fn upsert_batch(&mut self, docs: &[BookDocument]) -> StoreResult<UpsertOutcome>;

    /// Number of documents in the collection
    fn count(&self) -> StoreResult<u64>;

    /// Fetch one document by key
    fn get(&self, key: &NaturalKey) -> StoreResult<Option<BookDocument>>;

    /// Up to `limit` documents in key order
    fn sample(&self, limit: usize) -> StoreResult<Vec<BookDocument>>;

    /// Documents whose title shares a token with `text`, best match first.
    /// Fails with [`StoreError::MissingIndex`] until the title index exists.
    fn search_title(&self, text: &str, limit: usize) -> StoreResult<Vec<BookDocument>>;

    /// Documents listing `name` among their authors (exact match)
    fn find_by_author(&self, name: &str, limit: usize) -> StoreResult<Vec<BookDocument>>;

    /// Create the title text index if missing. Returns true when it was built now.
    fn ensure_title_index(&mut self) -> StoreResult<bool>;

    /// Whether the title text index exists
    fn has_title_index(&self) -> bool;

    /// Remove every document and index
    fn drop_collection(&mut self) -> StoreResult<()>;

    /// Make committed batches durable
    fn flush(&self) -> StoreResult<()> {
        Ok(())
    }
}

/// Rank candidates by the number of distinct query tokens they matched
pub(crate) fn rank_by_hits(
    hits: std::collections::HashMap<NaturalKey, usize>,
    limit: usize,
) -> Vec<NaturalKey> {
    let mut ranked: Vec<(NaturalKey, usize)> = hits.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    ranked.into_iter().take(limit).map(|(key, _)| key).collect()
}
