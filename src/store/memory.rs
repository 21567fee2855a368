//! In-process document store

use super::{rank_by_hits, DocumentStore, StoreError, StoreResult, UpsertOutcome};
use crate::types::{BookDocument, NaturalKey};
use crate::util::title_tokens;
use std::collections::{BTreeMap, HashMap, HashSet};

/// Collection held in a `BTreeMap`, so iteration order matches [`super::SledStore`]
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    name: String,
    docs: BTreeMap<NaturalKey, BookDocument>,
    /// token -> keys, present once the title index has been created
    title_index: Option<HashMap<String, HashSet<NaturalKey>>>,
}

impl MemoryStore {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    fn index_title(
        index: &mut HashMap<String, HashSet<NaturalKey>>,
        key: &NaturalKey,
        title: &str,
    ) {
        for token in title_tokens(title) {
            index.entry(token).or_default().insert(key.clone());
        }
    }
}

impl DocumentStore for MemoryStore {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn upsert_batch(&mut self, docs: &[BookDocument]) -> StoreResult<UpsertOutcome> {
        let mut outcome = UpsertOutcome::default();
        for doc in docs {
            let key = doc.natural_key();
            if let Some(index) = self.title_index.as_mut() {
                Self::index_title(index, &key, &doc.title);
            }
            match self.docs.insert(key, doc.clone()) {
                Some(_) => outcome.updated += 1,
                None => outcome.inserted += 1,
            }
        }
        Ok(outcome)
    }

    fn count(&self) -> StoreResult<u64> {
        Ok(self.docs.len() as u64)
    }

    fn get(&self, key: &NaturalKey) -> StoreResult<Option<BookDocument>> {
        Ok(self.docs.get(key).cloned())
    }

    fn sample(&self, limit: usize) -> StoreResult<Vec<BookDocument>> {
        Ok(self.docs.values().take(limit).cloned().collect())
    }

    fn search_title(&self, text: &str, limit: usize) -> StoreResult<Vec<BookDocument>> {
        let index = self
            .title_index
            .as_ref()
            .ok_or_else(|| StoreError::MissingIndex(self.name.clone()))?;

        let tokens: HashSet<String> = title_tokens(text).into_iter().collect();
        let mut hits: HashMap<NaturalKey, usize> = HashMap::new();
        for token in &tokens {
            for key in index.get(token).into_iter().flatten() {
                *hits.entry(key.clone()).or_default() += 1;
            }
        }

        Ok(rank_by_hits(hits, limit)
            .iter()
            .filter_map(|key| self.docs.get(key).cloned())
            .collect())
    }

    fn find_by_author(&self, name: &str, limit: usize) -> StoreResult<Vec<BookDocument>> {
        Ok(self
            .docs
            .values()
            .filter(|doc| doc.authors.iter().any(|a| a == name))
            .take(limit)
            .cloned()
            .collect())
    }

    fn ensure_title_index(&mut self) -> StoreResult<bool> {
        if self.title_index.is_some() {
            return Ok(false);
        }
        let mut index = HashMap::new();
        for (key, doc) in &self.docs {
            Self::index_title(&mut index, key, &doc.title);
        }
        self.title_index = Some(index);
        Ok(true)
    }

    fn has_title_index(&self) -> bool {
        self.title_index.is_some()
    }

    fn drop_collection(&mut self) -> StoreResult<()> {
        self.docs.clear();
        self.title_index = None;
        Ok(())
    }
}
