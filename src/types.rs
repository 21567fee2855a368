//! Core types for bookdump

use crate::util::normalize_key_part;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// Separator between the title and author parts of a natural key
const KEY_SEPARATOR: char = '\u{1f}';

// ============================================================================
// Book Documents
// ============================================================================

/// Where a document came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BookSource {
    /// Plain JSON / JSON Lines sample file
    Json,
    /// Open Library works dump
    OpenLibrary,
}

impl BookSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::OpenLibrary => "openlibrary",
        }
    }
}

impl fmt::Display for BookSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unified book document persisted in the store.
///
/// Construction goes through [`BookDocument::new`], which rejects blank titles,
/// and the `with_*` builders, which trim, drop empty entries, and keep only the
/// first occurrence of each value. Once built a document is never edited;
/// corrections happen by upserting a replacement under the same natural key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookDocument {
    /// Trimmed, non-empty title
    pub title: String,
    /// Author display names, first-seen order, no duplicates
    pub authors: Vec<String>,
    /// Subjects, first-seen order, no duplicates
    pub subjects: Vec<String>,
    /// Origin of the record
    pub source: BookSource,
}

impl BookDocument {
    /// Create a document, or `None` if the title is empty after trimming
    pub fn new(title: &str, source: BookSource) -> Option<Self> {
        let title = title.trim();
        if title.is_empty() {
            return None;
        }
        Some(Self {
            title: title.to_string(),
            authors: Vec::new(),
            subjects: Vec::new(),
            source,
        })
    }

    /// Set the authors (trimmed, deduplicated, order preserved)
    pub fn with_authors<I, S>(mut self, authors: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.authors = ordered_unique(authors);
        self
    }

    /// Set the subjects (trimmed, deduplicated, order preserved)
    pub fn with_subjects<I, S>(mut self, subjects: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.subjects = ordered_unique(subjects);
        self
    }

    /// Stable key identifying the same logical book across ingestion runs
    pub fn natural_key(&self) -> NaturalKey {
        let first_author = self.authors.first().map(String::as_str).unwrap_or("");
        NaturalKey(format!(
            "{}{}{}",
            normalize_key_part(&self.title),
            KEY_SEPARATOR,
            normalize_key_part(first_author)
        ))
    }
}

/// Deterministic upsert key derived from a document.
///
/// Lowercased, whitespace-collapsed title joined with the first author the
/// same way, so casing or spacing differences between runs map to one entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NaturalKey(String);

impl NaturalKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }

    /// Rebuild a key read back from storage
    pub fn from_stored(bytes: &[u8]) -> Option<Self> {
        std::str::from_utf8(bytes).ok().map(|s| NaturalKey(s.to_string()))
    }
}

impl fmt::Display for NaturalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = self.0.splitn(2, KEY_SEPARATOR);
        let title = parts.next().unwrap_or("");
        match parts.next() {
            Some(author) if !author.is_empty() => write!(f, "{} / {}", title, author),
            _ => f.write_str(title),
        }
    }
}

/// Trim values, drop empties, and keep the first occurrence of each
pub fn ordered_unique<I, S>(values: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for value in values {
        let value = value.as_ref().trim();
        if value.is_empty() {
            continue;
        }
        if seen.insert(value.to_string()) {
            out.push(value.to_string());
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_title_rejected() {
        assert!(BookDocument::new("", BookSource::Json).is_none());
        assert!(BookDocument::new("   \t ", BookSource::Json).is_none());
    }

    #[test]
    fn test_title_trimmed() {
        let doc = BookDocument::new("  Dune \n", BookSource::Json).unwrap();
        assert_eq!(doc.title, "Dune");
    }

    #[test]
    fn test_authors_deduplicated_in_order() {
        let doc = BookDocument::new("Study", BookSource::OpenLibrary)
            .unwrap()
            .with_authors(["X", "X", "", "Y", " X "]);
        assert_eq!(doc.authors, vec!["X", "Y"]);
    }

    #[test]
    fn test_subjects_deduplicated_in_order() {
        let doc = BookDocument::new("Study", BookSource::OpenLibrary)
            .unwrap()
            .with_subjects(vec!["Crime".to_string(), "London".into(), "Crime".into()]);
        assert_eq!(doc.subjects, vec!["Crime", "London"]);
    }

    #[test]
    fn test_natural_key_ignores_case_and_spacing() {
        let a = BookDocument::new("A Study  in Scarlet", BookSource::Json)
            .unwrap()
            .with_authors(["Arthur Conan Doyle"]);
        let b = BookDocument::new("a study in scarlet", BookSource::OpenLibrary)
            .unwrap()
            .with_authors(["ARTHUR  CONAN DOYLE", "Someone Else"]);
        assert_eq!(a.natural_key(), b.natural_key());
    }

    #[test]
    fn test_natural_key_distinguishes_authors() {
        let a = BookDocument::new("Poems", BookSource::Json).unwrap().with_authors(["Keats"]);
        let b = BookDocument::new("Poems", BookSource::Json).unwrap().with_authors(["Byron"]);
        let c = BookDocument::new("Poems", BookSource::Json).unwrap();
        assert_ne!(a.natural_key(), b.natural_key());
        assert_ne!(a.natural_key(), c.natural_key());
    }

    #[test]
    fn test_natural_key_roundtrips_through_bytes() {
        let doc = BookDocument::new("Emma", BookSource::Json).unwrap().with_authors(["Austen"]);
        let key = doc.natural_key();
        assert_eq!(NaturalKey::from_stored(key.as_bytes()), Some(key.clone()));
        assert_eq!(key.to_string(), "emma / austen");
    }

    #[test]
    fn test_source_serializes_lowercase() {
        let json = serde_json::to_string(&BookSource::OpenLibrary).unwrap();
        assert_eq!(json, "\"openlibrary\"");
    }
}
