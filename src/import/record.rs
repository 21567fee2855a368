//! Record parser for Open Library dump lines
//!
//! A dump line is either tab-separated with the JSON payload in the last column
//! (`type, key, revision, last_modified, json`) or a bare JSON object. Parsing
//! is pure: the same line always yields the same record or the same error.

use super::source::ParseError;
use serde::de::IgnoredAny;
use serde::Deserialize;

/// Minimum number of tab-separated columns in a TSV dump line
pub const MIN_COLUMNS: usize = 2;

/// Key prefixes that identify a record kind on their own
const KNOWN_KEY_PREFIXES: [&str; 4] = ["/authors/", "/works/", "/books/", "/editions/"];

/// Which kind of record a dump holds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    Author,
    Work,
}

impl RecordKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Author => "author",
            Self::Work => "work",
        }
    }

    fn key_prefix(&self) -> &'static str {
        match self {
            Self::Author => "/authors/",
            Self::Work => "/works/",
        }
    }
}

/// One author from the authors dump
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorRecord {
    /// Open Library key, e.g. `/authors/OL23919A`
    pub id: String,
    /// Display name, empty if the record has none
    pub name: String,
}

/// One work from the works dump. Missing fields are empty, never an error.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkRecord {
    pub id: String,
    pub title: String,
    /// Referenced author keys in dump order, duplicates kept
    pub author_ids: Vec<String>,
    /// Subjects in dump order, duplicates kept
    pub subjects: Vec<String>,
}

/// A parsed dump line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DumpRecord {
    Author(AuthorRecord),
    Work(WorkRecord),
}

// ---------------------------------------------------------------------------
// Payload shapes
// ---------------------------------------------------------------------------

/// `"type"` is either `"/type/work"` or `{"key": "/type/work"}`
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum KeyRef {
    Key(String),
    Object { key: Option<String> },
    Other(IgnoredAny),
}

impl KeyRef {
    fn key(&self) -> Option<&str> {
        match self {
            KeyRef::Key(k) => Some(k.as_str()),
            KeyRef::Object { key } => key.as_deref(),
            KeyRef::Other(IgnoredAny) => None,
        }
    }
}

/// Entry of a work's `"authors"` array
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum AuthorRole {
    Role {
        author: Option<KeyRef>,
        key: Option<String>,
    },
    Key(String),
    Other(IgnoredAny),
}

impl AuthorRole {
    fn author_key(&self) -> Option<&str> {
        match self {
            AuthorRole::Role { author: Some(a), .. } => a.key(),
            AuthorRole::Role { author: None, key } => key.as_deref(),
            AuthorRole::Key(k) => Some(k.as_str()),
            AuthorRole::Other(IgnoredAny) => None,
        }
    }
}

/// Subject entries are usually strings; nested lists are flattened
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Subject {
    Text(String),
    List(Vec<Subject>),
    Other(IgnoredAny),
}

impl Subject {
    fn flatten_into(self, out: &mut Vec<String>) {
        match self {
            Subject::Text(s) => out.push(s),
            Subject::List(items) => {
                for item in items {
                    item.flatten_into(out);
                }
            }
            Subject::Other(IgnoredAny) => {}
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Payload {
    key: Option<String>,
    #[serde(rename = "type")]
    record_type: Option<KeyRef>,
    name: Option<String>,
    personal_name: Option<String>,
    title: Option<String>,
    authors: Option<Vec<AuthorRole>>,
    subjects: Option<Vec<Subject>>,
}

impl Payload {
    /// Record type with any `/type/` prefix removed
    fn type_name(&self) -> Option<&str> {
        let t = self.record_type.as_ref()?.key()?;
        Some(t.strip_prefix("/type/").unwrap_or(t))
    }

    /// Accept the payload as `kind` unless something positively says otherwise
    fn check_kind(&self, kind: RecordKind) -> Result<(), ParseError> {
        let type_name = self.type_name();
        if type_name == Some(kind.as_str()) {
            return Ok(());
        }

        let key = self.key.as_deref().unwrap_or("");
        if key.starts_with(kind.key_prefix()) {
            return Ok(());
        }

        let key_names_other = KNOWN_KEY_PREFIXES.iter().any(|p| key.starts_with(p));
        if type_name.is_none() && !key_names_other {
            return Ok(());
        }

        Err(ParseError::KindMismatch {
            expected: kind.as_str(),
            found: type_name
                .map(str::to_string)
                .or_else(|| self.key.clone()),
        })
    }
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

/// Extract the JSON payload column from a raw dump line
fn payload_column(line: &str) -> Result<&str, ParseError> {
    let line = line.trim();
    if line.starts_with('{') {
        return Ok(line);
    }

    let found = line.split('\t').count();
    if found < MIN_COLUMNS {
        return Err(ParseError::TooFewColumns {
            expected: MIN_COLUMNS,
            found,
        });
    }

    Ok(line.rsplit('\t').next().unwrap_or(line))
}

fn parse_payload(line: &str) -> Result<Payload, ParseError> {
    let column = payload_column(line)?;
    serde_json::from_str(column).map_err(|e| ParseError::InvalidPayload(e.to_string()))
}

/// Parse one dump line as the given kind
pub fn parse_line(line: &str, kind: RecordKind) -> Result<DumpRecord, ParseError> {
    match kind {
        RecordKind::Author => parse_author(line).map(DumpRecord::Author),
        RecordKind::Work => parse_work(line).map(DumpRecord::Work),
    }
}

/// Parse an authors-dump line. `name` falls back to `personal_name`.
pub fn parse_author(line: &str) -> Result<AuthorRecord, ParseError> {
    let payload = parse_payload(line)?;
    payload.check_kind(RecordKind::Author)?;

    let name = payload
        .name
        .filter(|n| !n.trim().is_empty())
        .or(payload.personal_name)
        .unwrap_or_default();

    Ok(AuthorRecord {
        id: payload.key.unwrap_or_default(),
        name: name.trim().to_string(),
    })
}

/// Parse a works-dump line
pub fn parse_work(line: &str) -> Result<WorkRecord, ParseError> {
    let payload = parse_payload(line)?;
    payload.check_kind(RecordKind::Work)?;

    let author_ids = payload
        .authors
        .as_deref()
        .unwrap_or_default()
        .iter()
        .filter_map(AuthorRole::author_key)
        .map(str::to_string)
        .collect();

    let mut subjects = Vec::new();
    for subject in payload.subjects.unwrap_or_default() {
        subject.flatten_into(&mut subjects);
    }

    Ok(WorkRecord {
        id: payload.key.unwrap_or_default(),
        title: payload.title.unwrap_or_default(),
        author_ids,
        subjects,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const AUTHOR_LINE: &str = "/type/author\t/authors/OL23919A\t4\t2008-04-01T03:28:50.625462\t{\"name\": \"Arthur Conan Doyle\", \"key\": \"/authors/OL23919A\", \"type\": {\"key\": \"/type/author\"}, \"revision\": 4}";

    const WORK_LINE: &str = "/type/work\t/works/OL262758W\t9\t2020-08-13T00:00:00\t{\"title\": \"A Study in Scarlet\", \"key\": \"/works/OL262758W\", \"type\": {\"key\": \"/type/work\"}, \"authors\": [{\"type\": {\"key\": \"/type/author_role\"}, \"author\": {\"key\": \"/authors/OL23919A\"}}, {\"author\": {\"key\": \"/authors/OL23919A\"}}], \"subjects\": [\"Sherlock Holmes\", \"London\", \"Sherlock Holmes\"]}";

    #[test]
    fn test_parse_author_tsv() {
        let author = parse_author(AUTHOR_LINE).unwrap();
        assert_eq!(author.id, "/authors/OL23919A");
        assert_eq!(author.name, "Arthur Conan Doyle");
    }

    #[test]
    fn test_parse_work_tsv_keeps_duplicates() {
        let work = parse_work(WORK_LINE).unwrap();
        assert_eq!(work.id, "/works/OL262758W");
        assert_eq!(work.title, "A Study in Scarlet");
        assert_eq!(work.author_ids, vec!["/authors/OL23919A", "/authors/OL23919A"]);
        assert_eq!(work.subjects, vec!["Sherlock Holmes", "London", "Sherlock Holmes"]);
    }

    #[test]
    fn test_parse_json_lines_format() {
        let line = r#"{"key": "/authors/OL1A", "type": "/type/author", "name": "Doyle"}"#;
        let author = parse_author(line).unwrap();
        assert_eq!(author.id, "/authors/OL1A");
        assert_eq!(author.name, "Doyle");
    }

    #[test]
    fn test_personal_name_fallback() {
        let line = r#"{"key": "/authors/OL2A", "name": "  ", "personal_name": "Mary Shelley"}"#;
        assert_eq!(parse_author(line).unwrap().name, "Mary Shelley");
    }

    #[test]
    fn test_missing_fields_default_to_empty() {
        let work = parse_work("/type/work\t{\"type\": \"/type/work\"}").unwrap();
        assert_eq!(work, WorkRecord::default());

        let author = parse_author("x\t{}").unwrap();
        assert!(author.id.is_empty());
        assert!(author.name.is_empty());
    }

    #[test]
    fn test_too_few_columns() {
        assert_eq!(
            parse_work("just some text"),
            Err(ParseError::TooFewColumns { expected: 2, found: 1 })
        );
    }

    #[test]
    fn test_invalid_payload() {
        let err = parse_work("/type/work\t/works/OL1W\t{not json").unwrap_err();
        assert!(matches!(err, ParseError::InvalidPayload(_)));
    }

    #[test]
    fn test_kind_mismatch() {
        let err = parse_author(WORK_LINE).unwrap_err();
        assert_eq!(
            err,
            ParseError::KindMismatch {
                expected: "author",
                found: Some("work".to_string()),
            }
        );
    }

    #[test]
    fn test_kind_from_key_prefix_when_type_differs() {
        let line = r#"{"key": "/authors/OL9A", "type": {"key": "/type/redirect"}}"#;
        let author = parse_author(line).unwrap();
        assert_eq!(author.id, "/authors/OL9A");
        assert!(author.name.is_empty());
    }

    #[test]
    fn test_untyped_record_accepted() {
        let work = parse_work(r#"{"key": "W1", "title": "Study", "authors": [{"author": "A1"}]}"#)
            .unwrap();
        assert_eq!(work.author_ids, vec!["A1"]);
    }

    #[test]
    fn test_author_reference_shapes() {
        let line = r#"{"type": "/type/work", "title": "T", "authors": [
            {"author": {"key": "/authors/OL1A"}},
            {"author": "/authors/OL2A"},
            {"key": "/authors/OL3A"},
            "/authors/OL4A",
            {"role": "editor"},
            42
        ]}"#;
        let work = parse_work(line).unwrap();
        assert_eq!(
            work.author_ids,
            vec!["/authors/OL1A", "/authors/OL2A", "/authors/OL3A", "/authors/OL4A"]
        );
    }

    #[test]
    fn test_nested_subjects_flattened() {
        let line = r#"{"type": "/type/work", "subjects": ["A", ["B", "C"], 7, null, "A"]}"#;
        let work = parse_work(line).unwrap();
        assert_eq!(work.subjects, vec!["A", "B", "C", "A"]);
    }

    #[test]
    fn test_unrecognized_shapes_are_ignored() {
        let line = r#"{"key": "/works/OL1W", "type": 5, "title": "T",
            "authors": [{"author": 17}, {"author": {"key": "/authors/OL1A"}}],
            "subjects": [{"name": "x"}, "Y"]}"#;
        let work = parse_work(line).unwrap();
        assert_eq!(work.title, "T");
        assert_eq!(work.author_ids, vec!["/authors/OL1A"]);
        assert_eq!(work.subjects, vec!["Y"]);
    }

    #[test]
    fn test_null_arrays() {
        let line = r#"{"type": "/type/work", "title": "T", "authors": null, "subjects": null}"#;
        let work = parse_work(line).unwrap();
        assert!(work.author_ids.is_empty());
        assert!(work.subjects.is_empty());
    }

    #[test]
    fn test_parsing_is_deterministic() {
        for line in [AUTHOR_LINE, WORK_LINE, "garbage", "a\t{bad"] {
            assert_eq!(parse_line(line, RecordKind::Work), parse_line(line, RecordKind::Work));
            assert_eq!(parse_line(line, RecordKind::Author), parse_line(line, RecordKind::Author));
        }
    }

    #[test]
    fn test_parse_line_dispatch() {
        assert!(matches!(
            parse_line(AUTHOR_LINE, RecordKind::Author),
            Ok(DumpRecord::Author(_))
        ));
        assert!(matches!(
            parse_line(WORK_LINE, RecordKind::Work),
            Ok(DumpRecord::Work(_))
        ));
    }
}
