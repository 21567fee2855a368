//! Ingestion pipeline for Open Library dumps and JSON book samples
//!
//! # Supported Inputs
//!
//! - **Open Library dumps**: authors + works, TSV with a JSON payload column
//!   or JSON Lines, plain / `.gz` / `.bz2`
//! - **JSON samples**: a JSON array of book objects or JSON Lines, plain or
//!   compressed
//!
//! # Example Usage
//!
//! ```no_run
//! use bookdump::import::{IngestCoordinator, IngestOptions, IngestSource};
//! use bookdump::store::SledStore;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut store = SledStore::open(".bookdump", "library_db", "books")?;
//!
//! let source = IngestSource::Dumps {
//!     authors: "ol_dump_authors.txt.gz".into(),
//!     works: "ol_dump_works.txt.gz".into(),
//! };
//! let options = IngestOptions {
//!     works_limit: Some(50_000),
//!     verify_after: true,
//!     ..IngestOptions::default()
//! };
//!
//! let report = IngestCoordinator::new(&mut store, options).run(&source)?;
//! report.print_summary();
//! # Ok(())
//! # }
//! ```
//!
//! # Architecture
//!
//! ```text
//!   authors dump                works dump               JSON sample
//!        │                          │                         │
//!        ▼                          ▼                         ▼
//! ┌──────────────┐          ┌──────────────┐          ┌──────────────┐
//! │  LineReader  │          │  LineReader  │          │  LineReader  │
//! │ + record.rs  │          │ + record.rs  │          │ + serde_json │
//! └──────────────┘          └──────────────┘          └──────────────┘
//!        │                          │                         │
//!        ▼                          ▼                         │
//! ┌──────────────┐  borrowed ┌──────────────┐                 │
//! │ AuthorIndex  │ ────────▶ │WorkDocuments │                 │
//! │  (phase 1)   │           │  (phase 2)   │                 │
//! └──────────────┘           └──────────────┘                 │
//!                                   │                         │
//!                                   ▼                         ▼
//!                          ┌────────────────────────────────────────┐
//!                          │  BatchWriter → DocumentStore (upsert)  │
//!                          └────────────────────────────────────────┘
//! ```

pub mod authors;
pub mod coordinator;
pub mod progress;
pub mod reader;
pub mod record;
pub mod sample;
pub mod source;
pub mod works;
pub mod writer;

// Re-export main types
pub use authors::{AuthorIndex, AuthorIndexBuilder, AuthorScanStats};
pub use coordinator::{IngestCoordinator, IngestOptions, IngestSource};
pub use progress::ImportProgress;
pub use reader::{Compression, DecodePolicy, LineReader, ReaderStats};
pub use record::{parse_author, parse_line, parse_work, AuthorRecord, DumpRecord, RecordKind, WorkRecord};
pub use sample::{sample_document, SampleDocuments, SampleLayout, SampleStats};
pub use source::{ImportError, IngestAborted, IngestReport, ParseError};
pub use works::{NormalizeOptions, UnresolvedAuthors, WorkDocuments, WorkNormalizer, WorkOutcome, WorkScanStats};
pub use writer::{verify, BatchWriter, VerificationReport, WriteStats};
