//! bookdump: ingest Open Library dumps and JSON book samples into a document store
//!
//! - Streaming readers for plain, gzip and bzip2 dumps
//! - Two-phase dump ingestion: author index first, then works resolved against it
//! - Idempotent batched upserts keyed by a natural key
//! - sled-backed collections with a title text index

pub mod config;
pub mod import;
pub mod store;
pub mod types;
pub mod util;

pub use config::Config;
pub use types::*;
