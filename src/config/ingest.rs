//! Ingestion configuration

use crate::import::{DecodePolicy, IngestOptions, NormalizeOptions, UnresolvedAuthors};
use serde::{Deserialize, Serialize};

/// Defaults for `bookdump ingest`; every field can be overridden by a flag
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestConfig {
    /// Documents per upsert batch
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Stop the author scan after this many lines
    #[serde(default)]
    pub authors_scan_limit: Option<u64>,
    /// Stop after this many work documents
    #[serde(default)]
    pub works_limit: Option<u64>,
    /// What to do with author keys missing from the index
    #[serde(default)]
    pub unresolved_authors: UnresolvedAuthors,
    /// Skip works that end up with no author
    #[serde(default)]
    pub skip_unattributed: bool,
    /// Fraction of undecodable lines tolerated before a file is rejected
    #[serde(default = "default_max_decode_error_rate")]
    pub max_decode_error_rate: f64,
    /// Lines read before the decode error rate is enforced
    #[serde(default = "default_decode_error_grace_lines")]
    pub decode_error_grace_lines: u64,
    /// Count and spot-check after every run
    #[serde(default)]
    pub verify_after: bool,
    /// Documents fetched back by the spot check
    #[serde(default = "default_sample_size")]
    pub sample_size: usize,
}

fn default_batch_size() -> usize {
    1000
}

fn default_max_decode_error_rate() -> f64 {
    0.01
}

fn default_decode_error_grace_lines() -> u64 {
    1000
}

fn default_sample_size() -> usize {
    1
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            authors_scan_limit: None,
            works_limit: None,
            unresolved_authors: UnresolvedAuthors::default(),
            skip_unattributed: false,
            max_decode_error_rate: default_max_decode_error_rate(),
            decode_error_grace_lines: default_decode_error_grace_lines(),
            verify_after: false,
            sample_size: default_sample_size(),
        }
    }
}

impl IngestConfig {
    /// Pipeline options from this section (no drop, no flag overrides)
    pub fn options(&self) -> IngestOptions {
        IngestOptions {
            batch_size: self.batch_size,
            authors_scan_limit: self.authors_scan_limit,
            works_limit: self.works_limit,
            normalize: NormalizeOptions {
                unresolved_authors: self.unresolved_authors,
                skip_unattributed: self.skip_unattributed,
            },
            decode: DecodePolicy {
                max_error_rate: self.max_decode_error_rate,
                grace_lines: self.decode_error_grace_lines,
            },
            drop_first: false,
            verify_after: self.verify_after,
            sample_size: self.sample_size,
        }
    }
}
