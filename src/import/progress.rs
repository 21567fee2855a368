//! Progress tracking for ingestion stages

use crate::util::{format_bytes, truncate_str};
use indicatif::{ProgressBar, ProgressStyle};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Refresh the bar every this many lines
const REFRESH_EVERY: u64 = 4096;

/// Progress display for one scan over an input file.
///
/// Dump scans know the file size and show a byte-based bar; the position is
/// compressed bytes consumed, so it tracks real I/O rather than decoded text.
pub struct ImportProgress {
    /// Progress bar (None if running in quiet mode)
    progress_bar: Option<ProgressBar>,
    /// Start time
    start_time: Instant,
    /// Shared cancel flag (set from the Ctrl-C handler)
    cancelled: Arc<AtomicBool>,
}

impl ImportProgress {
    /// Create a new progress tracker
    pub fn new(label: &str, total_bytes: Option<u64>, quiet: bool, cancelled: Arc<AtomicBool>) -> Self {
        let progress_bar = if !quiet {
            let pb = match total_bytes {
                Some(total) if total > 0 => {
                    let pb = ProgressBar::new(total);
                    pb.set_style(
                        ProgressStyle::default_bar()
                            .template("{spinner:.green} {prefix} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({eta}) {msg}")
                            .unwrap_or_else(|_| ProgressStyle::default_bar())
                            .progress_chars("#>-"),
                    );
                    pb
                }
                _ => {
                    let pb = ProgressBar::new_spinner();
                    pb.set_style(
                        ProgressStyle::default_spinner()
                            .template("{spinner:.green} {prefix} [{elapsed_precise}] {msg}")
                            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
                    );
                    pb
                }
            };
            pb.set_prefix(truncate_str(label, 32));
            Some(pb)
        } else {
            None
        };

        Self {
            progress_bar,
            start_time: Instant::now(),
            cancelled,
        }
    }

    /// Tracker that never draws, for tests and quiet runs
    pub fn hidden() -> Self {
        Self::new("", None, true, Arc::new(AtomicBool::new(false)))
    }

    /// Update after a line has been consumed
    pub fn line_scanned(&self, lines: u64, bytes: u64, kept: u64) {
        if lines % REFRESH_EVERY != 0 {
            return;
        }
        if let Some(ref pb) = self.progress_bar {
            pb.set_position(bytes);
            let elapsed = self.start_time.elapsed().as_secs_f64();
            let rate = if elapsed > 0.0 { lines as f64 / elapsed } else { 0.0 };
            pb.set_message(format!("{} lines, {} kept, {:.0} lines/s", lines, kept, rate));
        }
    }

    /// Check if the run has been interrupted
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }

    /// Request the run to stop at the next batch boundary
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
        if let Some(ref pb) = self.progress_bar {
            pb.abandon_with_message("Cancelled");
        }
    }

    /// Finish the progress bar
    pub fn finish(&self, lines: u64, bytes: u64, kept: u64) {
        if let Some(ref pb) = self.progress_bar {
            pb.set_position(bytes);
            pb.finish_with_message(format!(
                "Done! {} lines ({}), {} kept in {:.1}s",
                lines,
                format_bytes(bytes),
                kept,
                self.start_time.elapsed().as_secs_f64()
            ));
        }
    }
}
