use super::open_store;
use anyhow::{Context, Result};
use bookdump::{
    config::Config,
    import::{IngestAborted, IngestCoordinator, IngestSource, UnresolvedAuthors},
};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

/// Flags of `bookdump ingest`; `None` means "use the config value"
#[derive(Debug, Default)]
pub struct IngestArgs {
    pub json_sample: Option<PathBuf>,
    pub authors: Option<PathBuf>,
    pub works: Option<PathBuf>,
    pub batch: Option<usize>,
    pub authors_scan_limit: Option<u64>,
    pub works_limit: Option<u64>,
    pub unresolved_authors: Option<UnresolvedAuthors>,
    pub skip_unattributed: bool,
    pub drop: bool,
    pub verify_after: bool,
    pub report: Option<PathBuf>,
    pub quiet: bool,
}

pub async fn run_ingest(mut config: Config, args: IngestArgs) -> Result<()> {
    let source = IngestSource::from_paths(args.json_sample, args.authors, args.works)?;

    if let Some(batch) = args.batch {
        config.ingest.batch_size = batch;
    }
    if args.authors_scan_limit.is_some() {
        config.ingest.authors_scan_limit = args.authors_scan_limit;
    }
    if args.works_limit.is_some() {
        config.ingest.works_limit = args.works_limit;
    }
    if let Some(policy) = args.unresolved_authors {
        config.ingest.unresolved_authors = policy;
    }
    config.ingest.skip_unattributed |= args.skip_unattributed;
    config.ingest.verify_after |= args.verify_after;
    config.validate()?;

    let mut options = config.ingest.options();
    options.drop_first = args.drop;

    // Ctrl-C stops the run at the next batch boundary
    let cancelled = Arc::new(AtomicBool::new(false));
    let flag = cancelled.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, stopping after the current batch");
            flag.store(true, Ordering::Relaxed);
        }
    });

    let quiet = args.quiet;
    let outcome = tokio::task::spawn_blocking(move || -> Result<_> {
        let mut store = open_store(&config)?;
        info!(
            "Ingesting into {}.{} (batch size {})",
            config.store.database, config.store.collection, options.batch_size
        );
        Ok(IngestCoordinator::new(&mut store, options)
            .with_quiet(quiet)
            .with_cancel_flag(cancelled)
            .run(&source))
    })
    .await
    .context("Ingest task panicked")??;

    // An aborted run still reports what it wrote before failing
    let (report, failure) = match outcome {
        Ok(report) => (report, None),
        Err(IngestAborted { error, report }) => (*report, Some(error)),
    };

    if !args.quiet {
        report.print_summary();
    }

    if let Some(path) = args.report {
        let json = serde_json::to_string_pretty(&report)?;
        std::fs::write(&path, json)
            .with_context(|| format!("Failed to write report to {}", path.display()))?;
        info!("Wrote run report to {}", path.display());
    }

    match failure {
        Some(error) => Err(anyhow::Error::new(error).context(format!(
            "Ingest aborted after {} documents submitted",
            report.write.submitted
        ))),
        None => Ok(()),
    }
}
