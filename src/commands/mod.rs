//! `bookdump` subcommands

pub mod ingest;
pub mod init;
pub mod query;
pub mod stats;

use anyhow::{Context, Result};
use bookdump::config::Config;
use bookdump::store::SledStore;

/// Open the configured collection
pub fn open_store(config: &Config) -> Result<SledStore> {
    std::fs::create_dir_all(&config.store.data_dir).with_context(|| {
        format!(
            "Failed to create data directory {}",
            config.store.data_dir.display()
        )
    })?;
    SledStore::open(
        &config.store.data_dir,
        &config.store.database,
        &config.store.collection,
    )
    .with_context(|| {
        format!(
            "Failed to open {}.{} in {}",
            config.store.database,
            config.store.collection,
            config.store.data_dir.display()
        )
    })
}
