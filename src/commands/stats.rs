use super::open_store;
use anyhow::Result;
use bookdump::{config::Config, store::DocumentStore, util::format_bytes};

pub async fn show_stats(config: Config, sample: usize) -> Result<()> {
    let store = open_store(&config)?;

    println!("\nCollection Statistics");
    println!("=====================");
    println!("Collection:       {}", store.name());
    println!("Data directory:   {}", store.path().display());
    println!("Documents:        {}", store.count()?);
    println!("Title index:      {}", if store.has_title_index() { "yes" } else { "no" });
    println!("Size on disk:     {}", format_bytes(store.size_on_disk()?));

    let docs = store.sample(sample)?;
    if !docs.is_empty() {
        println!("\nSample:");
        for doc in docs {
            println!("{}", serde_json::to_string(&doc)?);
        }
    }

    Ok(())
}
