use super::open_store;
use anyhow::Result;
use bookdump::{config::Config, store::DocumentStore, types::BookDocument, util::truncate_str};
use tracing::info;

pub async fn run_query(
    config: Config,
    title: Option<String>,
    author: Option<String>,
    limit: usize,
    format: String,
) -> Result<()> {
    let mut store = open_store(&config)?;

    let results = match (title, author) {
        (Some(text), None) => {
            if store.ensure_title_index()? {
                info!("Created title index on {}", store.name());
            }
            info!("Searching titles for: {}", text);
            store.search_title(&text, limit)?
        }
        (None, Some(name)) => {
            info!("Finding books by: {}", name);
            store.find_by_author(&name, limit)?
        }
        _ => anyhow::bail!("Pass exactly one of --title or --author"),
    };

    output_results(&results, &format)
}

fn output_results(results: &[BookDocument], format: &str) -> Result<()> {
    match format {
        "json" => println!("{}", serde_json::to_string_pretty(results)?),
        "jsonl" => {
            for doc in results {
                println!("{}", serde_json::to_string(doc)?);
            }
        }
        _ => {
            if results.is_empty() {
                println!("No matching books.");
                return Ok(());
            }
            for (i, doc) in results.iter().enumerate() {
                println!("{}. {}", i + 1, truncate_str(&doc.title, 80));
                if !doc.authors.is_empty() {
                    println!("   by {}", doc.authors.join(", "));
                }
                if !doc.subjects.is_empty() {
                    println!("   subjects: {}", truncate_str(&doc.subjects.join(", "), 100));
                }
            }
        }
    }
    Ok(())
}
