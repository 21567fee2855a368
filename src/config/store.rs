//! Document store configuration

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Where documents are written
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Directory holding one sled database per database name
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    /// Database name
    #[serde(default = "default_database")]
    pub database: String,
    /// Collection name
    #[serde(default = "default_collection")]
    pub collection: String,
}

fn default_data_dir() -> PathBuf {
    directories::ProjectDirs::from("", "", "bookdump")
        .map(|d| d.data_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from(".bookdump"))
}

fn default_database() -> String {
    "library_db".to_string()
}

fn default_collection() -> String {
    "books".to_string()
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            database: default_database(),
            collection: default_collection(),
        }
    }
}
