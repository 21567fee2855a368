use anyhow::{Context, Result};
use bookdump::config::{Config, DEFAULT_CONFIG_FILE};
use std::path::PathBuf;

pub async fn init_config(path: PathBuf, force: bool) -> Result<()> {
    let config = Config::default();
    let config_path = path.join(DEFAULT_CONFIG_FILE);

    if config_path.exists() && !force {
        anyhow::bail!(
            "{} already exists (pass --force to overwrite)",
            config_path.display()
        );
    }

    let toml_content = format!("# bookdump configuration\n\n{}", config.to_toml()?);

    std::fs::create_dir_all(&path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    std::fs::write(&config_path, toml_content)?;
    println!("Created configuration file: {}", config_path.display());

    std::fs::create_dir_all(&config.store.data_dir)?;
    println!("Created data directory: {}", config.store.data_dir.display());

    Ok(())
}
