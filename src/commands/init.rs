//! Init command implementation

use crate::config::Config;
use crate::error::{Error, Result};
use serde::Serialize;
use std::path::PathBuf;
use tracing::info;

#[derive(Debug, Clone)]
pub struct InitOptions {
    pub base_dir: PathBuf,
    pub config_path: PathBuf,
    pub force: bool,
    /// Backend to record in the new config instead of the default
    pub api_base_url: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct InitReport {
    pub config_path: PathBuf,
    pub api_base_url: String,
    pub overwritten: bool,
}

/// Write a default configuration file
pub async fn cmd_init(options: InitOptions) -> Result<InitReport> {
    let InitOptions {
        base_dir,
        config_path,
        force,
        api_base_url,
    } = options;

    let exists = config_path.exists();
    if exists && !force {
        return Err(Error::Config(format!(
            "Config already exists at {}. Use --force to overwrite.",
            config_path.display()
        )));
    }

    let mut config = Config::default();
    if let Some(url) = api_base_url {
        config.api_base_url = url;
    }
    config.paths.token_file = base_dir.join("credentials.json");
    config.paths.base_dir = base_dir;
    config.paths.config_file = config_path.clone();
    config.validate()?;

    tokio::fs::create_dir_all(&config.paths.base_dir).await?;
    config.save()?;
    info!("Initialized docchat at {:?}", config.paths.base_dir);

    Ok(InitReport {
        config_path,
        api_base_url: config.api_base_url,
        overwritten: exists,
    })
}

pub fn print_init(report: &InitReport) {
    println!("✓ Wrote {}", report.config_path.display());
    println!("  Backend: {}", report.api_base_url);
    println!("\nNext: docchat login <email>");
}
