use std::path::Path;

use anyhow::{Context, Result};

use crate::config::{AppConfig, config_path};

pub fn run(config: &AppConfig, explicit: Option<&Path>) -> Result<()> {
    match explicit.map(Path::to_path_buf).or_else(config_path) {
        Some(path) if path.exists() => println!("# {}", path.display()),
        Some(path) => println!("# {} (not found, showing defaults)", path.display()),
        None => println!("# no config directory, showing defaults"),
    }
    println!("# scenery path: {}", config.scenery_path().display());
    println!();
    print!("{}", toml::to_string_pretty(config).context("failed to render config")?);
    Ok(())
}
