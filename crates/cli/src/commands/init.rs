//! `parley init`: write a starter config file.

use anyhow::Context;
use parley_config::AppConfig;

pub fn run(force: bool) -> anyhow::Result<()> {
    let config_dir = AppConfig::config_dir();
    let config_path = config_dir.join("config.toml");

    if config_path.exists() && !force {
        println!("Config already exists: {}", config_path.display());
        println!("Use --force to overwrite it.");
        return Ok(());
    }

    std::fs::create_dir_all(&config_dir)
        .with_context(|| format!("Failed to create {}", config_dir.display()))?;
    std::fs::write(&config_path, AppConfig::default_toml())
        .with_context(|| format!("Failed to write {}", config_path.display()))?;

    println!("Wrote {}", config_path.display());
    if std::env::var("PARLEY_API_KEY").is_err() && std::env::var("OPENAI_API_KEY").is_err() {
        println!("Set api_key there, or export PARLEY_API_KEY / OPENAI_API_KEY.");
    }
    Ok(())
}
