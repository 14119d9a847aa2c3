//! `.env` loading and store configuration resolution

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::debug;

use pharmadb_core::StoreConfig;

/// Load `.env` from the current directory, then `~/.pharmadb/.env`.
/// Variables already set in the process are never overwritten.
///
/// Runs before tracing is set up so `RUST_LOG` may come from a `.env`
/// file; the loaded files are returned for [`log_loaded`].
pub fn load_dotenv() -> Vec<PathBuf> {
    let mut loaded = Vec::new();
    if let Ok(path) = dotenvy::dotenv() {
        loaded.push(path);
    }

    let env_file = StoreConfig::home_dir().join(".env");
    if env_file.exists() && dotenvy::from_path(&env_file).is_ok() {
        loaded.push(env_file);
    }
    loaded
}

pub fn log_loaded(paths: &[PathBuf]) {
    for path in paths {
        debug!("Loaded .env from {}", path.display());
    }
}

/// Resolve the store configuration: file, then environment, then flags.
pub fn resolve_config(path: Option<&Path>, database_url: Option<String>) -> Result<StoreConfig> {
    let mut config = match path {
        Some(path) => {
            let mut config = StoreConfig::from_file(path)
                .with_context(|| format!("Failed to read config {}", path.display()))?;
            config.apply_overrides(|key| std::env::var(key).ok())?;
            config
        }
        None => StoreConfig::load().context("Failed to load store configuration")?,
    };
    if let Some(url) = database_url {
        config.database_url = url;
    }
    config.validate()?;
    Ok(config)
}
