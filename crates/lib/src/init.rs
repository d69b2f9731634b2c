//! Initialize the configuration directory: create ~/.raybridge, a default config and the artifacts directory.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use crate::config;

/// Ensure the configuration directory has been initialized (config file and artifacts directory exist).
pub fn require_initialized(config_path: &Path, config: &config::Config) -> Result<()> {
    if !config_path.exists() {
        anyhow::bail!(
            "configuration not initialized; run `raybridge init` first (config file not found: {})",
            config_path.display()
        );
    }
    let artifacts_dir = config::resolve_artifacts_dir(config, config_path);
    if !artifacts_dir.exists() {
        anyhow::bail!(
            "configuration not initialized; run `raybridge init` first (artifacts directory not found: {})",
            artifacts_dir.display()
        );
    }
    Ok(())
}

/// Create the config directory and default files if they do not exist.
/// - Writes `config.json` with `{}` if missing.
/// - Creates the artifacts directory the loaded config resolves to.
///
/// Returns the config directory.
pub fn init_config_dir(config_path: &Path) -> Result<PathBuf> {
    let config_dir = config_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(config_dir)
        .with_context(|| format!("creating config directory {}", config_dir.display()))?;

    if !config_path.exists() {
        std::fs::write(config_path, b"{}")
            .with_context(|| format!("writing default config to {}", config_path.display()))?;
        log::info!("created default config at {}", config_path.display());
    }

    let (config, _) = config::load_config(Some(config_path.to_path_buf()))?;
    let artifacts_dir = config::resolve_artifacts_dir(&config, config_path);
    if !artifacts_dir.exists() {
        std::fs::create_dir_all(&artifacts_dir)
            .with_context(|| format!("creating artifacts directory {}", artifacts_dir.display()))?;
        log::info!("created artifacts directory at {}", artifacts_dir.display());
    } else {
        log::debug!("artifacts directory already exists at {}, skipping", artifacts_dir.display());
    }

    Ok(config_dir.to_path_buf())
}
