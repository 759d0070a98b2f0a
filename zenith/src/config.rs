use std::path::{Path, PathBuf};

use serde::Deserialize;
use zenith_common::{Seed, StoreBackend, Stores};

/// Environment variable naming the configuration file
pub const CONFIG_ENV: &str = "ZENITH_CONFIG";

const DEFAULT_PATHS: [&str; 2] = ["./zenith.config.ron", "/etc/zenith/zenith.config.ron"];

/// Campaign and subscriber data
///
/// ```ron
/// store: (
///     backend: File(path: "/var/spool/zenith/store"),
///     seed: Some("./seed.ron"),
/// ),
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub backend: StoreBackend,

    /// RON file of campaigns and subscribers to add on start
    ///
    /// Rows the backend already holds are left alone.
    #[serde(default)]
    pub seed: Option<PathBuf>,
}

impl StoreConfig {
    /// # Errors
    /// If the seed file cannot be read or parsed, or the backend cannot be
    /// opened
    pub async fn open(&self) -> anyhow::Result<Stores> {
        let seed = match &self.seed {
            Some(path) => Seed::load(path)?,
            None => Seed::default(),
        };
        Ok(self.backend.open(seed).await?)
    }
}

/// Find the configuration file using the following precedence:
/// 1. An explicit path, normally from `--config`
/// 2. The `ZENITH_CONFIG` environment variable
/// 3. ./zenith.config.ron (current working directory)
/// 4. /etc/zenith/zenith.config.ron (system-wide config)
///
/// # Errors
/// If an explicitly named file does not exist, or no candidate does
pub fn locate_config(explicit: Option<&Path>, env: Option<&str>) -> anyhow::Result<PathBuf> {
    if let Some(path) = explicit {
        if path.exists() {
            return Ok(path.to_path_buf());
        }
        anyhow::bail!("Config file does not exist: {}", path.display());
    }

    if let Some(env_path) = env {
        let path = PathBuf::from(env_path);
        if path.exists() {
            return Ok(path);
        }
        anyhow::bail!(
            "{CONFIG_ENV} points to non-existent file: {}",
            path.display()
        );
    }

    if let Some(path) = DEFAULT_PATHS.iter().map(PathBuf::from).find(|p| p.exists()) {
        return Ok(path);
    }

    let paths_tried = DEFAULT_PATHS
        .iter()
        .map(|p| format!("  - {p}"))
        .collect::<Vec<_>>()
        .join("\n");

    anyhow::bail!(
        "No configuration file found. Tried:\n  - --config\n  - {CONFIG_ENV} environment variable\n{paths_tried}"
    )
}
