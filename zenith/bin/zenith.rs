use std::path::PathBuf;

use clap::Parser;
use zenith::{Zenith, config::CONFIG_ENV, locate_config};

#[cfg(not(any(target_os = "macos", unix)))]
compile_error!("Only macos and unix are currently supported");

/// Bulk campaign dispatch and delivery tracking
#[derive(Parser, Debug)]
#[command(name = "zenith")]
#[command(version)]
struct Cli {
    /// Path to the RON configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let env = std::env::var(CONFIG_ENV).ok();
    let config_path = locate_config(cli.config.as_deref(), env.as_deref())?;
    let config_content = std::fs::read_to_string(&config_path).map_err(|e| {
        anyhow::anyhow!(
            "Failed to read config from {}: {}",
            config_path.display(),
            e
        )
    })?;
    let zenith: Zenith = ron::from_str(&config_content)?;

    zenith.run().await
}
