use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;
use loadgen_config::{ConfigLoader, LoadConfig};
use std::path::Path;
use tracing::info;

mod cli;
mod logging;
mod report;
mod run;

use cli::{Cli, Commands};

/// Exit status when the run completed but a threshold failed
const THRESHOLD_FAILURE_EXIT_CODE: i32 = 99;

fn load_config(path: &Path) -> Result<LoadConfig> {
    ConfigLoader::new()
        .load(Some(path))
        .with_context(|| format!("Failed to load configuration from {}", path.display()))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::SampleConfig => {
            print!("{}", LoadConfig::generate_sample());
            Ok(())
        }
        Commands::Validate { config } => {
            let loaded = load_config(&config)?;
            let thresholds = run::preflight(&loaded)?;
            println!(
                "{} {} is valid ({} thresholds)",
                "✓".green(),
                config.display(),
                thresholds.len()
            );
            Ok(())
        }
        Commands::Run { config, summary_json } => {
            let loaded = load_config(&config)?;
            logging::init_tracing(&loaded.logging, cli.log_level.as_deref())?;
            info!("Loaded configuration from {}", config.display());

            let outcome = run::execute(&loaded).await?;
            print!(
                "{}",
                report::render_final(&outcome.run, &outcome.summary, &outcome.thresholds)
            );

            if let Some(path) = summary_json {
                run::write_summary_json(&path, &outcome)?;
            }

            if !outcome.passed() {
                std::process::exit(THRESHOLD_FAILURE_EXIT_CODE);
            }
            Ok(())
        }
    }
}
