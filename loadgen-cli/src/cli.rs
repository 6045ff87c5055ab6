//! CLI argument parsing definitions

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Override the configured log level (trace, debug, info, warn, error)
    #[arg(long, value_name = "LEVEL", global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the load scenario described by a configuration file
    Run {
        /// Path to the configuration file
        #[arg(short, long, value_name = "PATH")]
        config: PathBuf,

        /// Also write the final summary as JSON to this path
        #[arg(long, value_name = "PATH")]
        summary_json: Option<PathBuf>,
    },

    /// Validate a configuration file without generating load
    Validate {
        /// Path to the configuration file
        #[arg(short, long, value_name = "PATH")]
        config: PathBuf,
    },

    /// Print a sample configuration to stdout
    SampleConfig,
}
