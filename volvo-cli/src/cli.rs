use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use clap_complete::Shell;

#[derive(Parser, Debug)]
#[command(
    name = "volvo",
    version,
    about = "Poll the Volvo Cars connected vehicle API",
    long_about = None
)]
pub struct Args {
    /// Configuration file path
    #[arg(short, long, global = true, env = "VOLVO_CONFIG")]
    pub config: Option<PathBuf>,

    /// File holding persisted tokens and response caches
    #[arg(long, global = true, env = "VOLVO_STATE")]
    pub state: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    pub verbose: bool,

    /// Only log errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Keep polling until interrupted, printing the garage after every update
    Run {
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Pretty)]
        output: OutputFormat,

        /// Override the configured poll interval (seconds)
        #[arg(short, long)]
        interval: Option<u64>,
    },

    /// Run a single update cycle, print the garage and exit
    Once {
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Pretty)]
        output: OutputFormat,
    },

    /// Configuration management
    Config {
        /// Show the effective configuration with secrets masked
        #[arg(long)]
        show: bool,

        /// Write a configuration template
        #[arg(long)]
        init: bool,
    },

    /// Generate shell completions
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable summary
    Pretty,
    /// Pretty-printed JSON
    Json,
    /// Single-line JSON
    JsonCompact,
}

impl Commands {
    pub fn output_format(&self) -> Option<OutputFormat> {
        match self {
            Commands::Run { output, .. } | Commands::Once { output } => Some(*output),
            _ => None,
        }
    }
}
