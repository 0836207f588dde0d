use clap::{Parser, Subcommand, ValueEnum};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
#[value(rename_all = "lowercase")]
pub enum OutputFormat {
    Plain,
    Json,
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputFormat::Plain => write!(f, "plain"),
            OutputFormat::Json => write!(f, "json"),
        }
    }
}

#[derive(Parser)]
#[command(name = "strategy")]
#[command(about = "Drive a strategy orchestration turn against scripted doubles", long_about = None)]
#[command(version)]
pub struct Cli {
    #[arg(long, default_value = "plain", global = true)]
    pub format: OutputFormat,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    #[command(about = "Run a goal through the delegation scheduler with a scripted sub-agent")]
    Run {
        /// Natural-language goal for the turn, e.g. "genes linked to both X and Y".
        goal: String,

        /// Record type searched against (must be known to the scripted platform double).
        #[arg(long, default_value = "gene")]
        record_type: String,

        /// Strategy id the turn is scoped to.
        #[arg(long, default_value = "demo-strategy")]
        strategy_id: String,
    },
}
