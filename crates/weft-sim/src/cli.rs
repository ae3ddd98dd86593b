use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "weft-sim",
    about = "Drive randomized collaborative editing sessions against an in-memory sequencer",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Clone, Debug, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run a simulation and check convergence
    Run(RunArgs),
    /// Print or write the default configuration
    Config(ConfigArgs),
}

#[derive(Args)]
pub struct RunArgs {
    /// TOML configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,
    #[arg(long)]
    pub clients: Option<usize>,
    #[arg(long)]
    pub steps: Option<usize>,
    #[arg(long)]
    pub seed: Option<u64>,
    /// Run this many consecutive seeds starting at the configured one
    #[arg(long, default_value_t = 1)]
    pub runs: u64,
    /// Print every client's final document
    #[arg(long)]
    pub show_documents: bool,
}

#[derive(Args)]
pub struct ConfigArgs {
    /// Write to a file instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}
