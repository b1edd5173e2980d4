use clap::{Args, Parser, Subcommand};
use ewaldorder::engine::config::OrderingAlgorithm;
use std::path::PathBuf;

const HELP_TEMPLATE: &str = "\
{before-help}{name} {version}
{author-with-newline}{about-with-newline}
{usage-heading} {usage}

{all-args}{after-help}
";

#[derive(Parser, Debug)]
#[command(
    author = "The ewaldorder developers",
    version,
    about = "ewaldorder - Order partially occupied crystal structures by minimizing their Ewald energy.",
    help_template = HELP_TEMPLATE,
)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity level (-v for INFO, -vv for DEBUG, -vvv for TRACE)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all log output except for errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Write logs to a specified file in addition to the console output
    #[arg(long, global = true, value_name = "PATH")]
    pub log_file: Option<PathBuf>,

    /// Set the number of threads for parallel computation.
    /// Defaults to the number of available logical cores.
    #[arg(short = 'j', long, global = true, value_name = "NUM")]
    pub threads: Option<usize>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Search for the lowest-energy orderings of a job file's site groups.
    Order(OrderArgs),
    /// Validate a job file and print how many orderings it admits.
    Count(CountArgs),
}

/// Arguments for the `order` subcommand.
#[derive(Args, Debug)]
pub struct OrderArgs {
    // --- Core Arguments ---
    /// Path to the job file in TOML format (structure, groups and settings).
    #[arg(short, long, required = true, value_name = "PATH")]
    pub config: PathBuf,

    /// Write the ranked orderings, including their structures, to this TOML file.
    #[arg(short, long, value_name = "PATH")]
    pub output: Option<PathBuf>,

    /// Write a one-line-per-ordering CSV summary to this file.
    #[arg(long, value_name = "PATH")]
    pub summary: Option<PathBuf>,

    // --- Ordering Overrides ---
    /// Override the search algorithm (fast, complete or best-first).
    #[arg(short, long, value_name = "ALGO", value_parser = parse_algorithm)]
    pub algorithm: Option<OrderingAlgorithm>,

    /// Override the number of orderings to return.
    #[arg(short = 'n', long, value_name = "INT")]
    pub num_to_return: Option<usize>,

    // --- Budget Overrides ---
    /// Stop the search after expanding this many nodes (or evaluating this many orderings).
    #[arg(long, value_name = "INT")]
    pub max_nodes: Option<u64>,

    /// Stop the search after this many seconds.
    #[arg(long, value_name = "SECONDS")]
    pub time_limit: Option<f64>,

    /// Set a specific configuration value, overriding the job file.
    /// Can be used multiple times. Example: -S ewald.accuracy-factor=10
    #[arg(short = 'S', long = "set", value_name = "KEY=VALUE", num_args(0..))]
    pub set_values: Vec<String>,
}

/// Arguments for the `count` subcommand.
#[derive(Args, Debug)]
pub struct CountArgs {
    /// Path to the job file in TOML format.
    #[arg(short, long, required = true, value_name = "PATH")]
    pub config: PathBuf,
}

fn parse_algorithm(s: &str) -> Result<OrderingAlgorithm, String> {
    s.parse().map_err(|e: ewaldorder::engine::config::ConfigError| e.to_string())
}
