//! CLI command definitions.

use std::path::PathBuf;

use clap::{ArgGroup, Args, Subcommand, ValueEnum};

/// Track command arguments.
///
/// Fixes come either from a replay file or from a fixed position.
#[derive(Debug, Args)]
#[command(group(ArgGroup::new("source").required(true).args(["replay", "lat"])))]
pub struct TrackCommand {
    /// Replay fixes from a JSON file
    #[arg(long, value_name = "FILE")]
    pub replay: Option<PathBuf>,

    /// Report a fixed latitude
    #[arg(long, requires = "lon", allow_negative_numbers = true)]
    pub lat: Option<f64>,

    /// Report a fixed longitude
    #[arg(long, requires = "lat", allow_negative_numbers = true)]
    pub lon: Option<f64>,

    /// Accuracy of the fixed position in metres
    #[arg(long, default_value = "0")]
    pub accuracy: f64,

    /// Time between watcher fixes in milliseconds
    #[arg(
        long,
        default_value = "1000",
        value_name = "MS",
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub fix_period_ms: u64,

    /// Stop the replay after the last fix instead of starting over
    #[arg(long)]
    pub no_loop: bool,

    /// Start as if the app were in the background
    #[arg(long)]
    pub background: bool,

    /// Stop after this many seconds (default: until Ctrl-C)
    #[arg(long, value_name = "SECS")]
    pub duration_secs: Option<u64>,
}

/// List command arguments.
#[derive(Debug, Args)]
pub struct ListCommand {
    /// Show only the newest N locations
    #[arg(short, long)]
    pub limit: Option<usize>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "plain")]
    pub format: OutputFormat,
}

/// Clear command arguments.
#[derive(Debug, Args)]
pub struct ClearCommand {
    /// Skip confirmation
    #[arg(short, long)]
    pub yes: bool,
}

/// Status command arguments.
#[derive(Debug, Args)]
pub struct StatusCommand {
    /// Output as JSON
    #[arg(short, long)]
    pub json: bool,
}

/// Configuration commands.
#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration
    Show {
        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Show the configuration file path
    Path,

    /// Validate configuration
    Validate {
        /// Path to configuration file to validate
        #[arg(short, long)]
        file: Option<PathBuf>,
    },
}

/// Output format for listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    /// One block per location
    #[default]
    Plain,
    /// Aligned columns
    Table,
    /// JSON array of the listed points, newest first
    Json,
}
