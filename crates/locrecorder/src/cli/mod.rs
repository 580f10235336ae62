//! Command-line interface for locrecorder.
//!
//! This module provides the CLI structure for the `locrec` binary.

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::logging::Verbosity;

pub use commands::{
    ClearCommand, ConfigCommand, ListCommand, OutputFormat, StatusCommand, TrackCommand,
};

/// locrec - Record where you have been, one point per interval
///
/// Feeds a location watcher and an interval timer into a recorder that saves
/// at most one location per interval.
#[derive(Debug, Parser)]
#[command(name = "locrec")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to custom configuration file
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Increase verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// The command to execute
    #[command(subcommand)]
    pub command: Command,
}

/// Available commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Track and record locations until stopped
    Track(TrackCommand),

    /// List saved locations, newest first
    List(ListCommand),

    /// Print the number of saved locations
    Count,

    /// Delete all saved locations
    Clear(ClearCommand),

    /// Show live tracking status and storage details
    Status(StatusCommand),

    /// View or check configuration
    #[command(subcommand)]
    Config(ConfigCommand),
}

impl Cli {
    /// Get the verbosity level based on flags.
    #[must_use]
    pub fn verbosity(&self) -> Verbosity {
        if self.quiet {
            Verbosity::Quiet
        } else {
            match self.verbose {
                0 => Verbosity::Normal,
                1 => Verbosity::Verbose,
                _ => Verbosity::Trace,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(args).unwrap()
    }

    #[test]
    fn test_cli_verify() {
        Cli::command().debug_assert();
        assert_eq!(Cli::command().get_name(), "locrec");
    }

    #[test]
    fn test_verbosity_levels() {
        assert_eq!(parse(&["locrec", "count"]).verbosity(), Verbosity::Normal);
        assert_eq!(parse(&["locrec", "-v", "count"]).verbosity(), Verbosity::Verbose);
        assert_eq!(parse(&["locrec", "-vv", "count"]).verbosity(), Verbosity::Trace);
        assert_eq!(parse(&["locrec", "-q", "count"]).verbosity(), Verbosity::Quiet);
    }

    #[test]
    fn test_parse_track_fixed_position() {
        let cli = parse(&[
            "locrec",
            "track",
            "--lat",
            "-33.8688",
            "--lon",
            "151.2093",
            "--accuracy",
            "12.5",
            "--background",
            "--duration-secs",
            "30",
        ]);
        let Command::Track(cmd) = cli.command else {
            panic!("expected track");
        };
        assert_eq!(cmd.lat, Some(-33.8688));
        assert_eq!(cmd.lon, Some(151.2093));
        assert!(cmd.background);
        assert_eq!(cmd.duration_secs, Some(30));
        assert_eq!(cmd.fix_period_ms, 1000);
    }

    #[test]
    fn test_parse_track_replay() {
        let cli = parse(&["locrec", "track", "--replay", "walk.json", "--no-loop"]);
        let Command::Track(cmd) = cli.command else {
            panic!("expected track");
        };
        assert_eq!(cmd.replay, Some(PathBuf::from("walk.json")));
        assert!(cmd.no_loop);
    }

    #[test]
    fn test_track_needs_a_source() {
        assert!(Cli::try_parse_from(["locrec", "track"]).is_err());
        assert!(Cli::try_parse_from(["locrec", "track", "--lat", "1.0"]).is_err());
        assert!(Cli::try_parse_from([
            "locrec", "track", "--replay", "a.json", "--lat", "1", "--lon", "2"
        ])
        .is_err());
    }

    #[test]
    fn test_track_rejects_zero_fix_period() {
        assert!(Cli::try_parse_from([
            "locrec", "track", "--lat", "1", "--lon", "2", "--fix-period-ms", "0"
        ])
        .is_err());
        let cli = parse(&["locrec", "track", "--lat", "1", "--lon", "2", "--fix-period-ms", "1"]);
        assert!(matches!(cli.command, Command::Track(TrackCommand { fix_period_ms: 1, .. })));
    }

    #[test]
    fn test_parse_list() {
        let cli = parse(&["locrec", "list", "--limit", "5", "--format", "json"]);
        let Command::List(cmd) = cli.command else {
            panic!("expected list");
        };
        assert_eq!(cmd.limit, Some(5));
        assert_eq!(cmd.format, OutputFormat::Json);
    }

    #[test]
    fn test_parse_clear_and_status() {
        assert!(matches!(
            parse(&["locrec", "clear", "--yes"]).command,
            Command::Clear(ClearCommand { yes: true })
        ));
        assert!(matches!(
            parse(&["locrec", "status", "--json"]).command,
            Command::Status(StatusCommand { json: true })
        ));
    }

    #[test]
    fn test_parse_with_config() {
        let cli = parse(&["locrec", "-c", "/custom/config.toml", "count"]);
        assert_eq!(cli.config, Some(PathBuf::from("/custom/config.toml")));
    }

    #[test]
    fn test_parse_config_validate() {
        let cli = parse(&["locrec", "config", "validate", "--file", "x.toml"]);
        assert!(matches!(
            cli.command,
            Command::Config(ConfigCommand::Validate { file: Some(_) })
        ));
    }
}
