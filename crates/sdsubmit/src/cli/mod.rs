//! Command-line interface for sdsubmit.
//!
//! This module provides the CLI structure for the `sdsub` binary.

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

pub use commands::{ConfigCommand, QueueCommand, ScanCommand, SubmitCommand};

use crate::logging::Verbosity;

/// sdsub - Queue SD card imagery for upload
///
/// Scans a survey camera card, groups its flight and strip-sample folders by
/// stand, records flight metadata and appends one upload entry per group to
/// a shared queue.
#[derive(Debug, Parser)]
#[command(name = "sdsub")]
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
    /// Show what a card would submit, without writing anything
    Scan(ScanCommand),

    /// Record flight metadata and queue a card's uploads
    Submit(SubmitCommand),

    /// Inspect or drain the upload queue
    #[command(subcommand)]
    Queue(QueueCommand),

    /// View or validate configuration
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
    fn test_cli_name() {
        assert_eq!(Cli::command().get_name(), "sdsub");
    }

    #[test]
    fn test_cli_verify() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_verbosity_flags() {
        assert_eq!(
            parse(&["sdsub", "queue", "pop"]).verbosity(),
            Verbosity::Normal
        );
        assert_eq!(
            parse(&["sdsub", "-q", "queue", "pop"]).verbosity(),
            Verbosity::Quiet
        );
        assert_eq!(
            parse(&["sdsub", "-v", "queue", "pop"]).verbosity(),
            Verbosity::Verbose
        );
        assert_eq!(
            parse(&["sdsub", "-vv", "queue", "pop"]).verbosity(),
            Verbosity::Trace
        );
    }

    #[test]
    fn test_parse_submit() {
        let cli = parse(&["sdsub", "submit", "/Volumes/SD-0451", "--pilot", "Jake", "--yes"]);
        match cli.command {
            Command::Submit(cmd) => {
                assert_eq!(cmd.path, PathBuf::from("/Volumes/SD-0451"));
                assert_eq!(cmd.pilot, "Jake");
                assert!(cmd.yes);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_submit_requires_pilot() {
        assert!(Cli::try_parse_from(["sdsub", "submit", "/Volumes/SD-0451"]).is_err());
    }

    #[test]
    fn test_parse_scan_json() {
        let cli = parse(&["sdsub", "scan", "/Volumes/SD-0451/DCIM", "--json"]);
        assert!(matches!(cli.command, Command::Scan(ScanCommand { json: true, .. })));
    }

    #[test]
    fn test_parse_queue_list() {
        let cli = parse(&["sdsub", "queue", "list", "--limit", "5"]);
        assert!(matches!(
            cli.command,
            Command::Queue(QueueCommand::List {
                limit: 5,
                json: false
            })
        ));
    }

    #[test]
    fn test_parse_queue_remove() {
        let cli = parse(&["sdsub", "queue", "remove", "42"]);
        assert!(matches!(
            cli.command,
            Command::Queue(QueueCommand::Remove { id: 42 })
        ));
    }

    #[test]
    fn test_parse_with_config() {
        let cli = parse(&["sdsub", "-c", "/custom/config.toml", "config", "show"]);
        assert_eq!(cli.config, Some(PathBuf::from("/custom/config.toml")));
        assert!(matches!(
            cli.command,
            Command::Config(ConfigCommand::Show { json: false })
        ));
    }
}
