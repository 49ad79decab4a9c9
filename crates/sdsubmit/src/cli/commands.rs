//! CLI command definitions.
//!
//! This module defines the structure of all CLI subcommands.

use std::path::PathBuf;

use clap::{Args, Subcommand};

/// Scan command arguments.
#[derive(Debug, Args)]
pub struct ScanCommand {
    /// Card path as selected by the operator (volume root or its DCIM folder)
    pub path: PathBuf,

    /// Output as JSON
    #[arg(short, long)]
    pub json: bool,
}

/// Submit command arguments.
#[derive(Debug, Args)]
pub struct SubmitCommand {
    /// Card path as selected by the operator (volume root or its DCIM folder)
    pub path: PathBuf,

    /// Pilot who flew the card
    #[arg(short, long)]
    pub pilot: String,

    /// Skip the verification prompt
    #[arg(short, long)]
    pub yes: bool,
}

/// Upload queue commands.
#[derive(Debug, Subcommand)]
pub enum QueueCommand {
    /// Show item count, age and storage size
    Status {
        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// List queued items, oldest first
    List {
        /// Maximum number of items
        #[arg(short, long, default_value = "20")]
        limit: usize,

        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Remove the oldest item and print it
    Pop,

    /// Remove an item by id
    Remove {
        /// Queue id
        id: i64,
    },
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
