//! `sdsub` - CLI for sdsubmit
//!
//! This binary scans survey SD cards, queues their uploads and lets the
//! operator inspect the shared upload queue.

#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

use std::io::{self, BufRead, Write};
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use tracing::error;

use sdsubmit::cli::{Cli, Command, ConfigCommand, QueueCommand, ScanCommand, SubmitCommand};
use sdsubmit::{
    aggregate, init_logging, resolve_folders, scan_volume, Batch, Catalog, Config, EntryPreview,
    Error, FlightLog, QueueStats, SubmissionContext, UploadQueue, VolumeRoot,
};

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize logging based on verbosity
    init_logging(cli.verbosity());

    match run(cli) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("error: {err:#}");
            if let Some(hint) = err.downcast_ref::<Error>().and_then(hint_for) {
                eprintln!("hint: {hint}");
            }
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let config = Config::load_from(cli.config.clone()).context("loading configuration")?;

    match cli.command {
        Command::Scan(cmd) => handle_scan(&config, &cmd),
        Command::Submit(cmd) => handle_submit(&config, &cmd),
        Command::Queue(cmd) => handle_queue(&config, cmd),
        Command::Config(cmd) => handle_config(&config, cmd),
    }
}

fn hint_for(err: &Error) -> Option<&'static str> {
    if err.is_retryable() {
        Some("another sdsub is holding the queue lock; try again shortly")
    } else if err.is_user_correctable() {
        Some("check the selected card path and pilot name")
    } else {
        None
    }
}

fn load_catalog(config: &Config) -> anyhow::Result<Catalog> {
    let path = config.catalog_path();
    Catalog::load(&path).with_context(|| format!("loading catalog {}", path.display()))
}

fn handle_scan(config: &Config, cmd: &ScanCommand) -> anyhow::Result<ExitCode> {
    let catalog = load_catalog(config)?;
    let volume = VolumeRoot::from_selected(&cmd.path)?;
    let report = scan_volume(&volume, &catalog)?;
    let skipped = report.skipped;
    let groups = aggregate(&resolve_folders(report.folders, config.path_convention()));

    if cmd.json {
        let out = serde_json::json!({
            "card_id": volume.card_id(),
            "volume": volume.path(),
            "groups": groups,
            "skipped": skipped,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(ExitCode::SUCCESS);
    }

    println!("Card:    {}", volume.card_id());
    println!("Volume:  {}", volume.path().display());
    println!("Groups:  {}", groups.len());
    for group in &groups {
        println!();
        println!(
            "  {} {}/{}/{} ({} folders)",
            group.key.category,
            group.key.client_id,
            group.key.project_id,
            group.key.stand_id,
            group.full_paths.len()
        );
        for path in &group.full_paths {
            println!("    {path}");
        }
    }
    if !skipped.is_empty() {
        println!();
        println!("Skipped: {}", skipped.join(", "));
    }
    Ok(ExitCode::SUCCESS)
}

fn handle_submit(config: &Config, cmd: &SubmitCommand) -> anyhow::Result<ExitCode> {
    config.check_pilot(&cmd.pilot)?;
    let catalog = load_catalog(config)?;
    let batch = Batch::prepare(&cmd.path, cmd.pilot.as_str(), &catalog, config.path_convention())
        .with_context(|| format!("preparing {}", cmd.path.display()))?;

    if batch.entries.is_empty() {
        println!("Nothing to submit on {}.", batch.card_id());
        return Ok(ExitCode::SUCCESS);
    }

    let previews: Vec<EntryPreview<'_>> = batch.entries.iter().map(EntryPreview::from).collect();
    println!("SD card: {}", batch.card_id());
    println!("Pilot:   {}", batch.pilot);
    println!("{}", serde_json::to_string_pretty(&previews)?);

    if !cmd.yes && !confirm(batch.entries.len())? {
        error!("submission cancelled");
        return Ok(ExitCode::SUCCESS);
    }

    let context = SubmissionContext::from_config(config).context("opening upload queue")?;
    let flight_log = FlightLog::new(config.flight_log_path());
    let report = context.submit(&batch, &flight_log);

    println!(
        "Queued {} of {} entries from {}.",
        report.enqueued(),
        report.outcomes.len(),
        report.card_id
    );
    for (entry, err) in report.failures() {
        eprintln!("FAILED {}: {err}", entry.label());
        if let Some(hint) = hint_for(err) {
            eprintln!("  hint: {hint}");
        }
    }

    Ok(if report.is_complete() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn confirm(count: usize) -> io::Result<bool> {
    print!("Submit {count} entries? [y/N] ");
    io::stdout().flush()?;

    let mut answer = String::new();
    io::stdin().lock().read_line(&mut answer)?;
    Ok(matches!(
        answer.trim().to_ascii_lowercase().as_str(),
        "y" | "yes"
    ))
}

fn handle_queue(config: &Config, cmd: QueueCommand) -> anyhow::Result<ExitCode> {
    match cmd {
        QueueCommand::Status { json } => {
            let queue_path = config.queue_path();
            let stats = match UploadQueue::open_read_only(&queue_path)? {
                Some(queue) => queue.stats()?,
                None => QueueStats::default(),
            };
            if json {
                let out = serde_json::json!({
                    "queue_path": queue_path,
                    "lock_path": config.lock_path(),
                    "stats": stats,
                });
                println!("{}", serde_json::to_string_pretty(&out)?);
            } else {
                let when = |t: Option<chrono::DateTime<chrono::Utc>>| {
                    t.map_or_else(|| "-".to_string(), |t| t.to_rfc3339())
                };
                println!("sdsub queue status");
                println!("------------------");
                println!("Queue:         {}", queue_path.display());
                println!("Lock:          {}", config.lock_path().display());
                println!("Items:         {}", stats.items);
                println!("Oldest:        {}", when(stats.oldest_enqueued));
                println!("Newest:        {}", when(stats.newest_enqueued));
                println!("Size (bytes):  {}", stats.db_size_bytes);
            }
        }
        QueueCommand::List { limit, json } => {
            let items = match UploadQueue::open_read_only(config.queue_path())? {
                Some(queue) => queue.list(limit)?,
                None => Vec::new(),
            };
            if json {
                println!("{}", serde_json::to_string_pretty(&items)?);
            } else if items.is_empty() {
                println!("Queue is empty.");
            } else {
                for item in &items {
                    println!(
                        "{:>6}  {}  {}  ({} files)",
                        item.id,
                        item.enqueued_at.to_rfc3339(),
                        item.entry.label(),
                        item.entry.files.len()
                    );
                }
            }
        }
        QueueCommand::Pop => {
            let context = SubmissionContext::from_config(config)?;
            match context.dequeue()? {
                Some(item) => println!("{}", serde_json::to_string_pretty(&item)?),
                None => println!("Queue is empty."),
            }
        }
        QueueCommand::Remove { id } => {
            let context = SubmissionContext::from_config(config)?;
            if context.remove(id)? {
                println!("Removed item {id}.");
            } else {
                println!("No item with id {id}.");
                return Ok(ExitCode::FAILURE);
            }
        }
    }
    Ok(ExitCode::SUCCESS)
}

fn handle_config(config: &Config, cmd: ConfigCommand) -> anyhow::Result<ExitCode> {
    match cmd {
        ConfigCommand::Show { json } => {
            if json {
                println!("{}", serde_json::to_string_pretty(config)?);
            } else {
                println!("Current Configuration");
                println!("=====================");
                println!();
                println!("[Queue]");
                println!("  Queue path:         {}", config.queue_path().display());
                println!("  Lock path:          {}", config.lock_path().display());
                println!("  Lock timeout (s):   {}", config.queue.lock_timeout_secs);
                println!();
                println!("[Paths]");
                println!("  Convention:         {}", config.path_convention());
                println!();
                println!("[Catalog]");
                println!("  Catalog path:       {}", config.catalog_path().display());
                println!("  Flight log path:    {}", config.flight_log_path().display());
                println!();
                println!("[Submission]");
                if config.submission.pilots.is_empty() {
                    println!("  Pilots:             (any)");
                } else {
                    println!("  Pilots:             {}", config.submission.pilots.join(", "));
                }
            }
        }
        ConfigCommand::Path => {
            println!("{}", Config::default_config_path().display());
        }
        ConfigCommand::Validate { file } => {
            let path = file.unwrap_or_else(Config::default_config_path);
            println!("Validating configuration: {}", path.display());
            match Config::load_from(Some(path)) {
                Ok(_) => println!("Configuration is valid."),
                Err(e) => {
                    println!("Configuration error: {e}");
                    return Ok(ExitCode::FAILURE);
                }
            }
        }
    }
    Ok(ExitCode::SUCCESS)
}
