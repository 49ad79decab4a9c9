//! Batch preparation and submission.
//!
//! [`Batch::prepare`] runs the read-only pipeline (validate, classify,
//! resolve paths, aggregate, build entries) and has no side effects, so a
//! batch that is never confirmed leaves nothing behind. [`SubmissionContext::submit`]
//! then commits each entry independently: flight metadata first, then the
//! enqueue under the queue lock.

use std::path::Path;

use serde::Serialize;
use tracing::{error, info, warn};

use crate::aggregate::aggregate;
use crate::classify::scan_volume;
use crate::config::Config;
use crate::entry::{build_entries, SubmissionEntry};
use crate::error::{Error, Result};
use crate::lock::QueueLock;
use crate::lookup::{ClientResolver, FiletypeRegistry, FlightField, MetadataUpdater, StandResolver};
use crate::paths::{resolve_folders, PathConvention};
use crate::queue::{QueueItem, UploadQueue};
use crate::volume::VolumeRoot;

/// Metadata key for the card id.
pub const FIELD_SD_CARD: &str = "SD_CARD";
/// Metadata key for the pilot name.
pub const FIELD_PILOT: &str = "PILOT";
/// Metadata key marking the flight as complete.
pub const FIELD_FLIGHT_COMPLETE: &str = "FLIGHT_COMPLETE";

/// Everything needed to submit one card, prepared but not yet committed.
#[derive(Debug, Clone)]
pub struct Batch {
    /// The scanned volume.
    pub volume: VolumeRoot,
    /// Pilot who flew the card.
    pub pilot: String,
    /// Entries in aggregation order.
    pub entries: Vec<SubmissionEntry>,
    /// Volume children that were not classified.
    pub skipped: Vec<String>,
}

impl Batch {
    /// Scan a selected card path and build its entries.
    ///
    /// # Errors
    ///
    /// Returns the first validation, listing or lookup failure. Nothing is
    /// written in any case.
    pub fn prepare<L>(
        selected: impl AsRef<Path>,
        pilot: impl Into<String>,
        lookup: &L,
        convention: PathConvention,
    ) -> Result<Self>
    where
        L: ClientResolver + StandResolver + FiletypeRegistry,
    {
        let volume = VolumeRoot::from_selected(selected)?;
        let report = scan_volume(&volume, lookup)?;
        let resolved = resolve_folders(report.folders, convention);
        let groups = aggregate(&resolved);
        let entries = build_entries(&groups, lookup, lookup)?;

        let pilot = pilot.into();
        info!(
            "Prepared {} entries from {} for pilot {}",
            entries.len(),
            volume.card_id(),
            pilot
        );
        Ok(Self {
            volume,
            pilot,
            entries,
            skipped: report.skipped,
        })
    }

    /// The card identifier.
    #[must_use]
    pub fn card_id(&self) -> &str {
        self.volume.card_id()
    }

    /// The metadata recorded against every stand in this batch.
    #[must_use]
    pub fn flight_fields(&self) -> Vec<FlightField> {
        vec![
            FlightField::new(FIELD_SD_CARD, self.card_id()),
            FlightField::new(FIELD_PILOT, self.pilot.as_str()),
            FlightField::new(FIELD_FLIGHT_COMPLETE, 1),
        ]
    }
}

/// What happened to one entry.
#[derive(Debug)]
pub struct EntryOutcome {
    /// The entry.
    pub entry: SubmissionEntry,
    /// Queue id on success.
    pub result: Result<i64>,
}

impl EntryOutcome {
    /// Whether the entry reached the queue.
    #[must_use]
    pub fn is_enqueued(&self) -> bool {
        self.result.is_ok()
    }
}

/// Per-entry results of a submission, in batch order.
#[derive(Debug)]
pub struct SubmissionReport {
    /// Card the batch came from.
    pub card_id: String,
    /// One outcome per entry.
    pub outcomes: Vec<EntryOutcome>,
}

impl SubmissionReport {
    /// Number of entries that reached the queue.
    #[must_use]
    pub fn enqueued(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_enqueued()).count()
    }

    /// Entries that did not reach the queue.
    pub fn failures(&self) -> impl Iterator<Item = (&SubmissionEntry, &Error)> {
        self.outcomes
            .iter()
            .filter_map(|o| o.result.as_ref().err().map(|e| (&o.entry, e)))
    }

    /// Whether every entry reached the queue.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.outcomes.iter().all(EntryOutcome::is_enqueued)
    }
}

/// Summary of an entry for operator review before committing.
#[derive(Debug, Serialize)]
pub struct EntryPreview<'a> {
    /// Client id.
    #[serde(rename = "CLIENT_ID")]
    pub client_id: &'a str,
    /// Project id.
    #[serde(rename = "PROJECT_ID")]
    pub project_id: &'a str,
    /// Stand id.
    #[serde(rename = "STAND_ID")]
    pub stand_id: &'a str,
    /// Filetype.
    pub filetype: &'a str,
    /// Files to upload.
    pub files: &'a [String],
}

impl<'a> From<&'a SubmissionEntry> for EntryPreview<'a> {
    fn from(entry: &'a SubmissionEntry) -> Self {
        Self {
            client_id: &entry.client_id,
            project_id: &entry.project_id,
            stand_id: &entry.stand_id,
            filetype: &entry.filetype,
            files: &entry.files,
        }
    }
}

/// The queue and its lock, opened once per process.
#[derive(Debug)]
pub struct SubmissionContext {
    queue: UploadQueue,
    lock: QueueLock,
}

impl SubmissionContext {
    /// Combine an opened queue with its lock.
    #[must_use]
    pub fn new(queue: UploadQueue, lock: QueueLock) -> Self {
        Self { queue, lock }
    }

    /// Open (creating or migrating if needed) the queue in `dir` while
    /// holding `lock`.
    ///
    /// # Errors
    ///
    /// Returns a lock error, or an error if the queue cannot be opened.
    pub fn open(dir: impl AsRef<Path>, lock: QueueLock) -> Result<Self> {
        let queue = lock.with_lock(|| UploadQueue::open(dir))?;
        Ok(Self::new(queue, lock))
    }

    /// Open the queue and lock named by the configuration.
    ///
    /// # Errors
    ///
    /// Returns a lock error, or an error if the queue cannot be opened.
    pub fn from_config(config: &Config) -> Result<Self> {
        let lock = QueueLock::new(config.lock_path(), config.lock_timeout());
        Self::open(config.queue_path(), lock)
    }

    /// The underlying queue, for read-only inspection.
    #[must_use]
    pub fn queue(&self) -> &UploadQueue {
        &self.queue
    }

    /// The queue lock.
    #[must_use]
    pub fn lock(&self) -> &QueueLock {
        &self.lock
    }

    /// Enqueue one entry while holding the lock.
    ///
    /// # Errors
    ///
    /// Returns a lock error or [`Error::QueueWrite`]; the lock is released
    /// either way.
    pub fn enqueue(&self, entry: &SubmissionEntry) -> Result<i64> {
        self.lock.with_lock(|| self.queue.enqueue(entry))
    }

    /// Remove the oldest item while holding the lock.
    ///
    /// # Errors
    ///
    /// Returns a lock error, or the queue's error for a corrupt head item.
    pub fn dequeue(&self) -> Result<Option<QueueItem>> {
        self.lock.with_lock(|| self.queue.dequeue())
    }

    /// Remove an item by id while holding the lock.
    ///
    /// # Errors
    ///
    /// Returns a lock or database error.
    pub fn remove(&self, id: i64) -> Result<bool> {
        self.lock.with_lock(|| self.queue.remove(id))
    }

    /// Commit a confirmed batch.
    ///
    /// Each entry is attempted once, in order. An entry is enqueued only if
    /// its metadata update succeeded; a failed entry does not stop the rest.
    pub fn submit(&self, batch: &Batch, updater: &dyn MetadataUpdater) -> SubmissionReport {
        let fields = batch.flight_fields();
        let outcomes = batch
            .entries
            .iter()
            .map(|entry| {
                let result = self.submit_entry(entry, &fields, updater);
                if let Err(e) = &result {
                    error!(
                        "Submission of {} from {} failed: {}",
                        entry.label(),
                        batch.card_id(),
                        e
                    );
                }
                EntryOutcome {
                    entry: entry.clone(),
                    result,
                }
            })
            .collect::<Vec<_>>();

        let report = SubmissionReport {
            card_id: batch.card_id().to_string(),
            outcomes,
        };
        if report.is_complete() {
            info!(
                "Submitted {} entries from {}",
                report.enqueued(),
                report.card_id
            );
        } else {
            warn!(
                "Submitted {} of {} entries from {}",
                report.enqueued(),
                report.outcomes.len(),
                report.card_id
            );
        }
        report
    }

    fn submit_entry(
        &self,
        entry: &SubmissionEntry,
        fields: &[FlightField],
        updater: &dyn MetadataUpdater,
    ) -> Result<i64> {
        updater.update_flight_info(&entry.client_id, &entry.project_id, &entry.stand_id, fields)?;
        let id = self.enqueue(entry)?;
        info!("{}", upload_log_line(entry));
        Ok(id)
    }
}

fn upload_log_line(entry: &SubmissionEntry) -> String {
    match serde_json::to_string_pretty(entry) {
        Ok(json) => format!("Submitting file upload\n{json}"),
        Err(e) => format!(
            "Submitting file upload {} (payload not renderable: {e})",
            entry.label()
        ),
    }
}
