//! `sdsubmit` - SD card ingest and durable upload queue
//!
//! This library turns a survey camera card into upload entries: it validates
//! the selected volume, classifies its folders, groups them per stand, and
//! commits each group to a crash-safe queue shared by concurrent processes.

#![warn(missing_docs)]
#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

pub mod aggregate;
pub mod catalog;
pub mod classify;
pub mod cli;
pub mod config;
pub mod entry;
pub mod error;
pub mod lock;
pub mod logging;
pub mod lookup;
pub mod paths;
pub mod queue;
pub mod submit;
pub mod volume;

pub use aggregate::{aggregate, FileGroup, GroupKey};
pub use catalog::{Catalog, FlightLog};
pub use classify::{scan_volume, Category, ClassifiedFolder, ScanReport};
pub use config::Config;
pub use entry::SubmissionEntry;
pub use error::{Error, Result};
pub use lock::{LockGuard, QueueLock};
pub use logging::init_logging;
pub use lookup::{ClientResolver, FiletypeRegistry, FlightField, MetadataUpdater, StandResolver};
pub use paths::{resolve_folders, PathConvention, ResolvedFolder};
pub use queue::{QueueItem, QueueStats, UploadQueue};
pub use submit::{Batch, EntryPreview, SubmissionContext, SubmissionReport};
pub use volume::VolumeRoot;
