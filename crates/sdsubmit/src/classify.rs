//! Folder classification.
//!
//! Each immediate child of a volume root whose name starts with
//! `{projectID}_{standID}_` becomes a [`ClassifiedFolder`]. Everything else is
//! skipped without error and listed in the [`ScanReport`].

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::lookup::ClientResolver;
use crate::volume::VolumeRoot;

const FOLDER_PATTERN: &str = r"^[0-9]{6}_[0-9]{3}_";

/// Last name token marking a strip sample folder (compared case-insensitively).
const STRIP_SAMPLE_SUFFIX: &str = "SS";

fn folder_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(FOLDER_PATTERN).expect("Invalid folder pattern"))
}

/// Content category of a flight folder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    /// Regular survey imagery.
    FlightImages,
    /// Strip sample imagery, marked by an `SS` suffix.
    StripSampleImages,
}

impl Category {
    /// Every known category.
    pub const ALL: [Self; 2] = [Self::FlightImages, Self::StripSampleImages];

    /// The lower-cased filetype name used on the queue.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::FlightImages => "flight_images",
            Self::StripSampleImages => "strip_sample_images",
        }
    }

    /// Parse a filetype name, ignoring case.
    #[must_use]
    pub fn from_filetype(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|c| c.as_str().eq_ignore_ascii_case(name))
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A child of the volume root as seen by the directory listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFolder {
    /// Entry name.
    pub name: String,
    /// Full host path.
    pub path: PathBuf,
}

/// Identifiers parsed from a folder name, before client resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FolderName {
    /// Six digit project id.
    pub project_id: String,
    /// Three digit stand id.
    pub stand_id: String,
    /// Category from the last name token.
    pub category: Category,
}

impl FolderName {
    /// Parse a folder name, returning `None` if it does not follow the
    /// naming convention.
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        if !folder_regex().is_match(name) {
            return None;
        }
        let mut tokens = name.split('_');
        let project_id = tokens.next()?.to_string();
        let stand_id = tokens.next()?.to_string();
        let last = name.rsplit('_').next().unwrap_or_default();
        let category = if last.eq_ignore_ascii_case(STRIP_SAMPLE_SUFFIX) {
            Category::StripSampleImages
        } else {
            Category::FlightImages
        };
        Some(Self {
            project_id,
            stand_id,
            category,
        })
    }
}

/// A folder that follows the naming convention, with its client resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassifiedFolder {
    /// Client owning the project.
    pub client_id: String,
    /// Six digit project id.
    pub project_id: String,
    /// Three digit stand id.
    pub stand_id: String,
    /// Content category.
    pub category: Category,
    /// Host path of the folder.
    pub source_path: PathBuf,
    /// Suffix for folders split into sub-items.
    pub sub_source: Option<String>,
}

/// Outcome of scanning one volume.
#[derive(Debug, Clone)]
pub struct ScanReport {
    /// The volume that was scanned.
    pub volume: VolumeRoot,
    /// Classified folders in discovery order.
    pub folders: Vec<ClassifiedFolder>,
    /// Names of children that were not classified.
    pub skipped: Vec<String>,
}

/// List the immediate children of the volume root, sorted by name.
///
/// # Errors
///
/// Returns [`Error::VolumeRead`] if the directory cannot be listed.
pub fn list_volume(volume: &VolumeRoot) -> Result<(Vec<RawFolder>, Vec<String>)> {
    let root = volume.path();
    let read_err = |source| Error::VolumeRead {
        path: root.to_path_buf(),
        source,
    };

    let mut folders = Vec::new();
    let mut skipped = Vec::new();
    for entry in std::fs::read_dir(root).map_err(read_err)? {
        let entry = entry.map_err(read_err)?;
        // Follows symlinks; a dangling link counts as a non-directory.
        let is_dir = std::fs::metadata(entry.path()).is_ok_and(|m| m.is_dir());
        match entry.file_name().into_string() {
            Ok(name) if is_dir => folders.push(RawFolder {
                name,
                path: entry.path(),
            }),
            Ok(name) => skipped.push(name),
            Err(raw) => skipped.push(raw.to_string_lossy().into_owned()),
        }
    }

    folders.sort_by(|a, b| a.name.cmp(&b.name));
    skipped.sort();
    Ok((folders, skipped))
}

/// Classify a listing, resolving each project's client once.
///
/// A client resolution failure aborts the whole classification.
///
/// # Errors
///
/// Propagates the first [`Error::ClientResolution`] from `clients`.
pub fn classify(
    raw: Vec<RawFolder>,
    clients: &dyn ClientResolver,
) -> Result<(Vec<ClassifiedFolder>, Vec<String>)> {
    let mut resolved: HashMap<String, String> = HashMap::new();
    let mut folders = Vec::new();
    let mut skipped = Vec::new();

    for folder in raw {
        let Some(parsed) = FolderName::parse(&folder.name) else {
            debug!("Skipping folder {}", folder.name);
            skipped.push(folder.name);
            continue;
        };

        let client_id = match resolved.get(&parsed.project_id) {
            Some(client) => client.clone(),
            None => {
                let client = clients.resolve_client(&parsed.project_id)?;
                resolved.insert(parsed.project_id.clone(), client.clone());
                client
            }
        };

        folders.push(ClassifiedFolder {
            client_id,
            project_id: parsed.project_id,
            stand_id: parsed.stand_id,
            category: parsed.category,
            source_path: folder.path,
            sub_source: None,
        });
    }

    Ok((folders, skipped))
}

/// List and classify a volume.
///
/// # Errors
///
/// Returns [`Error::VolumeRead`] if the listing fails, or the client
/// resolver's error for the first unknown project.
pub fn scan_volume(volume: &VolumeRoot, clients: &dyn ClientResolver) -> Result<ScanReport> {
    let (raw, mut skipped) = list_volume(volume)?;
    let (folders, unmatched) = classify(raw, clients)?;
    skipped.extend(unmatched);
    skipped.sort();

    info!(
        "Scanned {}: {} folders classified, {} skipped",
        volume.path().display(),
        folders.len(),
        skipped.len()
    );
    Ok(ScanReport {
        volume: volume.clone(),
        folders,
        skipped,
    })
}
