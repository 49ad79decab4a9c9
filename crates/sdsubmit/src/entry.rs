//! Submission entries, the unit handed to the upload queue.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::aggregate::FileGroup;
use crate::error::Result;
use crate::lookup::{FiletypeRegistry, StandResolver};

/// One aggregated group ready for upload.
///
/// The serialized key names are what the upload consumer reads; unknown
/// keys are ignored when decoding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionEntry {
    /// Lower-cased category name.
    pub filetype: String,
    /// Client id.
    #[serde(rename = "CLIENT_ID")]
    pub client_id: String,
    /// Project id.
    #[serde(rename = "PROJECT_ID")]
    pub project_id: String,
    /// Human-entered stand id.
    #[serde(rename = "STAND_ID")]
    pub stand_id: String,
    /// Backend key for the stand.
    #[serde(rename = "STAND_PERSISTENT_ID")]
    pub stand_persistent_id: String,
    /// Upload names, one per filetype in the entry.
    #[serde(default)]
    pub names: Vec<String>,
    /// Absolute paths to upload.
    pub files: Vec<String>,
    /// One content-type tag per file.
    #[serde(rename = "type")]
    pub content_types: Vec<String>,
}

impl SubmissionEntry {
    /// Build the entry for one file group.
    ///
    /// # Errors
    ///
    /// Returns the stand resolver's error if the stand has no persistent id.
    pub fn build(
        group: &FileGroup,
        stands: &dyn StandResolver,
        filetypes: &dyn FiletypeRegistry,
    ) -> Result<Self> {
        let key = &group.key;
        let stand_persistent_id =
            stands.resolve_stand(&key.client_id, &key.project_id, &key.stand_id)?;
        let filetype = key.category.as_str().to_string();
        let type_tag = filetypes.lookup_type(key.category);

        debug!(
            "Built {} entry for project {} stand {} ({} files)",
            filetype,
            key.project_id,
            key.stand_id,
            group.full_paths.len()
        );
        Ok(Self {
            names: vec![filetype.clone()],
            filetype,
            client_id: key.client_id.clone(),
            project_id: key.project_id.clone(),
            stand_id: key.stand_id.clone(),
            stand_persistent_id,
            content_types: vec![type_tag; group.full_paths.len()],
            files: group.full_paths.clone(),
        })
    }

    /// Canonical encoding stored on the queue.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Decode an entry from its queue encoding.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload is not a valid entry.
    pub fn from_json(payload: &str) -> Result<Self> {
        Ok(serde_json::from_str(payload)?)
    }

    /// Whether every file has exactly one content-type tag.
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        self.files.len() == self.content_types.len()
    }

    /// Short label for logs and reports.
    #[must_use]
    pub fn label(&self) -> String {
        format!(
            "{} {}/{}/{}",
            self.filetype, self.client_id, self.project_id, self.stand_id
        )
    }
}

/// Build entries for every group, stopping at the first failure.
///
/// # Errors
///
/// Returns the first stand resolution error; no partial batch is produced.
pub fn build_entries(
    groups: &[FileGroup],
    stands: &dyn StandResolver,
    filetypes: &dyn FiletypeRegistry,
) -> Result<Vec<SubmissionEntry>> {
    groups
        .iter()
        .map(|group| SubmissionEntry::build(group, stands, filetypes))
        .collect()
}
