//! SD card volume validation.
//!
//! A volume root is the `DCIM` directory of a card whose path carries an
//! `SD-NNNN` card identifier somewhere in its ancestry.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex::Regex;

use crate::error::{Error, Result};

/// Name of the camera directory on the card.
pub const DCIM_DIR: &str = "DCIM";

/// Pattern for the physical card identifier.
const CARD_ID_PATTERN: &str = r"SD-[0-9]{4}";

fn card_id_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(CARD_ID_PATTERN).expect("Invalid card id pattern"))
}

/// A validated volume root selected for one submission session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeRoot {
    path: PathBuf,
    card_id: String,
}

impl VolumeRoot {
    /// Validate a user-selected path and normalize it to its `DCIM` directory.
    ///
    /// Performs no filesystem I/O.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidVolume`] if the path has no `SD-NNNN` card id.
    pub fn from_selected(selected: impl AsRef<Path>) -> Result<Self> {
        let selected = selected.as_ref();
        let text = selected.to_string_lossy();

        let card_id = card_id_regex()
            .find(&text)
            .map(|m| m.as_str().to_string())
            .ok_or_else(|| Error::InvalidVolume {
                path: selected.to_path_buf(),
            })?;

        // Component iteration ignores a trailing separator.
        let mut path: PathBuf = selected.components().collect();
        if path.file_name().and_then(|n| n.to_str()) != Some(DCIM_DIR) {
            path.push(DCIM_DIR);
        }

        Ok(Self { path, card_id })
    }

    /// The normalized `DCIM` path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The card identifier, e.g. `SD-0451`.
    #[must_use]
    pub fn card_id(&self) -> &str {
        &self.card_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_dcim_path_unchanged() {
        let volume = VolumeRoot::from_selected("/media/pilot/SD-0451/DCIM").unwrap();
        assert_eq!(volume.path(), Path::new("/media/pilot/SD-0451/DCIM"));
        assert_eq!(volume.card_id(), "SD-0451");
    }

    #[test]
    fn test_appends_dcim() {
        let volume = VolumeRoot::from_selected("/media/pilot/SD-0451").unwrap();
        assert_eq!(volume.path(), Path::new("/media/pilot/SD-0451/DCIM"));
    }

    #[test]
    fn test_strips_trailing_separator_before_appending() {
        let volume = VolumeRoot::from_selected("/media/pilot/SD-0451/").unwrap();
        assert_eq!(volume.path(), Path::new("/media/pilot/SD-0451/DCIM"));
        assert!(!volume.path().to_string_lossy().contains("//"));
    }

    #[test]
    fn test_card_id_in_any_ancestor() {
        let volume = VolumeRoot::from_selected("/mnt/SD-1234/backup/DCIM").unwrap();
        assert_eq!(volume.card_id(), "SD-1234");
    }

    #[test]
    fn test_missing_card_id_is_invalid() {
        let err = VolumeRoot::from_selected("/media/random/DCIM").unwrap_err();
        assert!(matches!(err, Error::InvalidVolume { .. }));
    }

    #[test]
    fn test_short_card_id_is_invalid() {
        let err = VolumeRoot::from_selected("/media/SD-12/DCIM").unwrap_err();
        assert!(matches!(err, Error::InvalidVolume { .. }));
    }

    #[test]
    fn test_no_io_performed() {
        // A nonexistent path validates fine; listing happens later.
        assert!(VolumeRoot::from_selected("/definitely/not/here/SD-9999").is_ok());
    }
}
