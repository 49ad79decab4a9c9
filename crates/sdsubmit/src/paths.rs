//! Target-platform path construction.
//!
//! The queue consumer may run on a different operating system than the
//! machine reading the card, so resolved paths are rendered with the
//! separator of the consuming side rather than the host.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::classify::ClassifiedFolder;

/// Which separator convention resolved paths use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PathConvention {
    /// Whatever the host uses.
    #[default]
    Native,
    /// Forward slashes.
    Posix,
    /// Backslashes; forward slashes in the input are converted.
    Windows,
}

impl PathConvention {
    /// The separator character for this convention.
    #[must_use]
    pub fn separator(self) -> char {
        match self {
            Self::Native => std::path::MAIN_SEPARATOR,
            Self::Posix => '/',
            Self::Windows => '\\',
        }
    }

    /// Join `source` with an optional sub-source suffix.
    ///
    /// An empty or missing suffix yields `source` itself, rendered in this
    /// convention.
    #[must_use]
    pub fn resolve(self, source: &Path, sub_source: Option<&str>) -> String {
        let sep = self.separator();
        let mut full = self.normalize(&source.to_string_lossy());

        if let Some(sub) = sub_source.map(|s| self.normalize(s)) {
            let sub = sub.trim_start_matches(sep);
            if !sub.is_empty() {
                if !full.ends_with(sep) {
                    full.push(sep);
                }
                full.push_str(sub);
            }
        }
        full
    }

    fn normalize(self, raw: &str) -> String {
        let sep = self.separator();
        let mut out = if sep == '\\' {
            raw.replace('/', "\\")
        } else {
            raw.to_string()
        };
        // Keep a bare root like "/" or "C:\" intact.
        let drive_root = format!(":{sep}");
        while out.len() > 1 && out.ends_with(sep) && !out.ends_with(&drive_root) {
            out.pop();
        }
        out
    }
}

impl std::fmt::Display for PathConvention {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Native => write!(f, "native"),
            Self::Posix => write!(f, "posix"),
            Self::Windows => write!(f, "windows"),
        }
    }
}

/// A classified folder with its path rendered for the consumer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedFolder {
    /// The classified folder.
    pub folder: ClassifiedFolder,
    /// `source_path` joined with `sub_source` in the target convention.
    pub full_path: String,
}

/// Compute the full path of every folder, keeping order.
#[must_use]
pub fn resolve_folders(
    folders: Vec<ClassifiedFolder>,
    convention: PathConvention,
) -> Vec<ResolvedFolder> {
    folders
        .into_iter()
        .map(|folder| {
            let full_path = convention.resolve(&folder.source_path, folder.sub_source.as_deref());
            ResolvedFolder { folder, full_path }
        })
        .collect()
}
