//! File-backed lookup collaborators.
//!
//! [`Catalog`] answers client, stand and filetype lookups from a TOML file;
//! [`FlightLog`] records flight metadata as fsynced JSON lines. Both stand in
//! for the remote lookup service when the binary runs on its own.
//!
//! ```toml
//! [clients]
//! "123456" = "ACME"
//!
//! [[stands]]
//! client_id = "ACME"
//! project_id = "123456"
//! stand_id = "007"
//! persistent_id = "a1b2c3"
//!
//! [filetypes]
//! flight_images = "FLIGHT_IMAGE"
//! strip_sample_images = "STRIP_SAMPLE_IMAGE"
//! ```

use std::collections::HashMap;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::Utc;
use figment::providers::{Format, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::classify::Category;
use crate::error::{Error, Result};
use crate::lookup::{
    ClientResolver, FiletypeRegistry, FlightField, MetadataUpdater, StandResolver,
};

/// One row of the stand table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StandRecord {
    /// Client id.
    pub client_id: String,
    /// Project id.
    pub project_id: String,
    /// Human-entered stand id.
    pub stand_id: String,
    /// Backend key.
    pub persistent_id: String,
}

/// Type tags per category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FiletypeTags {
    /// Tag for [`Category::FlightImages`].
    pub flight_images: String,
    /// Tag for [`Category::StripSampleImages`].
    pub strip_sample_images: String,
}

#[derive(Debug, Deserialize)]
struct CatalogFile {
    #[serde(default)]
    clients: HashMap<String, String>,
    #[serde(default)]
    stands: Vec<StandRecord>,
    filetypes: FiletypeTags,
}

type StandKey = (String, String, String);

/// Lookup tables loaded from a catalog file.
#[derive(Debug, Clone)]
pub struct Catalog {
    clients: HashMap<String, String>,
    stands: HashMap<StandKey, String>,
    filetypes: FiletypeTags,
}

impl Catalog {
    /// Load a catalog file.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Catalog`] if the file is missing, malformed, lacks a
    /// filetype tag, or lists the same stand twice.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(Error::Catalog {
                path: path.to_path_buf(),
                message: "file not found".to_string(),
            });
        }

        let file: CatalogFile = Figment::from(Toml::file(path))
            .extract()
            .map_err(|e| Error::Catalog {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?;

        let catalog = Self::from_parts(file.clients, file.stands, file.filetypes).map_err(
            |message| Error::Catalog {
                path: path.to_path_buf(),
                message,
            },
        )?;
        info!(
            "Loaded catalog {}: {} projects, {} stands",
            path.display(),
            catalog.clients.len(),
            catalog.stands.len()
        );
        Ok(catalog)
    }

    fn from_parts(
        clients: HashMap<String, String>,
        stand_rows: Vec<StandRecord>,
        filetypes: FiletypeTags,
    ) -> std::result::Result<Self, String> {
        for (category, tag) in [
            (Category::FlightImages, &filetypes.flight_images),
            (Category::StripSampleImages, &filetypes.strip_sample_images),
        ] {
            if tag.trim().is_empty() {
                return Err(format!("empty type tag for {category}"));
            }
        }

        let mut stands = HashMap::with_capacity(stand_rows.len());
        for row in stand_rows {
            let key = (row.client_id, row.project_id, row.stand_id);
            if stands.contains_key(&key) {
                return Err(format!(
                    "duplicate stand {} (client {}, project {})",
                    key.2, key.0, key.1
                ));
            }
            stands.insert(key, row.persistent_id);
        }

        Ok(Self {
            clients,
            stands,
            filetypes,
        })
    }
}

impl ClientResolver for Catalog {
    fn resolve_client(&self, project_id: &str) -> Result<String> {
        self.clients
            .get(project_id)
            .cloned()
            .ok_or_else(|| Error::client_resolution(project_id, "project not in catalog"))
    }
}

impl StandResolver for Catalog {
    fn resolve_stand(&self, client_id: &str, project_id: &str, stand_id: &str) -> Result<String> {
        let key = (
            client_id.to_string(),
            project_id.to_string(),
            stand_id.to_string(),
        );
        self.stands.get(&key).cloned().ok_or_else(|| {
            Error::stand_resolution(client_id, project_id, stand_id, "stand not in catalog")
        })
    }
}

impl FiletypeRegistry for Catalog {
    fn lookup_type(&self, category: Category) -> String {
        match category {
            Category::FlightImages => self.filetypes.flight_images.clone(),
            Category::StripSampleImages => self.filetypes.strip_sample_images.clone(),
        }
    }
}

/// A recorded flight metadata update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlightRecord {
    /// When the update was recorded.
    pub recorded_at: chrono::DateTime<Utc>,
    /// Client id.
    #[serde(rename = "CLIENT_ID")]
    pub client_id: String,
    /// Project id.
    #[serde(rename = "PROJECT_ID")]
    pub project_id: String,
    /// Stand id.
    #[serde(rename = "STAND_ID")]
    pub stand_id: String,
    /// The `[key, value]` pairs.
    pub fields: Vec<FlightField>,
}

/// Append-only journal of flight metadata updates.
#[derive(Debug, Clone)]
pub struct FlightLog {
    path: PathBuf,
}

impl FlightLog {
    /// A journal at `path`, created on first write.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path to the journal.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read back every record.
    ///
    /// # Errors
    ///
    /// Returns an error if the journal cannot be read or a line is malformed.
    pub fn records(&self) -> Result<Vec<FlightRecord>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        std::fs::read_to_string(&self.path)?
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| Ok(serde_json::from_str(line)?))
            .collect()
    }

    fn append(&self, record: &FlightRecord) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let mut line = serde_json::to_string(record)?;
        line.push('\n');

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(line.as_bytes())?;
        file.sync_all()
    }
}

impl MetadataUpdater for FlightLog {
    fn update_flight_info(
        &self,
        client_id: &str,
        project_id: &str,
        stand_id: &str,
        fields: &[FlightField],
    ) -> Result<()> {
        let record = FlightRecord {
            recorded_at: Utc::now(),
            client_id: client_id.to_string(),
            project_id: project_id.to_string(),
            stand_id: stand_id.to_string(),
            fields: fields.to_vec(),
        };
        self.append(&record).map_err(|e| {
            Error::metadata_update(
                client_id,
                project_id,
                stand_id,
                format!("{}: {e}", self.path.display()),
            )
        })?;
        debug!(
            "Recorded flight info for {}/{}/{} in {}",
            client_id,
            project_id,
            stand_id,
            self.path.display()
        );
        Ok(())
    }
}
