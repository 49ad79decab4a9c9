//! Interfaces to the remote lookup service.
//!
//! Classification and submission only see these traits, so tests can use
//! in-memory fakes and the binary can plug in the file-backed catalog.

use crate::classify::Category;
use crate::error::Result;

/// Resolves the client that owns a project.
pub trait ClientResolver {
    /// Look up the client id for a six digit project id.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::ClientResolution`] if the project is unknown.
    fn resolve_client(&self, project_id: &str) -> Result<String>;
}

/// Resolves the backend key for a (client, project, stand) triple.
pub trait StandResolver {
    /// Look up the persistent stand id.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::StandResolution`] if the stand is unknown.
    fn resolve_stand(&self, client_id: &str, project_id: &str, stand_id: &str) -> Result<String>;
}

/// Maps a content category to the type tag the upload consumer expects.
///
/// Total over [`Category`]: implementations must know every category.
pub trait FiletypeRegistry {
    /// The type tag for files of this category.
    fn lookup_type(&self, category: Category) -> String;
}

/// Records flight metadata against a stand.
pub trait MetadataUpdater {
    /// Store `fields` for the stand identified by the three ids.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::MetadataUpdate`] if the update was not recorded.
    fn update_flight_info(
        &self,
        client_id: &str,
        project_id: &str,
        stand_id: &str,
        fields: &[FlightField],
    ) -> Result<()>;
}

/// One `[key, value]` pair of flight metadata.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct FlightField(pub String, pub serde_json::Value);

impl FlightField {
    /// Create a field.
    #[must_use]
    pub fn new(key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        Self(key.into(), value.into())
    }

    /// The field name.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.0
    }

    /// The field value.
    #[must_use]
    pub fn value(&self) -> &serde_json::Value {
        &self.1
    }
}
