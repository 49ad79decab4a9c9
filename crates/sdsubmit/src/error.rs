//! Error types for sdsubmit.
//!
//! Every fault an operator may need to act on carries enough context
//! (card, project, stand, path) to retry the affected submission by hand.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// The main error type for sdsubmit operations.
#[derive(Error, Debug)]
pub enum Error {
    // === Volume Errors ===
    /// The selected path does not belong to an SD card.
    #[error("invalid volume path {path}: expected an 'SD-1234/DCIM' style path")]
    InvalidVolume {
        /// The path that was selected.
        path: PathBuf,
    },

    /// The volume root could not be listed.
    #[error("failed to read volume {path}: {source}")]
    VolumeRead {
        /// The directory that failed to list.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    // === Collaborator Errors ===
    /// No client is known for a project.
    #[error("failed to resolve client for project {project_id}: {message}")]
    ClientResolution {
        /// Project that could not be resolved.
        project_id: String,
        /// Description of what went wrong.
        message: String,
    },

    /// No persistent id is known for a stand.
    #[error(
        "failed to resolve stand {stand_id} (client {client_id}, project {project_id}): {message}"
    )]
    StandResolution {
        /// Client of the stand.
        client_id: String,
        /// Project of the stand.
        project_id: String,
        /// Human-entered stand id.
        stand_id: String,
        /// Description of what went wrong.
        message: String,
    },

    /// Recording flight metadata failed.
    #[error(
        "failed to update flight info for stand {stand_id} (client {client_id}, project {project_id}): {message}"
    )]
    MetadataUpdate {
        /// Client of the stand.
        client_id: String,
        /// Project of the stand.
        project_id: String,
        /// Human-entered stand id.
        stand_id: String,
        /// Description of what went wrong.
        message: String,
    },

    /// The lookup catalog is missing or malformed.
    #[error("invalid catalog {path}: {message}")]
    Catalog {
        /// Path to the catalog file.
        path: PathBuf,
        /// Description of what went wrong.
        message: String,
    },

    /// The pilot is not on the configured roster.
    #[error("unknown pilot '{name}'")]
    UnknownPilot {
        /// The name that was given.
        name: String,
    },

    // === Lock Errors ===
    /// Another holder kept the queue lock for the whole wait.
    #[error("timed out after {waited:?} waiting for queue lock {path}")]
    LockTimeout {
        /// Path to the lock file.
        path: PathBuf,
        /// How long we waited.
        waited: Duration,
    },

    /// The lock file could not be opened or locked.
    #[error("failed to lock {path}: {source}")]
    Lock {
        /// Path to the lock file.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    // === Queue Errors ===
    /// An entry could not be durably recorded.
    #[error("failed to write queue item to {path}: {source}")]
    QueueWrite {
        /// Path to the queue database.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: rusqlite::Error,
    },

    /// A stored item failed validation.
    #[error("queue item {id} is corrupt: {message}")]
    QueueCorrupt {
        /// Row id of the item.
        id: i64,
        /// Description of what went wrong.
        message: String,
    },

    /// Failed to open or create the queue database.
    #[error("failed to open database at {path}: {source}")]
    DatabaseOpen {
        /// Path to the database file.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: rusqlite::Error,
    },

    /// A database query failed.
    #[error("database query failed: {0}")]
    DatabaseQuery(#[from] rusqlite::Error),

    /// Failed to run database migrations.
    #[error("database migration failed: {message}")]
    DatabaseMigration {
        /// Description of what went wrong.
        message: String,
    },

    // === Configuration Errors ===
    /// Failed to load configuration.
    #[error("failed to load configuration: {0}")]
    ConfigLoad(Box<figment::Error>),

    /// Configuration validation failed.
    #[error("invalid configuration: {message}")]
    ConfigValidation {
        /// Description of the validation failure.
        message: String,
    },

    // === I/O Errors ===
    /// File system operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to create a required directory.
    #[error("failed to create directory {path}: {source}")]
    DirectoryCreate {
        /// Path that couldn't be created.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    // === Serialization Errors ===
    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// An internal error occurred (bug).
    #[error("internal error: {0}")]
    Internal(String),
}

/// A specialized Result type for sdsubmit operations.
pub type Result<T> = std::result::Result<T, Error>;

impl From<figment::Error> for Error {
    fn from(err: figment::Error) -> Self {
        Self::ConfigLoad(Box::new(err))
    }
}

impl Error {
    /// Create a new internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Create a client resolution error.
    #[must_use]
    pub fn client_resolution(project_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ClientResolution {
            project_id: project_id.into(),
            message: message.into(),
        }
    }

    /// Create a stand resolution error.
    #[must_use]
    pub fn stand_resolution(
        client_id: impl Into<String>,
        project_id: impl Into<String>,
        stand_id: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::StandResolution {
            client_id: client_id.into(),
            project_id: project_id.into(),
            stand_id: stand_id.into(),
            message: message.into(),
        }
    }

    /// Create a metadata update error.
    #[must_use]
    pub fn metadata_update(
        client_id: impl Into<String>,
        project_id: impl Into<String>,
        stand_id: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::MetadataUpdate {
            client_id: client_id.into(),
            project_id: project_id.into(),
            stand_id: stand_id.into(),
            message: message.into(),
        }
    }

    /// Check if retrying the same operation later may succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::LockTimeout { .. })
    }

    /// Check if the operator can fix this by changing their input.
    #[must_use]
    pub fn is_user_correctable(&self) -> bool {
        matches!(self, Self::InvalidVolume { .. } | Self::UnknownPilot { .. })
    }
}
