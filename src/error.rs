//! Error types for Shelf
//!
//! All modules use `ShelfResult<T>` as their return type. Resolution
//! failures are fatal to the referencing session; none of them are
//! retried by the core.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for Shelf operations
pub type ShelfResult<T> = Result<T, ShelfError>;

/// All errors that can occur in Shelf
#[derive(Error, Debug)]
pub enum ShelfError {
    // Resolution errors
    #[error("Unknown library: {0}. No configuration for this name is visible from any scope.")]
    UnknownLibrary(String),

    #[error("Version override not allowed for library {name} (requested {version})")]
    OverrideNotAllowed { name: String, version: String },

    #[error("No version specified for library {0} and no default is configured")]
    NoVersionSpecified(String),

    #[error("Library {name} is already loaded at version {loaded}, conflicting reference requested {requested}")]
    VersionConflict {
        name: String,
        loaded: String,
        requested: String,
    },

    #[error("Invalid library reference '{reference}': {reason}")]
    InvalidReference { reference: String, reason: String },

    #[error("Invalid library name '{name}': {reason}")]
    InvalidLibraryName { name: String, reason: String },

    #[error("Invalid version '{version}': {reason}")]
    InvalidVersion { version: String, reason: String },

    // Retrieval errors
    #[error("Retrieval failed for library {name}@{version}: {reason}")]
    RetrievalFailed {
        name: String,
        version: String,
        reason: String,
    },

    #[error("Version {version} of library {name} does not exist upstream ({remote})")]
    VersionNotFound {
        name: String,
        version: String,
        remote: String,
    },

    // Namespace errors
    #[error("Access to {symbol} of library {target} denied: caller belongs to library {caller}")]
    CrossLibraryAccessDenied {
        symbol: String,
        target: String,
        caller: String,
    },

    #[error("Library {library} exposes no symbol named {symbol}")]
    UnknownSymbol { library: String, symbol: String },

    #[error("Invalid source tree at {path}: {reason}")]
    SourceTreeInvalid { path: PathBuf, reason: String },

    // Session errors
    #[error("Failed to persist session record trace: {0}")]
    SessionPersist(String),

    // Cache errors
    #[error("Failed to prepare cache entry for {name}@{version}: {reason}")]
    CachePrepare {
        name: String,
        version: String,
        reason: String,
    },

    // Configuration errors
    #[error("Invalid configuration at {path}: {reason}")]
    ConfigInvalid { path: PathBuf, reason: String },

    #[error("Failed to create config directory {path}: {source}")]
    ConfigDirCreate {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // IO errors
    #[error("IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    // Process errors
    #[error("Command failed: {command}")]
    CommandFailed {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Command execution error: {command}, stderr: {stderr}")]
    CommandExecution { command: String, stderr: String },

    // Serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    // General errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("{0}")]
    User(String),
}

impl ShelfError {
    /// Create an IO error with context
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Create a command failed error
    pub fn command_failed(command: impl Into<String>, source: std::io::Error) -> Self {
        Self::CommandFailed {
            command: command.into(),
            source,
        }
    }

    /// Create a command execution error
    pub fn command_exec(command: impl Into<String>, stderr: impl Into<String>) -> Self {
        Self::CommandExecution {
            command: command.into(),
            stderr: stderr.into(),
        }
    }

    /// Create a retrieval failure wrapping an upstream cause
    pub fn retrieval(
        name: impl Into<String>,
        version: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::RetrievalFailed {
            name: name.into(),
            version: version.into(),
            reason: reason.into(),
        }
    }

    /// Whether this error terminates the referencing session
    pub fn is_session_fatal(&self) -> bool {
        matches!(
            self,
            Self::UnknownLibrary(_)
                | Self::OverrideNotAllowed { .. }
                | Self::NoVersionSpecified(_)
                | Self::VersionConflict { .. }
                | Self::RetrievalFailed { .. }
                | Self::VersionNotFound { .. }
                | Self::CrossLibraryAccessDenied { .. }
        )
    }

    /// Get actionable hint for the error
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::UnknownLibrary(_) => {
                Some("Declare the library in the global config or a project .shelf.toml")
            }
            Self::OverrideNotAllowed { .. } => {
                Some("Drop the @version suffix or set allow_version_override = true")
            }
            Self::NoVersionSpecified(_) => {
                Some("Add a default_version to the configuration or reference name@version")
            }
            Self::VersionNotFound { .. } => Some("Check the branch or tag name on the remote"),
            _ => None,
        }
    }
}
