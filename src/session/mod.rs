//! Session module
//!
//! A session is one execution of a script that may reference libraries;
//! it is the unit of idempotence and record lifetime.

pub mod record;
pub mod store;

pub use record::LibraryRecord;
pub use store::{LoadedLibrary, SessionRecordStore};

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Identifier of one script execution session
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(String);

impl SessionId {
    /// Create a fresh random session id
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create a session id from an external name (e.g. a build id)
    pub fn named(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// The id as a string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
