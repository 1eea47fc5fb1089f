//! Library load records
//!
//! One record exists per `(session, library name)`. Records are created
//! on first resolution, never mutated, and destroyed with the session.
//! The ordered record sequence is the session's externally visible trace
//! of what was loaded.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Immutable record of one library loaded into a session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LibraryRecord {
    /// Library name
    pub name: String,

    /// Concretely resolved version used for display and idempotence
    pub version: String,

    /// Exposed callable-function names, in exposure order
    pub variables: Vec<String>,

    /// Exposed class paths, in exposure order
    pub classes: Vec<String>,

    /// Whether the winning configuration came from the global scope
    pub trusted: bool,
}

impl fmt::Display for LibraryRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "LibraryRecord{{name={}, version={}, variables=[{}], trusted={}}}",
            self.name,
            self.version,
            self.variables.join(", "),
            self.trusted
        )
    }
}
