//! Cache key derivation for materialized source trees
//!
//! Entries are keyed by `(library name, resolved version)`. The version
//! half is hashed because symbolic versions are branch names and may
//! contain separators that are not filesystem-safe.

use sha2::{Digest, Sha256};

/// Key identifying one materialized source tree
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    /// Library name (validated by the registry)
    pub name: String,
    /// Concretely resolved version string
    pub version: String,
}

impl CacheKey {
    /// Create a key for a resolved `(name, version)` pair
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
        }
    }

    /// Directory name for this entry under the cache root
    /// (`{name}-{hash12-of-version}`)
    pub fn dir_name(&self) -> String {
        format!("{}-{}", self.name, hash_version(&self.version))
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.name, self.version)
    }
}

/// Hash a version string using SHA256, returning first 12 hex chars
fn hash_version(version: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(version.as_bytes());
    let result = hasher.finalize();

    // Take first 12 hex characters (6 bytes)
    hex::encode(&result[..6])
}
