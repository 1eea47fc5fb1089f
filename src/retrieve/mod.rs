//! Source retrieval abstraction
//!
//! A `Retriever` materializes the source tree of a library at a given
//! version. Two strategies exist: an SCM-backed lookup that resolves a
//! symbolic version (branch or tag) at use time, and a fixed source that
//! always yields the same pinned tree.

mod fixed;
mod scm;

pub use fixed::FixedRetriever;
pub use scm::ScmRetriever;

use crate::error::{ShelfError, ShelfResult};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Abstract retrieval interface
///
/// Resolution happens in two steps so the cache can key on the resolved
/// version before any fetch: `resolve_version` validates the requested
/// version against the source, then `materialize` writes the tree for
/// that version into a staging directory owned by the cache manager.
#[async_trait]
pub trait Retriever: Send + Sync + std::fmt::Debug {
    /// Short strategy name for logs and error messages
    fn kind(&self) -> &'static str;

    /// Whether a version (explicit or configured default) must be present
    fn requires_version(&self) -> bool {
        true
    }

    /// Resolve the requested version to the concrete version string used
    /// for caching and display. Fails clearly when the requested version
    /// does not exist upstream.
    async fn resolve_version(&self, name: &str, requested: Option<&str>) -> ShelfResult<String>;

    /// Write the source tree for `version` into `target`. The target
    /// directory exists and is empty; it is swapped into the cache
    /// atomically by the caller only after this returns Ok.
    async fn materialize(&self, name: &str, version: &str, target: &Path) -> ShelfResult<()>;
}

/// Declarative retriever form, serialized inside library configurations
/// and ad-hoc references
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum RetrieverSpec {
    /// Source-control lookup resolving a symbolic version at use time
    Scm {
        /// Remote repository URL
        remote: String,
    },
    /// Pinned local tree returned for every requested version
    Fixed {
        /// Directory holding the pinned source tree
        path: PathBuf,
        /// Version label to report (defaults to "fixed")
        #[serde(default)]
        version: Option<String>,
    },
}

impl RetrieverSpec {
    /// Instantiate the retriever this spec describes
    pub fn build(&self) -> Arc<dyn Retriever> {
        match self {
            Self::Scm { remote } => Arc::new(ScmRetriever::new(remote.clone())),
            Self::Fixed { path, version } => {
                Arc::new(FixedRetriever::new(path.clone(), version.clone()))
            }
        }
    }
}

/// Validate that a version string is safe to use as a ref and in paths.
///
/// Versions are symbolic (branch or tag names); slashes are allowed
/// because branch names contain them, everything that could escape into
/// command flags or parent directories is not.
pub(crate) fn validate_version(version: &str) -> ShelfResult<()> {
    let invalid = |reason: &str| {
        Err(ShelfError::InvalidVersion {
            version: version.to_string(),
            reason: reason.to_string(),
        })
    };

    if version.is_empty() {
        return invalid("must not be empty");
    }
    if version.starts_with('-') {
        return invalid("must not start with '-'");
    }
    if version.contains("..") || version.contains('\0') || version.contains('\\') {
        return invalid("must not contain '..', '\\', or NUL");
    }
    if version.chars().any(char::is_whitespace) {
        return invalid("must not contain whitespace");
    }
    Ok(())
}
