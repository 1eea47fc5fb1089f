//! Fixed (pinned) retrieval
//!
//! Serves a library from a directory that never changes with the
//! requested version: every materialization copies the same tree. Useful
//! for vendored libraries and for deterministic test fixtures.

use crate::error::{ShelfError, ShelfResult};
use crate::retrieve::Retriever;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Version label reported when the configuration declares none
const DEFAULT_LABEL: &str = "fixed";

/// Retriever serving a pinned local source tree
#[derive(Debug, Clone)]
pub struct FixedRetriever {
    path: PathBuf,
    version: Option<String>,
}

impl FixedRetriever {
    /// Create a retriever for the pinned tree at `path`
    pub fn new(path: PathBuf, version: Option<String>) -> Self {
        Self { path, version }
    }

    fn label(&self) -> &str {
        self.version.as_deref().unwrap_or(DEFAULT_LABEL)
    }
}

#[async_trait]
impl Retriever for FixedRetriever {
    fn kind(&self) -> &'static str {
        "fixed"
    }

    fn requires_version(&self) -> bool {
        false
    }

    async fn resolve_version(&self, _name: &str, _requested: Option<&str>) -> ShelfResult<String> {
        // Pinned content: the requested version cannot change what is
        // served, the reported version is always the pinned label.
        Ok(self.label().to_string())
    }

    async fn materialize(&self, name: &str, version: &str, target: &Path) -> ShelfResult<()> {
        if !self.path.is_dir() {
            return Err(ShelfError::retrieval(
                name,
                version,
                format!("pinned source {} is not a directory", self.path.display()),
            ));
        }

        let source = self.path.clone();
        let target = target.to_path_buf();
        tokio::task::spawn_blocking(move || copy_tree(&source, &target))
            .await
            .map_err(|e| ShelfError::Internal(format!("copy task panicked: {e}")))?
            .map_err(|e| ShelfError::retrieval(name, version, e.to_string()))?;

        debug!("Materialized {}@{} from {}", name, version, self.path.display());
        Ok(())
    }
}

/// Recursively copy a directory tree
fn copy_tree(source: &Path, target: &Path) -> std::io::Result<()> {
    std::fs::create_dir_all(target)?;
    for entry in std::fs::read_dir(source)? {
        let entry = entry?;
        let dest = target.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            copy_tree(&entry.path(), &dest)?;
        } else {
            std::fs::copy(entry.path(), &dest)?;
        }
    }
    Ok(())
}
