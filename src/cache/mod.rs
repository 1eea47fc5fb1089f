//! Materialized source-tree cache
//!
//! Maps `(library name, resolved version)` to a source tree on disk and
//! coordinates retrieval across sessions.
//!
//! # Invariants
//!
//! - At most one materialization is in flight per key; concurrent callers
//!   of the same key share one fetch instead of racing.
//! - Readers never observe a partially written tree: materialization
//!   stages into a private directory and is renamed into place.
//! - A failed materialization leaves no cache entry behind.
//! - A shared in-flight fetch completes even if the caller that started
//!   it is cancelled; remaining waiters reuse its result.

pub mod key;

pub use key::CacheKey;

use crate::config::{CacheConfig, RefreshPolicy};
use crate::error::{ShelfError, ShelfResult};
use crate::retrieve::Retriever;
use chrono::{DateTime, Utc};
use futures_util::future::{BoxFuture, FutureExt, Shared};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{debug, info};
use uuid::Uuid;

/// File holding an entry's metadata, beside its `tree/` directory
const ENTRY_META_FILE: &str = "entry.json";

/// Subdirectory holding in-progress materializations
const STAGING_DIR: &str = ".staging";

/// Metadata persisted with each cache entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Library name
    pub name: String,
    /// Resolved version the tree was materialized for
    pub version: String,
    /// When the tree was last (re)materialized
    pub last_refreshed: DateTime<Utc>,
}

/// Result type shared between concurrent callers of one key.
///
/// The error side is an `Arc` because a shared future hands the same
/// failure to every waiter.
type SharedFetch = Shared<BoxFuture<'static, Result<PathBuf, Arc<ShelfError>>>>;

/// Cache manager for materialized library source trees
pub struct CacheManager {
    root: PathBuf,
    refresh: RefreshPolicy,
    max_age_secs: u64,
    inflight: Arc<Mutex<HashMap<String, SharedFetch>>>,
}

impl CacheManager {
    /// Create a manager rooted at `root` with the given cache settings
    pub fn new(root: PathBuf, config: &CacheConfig) -> Self {
        Self {
            root,
            refresh: config.refresh,
            max_age_secs: config.max_age_secs,
            inflight: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// The cache root directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Ensure a source tree exists for the library, retrieving it if
    /// absent or stale. Returns the concretely resolved version and the
    /// tree path.
    pub async fn ensure(
        &self,
        name: &str,
        retriever: &Arc<dyn Retriever>,
        version: Option<&str>,
    ) -> ShelfResult<(String, PathBuf)> {
        // Fast path: the requested version is already cached and the
        // policy does not require revalidation.
        if let Some(requested) = version {
            if let Some(tree) = self.fresh_entry(name, requested).await {
                debug!("Cache hit for {}@{}", name, requested);
                return Ok((requested.to_string(), tree));
            }
        }

        let resolved = retriever.resolve_version(name, version).await?;

        // The resolved version may differ from the request (pinned
        // retrievers); re-check before fetching.
        if let Some(tree) = self.fresh_entry(name, &resolved).await {
            debug!("Cache hit for {}@{}", name, resolved);
            return Ok((resolved, tree));
        }

        let tree = self.fetch_shared(name, retriever, &resolved).await?;
        Ok((resolved, tree))
    }

    /// Return the entry tree for the key if it exists and the freshness
    /// policy allows reuse. A key with a fetch in flight is never fresh.
    async fn fresh_entry(&self, name: &str, version: &str) -> Option<PathBuf> {
        let dir_name = CacheKey::new(name, version).dir_name();

        if self.inflight.lock().await.contains_key(&dir_name) {
            return None;
        }

        self.fresh_on_disk(&dir_name).await
    }

    /// Disk-only freshness check, safe to call while holding the
    /// in-flight map lock
    async fn fresh_on_disk(&self, dir_name: &str) -> Option<PathBuf> {
        let entry_dir = self.root.join(dir_name);
        let entry = read_entry_meta(&entry_dir).await?;

        let fresh = match self.refresh {
            RefreshPolicy::Always => false,
            RefreshPolicy::Never => true,
            RefreshPolicy::MaxAge => {
                let age = Utc::now().signed_duration_since(entry.last_refreshed);
                age.num_seconds() >= 0 && (age.num_seconds() as u64) < self.max_age_secs
            }
        };

        if fresh {
            let tree = entry_dir.join("tree");
            tree.is_dir().then_some(tree)
        } else {
            None
        }
    }

    /// Join or start the single-flight materialization for a key
    async fn fetch_shared(
        &self,
        name: &str,
        retriever: &Arc<dyn Retriever>,
        version: &str,
    ) -> ShelfResult<PathBuf> {
        let key = CacheKey::new(name, version);
        let dir_name = key.dir_name();

        let shared = {
            let mut inflight = self.inflight.lock().await;
            if let Some(existing) = inflight.get(&dir_name) {
                debug!("Joining in-flight retrieval of {}", key);
                existing.clone()
            } else {
                // A fetch may have completed between the caller's
                // freshness check and this lock; don't start another.
                if let Some(tree) = self.fresh_on_disk(&dir_name).await {
                    return Ok(tree);
                }
                info!("Retrieving {}", key);
                let fut = spawn_fetch(
                    self.root.clone(),
                    Arc::clone(&self.inflight),
                    dir_name.clone(),
                    name.to_string(),
                    Arc::clone(retriever),
                    version.to_string(),
                );
                inflight.insert(dir_name, fut.clone());
                fut
            }
        };

        shared.await.map_err(|e| clone_for_waiter(&e))
    }

    /// List all cache entries
    pub async fn list(&self) -> ShelfResult<Vec<CacheEntry>> {
        if !self.root.exists() {
            return Ok(vec![]);
        }

        let mut entries = vec![];
        let mut dir = fs::read_dir(&self.root)
            .await
            .map_err(|e| ShelfError::io("reading cache directory", e))?;

        while let Some(item) = dir
            .next_entry()
            .await
            .map_err(|e| ShelfError::io("reading cache entry", e))?
        {
            if item.file_name() == STAGING_DIR {
                continue;
            }
            if let Some(entry) = read_entry_meta(&item.path()).await {
                entries.push(entry);
            }
        }

        entries.sort_by(|a, b| b.last_refreshed.cmp(&a.last_refreshed));
        Ok(entries)
    }

    /// Remove entries not refreshed within the last `days` days.
    /// Returns the number of entries removed.
    pub async fn gc(&self, days: u32) -> ShelfResult<u32> {
        if days == 0 || !self.root.exists() {
            return Ok(0);
        }

        let cutoff = Utc::now() - chrono::Duration::days(i64::from(days));
        let mut removed = 0;

        let mut dir = fs::read_dir(&self.root)
            .await
            .map_err(|e| ShelfError::io("reading cache directory", e))?;

        while let Some(item) = dir
            .next_entry()
            .await
            .map_err(|e| ShelfError::io("reading cache entry", e))?
        {
            if item.file_name() == STAGING_DIR {
                continue;
            }
            let Some(entry) = read_entry_meta(&item.path()).await else {
                continue;
            };
            if entry.last_refreshed < cutoff {
                fs::remove_dir_all(item.path())
                    .await
                    .map_err(|e| ShelfError::io("removing cache entry", e))?;
                removed += 1;
                info!("Removed stale cache entry {}@{}", entry.name, entry.version);
            }
        }

        Ok(removed)
    }

    /// Remove every cache entry, including leftover staging directories
    pub async fn clear(&self) -> ShelfResult<u32> {
        if !self.root.exists() {
            return Ok(0);
        }

        let mut removed = 0;
        let mut dir = fs::read_dir(&self.root)
            .await
            .map_err(|e| ShelfError::io("reading cache directory", e))?;

        while let Some(item) = dir
            .next_entry()
            .await
            .map_err(|e| ShelfError::io("reading cache entry", e))?
        {
            fs::remove_dir_all(item.path())
                .await
                .map_err(|e| ShelfError::io("removing cache entry", e))?;
            if item.file_name() != STAGING_DIR {
                removed += 1;
            }
        }

        Ok(removed)
    }
}

/// Start the detached materialization task for a key.
///
/// The task is spawned rather than driven by the caller so that a caller
/// cancelled mid-resolution does not cancel the fetch other sessions are
/// waiting on.
fn spawn_fetch(
    root: PathBuf,
    inflight: Arc<Mutex<HashMap<String, SharedFetch>>>,
    dir_name: String,
    name: String,
    retriever: Arc<dyn Retriever>,
    version: String,
) -> SharedFetch {
    let task = tokio::spawn(async move {
        let result = materialize_entry(&root, &dir_name, &name, &retriever, &version).await;
        inflight.lock().await.remove(&dir_name);
        result.map_err(Arc::new)
    });

    task.map(|joined| match joined {
        Ok(result) => result,
        Err(e) => Err(Arc::new(ShelfError::Internal(format!(
            "retrieval task panicked: {e}"
        )))),
    })
    .boxed()
    .shared()
}

/// Materialize one entry: stage, fetch, swap atomically
async fn materialize_entry(
    root: &Path,
    dir_name: &str,
    name: &str,
    retriever: &Arc<dyn Retriever>,
    version: &str,
) -> ShelfResult<PathBuf> {
    let staging_root = root.join(STAGING_DIR);
    fs::create_dir_all(&staging_root)
        .await
        .map_err(|e| ShelfError::io("creating cache staging directory", e))?;

    let staging = staging_root.join(Uuid::new_v4().to_string());
    let tree = staging.join("tree");
    fs::create_dir_all(&tree)
        .await
        .map_err(|e| ShelfError::io("creating staging tree", e))?;

    if let Err(e) = retriever.materialize(name, version, &tree).await {
        let _ = fs::remove_dir_all(&staging).await;
        return Err(e);
    }

    let entry = CacheEntry {
        name: name.to_string(),
        version: version.to_string(),
        last_refreshed: Utc::now(),
    };
    let meta = serde_json::to_string_pretty(&entry)?;
    fs::write(staging.join(ENTRY_META_FILE), meta)
        .await
        .map_err(|e| ShelfError::io("writing cache entry metadata", e))?;

    // Swap into place. The in-flight entry for this key blocks concurrent
    // readers of the same key until the rename lands, so the brief gap
    // between removal and rename is not observable.
    let entry_dir = root.join(dir_name);
    if entry_dir.exists() {
        fs::remove_dir_all(&entry_dir)
            .await
            .map_err(|e| ShelfError::io("removing stale cache entry", e))?;
    }
    fs::rename(&staging, &entry_dir).await.map_err(|e| {
        ShelfError::CachePrepare {
            name: name.to_string(),
            version: version.to_string(),
            reason: format!("installing entry: {e}"),
        }
    })?;

    debug!("Cache entry ready: {}", entry_dir.display());
    Ok(entry_dir.join("tree"))
}

/// Read an entry's metadata; None when the directory is not a complete
/// cache entry
async fn read_entry_meta(entry_dir: &Path) -> Option<CacheEntry> {
    let content = fs::read_to_string(entry_dir.join(ENTRY_META_FILE))
        .await
        .ok()?;
    serde_json::from_str(&content).ok()
}

/// Rebuild a waiter-facing error from the shared fetch failure,
/// preserving the retrieval taxonomy
fn clone_for_waiter(err: &ShelfError) -> ShelfError {
    match err {
        ShelfError::RetrievalFailed {
            name,
            version,
            reason,
        } => ShelfError::RetrievalFailed {
            name: name.clone(),
            version: version.clone(),
            reason: reason.clone(),
        },
        ShelfError::VersionNotFound {
            name,
            version,
            remote,
        } => ShelfError::VersionNotFound {
            name: name.clone(),
            version: version.clone(),
            remote: remote.clone(),
        },
        ShelfError::CachePrepare {
            name,
            version,
            reason,
        } => ShelfError::CachePrepare {
            name: name.clone(),
            version: version.clone(),
            reason: reason.clone(),
        },
        other => ShelfError::Internal(other.to_string()),
    }
}
