//! Session record store
//!
//! Per-session ledger of resolved libraries. Re-referencing a name within
//! a session returns the existing entry instead of re-resolving; listing
//! preserves first-reference order for reporting and replay. The store is
//! the owner of every namespace handle for the session's lifetime and is
//! cleared when the session ends.

use crate::error::{ShelfError, ShelfResult};
use crate::namespace::NamespaceHandle;
use crate::session::record::LibraryRecord;
use crate::session::SessionId;
use std::collections::HashMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// A fully built library: its immutable record plus the namespace handle
/// and the materialized tree it was built from
#[derive(Debug, Clone)]
pub struct LoadedLibrary {
    pub record: LibraryRecord,
    pub namespace: NamespaceHandle,
    pub tree: PathBuf,
}

/// One session's ledger, guarded by a per-session lock so concurrent
/// resolutions within the session are effectively sequential
#[derive(Debug, Default)]
struct SessionLedger {
    /// Loaded libraries in first-reference order
    libraries: Vec<Arc<LoadedLibrary>>,
    /// Name to position in `libraries`
    by_name: HashMap<String, usize>,
}

/// Store of per-session library ledgers
#[derive(Debug, Default)]
pub struct SessionRecordStore {
    sessions: Mutex<HashMap<SessionId, Arc<Mutex<SessionLedger>>>>,
}

impl SessionRecordStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    async fn ledger(&self, session: &SessionId) -> Arc<Mutex<SessionLedger>> {
        let mut sessions = self.sessions.lock().await;
        Arc::clone(sessions.entry(session.clone()).or_default())
    }

    /// Get the existing entry for a name, if the session already holds one
    pub async fn get(&self, session: &SessionId, name: &str) -> Option<Arc<LoadedLibrary>> {
        let ledger = self.ledger(session).await;
        let ledger = ledger.lock().await;
        ledger
            .by_name
            .get(name)
            .map(|&idx| Arc::clone(&ledger.libraries[idx]))
    }

    /// Get the entry for a name, running `factory` to build it on first
    /// reference. The factory runs at most once per `(session, name)`:
    /// the per-session lock is held across it, so concurrent references
    /// coalesce onto one resolution.
    ///
    /// Returns the entry and whether this call created it.
    pub async fn get_or_create<F, Fut>(
        &self,
        session: &SessionId,
        name: &str,
        factory: F,
    ) -> ShelfResult<(Arc<LoadedLibrary>, bool)>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = ShelfResult<LoadedLibrary>>,
    {
        let ledger = self.ledger(session).await;
        let mut ledger = ledger.lock().await;

        if let Some(&idx) = ledger.by_name.get(name) {
            debug!("Session {} already holds library {}", session, name);
            return Ok((Arc::clone(&ledger.libraries[idx]), false));
        }

        let loaded = Arc::new(factory().await?);
        let idx = ledger.libraries.len();
        ledger.libraries.push(Arc::clone(&loaded));
        ledger.by_name.insert(name.to_string(), idx);
        info!("Session {} loaded {}", session, loaded.record);

        Ok((loaded, true))
    }

    /// Get the entry for a name the session must already hold.
    ///
    /// Dispatching against a library the session never referenced is an
    /// `UnknownLibrary` failure, not a silent no-op.
    pub async fn require(
        &self,
        session: &SessionId,
        name: &str,
    ) -> ShelfResult<Arc<LoadedLibrary>> {
        self.get(session, name)
            .await
            .ok_or_else(|| ShelfError::UnknownLibrary(name.to_string()))
    }

    /// All loaded libraries of a session, in first-reference order
    pub async fn list(&self, session: &SessionId) -> Vec<Arc<LoadedLibrary>> {
        let ledger = self.ledger(session).await;
        let ledger = ledger.lock().await;
        ledger.libraries.clone()
    }

    /// The session's record trace, in first-reference order
    pub async fn records(&self, session: &SessionId) -> Vec<LibraryRecord> {
        self.list(session)
            .await
            .iter()
            .map(|l| l.record.clone())
            .collect()
    }

    /// Persist the session's record trace as pretty JSON under `dir`,
    /// returning the file path
    pub async fn persist_trace(&self, session: &SessionId, dir: &Path) -> ShelfResult<PathBuf> {
        let records = self.records(session).await;

        fs::create_dir_all(dir)
            .await
            .map_err(|e| ShelfError::SessionPersist(e.to_string()))?;

        let path = dir.join(format!("{session}.json"));
        let content = serde_json::to_string_pretty(&records)?;
        fs::write(&path, content)
            .await
            .map_err(|e| ShelfError::SessionPersist(e.to_string()))?;

        debug!("Persisted record trace for session {}", session);
        Ok(path)
    }

    /// End a session: drop its ledger and every namespace handle it owns.
    /// Returns the final record trace.
    pub async fn end(&self, session: &SessionId) -> Vec<LibraryRecord> {
        let ledger = {
            let mut sessions = self.sessions.lock().await;
            sessions.remove(session)
        };

        match ledger {
            Some(ledger) => {
                let ledger = ledger.lock().await;
                ledger.libraries.iter().map(|l| l.record.clone()).collect()
            }
            None => vec![],
        }
    }
}
