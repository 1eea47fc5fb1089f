//! Library reference resolution
//!
//! A reference names a library (`name`), optionally pins a version
//! (`name@version`), and optionally carries an ad-hoc retrieval source
//! instead of a registered configuration. The resolver turns a reference
//! into a loaded library: it consults the configuration registry, applies
//! the version rules, lets the cache manager materialize the source tree,
//! has the namespace layer build the bindings, and records the result in
//! the session store so repeated references are idempotent.

use crate::cache::CacheManager;
use crate::config::VersionConflictPolicy;
use crate::error::{ShelfError, ShelfResult};
use crate::namespace::build_namespace;
use crate::registry::{
    validate_library_name, ConfigurationRegistry, LibraryConfiguration, ScopeChain,
};
use crate::retrieve::{validate_version, Retriever, RetrieverSpec};
use crate::session::{LibraryRecord, LoadedLibrary, SessionId, SessionRecordStore};
use std::sync::Arc;
use tracing::debug;

/// A parsed library reference
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LibraryReference {
    /// Library name
    pub name: String,

    /// Explicitly requested version, if any
    pub version: Option<String>,

    /// Ad-hoc retrieval source. References carrying one bypass the
    /// registry and are always untrusted.
    pub retriever: Option<RetrieverSpec>,
}

impl LibraryReference {
    /// Parse a `name` or `name@version` reference string
    pub fn parse(reference: &str) -> ShelfResult<Self> {
        let (name, version) = match reference.split_once('@') {
            Some((name, version)) => {
                if version.is_empty() {
                    return Err(ShelfError::InvalidReference {
                        reference: reference.to_string(),
                        reason: "empty version after '@'".to_string(),
                    });
                }
                (name, Some(version.to_string()))
            }
            None => (reference, None),
        };

        validate_library_name(name)?;
        if let Some(ref v) = version {
            validate_version(v)?;
        }

        Ok(Self {
            name: name.to_string(),
            version,
            retriever: None,
        })
    }

    /// Build a structured reference: `identifier` in `name[@version]`
    /// form plus an ad-hoc retrieval source
    pub fn with_retriever(identifier: &str, spec: RetrieverSpec) -> ShelfResult<Self> {
        let mut reference = Self::parse(identifier)?;
        reference.retriever = Some(spec);
        Ok(reference)
    }
}

impl std::str::FromStr for LibraryReference {
    type Err = ShelfError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl std::fmt::Display for LibraryReference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.version {
            Some(v) => write!(f, "{}@{}", self.name, v),
            None => write!(f, "{}", self.name),
        }
    }
}

/// The resolution engine.
///
/// Holds its collaborators explicitly; there is no hidden global state.
pub struct Resolver {
    registry: Arc<ConfigurationRegistry>,
    cache: Arc<CacheManager>,
    store: Arc<SessionRecordStore>,
    conflict: VersionConflictPolicy,
}

impl Resolver {
    /// Create a resolver over the given registry, cache, and session store
    pub fn new(
        registry: Arc<ConfigurationRegistry>,
        cache: Arc<CacheManager>,
        store: Arc<SessionRecordStore>,
        conflict: VersionConflictPolicy,
    ) -> Self {
        Self {
            registry,
            cache,
            store,
            conflict,
        }
    }

    /// The session record store this resolver records into
    pub fn store(&self) -> &Arc<SessionRecordStore> {
        &self.store
    }

    /// Resolve a reference within a session.
    ///
    /// A name the session already holds is returned as-is without
    /// re-fetching; a conflicting explicit version on such a duplicate
    /// reference is handled per the configured policy.
    pub async fn resolve(
        &self,
        session: &SessionId,
        chain: &ScopeChain,
        reference: &LibraryReference,
    ) -> ShelfResult<Arc<LoadedLibrary>> {
        let (loaded, created) = self
            .store
            .get_or_create(session, &reference.name, || self.load(chain, reference))
            .await?;

        if !created {
            if let Some(requested) = &reference.version {
                if *requested != loaded.record.version
                    && self.conflict == VersionConflictPolicy::Fail
                {
                    return Err(ShelfError::VersionConflict {
                        name: reference.name.clone(),
                        loaded: loaded.record.version.clone(),
                        requested: requested.clone(),
                    });
                }
            }
            debug!(
                "Duplicate reference to {} returns the existing record",
                reference.name
            );
        }

        Ok(loaded)
    }

    /// Resolve every implicit library visible from the chain, in scope
    /// order
    pub async fn load_implicit(
        &self,
        session: &SessionId,
        chain: &ScopeChain,
    ) -> ShelfResult<Vec<Arc<LoadedLibrary>>> {
        let mut loaded = vec![];
        for resolved in self.registry.visible(chain) {
            if !resolved.config.implicit {
                continue;
            }
            let reference = LibraryReference {
                name: resolved.config.name.clone(),
                version: None,
                retriever: None,
            };
            loaded.push(self.resolve(session, chain, &reference).await?);
        }
        Ok(loaded)
    }

    /// Build a library on first reference: configuration, version rules,
    /// retrieval, namespace, trust tag.
    async fn load(
        &self,
        chain: &ScopeChain,
        reference: &LibraryReference,
    ) -> ShelfResult<LoadedLibrary> {
        let name = &reference.name;

        let (config, trusted, adhoc) = match &reference.retriever {
            Some(spec) => {
                // Ad-hoc source: no registered configuration, never trusted.
                let config = LibraryConfiguration {
                    name: name.clone(),
                    retriever: spec.build(),
                    default_version: None,
                    allow_version_override: true,
                    implicit: false,
                };
                (config, false, true)
            }
            None => {
                let resolved = self
                    .registry
                    .lookup(name, chain)
                    .ok_or_else(|| ShelfError::UnknownLibrary(name.clone()))?;
                (resolved.config, resolved.trusted, false)
            }
        };

        let requested = match &reference.version {
            Some(version) => {
                // The override gate guards registered configurations; an
                // ad-hoc reference names its own source and version.
                if !adhoc && !config.allow_version_override {
                    return Err(ShelfError::OverrideNotAllowed {
                        name: name.clone(),
                        version: version.clone(),
                    });
                }
                Some(version.clone())
            }
            None => config.default_version.clone(),
        };

        if requested.is_none() && config.retriever.requires_version() {
            return Err(ShelfError::NoVersionSpecified(name.clone()));
        }

        let (version, tree) = self
            .cache
            .ensure(name, &config.retriever, requested.as_deref())
            .await?;

        let namespace = build_namespace(name, &tree).await?;
        let record = LibraryRecord {
            name: name.clone(),
            version,
            variables: namespace.callable_names(),
            classes: namespace.class_paths(),
            trusted,
        };

        Ok(LoadedLibrary {
            record,
            namespace,
            tree,
        })
    }
}
