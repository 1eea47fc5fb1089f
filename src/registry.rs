//! Process-wide library configuration registry
//!
//! Configurations are contributed per scope: the global administrative
//! scope and any number of folder scopes forming the execution context's
//! folder chain. Lookup walks the chain from the most specific scope
//! outward, then falls back to global; the first match wins and its trust
//! is whatever the winning scope implies, never inherited.
//!
//! The registry is explicit state passed into the resolver, not a hidden
//! singleton. Writes happen at administration time (config load); reads
//! happen on every resolution.

use crate::config::LibraryDecl;
use crate::error::{ShelfError, ShelfResult};
use crate::retrieve::Retriever;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// A configuration scope
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Scope {
    /// Administrative scope; libraries declared here run trusted
    Global,
    /// A folder scope, identified by its path-like name
    Folder(String),
}

impl Scope {
    /// Trust implied by this scope
    pub fn trusted(&self) -> bool {
        matches!(self, Self::Global)
    }
}

impl std::fmt::Display for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Global => write!(f, "global"),
            Self::Folder(name) => write!(f, "folder:{name}"),
        }
    }
}

/// The execution context's folder chain, outermost folder first.
///
/// Lookup enumerates the chain innermost-first, then global.
#[derive(Debug, Clone, Default)]
pub struct ScopeChain {
    folders: Vec<String>,
}

impl ScopeChain {
    /// A context with no enclosing folders (global only)
    pub fn global() -> Self {
        Self::default()
    }

    /// A context nested in the given folders, outermost first
    pub fn new(folders: Vec<String>) -> Self {
        Self { folders }
    }

    /// Scopes in lookup order: innermost folder first, global last
    pub fn lookup_order(&self) -> impl Iterator<Item = Scope> + '_ {
        self.folders
            .iter()
            .rev()
            .map(|f| Scope::Folder(f.clone()))
            .chain(std::iter::once(Scope::Global))
    }
}

/// A registered library configuration
///
/// Built from a [`LibraryDecl`] at registration time, or constructed
/// directly when the retriever is an in-process instance (ad-hoc
/// references, tests).
#[derive(Debug, Clone)]
pub struct LibraryConfiguration {
    /// Library name, unique within its scope
    pub name: String,

    /// Retrieval strategy
    pub retriever: Arc<dyn Retriever>,

    /// Version used when a reference names none
    pub default_version: Option<String>,

    /// Whether `name@version` references may override the default
    pub allow_version_override: bool,

    /// Load without an explicit reference at session start
    pub implicit: bool,
}

impl LibraryConfiguration {
    /// Build a configuration from its declarative form
    pub fn from_decl(decl: &LibraryDecl) -> Self {
        Self {
            name: decl.name.clone(),
            retriever: decl.retriever.build(),
            default_version: decl.default_version.clone(),
            allow_version_override: decl.allow_version_override,
            implicit: decl.implicit,
        }
    }
}

/// A lookup result: the winning configuration plus the trust its scope
/// implies
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub config: LibraryConfiguration,
    pub scope: Scope,
    pub trusted: bool,
}

/// Registry of library configurations across scopes
#[derive(Debug, Default)]
pub struct ConfigurationRegistry {
    scopes: RwLock<HashMap<Scope, Vec<LibraryConfiguration>>>,
}

impl ConfigurationRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register one configuration in a scope, replacing any existing
    /// configuration with the same name in that scope
    pub fn register(&self, scope: Scope, config: LibraryConfiguration) -> ShelfResult<()> {
        validate_library_name(&config.name)?;

        let mut scopes = self.scopes.write().expect("registry lock poisoned");
        let entries = scopes.entry(scope).or_default();
        if let Some(existing) = entries.iter_mut().find(|c| c.name == config.name) {
            *existing = config;
        } else {
            entries.push(config);
        }
        Ok(())
    }

    /// Replace a scope's configurations wholesale (admin-time reload)
    pub fn reload(&self, scope: Scope, configs: Vec<LibraryConfiguration>) -> ShelfResult<()> {
        for config in &configs {
            validate_library_name(&config.name)?;
        }

        let mut scopes = self.scopes.write().expect("registry lock poisoned");
        scopes.insert(scope, configs);
        Ok(())
    }

    /// Look up a name along the caller's scope chain.
    ///
    /// The most specific scope defining the name wins; its trust tag comes
    /// from that scope alone.
    pub fn lookup(&self, name: &str, chain: &ScopeChain) -> Option<ResolvedConfig> {
        let scopes = self.scopes.read().expect("registry lock poisoned");

        for scope in chain.lookup_order() {
            if let Some(config) = scopes
                .get(&scope)
                .and_then(|entries| entries.iter().find(|c| c.name == name))
            {
                return Some(ResolvedConfig {
                    config: config.clone(),
                    trusted: scope.trusted(),
                    scope,
                });
            }
        }
        None
    }

    /// All configurations visible from the chain, shadowed names removed
    /// (nearest scope wins), in scope order
    pub fn visible(&self, chain: &ScopeChain) -> Vec<ResolvedConfig> {
        let scopes = self.scopes.read().expect("registry lock poisoned");
        let mut seen = std::collections::HashSet::new();
        let mut result = Vec::new();

        for scope in chain.lookup_order() {
            let Some(entries) = scopes.get(&scope) else {
                continue;
            };
            for config in entries {
                if seen.contains(&config.name) {
                    continue;
                }
                seen.insert(config.name.clone());
                result.push(ResolvedConfig {
                    config: config.clone(),
                    trusted: scope.trusted(),
                    scope: scope.clone(),
                });
            }
        }
        result
    }
}

/// Validate that a library name is safe (no path traversal, no special
/// characters)
pub(crate) fn validate_library_name(name: &str) -> ShelfResult<()> {
    let invalid = |reason: &str| {
        Err(ShelfError::InvalidLibraryName {
            name: name.to_string(),
            reason: reason.to_string(),
        })
    };

    if name.is_empty() {
        return invalid("must not be empty");
    }
    if name.contains('/') || name.contains('\\') || name.contains("..") || name.contains('\0') {
        return invalid("must not contain path separators or '..'");
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return invalid("must contain only alphanumeric characters, hyphens, or underscores");
    }
    Ok(())
}
