//! Configuration schema for Shelf
//!
//! The global configuration is stored at `~/.config/shelf/config.toml`.
//! Libraries declared there land in the global (trusted) scope; libraries
//! declared in a discovered project-local `.shelf.toml` land in that
//! folder's (untrusted) scope.

use crate::retrieve::RetrieverSpec;
use serde::{Deserialize, Serialize};

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General settings
    pub general: GeneralConfig,

    /// Cache settings
    pub cache: CacheConfig,

    /// Resolver settings
    pub resolver: ResolverConfig,

    /// Library declarations contributed by this file's scope
    #[serde(rename = "library")]
    pub libraries: Vec<LibraryDecl>,
}

/// General application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Enable verbose logging
    pub verbose: bool,

    /// Log format: "text" or "json"
    pub log_format: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            verbose: false,
            log_format: "text".to_string(),
        }
    }
}

/// Cache freshness policy for materialized source trees
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RefreshPolicy {
    /// Revalidate on every use (symbolic versions move between uses)
    Always,
    /// Never revalidate once materialized
    Never,
    /// Revalidate entries older than `max_age_secs`
    MaxAge,
}

/// Cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// When to refresh an existing cache entry
    pub refresh: RefreshPolicy,

    /// Entry age threshold for the "max-age" policy, in seconds
    pub max_age_secs: u64,

    /// Auto-remove entries unused for N days (0 = disabled)
    pub gc_days: u32,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            refresh: RefreshPolicy::Always,
            max_age_secs: 300,
            gc_days: 30,
        }
    }
}

/// Policy for a second reference to an already-loaded library that names
/// a different version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum VersionConflictPolicy {
    /// The first reference's version wins; later references reuse it
    FirstWins,
    /// Later conflicting references fail the session
    Fail,
}

/// Resolver configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    /// Same-name-different-version policy within a session
    pub version_conflict: VersionConflictPolicy,

    /// Load implicit libraries automatically at session start
    pub load_implicit: bool,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            version_conflict: VersionConflictPolicy::FirstWins,
            load_implicit: true,
        }
    }
}

/// Declarative form of a library configuration, as written in TOML.
///
/// Trust is never declared here; it is derived from the scope the file
/// contributes to when the declaration is registered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LibraryDecl {
    /// Library name, unique within the contributing scope
    pub name: String,

    /// Retrieval source
    pub retriever: RetrieverSpec,

    /// Version used when a reference names none
    #[serde(default)]
    pub default_version: Option<String>,

    /// Whether `name@version` references may override the default
    #[serde(default = "default_true")]
    pub allow_version_override: bool,

    /// Load without an explicit reference at session start
    #[serde(default)]
    pub implicit: bool,
}

fn default_true() -> bool {
    true
}
