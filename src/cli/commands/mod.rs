//! CLI command implementations

pub mod cache;
pub mod completions;
pub mod config;
pub mod list;
pub mod resolve;

pub use cache::execute as cache;
pub use completions::execute as completions;
pub use config::execute as config;
pub use list::execute as list;
pub use resolve::execute as resolve;

use crate::cache::CacheManager;
use crate::cli::LocalScope;
use crate::config::{Config, ConfigManager};
use crate::error::ShelfResult;
use crate::registry::{ConfigurationRegistry, LibraryConfiguration, Scope, ScopeChain};
use crate::resolver::Resolver;
use crate::session::SessionRecordStore;
use std::sync::Arc;

/// The assembled resolution engine a command operates on
pub(crate) struct Engine {
    pub registry: Arc<ConfigurationRegistry>,
    pub chain: ScopeChain,
    pub resolver: Resolver,
}

/// Wire registry, cache, session store, and resolver from the loaded
/// configuration. Global config declarations land in the global scope;
/// a discovered local config contributes one folder scope.
pub(crate) fn build_engine(config: &Config, local: Option<&LocalScope>) -> ShelfResult<Engine> {
    let registry = Arc::new(ConfigurationRegistry::new());
    registry.reload(
        Scope::Global,
        config
            .libraries
            .iter()
            .map(LibraryConfiguration::from_decl)
            .collect(),
    )?;

    let mut folders = vec![];
    if let Some(local) = local {
        registry.reload(
            Scope::Folder(local.name.clone()),
            local
                .config
                .libraries
                .iter()
                .map(LibraryConfiguration::from_decl)
                .collect(),
        )?;
        folders.push(local.name.clone());
    }

    let cache = Arc::new(CacheManager::new(ConfigManager::cache_dir(), &config.cache));
    let store = Arc::new(SessionRecordStore::new());
    let resolver = Resolver::new(
        Arc::clone(&registry),
        cache,
        store,
        config.resolver.version_conflict,
    );

    Ok(Engine {
        registry,
        chain: ScopeChain::new(folders),
        resolver,
    })
}
