//! Command-line interface

pub mod args;
pub mod commands;

pub use args::{Cli, Commands};

use crate::config::Config;

/// A discovered project-local configuration contributing a folder scope
#[derive(Debug, Clone)]
pub struct LocalScope {
    /// Folder scope name (the directory holding the .shelf.toml)
    pub name: String,
    /// The parsed local configuration
    pub config: Config,
}
