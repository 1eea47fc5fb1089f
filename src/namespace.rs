//! Library namespaces and cross-library isolation
//!
//! A materialized source tree is turned into two families of bindings:
//! callable top-level functions (files directly under `vars/`, exposed by
//! file stem) and classes (files under `src/`, exposed by their dotted
//! package path, so `src/some/pkg/Lib.*` becomes `some.pkg.Lib`).
//!
//! Every namespace carries an opaque [`LibraryIdentity`] token. Dispatch
//! compares the caller's identity with the namespace's own: code running
//! inside library A that reaches into library B's namespace is rejected
//! with `CrossLibraryAccessDenied`, even though both libraries live in
//! the same process. The check is a logical identity comparison, not a
//! sandbox, and it is independent of trust.
//!
//! Values that escape a successful dispatch ([`SymbolValue`]) are
//! freestanding: once a symbol has been legitimately obtained it can be
//! held and used without further checks, which is exactly the escape
//! rule for values returned out of a library into the calling session.

use crate::error::{ShelfError, ShelfResult};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

/// Directory of callable top-level functions within a source tree
const VARS_DIR: &str = "vars";

/// Directory of class sources within a source tree
const SRC_DIR: &str = "src";

/// Opaque identity token for one loaded library's namespace
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LibraryIdentity(Uuid);

impl LibraryIdentity {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

/// What a symbol is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolKind {
    /// Callable top-level function from `vars/`
    Callable,
    /// Class from `src/`
    Class,
}

/// A symbol obtained from a namespace.
///
/// Freestanding once obtained; holding one implies the access check has
/// already passed at the namespace boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SymbolValue {
    /// Library the symbol belongs to
    pub library: String,
    /// Flat callable name or dotted class path
    pub name: String,
    /// Symbol family
    pub kind: SymbolKind,
    /// Source file backing the symbol, inside the materialized tree
    pub source: PathBuf,
}

/// Who is performing a dispatch
#[derive(Debug, Clone)]
pub enum AccessContext {
    /// The calling session's own top-level scope
    Session,
    /// Code executing inside a loaded library
    Library {
        identity: LibraryIdentity,
        library: String,
    },
}

/// The exposed surface of one loaded library
#[derive(Debug)]
struct Namespace {
    identity: LibraryIdentity,
    library: String,
    callables: BTreeMap<String, SymbolValue>,
    classes: BTreeMap<String, SymbolValue>,
}

/// Shared handle to a library's namespace.
///
/// Owned by the session record store for the session's lifetime; clones
/// share the same immutable namespace.
#[derive(Debug, Clone)]
pub struct NamespaceHandle(Arc<Namespace>);

impl NamespaceHandle {
    /// The namespace's identity token
    pub fn identity(&self) -> LibraryIdentity {
        self.0.identity
    }

    /// The library this namespace belongs to
    pub fn library(&self) -> &str {
        &self.0.library
    }

    /// An access context for code executing inside this library
    pub fn context(&self) -> AccessContext {
        AccessContext::Library {
            identity: self.0.identity,
            library: self.0.library.clone(),
        }
    }

    /// Callable names in exposure order
    pub fn callable_names(&self) -> Vec<String> {
        self.0.callables.keys().cloned().collect()
    }

    /// Dotted class paths in exposure order
    pub fn class_paths(&self) -> Vec<String> {
        self.0.classes.keys().cloned().collect()
    }

    /// Dispatch a callable lookup
    pub fn callable(&self, ctx: &AccessContext, name: &str) -> ShelfResult<SymbolValue> {
        self.check_access(ctx, name)?;
        self.0
            .callables
            .get(name)
            .cloned()
            .ok_or_else(|| ShelfError::UnknownSymbol {
                library: self.0.library.clone(),
                symbol: name.to_string(),
            })
    }

    /// Dispatch a class lookup by dotted path
    pub fn class(&self, ctx: &AccessContext, path: &str) -> ShelfResult<SymbolValue> {
        self.check_access(ctx, path)?;
        self.0
            .classes
            .get(path)
            .cloned()
            .ok_or_else(|| ShelfError::UnknownSymbol {
                library: self.0.library.clone(),
                symbol: path.to_string(),
            })
    }

    /// The identity comparison at the heart of isolation. Trust plays no
    /// part here.
    fn check_access(&self, ctx: &AccessContext, symbol: &str) -> ShelfResult<()> {
        match ctx {
            AccessContext::Session => Ok(()),
            AccessContext::Library { identity, .. } if *identity == self.0.identity => Ok(()),
            AccessContext::Library { library, .. } => {
                Err(ShelfError::CrossLibraryAccessDenied {
                    symbol: symbol.to_string(),
                    target: self.0.library.clone(),
                    caller: library.clone(),
                })
            }
        }
    }
}

/// Build a namespace from a materialized source tree
pub async fn build_namespace(library: &str, tree: &Path) -> ShelfResult<NamespaceHandle> {
    let library = library.to_string();
    let tree = tree.to_path_buf();

    let namespace = tokio::task::spawn_blocking(move || scan_tree(&library, &tree))
        .await
        .map_err(|e| ShelfError::Internal(format!("namespace scan panicked: {e}")))??;

    debug!(
        "Built namespace for {}: {} callables, {} classes",
        namespace.library,
        namespace.callables.len(),
        namespace.classes.len()
    );
    Ok(NamespaceHandle(Arc::new(namespace)))
}

fn scan_tree(library: &str, tree: &Path) -> ShelfResult<Namespace> {
    if !tree.is_dir() {
        return Err(ShelfError::SourceTreeInvalid {
            path: tree.to_path_buf(),
            reason: "not a directory".to_string(),
        });
    }

    let mut callables = BTreeMap::new();
    let vars = tree.join(VARS_DIR);
    if vars.is_dir() {
        for entry in read_dir(&vars)? {
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            if !is_identifier(stem) {
                debug!("Skipping non-identifier file in vars/: {}", path.display());
                continue;
            }
            callables.insert(
                stem.to_string(),
                SymbolValue {
                    library: library.to_string(),
                    name: stem.to_string(),
                    kind: SymbolKind::Callable,
                    source: path,
                },
            );
        }
    }

    let mut classes = BTreeMap::new();
    let src = tree.join(SRC_DIR);
    if src.is_dir() {
        collect_classes(library, &src, &mut Vec::new(), &mut classes)?;
    }

    Ok(Namespace {
        identity: LibraryIdentity::new(),
        library: library.to_string(),
        callables,
        classes,
    })
}

/// Walk `src/` collecting class files; the directory path becomes the
/// package prefix
fn collect_classes(
    library: &str,
    dir: &Path,
    package: &mut Vec<String>,
    classes: &mut BTreeMap<String, SymbolValue>,
) -> ShelfResult<()> {
    for entry in read_dir(dir)? {
        let path = entry.path();
        let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };

        if path.is_dir() {
            let Some(segment) = path.file_name().and_then(|s| s.to_str()) else {
                continue;
            };
            if !is_identifier(segment) {
                debug!("Skipping non-identifier package dir: {}", path.display());
                continue;
            }
            package.push(segment.to_string());
            collect_classes(library, &path, package, classes)?;
            package.pop();
        } else if path.is_file() {
            if !is_identifier(stem) {
                debug!("Skipping non-identifier class file: {}", path.display());
                continue;
            }
            let dotted = if package.is_empty() {
                stem.to_string()
            } else {
                format!("{}.{}", package.join("."), stem)
            };
            classes.insert(
                dotted.clone(),
                SymbolValue {
                    library: library.to_string(),
                    name: dotted,
                    kind: SymbolKind::Class,
                    source: path,
                },
            );
        }
    }
    Ok(())
}

fn read_dir(dir: &Path) -> ShelfResult<Vec<std::fs::DirEntry>> {
    let mut entries: Vec<_> = std::fs::read_dir(dir)
        .map_err(|e| ShelfError::io(format!("reading {}", dir.display()), e))?
        .collect::<Result<_, _>>()
        .map_err(|e| ShelfError::io(format!("reading {}", dir.display()), e))?;
    entries.sort_by_key(std::fs::DirEntry::file_name);
    Ok(entries)
}

/// Valid symbol segment: starts with a letter or underscore, continues
/// with alphanumerics or underscores
fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
