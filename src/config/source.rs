//! Mounted level sources.
//!
//! # Responsibilities
//! - Read the level file and the debug-module allow-list file
//! - Derive the effective level of one module from both sources
//! - Classify every way reading or watching a source can fail
//!
//! # Design Decisions
//! - Read and parse failures are errors, never a fallback level: a logger
//!   stuck at an unintended verbosity is an operational hazard
//! - Both sources are read before anything is applied

use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::observability::level::Severity;

/// Errors raised while reading or watching mounted sources.
#[derive(Debug, Error)]
pub enum WatchError {
    /// The source is missing or unreadable.
    #[error("reading {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The source exists but its content is not valid.
    #[error("parsing {path:?}: {value:?} is not a valid {expected}")]
    Parse {
        path: PathBuf,
        value: String,
        expected: &'static str,
    },

    /// The filesystem watcher could not be created.
    #[error("creating fs watcher: {0}")]
    Init(#[source] notify::Error),

    /// Interest in a path could not be (re-)registered.
    #[error("watching path {path:?}: {source}")]
    Registration {
        path: PathBuf,
        #[source]
        source: notify::Error,
    },
}

/// The mounted files a watcher keeps in sync with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LevelSources {
    pub level_path: PathBuf,
    pub debug_modules_path: Option<PathBuf>,
}

impl LevelSources {
    pub fn new(level_path: impl Into<PathBuf>) -> Self {
        Self {
            level_path: level_path.into(),
            debug_modules_path: None,
        }
    }

    pub fn with_debug_modules(mut self, path: impl Into<PathBuf>) -> Self {
        self.debug_modules_path = Some(path.into());
        self
    }

    /// Every path to register interest in.
    pub fn paths(&self) -> impl Iterator<Item = &Path> {
        std::iter::once(self.level_path.as_path()).chain(self.debug_modules_path.as_deref())
    }
}

/// Modules allowed to log at debug or finer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModuleAllowList {
    modules: HashSet<String>,
}

impl ModuleAllowList {
    /// Parse a comma-separated list. Entries are trimmed; empty ones dropped.
    pub fn parse(content: &str) -> Self {
        let modules = content
            .split(',')
            .map(str::trim)
            .filter(|module| !module.is_empty())
            .map(str::to_string)
            .collect();
        Self { modules }
    }

    pub fn contains(&self, module: &str) -> bool {
        self.modules.contains(module)
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }
}

fn read_source(path: &Path, expected: &'static str) -> Result<String, WatchError> {
    fs::read_to_string(path).map_err(|source| match source.kind() {
        io::ErrorKind::InvalidData => WatchError::Parse {
            path: path.to_path_buf(),
            value: String::from("<non-utf8 content>"),
            expected,
        },
        _ => WatchError::Read {
            path: path.to_path_buf(),
            source,
        },
    })
}

/// Read and parse a level file.
pub fn read_level(path: &Path) -> Result<Severity, WatchError> {
    let content = read_source(path, "log level")?;
    content.parse().map_err(|_| WatchError::Parse {
        path: path.to_path_buf(),
        value: content,
        expected: "log level",
    })
}

/// Read and parse an allow-list file.
pub fn read_allow_list(path: &Path) -> Result<ModuleAllowList, WatchError> {
    read_source(path, "module list").map(|content| ModuleAllowList::parse(&content))
}

/// Effective level of `module`.
///
/// With an allow-list in effect, a debug-or-finer level only reaches modules
/// on the list; every other named module is held at `Info`. The unnamed
/// module is never gated.
pub fn resolve_level(level: Severity, module: &str, allow_list: Option<&ModuleAllowList>) -> Severity {
    match allow_list {
        Some(list) if level.is_debug_or_finer() && !module.is_empty() && !list.contains(module) => {
            Severity::Info
        }
        _ => level,
    }
}

/// Read both sources and derive the level for `module`.
///
/// `gated` selects whether the allow-list applies to this module at all.
pub fn read_effective_level(
    sources: &LevelSources,
    module: &str,
    gated: bool,
) -> Result<Severity, WatchError> {
    let level = read_level(&sources.level_path)?;
    let allow_list = match (&sources.debug_modules_path, gated) {
        (Some(path), true) => Some(read_allow_list(path)?),
        _ => None,
    };
    Ok(resolve_level(level, module, allow_list.as_ref()))
}
