//! Shared utilities for integration testing.

#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use levelwatch::{Logger, Severity};
use tempfile::TempDir;

/// Settle period used by every test watcher.
pub const SETTLE: Duration = Duration::from_millis(20);

/// A temporary stand-in for a mounted config directory.
pub struct Mount {
    dir: TempDir,
}

impl Mount {
    pub fn new() -> Self {
        Self {
            dir: tempfile::tempdir().unwrap(),
        }
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    pub fn level_path(&self) -> PathBuf {
        self.path("log_level")
    }

    pub fn modules_path(&self) -> PathBuf {
        self.path("log_debug_modules")
    }

    /// Replace `name` by writing a sibling file and renaming it over.
    pub fn replace(&self, name: &str, content: &str) {
        let staged = self.path(&format!(".{name}.tmp"));
        fs::write(&staged, content).unwrap();
        fs::rename(&staged, self.path(name)).unwrap();
    }

    /// Overwrite `name` in place.
    pub fn overwrite(&self, name: &str, content: &str) {
        fs::write(self.path(name), content).unwrap();
    }
}

/// Poll until `logger` reaches `expected` or `timeout` passes.
pub async fn wait_for_level(logger: &Logger, expected: Severity, timeout: Duration) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if logger.level() == expected {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    logger.level() == expected
}

/// Point the symlink at `link` to `target` by swapping in a fresh link.
#[cfg(unix)]
pub fn swap_symlink(link: &Path, target: &Path) {
    let staged = link.with_extension("swap");
    let _ = fs::remove_file(&staged);
    std::os::unix::fs::symlink(target, &staged).unwrap();
    fs::rename(&staged, link).unwrap();
}
