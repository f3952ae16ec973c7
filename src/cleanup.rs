//! Tracking of half-populated paths so an aborted fetch leaves nothing behind.

use anyhow::{Result, anyhow};
use log::{debug, warn};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::runtime::Runtime;

/// Paths currently being populated. Whatever is still registered when an
/// operation fails or is interrupted gets removed.
#[derive(Debug, Default)]
pub struct CleanupContext {
    paths: Vec<PathBuf>,
}

impl CleanupContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, path: PathBuf) {
        if !self.paths.contains(&path) {
            self.paths.push(path);
        }
    }

    pub fn remove(&mut self, path: &Path) {
        self.paths.retain(|p| p != path);
    }

    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    /// Removes every registered path and forgets it. Failures are logged,
    /// a missing path is not a failure.
    pub fn cleanup(&mut self, runtime: &dyn Runtime) {
        for path in self.paths.drain(..) {
            debug!("Cleaning up: {:?}", path);
            let result = if runtime.is_symlink(&path) {
                runtime.remove_symlink(&path)
            } else if runtime.is_dir(&path) {
                runtime.remove_dir_all(&path)
            } else if runtime.exists(&path) {
                runtime.remove_file(&path)
            } else {
                Ok(())
            };
            if let Err(e) = result {
                warn!("Failed to clean up {:?}: {:#}", path, e);
            }
        }
    }
}

pub type SharedCleanupContext = Arc<Mutex<CleanupContext>>;

pub fn new_shared() -> SharedCleanupContext {
    Arc::new(Mutex::new(CleanupContext::new()))
}

pub fn lock(ctx: &SharedCleanupContext) -> Result<MutexGuard<'_, CleanupContext>> {
    ctx.lock().map_err(|_| anyhow!("Cleanup context lock poisoned"))
}

/// Registers a path on creation and unregisters it on [`CleanupGuard::success`].
/// Dropping the guard without calling `success` leaves the path registered.
pub struct CleanupGuard {
    ctx: SharedCleanupContext,
    path: PathBuf,
}

impl CleanupGuard {
    pub fn new(ctx: SharedCleanupContext, path: PathBuf) -> Result<Self> {
        lock(&ctx)?.add(path.clone());
        Ok(Self { ctx, path })
    }

    pub fn success(self) -> Result<()> {
        lock(&self.ctx)?.remove(&self.path);
        Ok(())
    }
}
