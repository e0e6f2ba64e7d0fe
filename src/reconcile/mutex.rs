//! Per-directory asynchronous mutual exclusion.

use dashmap::DashMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Async lock keyed by project directory.
///
/// Waiters for the same directory are served in FIFO order; different
/// directories never contend. Locks are created lazily and live as long as
/// the `DirectoryMutex` itself.
///
/// Two styles of use are supported:
///
/// - [`DirectoryMutex::lock`] returns a [`DirectoryGuard`] releasing on drop.
/// - [`DirectoryMutex::acquire`] / [`DirectoryMutex::release`] keep the lock
///   inside the mutex, keyed by directory, for callers that release from a
///   different scope than they acquired in.
#[derive(Debug, Default)]
pub struct DirectoryMutex {
    locks: DashMap<PathBuf, Arc<Mutex<()>>>,
    held: DashMap<PathBuf, OwnedMutexGuard<()>>,
}

/// Holds the lock of one directory until dropped or released.
#[derive(Debug)]
#[must_use = "the directory is unlocked as soon as the guard is dropped"]
pub struct DirectoryGuard {
    dir: PathBuf,
    guard: Option<OwnedMutexGuard<()>>,
}

impl DirectoryMutex {
    /// Create an empty mutex map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_for(&self, dir: &Path) -> Arc<Mutex<()>> {
        self.locks
            .entry(dir.to_path_buf())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Wait until `dir` is free and lock it, returning a guard.
    pub async fn lock(&self, dir: &Path) -> DirectoryGuard {
        let lock = self.lock_for(dir);
        if lock.try_lock().is_err() {
            tracing::debug!(dir = %dir.display(), "Waiting for directory lock");
        }

        let guard = lock.lock_owned().await;
        tracing::trace!(dir = %dir.display(), "Directory locked");

        DirectoryGuard {
            dir: dir.to_path_buf(),
            guard: Some(guard),
        }
    }

    /// Lock `dir` only if it is free and nobody is queued for it.
    pub fn try_lock(&self, dir: &Path) -> Option<DirectoryGuard> {
        let guard = self.lock_for(dir).try_lock_owned().ok()?;
        tracing::trace!(dir = %dir.display(), "Directory locked");

        Some(DirectoryGuard {
            dir: dir.to_path_buf(),
            guard: Some(guard),
        })
    }

    /// Wait until `dir` is free and lock it until [`DirectoryMutex::release`] is called.
    pub async fn acquire(&self, dir: &Path) {
        let mut guard = self.lock(dir).await;
        if let Some(inner) = guard.guard.take() {
            self.held.insert(dir.to_path_buf(), inner);
        }
    }

    /// Release a lock taken with [`DirectoryMutex::acquire`], waking the next waiter.
    ///
    /// Releasing a directory that is not held only logs a warning.
    pub fn release(&self, dir: &Path) {
        if self.held.remove(dir).is_some() {
            tracing::trace!(dir = %dir.display(), "Directory released");
        } else {
            tracing::warn!(dir = %dir.display(), "Release of a directory that is not held");
        }
    }

    /// Run `work` while holding the lock of `dir`.
    ///
    /// The lock is released when `work` completes, also if it panics.
    pub async fn with_lock<F, T>(&self, dir: &Path, work: F) -> T
    where
        F: Future<Output = T>,
    {
        let _guard = self.lock(dir).await;
        work.await
    }

    /// Whether `dir` is currently locked.
    #[must_use]
    pub fn is_locked(&self, dir: &Path) -> bool {
        self.locks
            .get(dir)
            .is_some_and(|lock| lock.try_lock().is_err())
    }
}

impl DirectoryGuard {
    /// The locked directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Release the lock now.
    pub fn release(mut self) {
        self.unlock();
    }

    fn unlock(&mut self) {
        if self.guard.take().is_some() {
            tracing::trace!(dir = %self.dir.display(), "Directory released");
        }
    }
}

impl Drop for DirectoryGuard {
    fn drop(&mut self) {
        self.unlock();
    }
}
