//! Cross-process queue locking.
//!
//! Independently launched `sdsub` instances, possibly on different hosts
//! sharing one mount, serialize queue mutations through an OS-level exclusive
//! lock on a named file. The file's existence means nothing; only the lock
//! held on it does, so a crashed holder never leaves a stale lock behind.
//!
//! Uses the `fs2` crate for cross-platform file locking (flock/LockFileEx).

use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use fs2::FileExt;
use tracing::{debug, trace, warn};

use crate::error::{Error, Result};

/// Delay between acquisition attempts while the lock is contended.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// A named lock file with a bounded acquisition wait.
#[derive(Debug, Clone)]
pub struct QueueLock {
    path: PathBuf,
    timeout: Duration,
}

/// Proof of holding the lock; released on drop.
pub struct LockGuard {
    file: File,
    path: PathBuf,
}

impl QueueLock {
    /// Describe a lock at `path`. Nothing is touched until [`Self::acquire`].
    #[must_use]
    pub fn new(path: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            path: path.into(),
            timeout,
        }
    }

    /// Path to the lock file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Maximum time [`Self::acquire`] waits.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Acquire the lock, waiting up to the configured timeout.
    ///
    /// # Errors
    ///
    /// Returns [`Error::LockTimeout`] if another holder keeps the lock for the
    /// whole wait, or [`Error::Lock`] if the file cannot be opened or locked.
    pub fn acquire(&self) -> Result<LockGuard> {
        let file = self.open()?;
        let started = Instant::now();

        loop {
            // Fully qualified: std::fs::File grew its own try_lock_exclusive in 1.89.
            match FileExt::try_lock_exclusive(&file) {
                Ok(()) => {
                    debug!(
                        "Acquired queue lock {} after {:?}",
                        self.path.display(),
                        started.elapsed()
                    );
                    return Ok(LockGuard {
                        file,
                        path: self.path.clone(),
                    });
                }
                Err(e) if is_contended(&e) => {
                    let waited = started.elapsed();
                    if waited >= self.timeout {
                        warn!(
                            "Gave up on queue lock {} after {:?}",
                            self.path.display(),
                            waited
                        );
                        return Err(Error::LockTimeout {
                            path: self.path.clone(),
                            waited,
                        });
                    }
                    trace!("Queue lock {} is held, waiting", self.path.display());
                    thread::sleep(POLL_INTERVAL.min(self.timeout - waited));
                }
                Err(source) => {
                    return Err(Error::Lock {
                        path: self.path.clone(),
                        source,
                    })
                }
            }
        }
    }

    /// Run `f` while holding the lock.
    ///
    /// The lock is released however `f` returns.
    ///
    /// # Errors
    ///
    /// Returns the acquisition error, or whatever `f` returns.
    pub fn with_lock<T>(&self, f: impl FnOnce() -> Result<T>) -> Result<T> {
        let _guard = self.acquire()?;
        f()
    }

    fn open(&self) -> Result<File> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|source| Error::DirectoryCreate {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }
        }

        OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&self.path)
            .map_err(|source| Error::Lock {
                path: self.path.clone(),
                source,
            })
    }
}

fn is_contended(err: &io::Error) -> bool {
    err.kind() == io::ErrorKind::WouldBlock
        || err.raw_os_error() == fs2::lock_contended_error().raw_os_error()
}

impl LockGuard {
    /// Path to the held lock file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(&self.file) {
            // Closing the handle below releases it anyway.
            debug!("Explicit unlock of {} failed: {}", self.path.display(), e);
        }
        debug!("Released queue lock {}", self.path.display());
    }
}

impl std::fmt::Debug for LockGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LockGuard")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use super::*;
    use tempfile::TempDir;

    fn lock_in(dir: &TempDir, timeout: Duration) -> QueueLock {
        QueueLock::new(dir.path().join("queue.lock"), timeout)
    }

    #[test]
    fn test_acquire_and_release() {
        let dir = TempDir::new().unwrap();
        let lock = lock_in(&dir, Duration::from_secs(1));

        let guard = lock.acquire().unwrap();
        assert!(guard.path().exists());
        drop(guard);

        // Reacquirable after release.
        let _again = lock.acquire().unwrap();
    }

    #[test]
    fn test_contention_times_out() {
        let dir = TempDir::new().unwrap();
        let holder = lock_in(&dir, Duration::from_secs(1));
        let waiter = lock_in(&dir, Duration::from_millis(150));

        let _guard = holder.acquire().unwrap();
        let started = Instant::now();
        let err = waiter.acquire().unwrap_err();

        assert!(matches!(err, Error::LockTimeout { .. }));
        assert!(err.is_retryable());
        assert!(started.elapsed() >= Duration::from_millis(150));
    }

    #[test]
    fn test_waiter_gets_lock_after_release() {
        let dir = TempDir::new().unwrap();
        let holder = lock_in(&dir, Duration::from_secs(1));
        let waiter = lock_in(&dir, Duration::from_secs(5));

        let guard = holder.acquire().unwrap();
        let handle = thread::spawn(move || waiter.acquire().map(|_| ()));
        thread::sleep(Duration::from_millis(100));
        drop(guard);

        assert!(handle.join().unwrap().is_ok());
    }

    #[test]
    fn test_existing_file_is_not_a_lock() {
        let dir = TempDir::new().unwrap();
        let lock = lock_in(&dir, Duration::from_millis(100));
        std::fs::write(lock.path(), b"left over").unwrap();

        assert!(lock.acquire().is_ok());
    }

    #[test]
    fn test_with_lock_releases_on_error() {
        let dir = TempDir::new().unwrap();
        let lock = lock_in(&dir, Duration::from_millis(200));

        let result: Result<()> = lock.with_lock(|| Err(Error::internal("enqueue failed")));
        assert!(result.is_err());

        // Released despite the error.
        assert!(lock_in(&dir, Duration::from_millis(100)).acquire().is_ok());
    }

    #[test]
    fn test_creates_parent_dirs() {
        let dir = TempDir::new().unwrap();
        let lock = QueueLock::new(
            dir.path().join("nested").join("locks").join("queue.lock"),
            Duration::from_secs(1),
        );
        assert!(lock.acquire().is_ok());
    }

    #[test]
    fn test_mutual_exclusion() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("queue.lock");
        let inside = Arc::new(AtomicUsize::new(0));
        let max_inside = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..6)
            .map(|_| {
                let lock = QueueLock::new(path.clone(), Duration::from_secs(10));
                let inside = Arc::clone(&inside);
                let max_inside = Arc::clone(&max_inside);
                thread::spawn(move || {
                    lock.with_lock(|| {
                        let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                        max_inside.fetch_max(now, Ordering::SeqCst);
                        thread::sleep(Duration::from_millis(10));
                        inside.fetch_sub(1, Ordering::SeqCst);
                        Ok(())
                    })
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap().unwrap();
        }
        assert_eq!(max_inside.load(Ordering::SeqCst), 1);
    }
}
