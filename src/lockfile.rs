//! Cross-process advisory locking for shared credential caches
//!
//! Lock files live next to the cache they guard and use `flock(2)`, so a
//! crashed holder releases its lock when the kernel closes the descriptor.

use crate::error::{KrbError, KrbResult};
use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// Poll interval while waiting for a contended lock
const ACQUIRE_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// RAII guard for an exclusively-held advisory lock.
///
/// The lock is released when the guard is dropped: closing the descriptor
/// releases the underlying `flock`.
#[derive(Debug)]
pub struct LockGuard {
    _file: File,
    path: PathBuf,
}

impl LockGuard {
    /// Path of the lock file this guard holds
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// A cross-process advisory lock addressed by file path
#[derive(Debug, Clone)]
pub struct FileLock {
    path: PathBuf,
}

impl FileLock {
    /// Create a lock handle for the given path (nothing is acquired yet)
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path of the lock file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Try to acquire the lock without blocking.
    ///
    /// Returns `Ok(Some(guard))` on success, `Ok(None)` if another holder
    /// currently owns the lock.
    pub fn try_acquire(&self) -> KrbResult<Option<LockGuard>> {
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&self.path)
            .map_err(|e| {
                KrbError::io(format!("opening lock file {}", self.path.display()), e)
            })?;

        match try_flock_exclusive(&file) {
            Ok(true) => {
                debug!("Acquired lock: {}", self.path.display());
                Ok(Some(LockGuard {
                    _file: file,
                    path: self.path.clone(),
                }))
            }
            Ok(false) => Ok(None),
            Err(e) => Err(KrbError::Lock {
                path: self.path.clone(),
                source: e,
            }),
        }
    }

    /// Acquire the lock, polling until the current holder releases it
    pub async fn acquire(&self) -> KrbResult<LockGuard> {
        loop {
            if let Some(guard) = self.try_acquire()? {
                return Ok(guard);
            }
            tokio::time::sleep(ACQUIRE_POLL_INTERVAL).await;
        }
    }
}

/// Try to take an exclusive flock on a file (non-blocking).
///
/// Returns `Ok(true)` if the lock was acquired, `Ok(false)` if another
/// process already holds it.
fn try_flock_exclusive(file: &File) -> io::Result<bool> {
    #[cfg(unix)]
    {
        use std::os::unix::io::AsRawFd;
        let fd = file.as_raw_fd();
        // SAFETY: flock is a standard POSIX call and fd is a valid
        // descriptor owned by `file`.
        let result = unsafe { libc::flock(fd, libc::LOCK_EX | libc::LOCK_NB) };
        if result == 0 {
            return Ok(true);
        }
        let err = io::Error::last_os_error();
        if err.kind() == io::ErrorKind::WouldBlock || err.raw_os_error() == Some(libc::EWOULDBLOCK)
        {
            return Ok(false);
        }
        Err(err)
    }
    #[cfg(not(unix))]
    {
        let _ = file;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn acquire_and_release() {
        let dir = TempDir::new().unwrap();
        let lock = FileLock::new(dir.path().join("cc.lock"));

        let guard = lock.try_acquire().unwrap();
        assert!(guard.is_some());

        drop(guard);
        assert!(lock.try_acquire().unwrap().is_some());
    }

    #[test]
    fn held_lock_blocks_second_holder() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cc.lock");

        let first = FileLock::new(&path);
        let second = FileLock::new(&path);

        let guard = first.try_acquire().unwrap().unwrap();
        assert!(second.try_acquire().unwrap().is_none());

        drop(guard);
        assert!(second.try_acquire().unwrap().is_some());
    }

    #[tokio::test]
    async fn acquire_waits_for_release() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cc.lock");

        let guard = FileLock::new(&path).try_acquire().unwrap().unwrap();

        let waiter = tokio::spawn({
            let lock = FileLock::new(&path);
            async move { lock.acquire().await.map(|g| g.path().to_path_buf()) }
        });

        tokio::time::sleep(Duration::from_millis(250)).await;
        assert!(!waiter.is_finished());

        drop(guard);
        let acquired = waiter.await.unwrap().unwrap();
        assert_eq!(acquired, path);
    }
}
