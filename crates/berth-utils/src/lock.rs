//! Advisory file locks guarding files shared between processes.
//!
//! A [`FileLock`] holds an exclusive `flock` on a sibling `<file>.lock` so two
//! processes never rewrite the same lock file or cache directory at once.

use std::{
    fs::{File, OpenOptions},
    path::{Path, PathBuf},
};

use nix::fcntl::{Flock, FlockArg};

use crate::{
    error::{LockError, LockResult},
    fs::ensure_dir_exists,
};

/// An exclusive lock on a guarded path, released when dropped.
pub struct FileLock {
    _file: Flock<File>,
    path: PathBuf,
}

impl FileLock {
    /// Path of the lock file guarding `target`.
    fn lock_path(target: &Path) -> PathBuf {
        let mut path = target.to_path_buf();
        path.as_mut_os_string().push(".lock");
        path
    }

    fn open(target: &Path) -> LockResult<(PathBuf, File)> {
        let lock_path = Self::lock_path(target);
        if let Some(parent) = lock_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            ensure_dir_exists(parent).map_err(|err| LockError::AcquireFailed(err.to_string()))?;
        }

        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(&lock_path)?;
        Ok((lock_path, file))
    }

    /// Acquires an exclusive lock guarding `target`, blocking until it is free.
    pub fn acquire<P: AsRef<Path>>(target: P) -> LockResult<Self> {
        let (lock_path, file) = Self::open(target.as_ref())?;

        let file = Flock::lock(file, FlockArg::LockExclusive).map_err(|(_, err)| {
            LockError::AcquireFailed(format!("{}: {}", lock_path.display(), err))
        })?;

        Ok(FileLock {
            path: lock_path,
            _file: file,
        })
    }

    /// Tries to acquire the lock without blocking.
    ///
    /// Returns `None` if another holder owns it.
    pub fn try_acquire<P: AsRef<Path>>(target: P) -> LockResult<Option<Self>> {
        let (lock_path, file) = Self::open(target.as_ref())?;

        match Flock::lock(file, FlockArg::LockExclusiveNonblock) {
            Ok(file) => {
                Ok(Some(FileLock {
                    path: lock_path,
                    _file: file,
                }))
            }
            Err((_, nix::errno::Errno::EWOULDBLOCK)) => Ok(None),
            Err((_, err)) => {
                Err(LockError::AcquireFailed(format!(
                    "{}: {}",
                    lock_path.display(),
                    err
                )))
            }
        }
    }

    /// Path to the `.lock` file itself.
    pub fn path(&self) -> &Path {
        &self.path
    }
}
