//! Advisory file locking between processes sharing a sessions directory.
//!
//! A daemon and standalone CLI commands can open the same directory at once.
//! Writers take an exclusive flock() on a per-session lock file for the
//! whole read-modify-write of that session.

use std::fs::{File, OpenOptions};
use std::io;
use std::path::Path;

#[cfg(unix)]
use std::os::unix::io::AsRawFd;

/// A held file lock that releases on drop
pub struct FileLock {
    #[allow(dead_code)]
    file: File,
}

impl FileLock {
    /// Acquire an exclusive lock on `lock_path`, blocking until available.
    ///
    /// The lock file is created if missing and left in place afterwards.
    pub fn acquire_blocking(lock_path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(lock_path)?;

        Self::lock_exclusive(&file)?;

        Ok(FileLock { file })
    }

    #[cfg(unix)]
    fn lock_exclusive(file: &File) -> io::Result<()> {
        let fd = file.as_raw_fd();
        loop {
            let result = unsafe { libc::flock(fd, libc::LOCK_EX) };
            if result == 0 {
                return Ok(());
            }
            let err = io::Error::last_os_error();
            if err.kind() != io::ErrorKind::Interrupted {
                return Err(err);
            }
        }
    }

    #[cfg(not(unix))]
    fn lock_exclusive(_file: &File) -> io::Result<()> {
        // No cross-process locking off Unix; FileStore's mutex still
        // serializes writers inside one process.
        Ok(())
    }
}

#[cfg(unix)]
impl Drop for FileLock {
    fn drop(&mut self) {
        let fd = self.file.as_raw_fd();
        // Release the lock - ignore errors on drop
        unsafe { libc::flock(fd, libc::LOCK_UN) };
    }
}
