//! Advisory data-directory lockfile.
//!
//! `nendb.lock` holds the PID of the writing process and an exclusive
//! flock for the lifetime of the engine. A second process opening the same
//! directory fails with `DatabaseLocked`. Two engines on *different*
//! directories in one process are independent; there is no global state.

use fs2::FileExt;
use nendb_core::{Error, Result};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Lockfile name inside the data directory.
pub const LOCK_FILE_NAME: &str = "nendb.lock";

/// Held exclusive lock on a data directory. Released on drop; the file
/// itself is left in place (it is advisory).
pub struct Lockfile {
    file: File,
    path: PathBuf,
}

impl Lockfile {
    /// Acquire the exclusive lock, writing this process's PID into the
    /// file.
    ///
    /// # Errors
    ///
    /// `DatabaseLocked` if another process (or another engine instance on
    /// the same directory) holds the lock.
    pub fn acquire(data_dir: &Path) -> Result<Self> {
        let path = data_dir.join(LOCK_FILE_NAME);
        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .open(&path)?;

        file.try_lock_exclusive()
            .map_err(|_| Error::DatabaseLocked { path: path.clone() })?;

        file.set_len(0)?;
        writeln!(file, "{}", std::process::id())?;
        file.sync_all()?;

        Ok(Lockfile { file, path })
    }

    /// Path of the lockfile.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for Lockfile {
    fn drop(&mut self) {
        let _ = self.file.unlock();
    }
}
