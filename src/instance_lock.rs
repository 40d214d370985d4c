//! Single-instance guard backed by an OS file lock.

use anyhow::{Context, Result, anyhow};
use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Held for the lifetime of the process; released on drop or exit.
///
/// The lock file itself is left in place. Deleting it would let a later
/// process lock a fresh inode while another still waits on the old one.
#[derive(Debug)]
pub struct InstanceLock {
    file: File,
    path: PathBuf,
}

impl InstanceLock {
    pub fn acquire<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(&path)
            .with_context(|| format!("failed to open lock file {}", path.display()))?;

        file.try_lock_exclusive().map_err(|_| {
            anyhow!(
                "another bot instance is already running (lock held on {})",
                path.display()
            )
        })?;

        file.set_len(0)?;
        writeln!(file, "{}", std::process::id())?;
        file.flush()?;
        log::info!("Instance lock acquired: {}", path.display());

        Ok(Self { file, path })
    }
}

impl Drop for InstanceLock {
    fn drop(&mut self) {
        let _ = self.file.unlock();
        log::info!("Instance lock released: {}", self.path.display());
    }
}
