use std::fs::File;
use std::io;

use fs2::FileExt;

/// Exclusive advisory lock on the archive, released on drop.
///
/// Serializes archive growth between processes sharing the archive.
pub(crate) struct GrowLock<'a> {
    file: &'a File,
}

impl<'a> GrowLock<'a> {
    /// Block until the lock is held.
    pub(crate) fn acquire(file: &'a File) -> io::Result<Self> {
        file.lock_exclusive()?;
        Ok(Self { file })
    }
}

impl Drop for GrowLock<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.file.unlock() {
            let error = e.to_string();
            carvfs_config::log_repo_warn!("Failed to release grow lock", error = error.as_str());
        }
    }
}
