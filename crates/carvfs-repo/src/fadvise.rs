//! posix_fadvise on the archive descriptor.

use std::fs::File;
use std::io;
use std::sync::Arc;

use carvfs_refcount::CacheAdvisor;

/// Page-cache advice for the archive file.
///
/// Referenced ranges get `WILLNEED`, released ranges `DONTNEED`. On
/// platforms without `posix_fadvise` the advice is dropped.
#[derive(Debug, Clone)]
pub struct FadviseAdvisor {
    file: Arc<File>,
}

impl FadviseAdvisor {
    pub fn new(file: Arc<File>) -> Self {
        Self { file }
    }

    /// Mark the whole archive as cold.
    pub fn release_all(&self) -> io::Result<()> {
        // A zero length reaches to the end of the file.
        self.advise(0, 0, false)
    }
}

#[cfg(any(target_os = "linux", target_os = "android", target_os = "freebsd"))]
impl CacheAdvisor for FadviseAdvisor {
    fn advise(&self, offset: u64, size: u64, will_need: bool) -> io::Result<()> {
        use nix::fcntl::{posix_fadvise, PosixFadviseAdvice};
        use nix::libc::off_t;
        use std::os::unix::io::AsRawFd;

        let to_off = |v: u64| {
            off_t::try_from(v).map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "range exceeds off_t"))
        };
        let advice = if will_need {
            PosixFadviseAdvice::POSIX_FADV_WILLNEED
        } else {
            PosixFadviseAdvice::POSIX_FADV_DONTNEED
        };
        posix_fadvise(self.file.as_raw_fd(), to_off(offset)?, to_off(size)?, advice)
            .map_err(io::Error::from)
    }
}

#[cfg(not(any(target_os = "linux", target_os = "android", target_os = "freebsd")))]
impl CacheAdvisor for FadviseAdvisor {
    fn advise(&self, _offset: u64, _size: u64, _will_need: bool) -> io::Result<()> {
        Ok(())
    }
}
