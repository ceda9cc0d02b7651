//! The archive repository and its open carvpath handles.

use std::fs::{File, OpenOptions};
use std::io;
use std::os::unix::fs::FileExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use carvfs_config::{
    log_repo_debug, log_repo_error, log_repo_info, log_repo_warn, Config, DigestKind,
};
use carvfs_ohash::{HashLog, MemoryHashLog, OpportunisticHashCollection};
use carvfs_path::{Context, Entity, Segment, Top};
use carvfs_refcount::{MemoryTransitionLog, Pick, RefcountStack, TransitionLog};
use parking_lot::Mutex;

use crate::lock::GrowLock;
use crate::{FadviseAdvisor, JournalFile, LmdbLongPathMap, Result};

/// Collaborators and tuning for [`Repository::open`].
#[derive(Clone)]
pub struct RepositoryOptions {
    pub digest: DigestKind,
    pub hash_log: Arc<dyn HashLog>,
    pub transition_log: Arc<dyn TransitionLog>,
}

impl RepositoryOptions {
    /// Journals at the configured locations.
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self {
            digest: config.hashing.algorithm,
            hash_log: Arc::new(JournalFile::open(&config.journal.ohash_log)?),
            transition_log: Arc::new(JournalFile::open(&config.journal.refcount_log)?),
        })
    }
}

impl Default for RepositoryOptions {
    /// In-memory journals and the default digest.
    fn default() -> Self {
        Self {
            digest: DigestKind::default(),
            hash_log: Arc::new(MemoryHashLog::new()),
            transition_log: Arc::new(MemoryTransitionLog::new()),
        }
    }
}

/// A flat, append-only archive file and everything currently open in it.
///
/// All stack and hash mutations, and the archive I/O of open carvpaths that
/// feeds them, go through one lock.
pub struct Repository {
    path: PathBuf,
    file: Arc<File>,
    context: Context,
    top: Mutex<Top>,
    stack: Mutex<RefcountStack>,
}

impl Repository {
    /// Open or create the archive at `path`.
    pub fn open(path: impl AsRef<Path>, context: Context, options: RepositoryOptions) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = Arc::new(
            OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .truncate(false)
                .open(&path)?,
        );
        let size = file.metadata()?.len();

        let advisor = FadviseAdvisor::new(file.clone());
        // Everything starts out cold.
        if let Err(e) = advisor.release_all() {
            let error = e.to_string();
            log_repo_warn!("Initial fadvise failed", error = error.as_str());
        }

        let hashes = OpportunisticHashCollection::new(options.digest, options.hash_log);
        let stack = RefcountStack::new(
            context.clone(),
            hashes,
            Arc::new(advisor),
            options.transition_log,
        );

        let location = path.display().to_string();
        log_repo_info!("Repository opened", path = location.as_str(), size = size);

        Ok(Self {
            path,
            file,
            context,
            top: Mutex::new(Top::new(size)),
            stack: Mutex::new(stack),
        })
    }

    /// Open the configured archive with the LMDB long-path map and journals.
    pub fn from_config(config: &Config) -> Result<Self> {
        let longpaths = LmdbLongPathMap::open(&config.carvpath.longpath_db)?;
        let context = Context::new(Arc::new(longpaths), config.carvpath.max_token_len);
        let options = RepositoryOptions::from_config(config)?;
        Self::open(&config.repository.archive, context, options)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn context(&self) -> &Context {
        &self.context
    }

    /// Current archive size as known to this process.
    pub fn size(&self) -> u64 {
        self.top.lock().size()
    }

    /// Append `chunk` bytes (sparse at first) to the archive. Returns the
    /// offset of the new chunk.
    pub fn grow(&self, chunk: u64) -> Result<u64> {
        let mut top = self.top.lock();
        let _lock = GrowLock::acquire(&self.file)?;
        let offset = self.file.metadata()?.len();
        let end = offset.checked_add(chunk).ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidInput, "archive size overflows u64")
        })?;
        self.file.set_len(end)?;
        top.grow_to(end);
        log_repo_debug!("Archive grown", offset = offset, chunk = chunk);
        Ok(offset)
    }

    /// Store `data` at the end of the archive and return its carvpath.
    pub fn snapshot(&self, data: &[u8]) -> Result<String> {
        let size = data.len() as u64;
        let offset = self.grow(size)?;
        self.file.write_all_at(data, offset)?;
        Ok(self.context.serialize(&Entity::from(Segment::fragment(offset, size)))?)
    }

    /// Allocate `size` fresh bytes for writing and return their carvpath.
    pub fn new_mutable(&self, size: u64) -> Result<String> {
        let offset = self.grow(size)?;
        Ok(self.context.serialize(&Entity::from(Segment::fragment(offset, size)))?)
    }

    /// Adopt growth made by other processes. Returns the number of bytes
    /// gained.
    pub fn multi_sync(&self) -> Result<u64> {
        let len = self.file.metadata()?.len();
        let mut top = self.top.lock();
        let grown = len.saturating_sub(top.size());
        top.grow(grown)?;
        if grown > 0 {
            log_repo_debug!("Adopted external growth", grown = grown);
        }
        Ok(grown)
    }

    /// Parse `address` and make sure it lies within the archive, syncing
    /// with other processes once before giving up.
    fn resolve(&self, address: &str) -> Result<Entity> {
        let entity = self.context.parse(address)?;
        if self.top.lock().test(&entity) {
            return Ok(entity);
        }
        self.multi_sync()?;
        self.top.lock().check(&entity)?;
        Ok(entity)
    }

    /// Is `address` well formed and within the archive?
    pub fn is_valid(&self, address: &str) -> bool {
        self.resolve(address).is_ok()
    }

    /// Flatten `sub`, addressed relative to `base`, into one carvpath.
    pub fn flatten(&self, base: &str, sub: &str) -> Result<String> {
        Ok(self.context.flatten(&format!("{}/{}", base, sub))?)
    }

    /// Bytes referenced by at least one open carvpath.
    pub fn volume(&self) -> u64 {
        self.stack.lock().volume()
    }

    /// `(referenced, unreferenced)` bytes of the whole archive.
    pub fn throttle_info(&self) -> (u64, u64) {
        let volume = self.volume();
        (volume, self.size().saturating_sub(volume))
    }

    /// `(referenced, unreferenced)` bytes of `address`.
    pub fn advisory_info(&self, address: &str) -> Result<(u64, u64)> {
        Ok(self.stack.lock().advisory_info(address)?)
    }

    /// Best of `candidates` under `policy`. Every candidate must be open.
    pub fn best<I, S>(&self, policy: &str, candidates: I) -> Result<Option<Pick>>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Ok(self.stack.lock().priority_pick(policy, candidates)?)
    }

    /// Open `address`; it stays referenced until the handle is dropped.
    pub fn open_carvpath(&self, address: &str) -> Result<OpenCarvPath<'_>> {
        let entity = self.resolve(address)?;
        self.stack.lock().add(address)?;
        Ok(OpenCarvPath {
            repo: self,
            address: address.to_string(),
            entity,
        })
    }

    /// No more writes will happen to the open `address`.
    pub fn freeze(&self, address: &str) -> Result<()> {
        Ok(self.stack.lock().freeze(address)?)
    }

    /// Digest of an open address, or the incomplete sentinel.
    pub fn hash_result(&self, address: &str) -> Option<String> {
        self.stack.lock().hashes().result(address).map(str::to_string)
    }

    pub fn hash_done(&self, address: &str) -> Option<bool> {
        self.stack.lock().hashes().is_done(address)
    }

    /// Logical offset up to which an open address has been hashed.
    pub fn hash_offset(&self, address: &str) -> Option<u64> {
        self.stack.lock().hashes().offset(address)
    }

    /// fsync the archive.
    pub fn flush(&self) -> Result<()> {
        self.file.sync_all()?;
        Ok(())
    }

    /// Refcount stack debug dump.
    pub fn dump(&self) -> String {
        self.stack.lock().to_string()
    }

    fn release(&self, address: &str) {
        if let Err(e) = self.stack.lock().remove(address) {
            let error = e.to_string();
            log_repo_error!("Failed to release carvpath", address = address, error = error.as_str());
        }
    }
}

impl std::fmt::Debug for Repository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Repository")
            .field("path", &self.path)
            .field("size", &self.size())
            .finish_non_exhaustive()
    }
}

/// An open carvpath. Reads and writes address its logical stream; dropping
/// the handle releases its references.
pub struct OpenCarvPath<'a> {
    repo: &'a Repository,
    address: String,
    entity: Entity,
}

impl OpenCarvPath<'_> {
    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn entity(&self) -> &Entity {
        &self.entity
    }

    pub fn size(&self) -> u64 {
        self.entity.total_size()
    }

    /// Backing segments of `[offset, offset + size)`, clipped to the entity.
    fn project(&self, offset: u64, size: u64) -> Result<Entity> {
        let range = Entity::from(Segment::fragment(offset, size));
        Ok(self.entity.subentity(&range, true)?)
    }

    /// Read up to `size` bytes at logical `offset`. Sparse runs read as
    /// zeros.
    ///
    /// The stack lock is held across the I/O so hash events reach the
    /// collection in the order the archive saw them.
    pub fn read(&self, offset: u64, size: u64) -> Result<Vec<u8>> {
        let chunks = self.project(offset, size)?;
        let mut buf = vec![0u8; chunks.total_size() as usize];
        let mut stack = self.repo.stack.lock();
        let mut at = 0usize;
        for chunk in chunks.segments() {
            let len = chunk.size() as usize;
            if let Segment::Fragment { offset, .. } = *chunk {
                let slice = &mut buf[at..at + len];
                self.repo.file.read_exact_at(slice, offset)?;
                stack.hashes_mut().read(offset, slice);
            }
            at += len;
        }
        Ok(buf)
    }

    /// Write `data` at logical `offset`. Bytes past the end of the entity or
    /// over sparse runs are dropped. Returns the number of bytes stored.
    pub fn write(&self, offset: u64, data: &[u8]) -> Result<usize> {
        let chunks = self.project(offset, data.len() as u64)?;
        let mut stack = self.repo.stack.lock();
        let mut stored = 0usize;
        let mut at = 0usize;
        for chunk in chunks.segments() {
            let len = chunk.size() as usize;
            if let Segment::Fragment { offset, .. } = *chunk {
                let slice = &data[at..at + len];
                self.repo.file.write_all_at(slice, offset)?;
                stack.hashes_mut().written(offset, slice);
                stored += len;
            }
            at += len;
        }
        Ok(stored)
    }
}

impl Drop for OpenCarvPath<'_> {
    fn drop(&mut self) {
        self.repo.release(&self.address);
    }
}

impl std::fmt::Debug for OpenCarvPath<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenCarvPath")
            .field("address", &self.address)
            .field("entity", &self.entity)
            .finish()
    }
}
