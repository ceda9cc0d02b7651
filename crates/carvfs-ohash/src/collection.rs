//! All entities currently eligible for opportunistic hashing.

use std::collections::HashMap;
use std::sync::Arc;

use carvfs_config::{log_ohash_debug, log_ohash_info, log_ohash_warn, DigestKind};
use carvfs_path::Entity;

use crate::{HashLog, TrackedHash};

struct Candidate {
    /// Canonical address written to the hash log
    canonical: String,
    tracked: TrackedHash,
}

/// Fans low-level read/write events out to every open entity.
///
/// Keyed by the address string the entity was opened under. Completed
/// digests are appended to the [`HashLog`] as `<canonical>:<digest>`.
pub struct OpportunisticHashCollection {
    kind: DigestKind,
    candidates: HashMap<String, Candidate>,
    log: Arc<dyn HashLog>,
}

impl OpportunisticHashCollection {
    pub fn new(kind: DigestKind, log: Arc<dyn HashLog>) -> Self {
        Self {
            kind,
            candidates: HashMap::new(),
            log,
        }
    }

    pub fn digest_kind(&self) -> DigestKind {
        self.kind
    }

    /// Start tracking `entity` under `address`. An address that is already
    /// tracked keeps its progress.
    pub fn add(&mut self, address: &str, canonical: String, entity: Entity) {
        if self.candidates.contains_key(address) {
            return;
        }
        let tracked = TrackedHash::new(entity, self.kind);
        log_ohash_debug!("Tracking entity", address = address, size = tracked.entity().total_size());
        let done = tracked.is_done();
        let candidate = Candidate { canonical, tracked };
        if done {
            self.report(&candidate);
        }
        self.candidates.insert(address.to_string(), candidate);
    }

    /// Stop tracking `address`. Returns `false` when it was not tracked.
    pub fn remove(&mut self, address: &str) -> bool {
        self.candidates.remove(address).is_some()
    }

    pub fn contains(&self, address: &str) -> bool {
        self.candidates.contains_key(address)
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    /// `data` was written to the backing store at `offset`.
    pub fn written(&mut self, offset: u64, data: &[u8]) {
        for candidate in self.candidates.values_mut() {
            if candidate.tracked.written(offset, data) {
                Self::report_to(&*self.log, candidate);
            }
        }
    }

    /// `data` was read from the backing store at `offset`.
    pub fn read(&mut self, offset: u64, data: &[u8]) {
        for candidate in self.candidates.values_mut() {
            if candidate.tracked.read(offset, data) {
                Self::report_to(&*self.log, candidate);
            }
        }
    }

    /// No more writes will happen to `address`. Returns `false` when it was
    /// not tracked.
    pub fn freeze(&mut self, address: &str) -> bool {
        let Some(candidate) = self.candidates.get_mut(address) else {
            return false;
        };
        if candidate.tracked.freeze() {
            Self::report_to(&*self.log, candidate);
        }
        true
    }

    pub fn is_done(&self, address: &str) -> Option<bool> {
        self.get(address).map(TrackedHash::is_done)
    }

    /// Hex digest, or the incomplete sentinel while hashing is in progress.
    pub fn result(&self, address: &str) -> Option<&str> {
        self.get(address).map(TrackedHash::result)
    }

    /// Logical offset of the first byte not hashed yet.
    pub fn offset(&self, address: &str) -> Option<u64> {
        self.get(address).map(TrackedHash::offset)
    }

    pub fn get(&self, address: &str) -> Option<&TrackedHash> {
        self.candidates.get(address).map(|c| &c.tracked)
    }

    fn report(&self, candidate: &Candidate) {
        Self::report_to(&*self.log, candidate);
    }

    fn report_to(log: &dyn HashLog, candidate: &Candidate) {
        let digest = candidate.tracked.result();
        log_ohash_info!(
            "Opportunistic hash complete",
            address = candidate.canonical.as_str(),
            digest = digest
        );
        if let Err(e) = log.record(&candidate.canonical, digest) {
            let error = e.to_string();
            log_ohash_warn!("Failed to record hash", error = error.as_str());
        }
    }
}

impl std::fmt::Debug for OpportunisticHashCollection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpportunisticHashCollection")
            .field("kind", &self.kind)
            .field("candidates", &self.candidates.len())
            .finish_non_exhaustive()
    }
}
