use std::io;
use std::sync::Arc;

use parking_lot::Mutex;

/// Append-only sink for completed opportunistic digests.
pub trait HashLog: Send + Sync {
    /// Record that `address` hashed to `digest`.
    fn record(&self, address: &str, digest: &str) -> io::Result<()>;
}

impl<T: HashLog + ?Sized> HashLog for Arc<T> {
    fn record(&self, address: &str, digest: &str) -> io::Result<()> {
        (**self).record(address, digest)
    }
}

/// In-memory hash log, for tests and embedders without a journal.
#[derive(Debug, Default)]
pub struct MemoryHashLog {
    entries: Mutex<Vec<(String, String)>>,
}

impl MemoryHashLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// `(address, digest)` pairs in recording order.
    pub fn entries(&self) -> Vec<(String, String)> {
        self.entries.lock().clone()
    }

    /// Most recent digest recorded for `address`.
    pub fn digest_of(&self, address: &str) -> Option<String> {
        self.entries
            .lock()
            .iter()
            .rev()
            .find(|(a, _)| a == address)
            .map(|(_, d)| d.clone())
    }
}

impl HashLog for MemoryHashLog {
    fn record(&self, address: &str, digest: &str) -> io::Result<()> {
        self.entries
            .lock()
            .push((address.to_string(), digest.to_string()));
        Ok(())
    }
}
