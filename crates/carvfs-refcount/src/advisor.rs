//! Collaborators notified when byte ranges cross the 0↔1 refcount boundary.

use std::fmt;
use std::io;
use std::sync::Arc;

use carvfs_path::Entity;
use parking_lot::Mutex;

/// Page-cache advice for a backing-store range.
pub trait CacheAdvisor: Send + Sync {
    /// `will_need` is true for 0→1 transitions, false for 1→0.
    fn advise(&self, offset: u64, size: u64, will_need: bool) -> io::Result<()>;
}

/// Direction of a refcount boundary crossing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// 0 → 1
    Referenced,
    /// 1 → 0
    Released,
}

impl Transition {
    pub fn symbol(self) -> char {
        match self {
            Transition::Referenced => '+',
            Transition::Released => '-',
        }
    }
}

impl fmt::Display for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.symbol())
    }
}

/// Append-only audit sink for boundary crossings.
pub trait TransitionLog: Send + Sync {
    fn record(&self, transition: Transition, ranges: &Entity) -> io::Result<()>;
}

impl<T: CacheAdvisor + ?Sized> CacheAdvisor for Arc<T> {
    fn advise(&self, offset: u64, size: u64, will_need: bool) -> io::Result<()> {
        (**self).advise(offset, size, will_need)
    }
}

impl<T: TransitionLog + ?Sized> TransitionLog for Arc<T> {
    fn record(&self, transition: Transition, ranges: &Entity) -> io::Result<()> {
        (**self).record(transition, ranges)
    }
}

/// Records advice instead of issuing it.
#[derive(Debug, Default)]
pub struct MemoryCacheAdvisor {
    calls: Mutex<Vec<(u64, u64, bool)>>,
}

impl MemoryCacheAdvisor {
    pub fn new() -> Self {
        Self::default()
    }

    /// `(offset, size, will_need)` in call order.
    pub fn calls(&self) -> Vec<(u64, u64, bool)> {
        self.calls.lock().clone()
    }
}

impl CacheAdvisor for MemoryCacheAdvisor {
    fn advise(&self, offset: u64, size: u64, will_need: bool) -> io::Result<()> {
        self.calls.lock().push((offset, size, will_need));
        Ok(())
    }
}

/// Keeps transitions in memory.
#[derive(Debug, Default)]
pub struct MemoryTransitionLog {
    entries: Mutex<Vec<(Transition, String)>>,
}

impl MemoryTransitionLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<(Transition, String)> {
        self.entries.lock().clone()
    }
}

impl TransitionLog for MemoryTransitionLog {
    fn record(&self, transition: Transition, ranges: &Entity) -> io::Result<()> {
        self.entries.lock().push((transition, ranges.to_string()));
        Ok(())
    }
}
