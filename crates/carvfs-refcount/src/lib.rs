//! # carvfs-refcount
//!
//! Reference counting for open carvpaths without per-byte counters.
//!
//! The stack keeps one interval set per reference depth: level `i` holds the
//! bytes referenced by more than `i` open entities. Opening and closing an
//! address moves byte ranges between levels and reports the ranges that
//! crossed the 0↔1 boundary, which drive page-cache advice.
//!
//! ```text
//! add("10+5"), add("13+5")
//!   L1 :       13+2
//!   L0 : 10+8
//! ```

mod advisor;
mod policy;
mod stack;

pub use advisor::{
    CacheAdvisor, MemoryCacheAdvisor, MemoryTransitionLog, Transition, TransitionLog,
};
pub use policy::{Pick, Policy, PolicyKey};
pub use stack::{Impact, RefcountStack};

use carvfs_path::CarvPathError;
use thiserror::Error;

/// Errors produced by the refcount stack
#[derive(Error, Debug)]
pub enum StackError {
    #[error(transparent)]
    Path(#[from] CarvPathError),

    #[error("Carvpath {0} not found on refcount stack")]
    UnknownAddress(String),

    #[error("Refcount stack corrupted: {0}")]
    Corrupted(String),

    #[error("Invalid pick policy {policy:?}: {reason}")]
    InvalidPolicy { policy: String, reason: String },
}

pub type Result<T> = std::result::Result<T, StackError>;
