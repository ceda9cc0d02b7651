//! # carvfs-ohash
//!
//! Opportunistic hashing: every open carvpath entity folds a digest over its
//! logical byte stream purely as a side effect of reads and writes that
//! happen to touch its bytes. No data is ever read just to hash it.
//!
//! - [`OpportunisticHash`]: per-entity cursor state machine in logical space
//! - [`TrackedHash`]: maps backing-store chunks onto one entity
//! - [`OpportunisticHashCollection`]: fans events out to every open entity
//! - [`HashLog`]: sink for completed digests

mod collection;
mod hasher;
mod log;
mod state;
mod tracked;

pub use carvfs_config::DigestKind;
pub use collection::OpportunisticHashCollection;
pub use log::{HashLog, MemoryHashLog};
pub use state::{OpportunisticHash, INCOMPLETE};
pub use tracked::TrackedHash;
