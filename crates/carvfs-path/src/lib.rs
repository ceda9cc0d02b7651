//! # carvfs-path
//!
//! CarvPath interval algebra for addressing fragmented, sparse regions of a
//! single flat backing store without copying bytes.
//!
//! ## Address grammar
//!
//! ```text
//! 0+4096_S8192_4096+4096            one level: fragment, sparse run, fragment
//! 0+20000_40000+20000/10000+20000   nested: right level addresses the left one
//! D901141262aa24ea...fe3fa480       digest token standing in for a long path
//! ```
//!
//! Fragments are `<offset>+<size>`, sparse runs `S<size>`. Levels are
//! flattened left to right, so every address resolves to a single [`Entity`]
//! over the backing store.
//!
//! ## Layout
//!
//! - [`Segment`] / [`Entity`]: the value types
//! - [`Context`]: parsing and serialization, including long-path elision
//! - [`Top`]: the backing store's current extent
//! - [`sweep`]: the interval kernel behind merge, unmerge and overlap

mod context;
mod entity;
mod segment;
pub mod sweep;
mod top;

pub use context::{digest_token, Context, LongPathMap, MemoryLongPathMap};
pub use entity::{Entity, SubChunks};
pub use segment::Segment;
pub use top::Top;

use thiserror::Error;

/// Errors produced by the interval algebra
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CarvPathError {
    #[error("Malformed carvpath {token:?}: {reason}")]
    MalformedAddress { token: String, reason: String },

    #[error("Range {offset}+{size} exceeds entity of size {total}")]
    OutOfRange { offset: u64, size: u64, total: u64 },

    #[error("Long-path map error: {0}")]
    LongPath(String),
}

impl CarvPathError {
    pub(crate) fn malformed(token: &str, reason: &str) -> Self {
        CarvPathError::MalformedAddress {
            token: token.to_string(),
            reason: reason.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, CarvPathError>;
