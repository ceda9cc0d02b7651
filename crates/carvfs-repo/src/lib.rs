//! # carvfs-repo
//!
//! The repository owns the single flat archive file every carvpath points
//! into. It grows the archive under an exclusive lock, hands out snapshot
//! and mutable carvpaths, and routes reads and writes of open carvpaths
//! through the refcount stack and the opportunistic hash engine.
//!
//! ## Collaborators
//!
//! - [`FadviseAdvisor`]: page-cache advice on the archive descriptor
//! - [`JournalFile`]: append-only refcount and hash journals
//! - [`LmdbLongPathMap`]: persistent digest → carvpath map

mod fadvise;
mod journal;
mod lock;
mod longpath;
mod repository;

pub use fadvise::FadviseAdvisor;
pub use journal::JournalFile;
pub use longpath::LmdbLongPathMap;
pub use repository::{OpenCarvPath, Repository, RepositoryOptions};

use carvfs_config::ConfigError;
use carvfs_path::CarvPathError;
use carvfs_refcount::StackError;
use thiserror::Error;

/// Errors produced by the repository
#[derive(Error, Debug)]
pub enum RepoError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Path(#[from] CarvPathError),

    #[error(transparent)]
    Stack(#[from] StackError),

    #[error("LMDB error: {0}")]
    Lmdb(#[from] heed::Error),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

pub type Result<T> = std::result::Result<T, RepoError>;
