//! Append-only journal files.

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use carvfs_ohash::HashLog;
use carvfs_path::Entity;
use carvfs_refcount::{Transition, TransitionLog};
use chrono::Utc;
use parking_lot::Mutex;

/// An append-only line journal.
///
/// Serves both as the refcount transition log
/// (`<secs>.<micros>:<+|->:<ranges>`) and as the opportunistic hash log
/// (`<address>:<digest>`). Every line is written with a single `write` call.
#[derive(Debug)]
pub struct JournalFile {
    path: PathBuf,
    file: Mutex<File>,
}

impl JournalFile {
    /// Open `path` for appending, creating it and its directory if needed.
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn append(&self, line: String) -> io::Result<()> {
        self.file.lock().write_all(line.as_bytes())
    }
}

impl TransitionLog for JournalFile {
    fn record(&self, transition: Transition, ranges: &Entity) -> io::Result<()> {
        let now = Utc::now();
        self.append(format!(
            "{}.{:06}:{}:{}\n",
            now.timestamp(),
            now.timestamp_subsec_micros(),
            transition,
            ranges
        ))
    }
}

impl HashLog for JournalFile {
    fn record(&self, address: &str, digest: &str) -> io::Result<()> {
        self.append(format!("{}:{}\n", address, digest))
    }
}
