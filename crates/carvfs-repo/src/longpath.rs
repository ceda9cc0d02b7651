//! LMDB-backed long-path map shared by every process using the archive.

use std::path::Path;

use carvfs_config::log_repo_debug;
use carvfs_path::{CarvPathError, LongPathMap};
use heed::types::Str;
use heed::{Database, Env, EnvOpenOptions};

fn lmdb_error(e: heed::Error) -> CarvPathError {
    CarvPathError::LongPath(e.to_string())
}

/// Digest token → full carvpath, persisted in LMDB.
pub struct LmdbLongPathMap {
    env: Env,
    paths: Database<Str, Str>,
}

impl LmdbLongPathMap {
    /// Default LMDB map size: 1GB
    const DEFAULT_MAP_SIZE: usize = 1024 * 1024 * 1024;

    /// Maximum readers
    const MAX_READERS: u32 = 128;

    /// Open or create the map in directory `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> crate::Result<Self> {
        let path = path.as_ref();
        std::fs::create_dir_all(path)?;

        let env = unsafe {
            EnvOpenOptions::new()
                .map_size(Self::DEFAULT_MAP_SIZE)
                .max_readers(Self::MAX_READERS)
                .max_dbs(1)
                .open(path)?
        };

        let mut wtxn = env.write_txn()?;
        let paths = env.create_database(&mut wtxn, Some("longpaths"))?;
        wtxn.commit()?;

        let location = path.display().to_string();
        log_repo_debug!("Opened long-path map", path = location.as_str());

        Ok(Self { env, paths })
    }

    /// Number of registered digests.
    pub fn len(&self) -> crate::Result<u64> {
        let rtxn = self.env.read_txn()?;
        Ok(self.paths.len(&rtxn)?)
    }
}

impl LongPathMap for LmdbLongPathMap {
    fn get(&self, digest: &str) -> carvfs_path::Result<Option<String>> {
        let rtxn = self.env.read_txn().map_err(lmdb_error)?;
        let path = self.paths.get(&rtxn, digest).map_err(lmdb_error)?;
        Ok(path.map(str::to_string))
    }

    fn insert(&self, digest: &str, path: &str) -> carvfs_path::Result<()> {
        let mut wtxn = self.env.write_txn().map_err(lmdb_error)?;
        self.paths.put(&mut wtxn, digest, path).map_err(lmdb_error)?;
        wtxn.commit().map_err(lmdb_error)
    }
}
