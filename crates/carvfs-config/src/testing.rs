//! Test environment abstraction for isolated testing.
//!
//! Provides `TestEnvironment` to manage:
//! - A temporary archive file
//! - Isolated journal files
//! - A private long-path LMDB directory
//!
//! # Usage
//!
//! ```ignore
//! use carvfs_config::testing::TestEnvironment;
//!
//! #[test]
//! fn test_something() {
//!     let env = TestEnvironment::new().unwrap();
//!     env.write_archive(b"hello")?;
//!     let repo = Repository::from_config(&env.config())?;
//! }
//! ```

use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};
use tempfile::TempDir;

use crate::{Config, DigestKind};

/// Atomic counter for unique test IDs
static TEST_COUNTER: AtomicU32 = AtomicU32::new(0);

/// Isolated test environment with unique paths
pub struct TestEnvironment {
    /// Temporary directory (dropped on cleanup)
    _temp_dir: TempDir,
    /// Backing archive file (not created until written)
    pub archive: PathBuf,
    /// Journal directory
    pub log_dir: PathBuf,
    /// LMDB long-path map directory
    pub longpath_db: PathBuf,
    /// Unique test ID
    pub test_id: u32,
}

impl TestEnvironment {
    /// Create a new isolated test environment
    pub fn new() -> anyhow::Result<Self> {
        let test_id = TEST_COUNTER.fetch_add(1, Ordering::Relaxed);
        let temp_dir = TempDir::new()?;
        let root = temp_dir.path();

        let log_dir = root.join("log");
        let longpath_db = root.join("longpath.lmdb");
        std::fs::create_dir_all(&log_dir)?;

        let archive = root.join(format!("archive-{}.dd", test_id));

        Ok(Self {
            _temp_dir: temp_dir,
            archive,
            log_dir,
            longpath_db,
            test_id,
        })
    }

    /// Refcount transition journal path
    pub fn refcount_log(&self) -> PathBuf {
        self.log_dir.join("refcount.log")
    }

    /// Opportunistic hash journal path
    pub fn ohash_log(&self) -> PathBuf {
        self.log_dir.join("ohash.log")
    }

    /// Replace the archive contents
    pub fn write_archive(&self, content: &[u8]) -> anyhow::Result<()> {
        std::fs::write(&self.archive, content)?;
        Ok(())
    }

    /// Read back a journal as lines (empty when it was never written)
    pub fn journal_lines(&self, path: &std::path::Path) -> anyhow::Result<Vec<String>> {
        if !path.exists() {
            return Ok(Vec::new());
        }
        let contents = std::fs::read_to_string(path)?;
        Ok(contents.lines().map(str::to_string).collect())
    }

    /// Build a Config pointing every path into this environment.
    pub fn config(&self) -> Config {
        let mut cfg = Config::default();
        cfg.repository.archive = self.archive.clone();
        cfg.carvpath.longpath_db = self.longpath_db.clone();
        cfg.journal.refcount_log = self.refcount_log();
        cfg.journal.ohash_log = self.ohash_log();
        cfg.hashing.algorithm = DigestKind::Blake2b;
        cfg
    }
}

impl Default for TestEnvironment {
    fn default() -> Self {
        Self::new().expect("Failed to create test environment")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_environment_creates_directories() {
        let env = TestEnvironment::new().unwrap();
        assert!(env.log_dir.exists());
        assert!(!env.archive.exists());
    }

    #[test]
    fn test_environment_has_unique_archive() {
        let env1 = TestEnvironment::new().unwrap();
        let env2 = TestEnvironment::new().unwrap();
        assert_ne!(env1.archive, env2.archive);
    }

    #[test]
    fn test_write_archive() {
        let env = TestEnvironment::new().unwrap();
        env.write_archive(b"carved bytes").unwrap();
        assert_eq!(std::fs::read(&env.archive).unwrap(), b"carved bytes");
    }

    #[test]
    fn test_config_points_into_env() {
        let env = TestEnvironment::new().unwrap();
        let cfg = env.config();
        assert_eq!(cfg.repository.archive, env.archive);
        assert!(cfg.journal.ohash_log.starts_with(&env.log_dir));
        assert!(env.journal_lines(&cfg.journal.ohash_log).unwrap().is_empty());
    }
}
