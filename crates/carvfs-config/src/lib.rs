//! # carvfs-config
//!
//! Configuration management for carvfs.
//!
//! Loads configuration from:
//! 1. `~/.carvfs/config.toml` (global)
//! 2. `.carvfs/config.toml` (project-local, overrides global)
//! 3. Environment variables (highest priority)
//!
//! Components never read configuration from ambient state: callers load a
//! [`Config`] once and hand the relevant values to constructors.

pub mod logging;
pub mod testing;

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::debug;

/// Default length above which serialized carvpaths are replaced by a digest token.
pub const DEFAULT_MAX_TOKEN_LEN: usize = 160;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub carvpath: CarvPathConfig,
    pub repository: RepositoryConfig,
    pub journal: JournalConfig,
    pub hashing: HashingConfig,
}

impl Config {
    /// Load config from standard locations
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = Config::default();

        // 1. Load global config (~/.carvfs/config.toml)
        if let Some(global_path) = Self::global_config_path() {
            if global_path.exists() {
                debug!("Loading global config from {:?}", global_path);
                config = Self::load_file(&global_path)?;
            }
        }

        // 2. Load project config (.carvfs/config.toml) - overrides global
        let project_path = Path::new(".carvfs/config.toml");
        if project_path.exists() {
            debug!("Loading project config from {:?}", project_path);
            config.merge(Self::load_file(project_path)?);
        }

        // 3. Apply environment variable overrides
        config.apply_env_overrides();

        Ok(config)
    }

    /// Parse a single TOML config file.
    pub fn load_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&contents)?)
    }

    /// Global config path: ~/.carvfs/config.toml
    pub fn global_config_path() -> Option<PathBuf> {
        dirs::home_dir().map(|h| h.join(".carvfs/config.toml"))
    }

    /// Merge a project config on top of this one.
    ///
    /// Only values that differ from the built-in defaults are taken over, so a
    /// project file that sets a single key leaves the rest of the global config
    /// in place.
    pub fn merge(&mut self, other: Config) {
        let defaults = Config::default();
        if other.carvpath.max_token_len != defaults.carvpath.max_token_len {
            self.carvpath.max_token_len = other.carvpath.max_token_len;
        }
        if other.carvpath.longpath_db != defaults.carvpath.longpath_db {
            self.carvpath.longpath_db = other.carvpath.longpath_db;
        }
        if other.repository.archive != defaults.repository.archive {
            self.repository.archive = other.repository.archive;
        }
        if other.journal.refcount_log != defaults.journal.refcount_log {
            self.journal.refcount_log = other.journal.refcount_log;
        }
        if other.journal.ohash_log != defaults.journal.ohash_log {
            self.journal.ohash_log = other.journal.ohash_log;
        }
        if other.hashing.algorithm != defaults.hashing.algorithm {
            self.hashing.algorithm = other.hashing.algorithm;
        }
    }

    /// Apply environment variable overrides
    pub fn apply_env_overrides(&mut self) {
        if let Ok(path) = std::env::var("CARVFS_ARCHIVE") {
            self.repository.archive = PathBuf::from(path);
        }
        if let Ok(len) = std::env::var("CARVFS_MAX_TOKEN_LEN") {
            if let Ok(n) = len.parse() {
                self.carvpath.max_token_len = n;
            }
        }
        if let Ok(algo) = std::env::var("CARVFS_HASH") {
            if let Ok(kind) = algo.parse() {
                self.hashing.algorithm = kind;
            }
        }
    }

    /// Generate default config TOML string
    pub fn default_toml() -> String {
        toml::to_string_pretty(&Config::default()).unwrap_or_default()
    }
}

/// Carvpath addressing configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CarvPathConfig {
    /// Serialized carvpaths longer than this are stored as `D<digest>` tokens
    pub max_token_len: usize,
    /// LMDB directory holding the digest → carvpath map
    pub longpath_db: PathBuf,
}

impl Default for CarvPathConfig {
    fn default() -> Self {
        Self {
            max_token_len: DEFAULT_MAX_TOKEN_LEN,
            longpath_db: PathBuf::from("/var/carvfs/longpath.lmdb"),
        }
    }
}

/// Backing store configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RepositoryConfig {
    /// The single flat archive file all carvpaths point into
    pub archive: PathBuf,
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self {
            archive: PathBuf::from("/var/carvfs/archive/0.dd"),
        }
    }
}

/// Append-only journal locations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JournalConfig {
    /// Refcount 0→1 / 1→0 transitions
    pub refcount_log: PathBuf,
    /// Completed opportunistic hashes
    pub ohash_log: PathBuf,
}

impl Default for JournalConfig {
    fn default() -> Self {
        Self {
            refcount_log: PathBuf::from("/var/carvfs/log/refcount.log"),
            ohash_log: PathBuf::from("/var/carvfs/log/ohash.log"),
        }
    }
}

/// Opportunistic hashing configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HashingConfig {
    pub algorithm: DigestKind,
}

/// Digest used for opportunistic hashing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DigestKind {
    /// BLAKE2b with a 256-bit output
    #[default]
    Blake2b,
    /// Parallel BLAKE2bp with a 256-bit output
    Blake2bp,
    Blake3,
}

impl DigestKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DigestKind::Blake2b => "blake2b",
            DigestKind::Blake2bp => "blake2bp",
            DigestKind::Blake3 => "blake3",
        }
    }
}

impl FromStr for DigestKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "blake2b" => Ok(DigestKind::Blake2b),
            "blake2bp" => Ok(DigestKind::Blake2bp),
            "blake3" => Ok(DigestKind::Blake3),
            other => Err(format!("unknown digest algorithm: {other}")),
        }
    }
}
