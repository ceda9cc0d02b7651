//! Parsing and serialization of carvpath strings, with long-path elision.

use std::fmt;
use std::sync::Arc;

use carvfs_config::{log_path_debug, DEFAULT_MAX_TOKEN_LEN};
use dashmap::DashMap;

use crate::{CarvPathError, Entity, Result};

/// Number of hex digits in a digest token (256-bit digest)
const DIGEST_HEX_LEN: usize = 64;

/// Store mapping digest tokens back to the full carvpath they replace.
///
/// Implementations are shared between processes in production (see the LMDB
/// map in `carvfs-repo`), so both operations may fail.
pub trait LongPathMap: Send + Sync {
    /// Full carvpath for `digest`, if it was ever registered.
    fn get(&self, digest: &str) -> Result<Option<String>>;

    /// Register `digest -> path`. Registering the same pair twice is a no-op.
    fn insert(&self, digest: &str, path: &str) -> Result<()>;
}

/// Process-local long-path map.
#[derive(Debug, Default)]
pub struct MemoryLongPathMap {
    paths: DashMap<String, String>,
}

impl MemoryLongPathMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}

impl LongPathMap for MemoryLongPathMap {
    fn get(&self, digest: &str) -> Result<Option<String>> {
        Ok(self.paths.get(digest).map(|p| p.value().clone()))
    }

    fn insert(&self, digest: &str, path: &str) -> Result<()> {
        self.paths.insert(digest.to_string(), path.to_string());
        Ok(())
    }
}

/// `D` followed by the hex BLAKE2b-256 digest of `path`.
pub fn digest_token(path: &str) -> String {
    let hash = blake2b_simd::Params::new()
        .hash_length(32)
        .to_state()
        .update(path.as_bytes())
        .finalize();
    format!("D{}", hash.to_hex())
}

fn is_digest_token(level: &str) -> bool {
    level.len() == DIGEST_HEX_LEN + 1
        && level.starts_with('D')
        && level[1..].bytes().all(|b| b.is_ascii_hexdigit())
}

/// Parser/serializer bound to a long-path map and an elision threshold.
#[derive(Clone)]
pub struct Context {
    longpaths: Arc<dyn LongPathMap>,
    max_token_len: usize,
}

impl Context {
    pub fn new(longpaths: Arc<dyn LongPathMap>, max_token_len: usize) -> Self {
        Self {
            longpaths,
            max_token_len,
        }
    }

    /// Context with a fresh in-memory long-path map and the default threshold.
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryLongPathMap::new()), DEFAULT_MAX_TOKEN_LEN)
    }

    pub fn max_token_len(&self) -> usize {
        self.max_token_len
    }

    pub fn longpaths(&self) -> &Arc<dyn LongPathMap> {
        &self.longpaths
    }

    /// Parse a possibly nested carvpath into a single flattened entity.
    ///
    /// Every level after the first addresses the logical stream of the
    /// flattened levels before it and must lie within it.
    pub fn parse(&self, path: &str) -> Result<Entity> {
        let mut levels = path.split('/');
        // split always yields at least one item
        let first = levels.next().unwrap_or_default();
        let mut entity = self.parse_level(first)?;
        for level in levels {
            let child = self.parse_level(level)?;
            entity = entity.subentity(&child, false)?;
        }
        Ok(entity)
    }

    fn parse_level(&self, level: &str) -> Result<Entity> {
        if !level.starts_with('D') {
            return level.parse();
        }
        if !is_digest_token(level) {
            return Err(CarvPathError::malformed(level, "malformed digest token"));
        }
        match self.longpaths.get(level)? {
            Some(full) => {
                log_path_debug!("Resolved digest token", digest = level);
                full.parse()
            }
            None => Err(CarvPathError::malformed(level, "unknown digest token")),
        }
    }

    /// Canonical string for `entity`, replaced by a digest token when it
    /// would be longer than the configured threshold.
    pub fn serialize(&self, entity: &Entity) -> Result<String> {
        let full = entity.to_string();
        if full.len() <= self.max_token_len {
            return Ok(full);
        }
        let digest = digest_token(&full);
        self.longpaths.insert(&digest, &full)?;
        log_path_debug!(
            "Elided long carvpath",
            digest = digest.as_str(),
            len = full.len()
        );
        Ok(digest)
    }

    /// Parse then serialize: the canonical form of any valid address.
    pub fn flatten(&self, path: &str) -> Result<String> {
        self.serialize(&self.parse(path)?)
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::in_memory()
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("max_token_len", &self.max_token_len)
            .finish_non_exhaustive()
    }
}
