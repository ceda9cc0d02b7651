//! Digest accumulators behind one interface.

use carvfs_config::DigestKind;

/// Output length of every supported digest, in bytes
pub(crate) const DIGEST_LEN: usize = 32;

#[derive(Clone)]
pub(crate) enum Hasher {
    Blake2b(blake2b_simd::State),
    Blake2bp(blake2b_simd::blake2bp::State),
    Blake3(Box<blake3::Hasher>),
}

impl Hasher {
    pub(crate) fn new(kind: DigestKind) -> Self {
        match kind {
            DigestKind::Blake2b => Hasher::Blake2b(
                blake2b_simd::Params::new()
                    .hash_length(DIGEST_LEN)
                    .to_state(),
            ),
            DigestKind::Blake2bp => Hasher::Blake2bp(
                blake2b_simd::blake2bp::Params::new()
                    .hash_length(DIGEST_LEN)
                    .to_state(),
            ),
            DigestKind::Blake3 => Hasher::Blake3(Box::new(blake3::Hasher::new())),
        }
    }

    pub(crate) fn update(&mut self, data: &[u8]) {
        match self {
            Hasher::Blake2b(state) => {
                state.update(data);
            }
            Hasher::Blake2bp(state) => {
                state.update(data);
            }
            Hasher::Blake3(hasher) => {
                hasher.update(data);
            }
        }
    }

    pub(crate) fn finalize_hex(&self) -> String {
        match self {
            Hasher::Blake2b(state) => state.finalize().to_hex().to_string(),
            Hasher::Blake2bp(state) => state.finalize().to_hex().to_string(),
            Hasher::Blake3(hasher) => hasher.finalize().to_hex().to_string(),
        }
    }
}

/// One-shot digest, used by tests to compute expected values.
#[cfg(test)]
pub(crate) fn digest_hex(kind: DigestKind, data: &[u8]) -> String {
    let mut hasher = Hasher::new(kind);
    hasher.update(data);
    hasher.finalize_hex()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_incremental_matches_one_shot() {
        for kind in [DigestKind::Blake2b, DigestKind::Blake2bp, DigestKind::Blake3] {
            let mut hasher = Hasher::new(kind);
            hasher.update(b"carved ");
            hasher.update(b"bytes");
            assert_eq!(hasher.finalize_hex(), digest_hex(kind, b"carved bytes"));
            assert_eq!(hasher.finalize_hex().len(), DIGEST_LEN * 2);
        }
    }

    #[test]
    fn test_kinds_differ() {
        let a = digest_hex(DigestKind::Blake2b, b"x");
        let b = digest_hex(DigestKind::Blake2bp, b"x");
        let c = digest_hex(DigestKind::Blake3, b"x");
        assert_ne!(a, b);
        assert_ne!(a, c);
    }
}
