//! Cursor state machine for one entity, in the entity's logical offset space.

use carvfs_config::DigestKind;

use crate::hasher::Hasher;

/// Result reported while an entity's hash has not completed.
pub const INCOMPLETE: &str = "INCOMPLETE-OPPORTUNISTIC_HASHING";

/// Zero runs are folded in pieces of this size.
const ZERO_CHUNK: usize = 64 * 1024;
static ZEROS: [u8; ZERO_CHUNK] = [0; ZERO_CHUNK];

/// Incremental digest over a fixed-size logical byte stream.
///
/// Bytes are folded strictly in order: `processed` is the logical offset of
/// the first byte not yet hashed. Data ahead of the cursor is ignored unless
/// the gap can be assumed to be clean sparse (never written, so zero).
pub struct OpportunisticHash {
    kind: DigestKind,
    hasher: Hasher,
    total: u64,
    processed: u64,
    done: bool,
    result: Option<String>,
    clean_sparse: bool,
}

impl OpportunisticHash {
    pub fn new(total: u64, kind: DigestKind) -> Self {
        Self {
            kind,
            hasher: Hasher::new(kind),
            total,
            processed: 0,
            done: false,
            result: None,
            clean_sparse: true,
        }
    }

    #[inline]
    pub fn processed_offset(&self) -> u64 {
        self.processed
    }

    #[inline]
    pub fn total_size(&self) -> u64 {
        self.total
    }

    #[inline]
    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Hex digest once done, [`INCOMPLETE`] before.
    pub fn result(&self) -> &str {
        self.result.as_deref().unwrap_or(INCOMPLETE)
    }

    pub fn is_clean_sparse(&self) -> bool {
        self.clean_sparse
    }

    pub fn digest_kind(&self) -> DigestKind {
        self.kind
    }

    /// Data written at logical `offset`.
    ///
    /// A write behind the cursor invalidates everything hashed so far, even
    /// after completion.
    pub fn written_chunk(&mut self, data: &[u8], offset: u64) {
        if offset < self.processed {
            self.reset();
        }
        if offset > self.processed && self.clean_sparse {
            let gap = offset - self.processed;
            self.fold_zeros(gap);
        }
        if offset == self.processed {
            self.fold(data);
        }
        self.complete();
    }

    /// Data read at logical `offset`. Reads never reset; the part before the
    /// cursor is trimmed off.
    pub fn read_chunk(&mut self, data: &[u8], offset: u64) {
        let len = data.len() as u64;
        if self.done || offset > self.processed || offset + len <= self.processed {
            return;
        }
        let start = (self.processed - offset) as usize;
        self.fold(&data[start..]);
        self.complete();
    }

    /// A virtual zero run of `len` bytes at logical `offset`; behaves like a
    /// read of zeros.
    pub fn sparse(&mut self, len: u64, offset: u64) {
        if self.done || offset > self.processed || offset + len <= self.processed {
            return;
        }
        let remaining = offset + len - self.processed;
        self.fold_zeros(remaining);
        self.complete();
    }

    /// No more writes will happen. When the stream is still clean sparse,
    /// the unhashed tail is taken to be zeros.
    pub fn freeze(&mut self) {
        if self.clean_sparse && !self.done {
            let tail = self.total - self.processed;
            self.fold_zeros(tail);
            self.complete();
        }
    }

    fn reset(&mut self) {
        self.hasher = Hasher::new(self.kind);
        self.processed = 0;
        self.done = false;
        self.result = None;
        self.clean_sparse = false;
    }

    fn fold(&mut self, data: &[u8]) {
        self.hasher.update(data);
        self.processed += data.len() as u64;
    }

    fn fold_zeros(&mut self, mut len: u64) {
        while len > 0 {
            let step = len.min(ZERO_CHUNK as u64) as usize;
            self.fold(&ZEROS[..step]);
            len -= step as u64;
        }
    }

    fn complete(&mut self) {
        if !self.done && self.processed > 0 && self.processed == self.total {
            self.result = Some(self.hasher.finalize_hex());
            self.done = true;
        }
    }
}

impl std::fmt::Debug for OpportunisticHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpportunisticHash")
            .field("kind", &self.kind)
            .field("total", &self.total)
            .field("processed", &self.processed)
            .field("done", &self.done)
            .field("clean_sparse", &self.clean_sparse)
            .finish()
    }
}
