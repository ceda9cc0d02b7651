//! Maps backing-store chunks onto one entity's logical stream.

use carvfs_config::DigestKind;
use carvfs_path::{Entity, Segment};

use crate::OpportunisticHash;

/// Opportunistic hash of one entity, fed with backing-store events.
#[derive(Debug)]
pub struct TrackedHash {
    entity: Entity,
    hash: OpportunisticHash,
    /// Inclusive backing span of the whole entity, for writes
    write_span: Option<(u64, u64)>,
    /// Backing offset of the byte the cursor waits for, for reads
    next_needed: Option<u64>,
}

impl TrackedHash {
    pub fn new(entity: Entity, kind: DigestKind) -> Self {
        let hash = OpportunisticHash::new(entity.total_size(), kind);
        let write_span = entity.range_of_interest(0);
        let mut tracked = Self {
            entity,
            hash,
            write_span,
            next_needed: None,
        };
        // A leading sparse run is hashed without any I/O.
        tracked.settle();
        tracked
    }

    pub fn entity(&self) -> &Entity {
        &self.entity
    }

    pub fn hash(&self) -> &OpportunisticHash {
        &self.hash
    }

    pub fn is_done(&self) -> bool {
        self.hash.is_done()
    }

    pub fn result(&self) -> &str {
        self.hash.result()
    }

    pub fn offset(&self) -> u64 {
        self.hash.processed_offset()
    }

    /// Data written to the backing store at `offset`. Returns `true` when
    /// this event completed the hash.
    pub fn written(&mut self, offset: u64, data: &[u8]) -> bool {
        let Some(end) = chunk_end(offset, data) else {
            return false;
        };
        let relevant = self
            .write_span
            .is_some_and(|(first, last)| offset <= last && end >= first);
        relevant && self.process(offset, end, data, true)
    }

    /// Data read from the backing store at `offset`. Returns `true` when this
    /// event completed the hash.
    pub fn read(&mut self, offset: u64, data: &[u8]) -> bool {
        let Some(end) = chunk_end(offset, data) else {
            return false;
        };
        let relevant = !self.hash.is_done()
            && self
                .next_needed
                .is_some_and(|needed| offset <= needed && needed <= end);
        relevant && self.process(offset, end, data, false)
    }

    /// No more writes will happen. Returns `true` when this completed the hash.
    pub fn freeze(&mut self) -> bool {
        let was_done = self.hash.is_done();
        self.hash.freeze();
        self.settle();
        !was_done && self.hash.is_done()
    }

    /// Feed the part of `[start, end]` that each fragment covers, in logical
    /// order, folding sparse runs as the cursor reaches them.
    fn process(&mut self, start: u64, end: u64, data: &[u8], write: bool) -> bool {
        let was_done = self.hash.is_done();
        let mut logical = 0u64;
        for segment in self.entity.segments() {
            match *segment {
                Segment::Fragment { offset, size } => {
                    let last = offset + size - 1;
                    if last >= start && offset <= end {
                        let lo = offset.max(start);
                        let hi = last.min(end);
                        let slice = &data[(lo - start) as usize..=(hi - start) as usize];
                        let at = logical + (lo - offset);
                        if write {
                            self.hash.written_chunk(slice, at);
                        } else {
                            self.hash.read_chunk(slice, at);
                        }
                    }
                }
                Segment::Sparse { size } => self.hash.sparse(size, logical),
            }
            logical += segment.size();
        }
        self.settle();
        !was_done && self.hash.is_done()
    }

    /// Absorb sparse runs sitting at the cursor and recompute what reads
    /// are waiting for.
    fn settle(&mut self) {
        let mut logical = 0u64;
        for segment in self.entity.segments() {
            if let Segment::Sparse { size } = *segment {
                self.hash.sparse(size, logical);
            }
            logical += segment.size();
        }
        self.next_needed = if self.hash.is_done() {
            None
        } else {
            self.entity.next_backing_offset(self.hash.processed_offset())
        };
    }
}

/// Inclusive end of a chunk, `None` for empty chunks.
fn chunk_end(offset: u64, data: &[u8]) -> Option<u64> {
    let len = data.len() as u64;
    if len == 0 {
        return None;
    }
    offset.checked_add(len - 1)
}
