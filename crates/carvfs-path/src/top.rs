use crate::{CarvPathError, Entity, Result, Segment};

/// The whole current extent of the backing store. Only ever grows.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Top {
    entity: Entity,
}

impl Top {
    pub fn new(size: u64) -> Self {
        Self {
            entity: Entity::from(Segment::fragment(0, size)),
        }
    }

    #[inline]
    pub fn size(&self) -> u64 {
        self.entity.total_size()
    }

    pub fn entity(&self) -> &Entity {
        &self.entity
    }

    /// Grow the extent by `chunk` bytes. Fails with
    /// [`CarvPathError::OutOfRange`] past 64-bit sizes.
    pub fn grow(&mut self, chunk: u64) -> Result<()> {
        self.entity.grow(chunk)
    }

    /// Grow the extent to at least `size` bytes.
    pub fn grow_to(&mut self, size: u64) {
        if size > self.size() {
            self.entity = Entity::from(Segment::fragment(0, size));
        }
    }

    /// Does `child` lie entirely within the backing store?
    pub fn test(&self, child: &Entity) -> bool {
        self.check(child).is_ok()
    }

    /// Like [`Top::test`], reporting the offending range.
    pub fn check(&self, child: &Entity) -> Result<()> {
        for (offset, size) in child.fragments() {
            if offset.checked_add(size).map_or(true, |end| end > self.size()) {
                return Err(CarvPathError::OutOfRange {
                    offset,
                    size,
                    total: self.size(),
                });
            }
        }
        Ok(())
    }
}
