//! Entities: normalized sequences of fragments and sparse runs.

use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;

use crate::sweep::{self, MERGE, UNMERGE};
use crate::{CarvPathError, Result, Segment};

/// An ordered, normalized sequence of segments describing one logical byte
/// stream.
///
/// Invariants held by every constructor and by [`Entity::push`]:
/// - no zero-size segments are stored; the empty entity is the canonical
///   zero-size entity and prints as `S0`;
/// - no two neighbours could be collapsed into one segment.
///
/// Field order matters for the derived ordering: segments compare first.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Entity {
    segments: Vec<Segment>,
    total_size: u64,
}

impl Entity {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    #[inline]
    pub fn total_size(&self) -> u64 {
        self.total_size
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Iterate `(offset, size)` of the real fragments, in logical order.
    pub fn fragments(&self) -> impl Iterator<Item = (u64, u64)> + '_ {
        self.segments.iter().filter_map(|seg| match *seg {
            Segment::Fragment { offset, size } => Some((offset, size)),
            Segment::Sparse { .. } => None,
        })
    }

    /// Lowest backing offset of any real fragment.
    pub fn lowest_offset(&self) -> Option<u64> {
        self.fragments().map(|(offset, _)| offset).min()
    }

    /// Append a segment, collapsing it into the tail when they are adjacent
    /// and of the same kind.
    ///
    /// # Panics
    ///
    /// When the total size no longer fits in 64 bits. Use
    /// [`Entity::try_push`] for segments from untrusted input.
    pub fn push(&mut self, segment: Segment) {
        if let Err(e) = self.try_push(segment) {
            panic!("{}", e);
        }
    }

    /// Like [`Entity::push`], failing with
    /// [`CarvPathError::MalformedAddress`] when the total size would
    /// overflow.
    pub fn try_push(&mut self, segment: Segment) -> Result<()> {
        let size = segment.size();
        if size == 0 {
            return Ok(());
        }
        let total = self.total_size.checked_add(size).ok_or_else(|| {
            CarvPathError::malformed(&segment.to_string(), "total size overflows")
        })?;
        let absorbed = match self.segments.last_mut() {
            Some(last) => last.absorb(&segment),
            None => false,
        };
        if !absorbed {
            self.segments.push(segment);
        }
        self.total_size = total;
        Ok(())
    }

    /// Grow the entity by extending its last segment, or by starting a
    /// fragment at offset zero when it is empty.
    pub fn grow(&mut self, size: u64) -> Result<()> {
        let total = self
            .total_size
            .checked_add(size)
            .ok_or(CarvPathError::OutOfRange {
                offset: self.total_size,
                size,
                total: self.total_size,
            })?;
        if size == 0 {
            return Ok(());
        }
        match self.segments.last_mut() {
            Some(last) => last.grow(size),
            None => self.segments.push(Segment::fragment(0, size)),
        }
        self.total_size = total;
        Ok(())
    }

    /// Segments of this entity's backing addressing that together cover
    /// `[offset, offset + size)` of its logical stream.
    ///
    /// Ranges reaching past the end fail with [`CarvPathError::OutOfRange`]
    /// unless `truncate` is set, in which case they are clipped.
    pub fn subchunk(&self, offset: u64, size: u64, truncate: bool) -> Result<SubChunks<'_>> {
        let fits = offset
            .checked_add(size)
            .is_some_and(|end| end <= self.total_size);
        let size = if fits {
            size
        } else if truncate {
            self.total_size.saturating_sub(offset)
        } else {
            return Err(CarvPathError::OutOfRange {
                offset,
                size,
                total: self.total_size,
            });
        };
        Ok(SubChunks {
            segments: self.segments.iter(),
            segment_start: 0,
            cursor: offset,
            remaining: size,
        })
    }

    /// Project `child` through this entity: each child fragment addresses
    /// this entity's logical stream and is replaced by the backing segments
    /// it lands on. Sparse child segments pass through unchanged.
    pub fn subentity(&self, child: &Entity, truncate: bool) -> Result<Entity> {
        let mut projected = Entity::new();
        for segment in &child.segments {
            match *segment {
                Segment::Sparse { .. } => projected.try_push(*segment)?,
                Segment::Fragment { offset, size } => {
                    for chunk in self.subchunk(offset, size, truncate)? {
                        projected.try_push(chunk)?;
                    }
                }
            }
        }
        Ok(projected)
    }

    /// Drop sparse runs and normalize the remaining fragments into a sorted,
    /// disjoint set of byte ranges.
    pub fn strip_sparse(&mut self) {
        *self = self.stripped();
    }

    /// Sparse-free, sorted, disjoint copy of this entity.
    pub fn stripped(&self) -> Entity {
        let mut ranges: Vec<(u64, u64)> = self.fragments().collect();
        ranges.sort_unstable();

        let mut out = Entity::new();
        let mut pending: Option<(u64, u64)> = None;
        for (offset, size) in ranges {
            let end = offset + size;
            pending = match pending {
                Some((start, stop)) if offset <= stop => Some((start, stop.max(end))),
                Some((start, stop)) => {
                    out.push(Segment::fragment(start, stop - start));
                    Some((offset, end))
                }
                None => Some((offset, end)),
            };
        }
        if let Some((start, stop)) = pending {
            out.push(Segment::fragment(start, stop - start));
        }
        out
    }

    /// True when the entity is already in the form the sweep expects.
    fn is_sweepable(&self) -> bool {
        let mut previous_end = None;
        for segment in &self.segments {
            match *segment {
                Segment::Sparse { .. } => return false,
                Segment::Fragment { offset, size } => {
                    if previous_end.is_some_and(|end| offset < end) {
                        return false;
                    }
                    previous_end = Some(offset + size);
                }
            }
        }
        true
    }

    fn sweepable(&self) -> Cow<'_, Entity> {
        if self.is_sweepable() {
            Cow::Borrowed(self)
        } else {
            Cow::Owned(self.stripped())
        }
    }

    /// Turn `self` into the union with `other`.
    ///
    /// Returns `(overlap, new)`: the part of `other` that was already covered
    /// and the part that was not.
    pub fn merge(&mut self, other: &Entity) -> (Entity, Entity) {
        let [union, overlap, new] = sweep::apply(&self.sweepable(), &other.sweepable(), &MERGE);
        *self = union;
        (overlap, new)
    }

    /// Remove `other`'s coverage from `self`.
    ///
    /// Returns `(leftover, removed)`: the part of `other` that `self` did not
    /// cover and the part that was actually removed.
    pub fn unmerge(&mut self, other: &Entity) -> (Entity, Entity) {
        let [remaining, leftover, removed] =
            sweep::apply(&self.sweepable(), &other.sweepable(), &UNMERGE);
        *self = remaining;
        (leftover, removed)
    }

    /// Does any real byte of `self` also belong to `other`?
    pub fn overlaps(&self, other: &Entity) -> bool {
        sweep::satisfies(&self.sweepable(), &other.sweepable(), sweep::both)
    }

    /// Number of real bytes shared with `other`.
    pub fn overlap_size(&self, other: &Entity) -> u64 {
        sweep::measure(&self.sweepable(), &other.sweepable(), sweep::both)
    }

    /// Fraction of this entity's total size that overlaps `other`.
    pub fn density(&self, other: &Entity) -> f64 {
        if self.total_size == 0 {
            return 0.0;
        }
        self.overlap_size(other) as f64 / self.total_size as f64
    }

    /// Backing span `(first, last)` (inclusive) of all real bytes at logical
    /// offsets `>= from`.
    pub fn range_of_interest(&self, from: u64) -> Option<(u64, u64)> {
        let mut logical = 0u64;
        let mut span: Option<(u64, u64)> = None;
        for segment in &self.segments {
            let size = segment.size();
            if let Segment::Fragment { offset, .. } = *segment {
                if logical + size > from {
                    let first = offset + from.saturating_sub(logical);
                    let last = offset + size - 1;
                    span = Some(match span {
                        Some((lo, hi)) => (lo.min(first), hi.max(last)),
                        None => (first, last),
                    });
                }
            }
            logical += size;
        }
        span
    }

    /// Backing offset of the first real byte at logical offset `>= from`.
    pub fn next_backing_offset(&self, from: u64) -> Option<u64> {
        let mut logical = 0u64;
        for segment in &self.segments {
            let size = segment.size();
            if let Segment::Fragment { offset, .. } = *segment {
                if logical + size > from {
                    return Some(offset + from.saturating_sub(logical));
                }
            }
            logical += size;
        }
        None
    }
}

impl From<Segment> for Entity {
    fn from(segment: Segment) -> Self {
        let mut entity = Entity::new();
        entity.push(segment);
        entity
    }
}

impl FromIterator<Segment> for Entity {
    fn from_iter<I: IntoIterator<Item = Segment>>(iter: I) -> Self {
        let mut entity = Entity::new();
        entity.extend(iter);
        entity
    }
}

impl Extend<Segment> for Entity {
    fn extend<I: IntoIterator<Item = Segment>>(&mut self, iter: I) {
        for segment in iter {
            self.push(segment);
        }
    }
}

impl fmt::Display for Entity {
    /// Full carvpath form, without long-path elision.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut segments = self.segments.iter();
        match segments.next() {
            None => f.write_str("S0"),
            Some(first) => {
                write!(f, "{}", first)?;
                for segment in segments {
                    write!(f, "_{}", segment)?;
                }
                Ok(())
            }
        }
    }
}

impl FromStr for Entity {
    type Err = CarvPathError;

    /// Parse one level of `_`-joined tokens. Nesting and digest tokens need a
    /// [`Context`](crate::Context).
    fn from_str(level: &str) -> Result<Self> {
        if level.is_empty() {
            return Err(CarvPathError::malformed(level, "empty carvpath level"));
        }
        let mut entity = Entity::new();
        for token in level.split('_') {
            entity.try_push(token.parse()?)?;
        }
        Ok(entity)
    }
}

/// Lazy iterator returned by [`Entity::subchunk`].
pub struct SubChunks<'a> {
    segments: std::slice::Iter<'a, Segment>,
    /// Logical offset where the next parent segment starts
    segment_start: u64,
    cursor: u64,
    remaining: u64,
}

impl Iterator for SubChunks<'_> {
    type Item = Segment;

    fn next(&mut self) -> Option<Segment> {
        while self.remaining > 0 {
            let segment = self.segments.next()?;
            let start = self.segment_start;
            let size = segment.size();
            self.segment_start += size;
            if start + size <= self.cursor {
                continue;
            }
            let within = self.cursor - start;
            let chunk = (size - within).min(self.remaining);
            self.cursor += chunk;
            self.remaining -= chunk;
            return Some(match *segment {
                Segment::Sparse { .. } => Segment::sparse(chunk),
                Segment::Fragment { offset, .. } => Segment::fragment(offset + within, chunk),
            });
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ent(path: &str) -> Entity {
        path.parse().unwrap()
    }

    #[test]
    fn test_zero_sizes_normalize_to_empty() {
        for path in ["0+0", "S0", "20000+0", "20000+0_89765+0"] {
            let e = ent(path);
            assert!(e.is_empty(), "{}", path);
            assert_eq!(e.total_size(), 0);
            assert_eq!(e.to_string(), "S0");
        }
    }

    #[test]
    fn test_push_collapses_neighbours() {
        assert_eq!(ent("S1_S1").to_string(), "S2");
        assert_eq!(ent("S100_S200").to_string(), "S300");
        assert_eq!(ent("0+20000_20000+20000").to_string(), "0+40000");
        assert_eq!(ent("0+5_S0_5+5").to_string(), "0+10");
        assert_eq!(ent("0+5_6+5").segments().len(), 2);
    }

    #[test]
    fn test_append_entities() {
        let mut a = ent("0+1000_S2000_1000+2000");
        a.extend(ent("3000+1000_6000+1000").segments().iter().copied());
        assert_eq!(a, ent("0+1000_S2000_1000+3000_6000+1000"));

        let mut b = ent("0+1000_S2000");
        b.extend(ent("S1000_3000+1000").segments().iter().copied());
        assert_eq!(b, ent("0+1000_S3000_3000+1000"));
        assert_eq!(b.total_size(), 5000);
    }

    #[test]
    fn test_subentity() {
        let parent = ent("0+20000_40000+20000");
        let child = parent.subentity(&ent("10000+20000"), false).unwrap();
        assert_eq!(child.to_string(), "10000+10000_40000+10000");

        let sparse_parent = ent("S200000");
        let child = sparse_parent.subentity(&ent("1000+9000"), false).unwrap();
        assert_eq!(child.to_string(), "S9000");

        let with_sparse_child = parent.subentity(&ent("0+10_S5_19990+20"), false).unwrap();
        assert_eq!(with_sparse_child.to_string(), "0+10_S5_19990+10_40000+10");
    }

    #[test]
    fn test_subchunk_bounds() {
        let parent = ent("0+100_S50_500+100");
        assert!(matches!(
            parent.subchunk(200, 51, false),
            Err(CarvPathError::OutOfRange { total: 250, .. })
        ));
        let clipped: Vec<_> = parent.subchunk(90, 1000, true).unwrap().collect();
        assert_eq!(
            clipped,
            vec![
                Segment::fragment(90, 10),
                Segment::sparse(50),
                Segment::fragment(500, 100)
            ]
        );
        assert_eq!(parent.subchunk(300, 10, true).unwrap().count(), 0);
        assert!(parent.subchunk(u64::MAX, 2, false).is_err());
    }

    #[test]
    fn test_strip_sparse() {
        let cases = [
            ("0+1000_S2000_1000+2000", "0+3000"),
            ("1000+2000_S2000_0+1000", "0+3000"),
            ("0+1000_S2000_4000+2000", "0+1000_4000+2000"),
            ("4000+2000_S2000_0+1000", "0+1000_4000+2000"),
            ("0+100_50+100", "0+150"),
        ];
        for (input, expected) in cases {
            let mut e = ent(input);
            e.strip_sparse();
            assert_eq!(e.to_string(), expected, "{}", input);
            // idempotent
            assert_eq!(e.stripped(), e);
        }
    }

    #[test]
    fn test_merge_vectors() {
        let cases = [
            ("0+1000_2000+1000", "500+2000", "0+3000"),
            (
                "2000+1000_5000+100",
                "100+500_800+800_4000+200_6000+100_7000+100",
                "100+500_800+800_2000+1000_4000+200_5000+100_6000+100_7000+100",
            ),
            ("2000+1000_5000+1000", "2500+500", "2000+1000_5000+1000"),
            ("500+2000", "0+1000_2000+1000", "0+3000"),
            ("0+1000_2000+1000", "500+1000", "0+1500_2000+1000"),
            ("S0", "0+1000_2000+1000", "0+1000_2000+1000"),
            ("0+60000", "15000+30000", "0+60000"),
        ];
        for (a, b, expected) in cases {
            let mut left = ent(a).stripped();
            left.merge(&ent(b).stripped());
            assert_eq!(left.to_string(), expected, "{} + {}", a, b);
        }
    }

    #[test]
    fn test_merge_reports_overlap_and_new() {
        let mut level = ent("2000+1000_5000+1000");
        let (overlap, new) = level.merge(&ent("2500+3000"));
        assert_eq!(overlap.to_string(), "2500+500_5000+500");
        assert_eq!(new.to_string(), "3000+2000");
        assert_eq!(level.to_string(), "2000+4000");
    }

    #[test]
    fn test_unmerge_inverts_merge() {
        let original = ent("100+500_800+800_4000+200");
        let other = ent("550+300_3000+1100_7000+50");
        let mut work = original.clone();
        let (_, new) = work.merge(&other);
        let (leftover, removed) = work.unmerge(&new);
        assert!(leftover.is_empty());
        assert_eq!(removed, new);
        assert_eq!(work, original);
    }

    #[test]
    fn test_unmerge_reports_leftover() {
        let mut level = ent("10+10");
        let (leftover, removed) = level.unmerge(&ent("15+10"));
        assert_eq!(level.to_string(), "10+5");
        assert_eq!(leftover.to_string(), "20+5");
        assert_eq!(removed.to_string(), "15+5");
    }

    #[test]
    fn test_overlap_and_density() {
        let a = ent("0+100_200+100");
        let b = ent("50+200");
        assert_eq!(a.overlap_size(&b), 100);
        assert_eq!(b.overlap_size(&a), 100);
        assert!(a.overlaps(&b));
        assert!(!a.overlaps(&ent("100+100")));
        assert_eq!(a.density(&b), 0.5);
        assert_eq!(a.density(&a), 1.0);
        assert_eq!(Entity::new().density(&a), 0.0);

        // sparse counts towards size but never overlaps
        let sparse = ent("0+100_S100");
        assert_eq!(sparse.density(&a), 0.5);
    }

    #[test]
    fn test_ordering() {
        assert!(Entity::new() < ent("S1"));
        assert!(ent("S5_0+1") < ent("0+1"));
        assert!(ent("0+10") < ent("1+1"));
        assert!(ent("0+10") < ent("0+10_S5"));
    }

    #[test]
    fn test_range_of_interest() {
        let e = ent("500+100_S50_100+100");
        assert_eq!(e.range_of_interest(0), Some((100, 599)));
        assert_eq!(e.range_of_interest(120), Some((100, 199)));
        assert_eq!(e.range_of_interest(170), Some((120, 199)));
        assert_eq!(e.range_of_interest(250), None);
        assert_eq!(e.next_backing_offset(0), Some(500));
        assert_eq!(e.next_backing_offset(110), Some(100));
        assert_eq!(e.next_backing_offset(160), Some(110));
    }

    #[test]
    fn test_grow() {
        let mut e = Entity::new();
        e.grow(100).unwrap();
        e.grow(50).unwrap();
        assert_eq!(e.to_string(), "0+150");
        assert!(matches!(
            e.grow(u64::MAX),
            Err(CarvPathError::OutOfRange { offset: 150, .. })
        ));
        assert_eq!(e.total_size(), 150);
    }

    #[test]
    fn test_total_size_overflow_is_malformed() {
        for bad in [
            "S18446744073709551615_S1",
            "0+18446744073709551615_S1",
            "S1_0+18446744073709551615",
            "0+9223372036854775808_S9223372036854775808",
        ] {
            assert!(
                matches!(bad.parse::<Entity>(), Err(CarvPathError::MalformedAddress { .. })),
                "accepted {:?}",
                bad
            );
        }
        let mut e: Entity = "S18446744073709551615".parse().unwrap();
        assert!(e.try_push(Segment::sparse(1)).is_err());
        assert_eq!(e.total_size(), u64::MAX);
    }
}
