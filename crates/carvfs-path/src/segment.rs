//! Fragment and sparse segments, the atoms every entity is built from.

use std::fmt;
use std::str::FromStr;

use crate::CarvPathError;

/// One run of an entity's logical byte stream.
///
/// Variant order matters: the derived ordering sorts sparse runs before
/// fragments, then by offset, then by size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Segment {
    /// Virtual zero-filled run with no backing bytes
    Sparse { size: u64 },
    /// Contiguous range of the backing store
    Fragment { offset: u64, size: u64 },
}

impl Segment {
    /// Build a fragment; a zero-size fragment becomes `Sparse { size: 0 }`.
    pub fn fragment(offset: u64, size: u64) -> Self {
        if size == 0 {
            Segment::Sparse { size: 0 }
        } else {
            Segment::Fragment { offset, size }
        }
    }

    pub fn sparse(size: u64) -> Self {
        Segment::Sparse { size }
    }

    #[inline]
    pub fn size(&self) -> u64 {
        match *self {
            Segment::Sparse { size } | Segment::Fragment { size, .. } => size,
        }
    }

    /// Backing offset, `None` for sparse runs.
    #[inline]
    pub fn offset(&self) -> Option<u64> {
        match *self {
            Segment::Fragment { offset, .. } => Some(offset),
            Segment::Sparse { .. } => None,
        }
    }

    /// One past the last backing byte, `None` for sparse runs.
    #[inline]
    pub fn end(&self) -> Option<u64> {
        match *self {
            Segment::Fragment { offset, size } => Some(offset + size),
            Segment::Sparse { .. } => None,
        }
    }

    #[inline]
    pub fn is_sparse(&self) -> bool {
        matches!(self, Segment::Sparse { .. })
    }

    /// Absorb `next` into `self` if it directly continues it. A run that
    /// would no longer fit in 64 bits is left alone.
    pub(crate) fn absorb(&mut self, next: &Segment) -> bool {
        let joined = match (*self, *next) {
            (Segment::Sparse { size }, Segment::Sparse { size: more }) => size.checked_add(more),
            (
                Segment::Fragment { offset, size },
                Segment::Fragment {
                    offset: next_offset,
                    size: more,
                },
            ) if offset.checked_add(size) == Some(next_offset) => size.checked_add(more),
            _ => None,
        };
        match (self, joined) {
            (Segment::Sparse { size } | Segment::Fragment { size, .. }, Some(joined)) => {
                *size = joined;
                true
            }
            _ => false,
        }
    }

    /// Grow the segment in place (only meaningful for the last segment).
    pub(crate) fn grow(&mut self, more: u64) {
        match self {
            Segment::Sparse { size } | Segment::Fragment { size, .. } => *size += more,
        }
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Segment::Sparse { size } => write!(f, "S{}", size),
            Segment::Fragment { size: 0, .. } => f.write_str("S0"),
            Segment::Fragment { offset, size } => write!(f, "{}+{}", offset, size),
        }
    }
}

impl FromStr for Segment {
    type Err = CarvPathError;

    /// Parse a single `<offset>+<size>` or `S<size>` token.
    fn from_str(token: &str) -> Result<Self, Self::Err> {
        if let Some(size) = token.strip_prefix('S') {
            return Ok(Segment::sparse(parse_number(token, size)?));
        }
        let (offset, size) = token
            .split_once('+')
            .ok_or_else(|| CarvPathError::malformed(token, "expected <offset>+<size>"))?;
        let offset = parse_number(token, offset)?;
        let size = parse_number(token, size)?;
        if offset.checked_add(size).is_none() {
            return Err(CarvPathError::malformed(token, "fragment end overflows"));
        }
        Ok(Segment::fragment(offset, size))
    }
}

/// Strict decimal: digits only, no sign, no whitespace.
fn parse_number(token: &str, digits: &str) -> Result<u64, CarvPathError> {
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(CarvPathError::malformed(token, "expected a decimal number"));
    }
    digits
        .parse()
        .map_err(|_| CarvPathError::malformed(token, "number does not fit in 64 bits"))
}
