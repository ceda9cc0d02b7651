//! Boolean interval sweep: the single kernel behind merge, unmerge, overlap
//! and density.
//!
//! Both inputs are walked in parallel by backing offset. Every step emits the
//! smallest interval over which membership in `a` and in `b` does not change,
//! including the gaps where neither has bytes. Callers classify each interval
//! with boolean combinators over `(in_a, in_b)`.
//!
//! Inputs must be sparse-free, sorted and disjoint (see
//! [`Entity::stripped`](crate::Entity::stripped)); sparse segments are skipped.

use crate::{Entity, Segment};

/// Decides whether an interval with the given membership belongs to an output.
pub type Combinator = fn(bool, bool) -> bool;

/// `a ∨ b`, `a ∧ b`, `¬a ∧ b`
pub(crate) const MERGE: [Combinator; 3] = [either, both, only_b];

/// `a ∧ ¬b`, `¬a ∧ b`, `a ∧ b`
pub(crate) const UNMERGE: [Combinator; 3] = [only_a, only_b, both];

pub(crate) fn either(a: bool, b: bool) -> bool {
    a || b
}

pub(crate) fn both(a: bool, b: bool) -> bool {
    a && b
}

pub(crate) fn only_a(a: bool, b: bool) -> bool {
    a && !b
}

pub(crate) fn only_b(a: bool, b: bool) -> bool {
    !a && b
}

/// A minimal interval produced by the sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Interval {
    pub offset: u64,
    pub size: u64,
    pub in_a: bool,
    pub in_b: bool,
}

/// Remaining part of the fragment currently being walked on one side.
#[derive(Debug, Clone, Copy)]
struct Cursor {
    start: u64,
    end: u64,
}

struct Side<'a> {
    fragments: std::slice::Iter<'a, Segment>,
    current: Option<Cursor>,
}

impl<'a> Side<'a> {
    fn new(entity: &'a Entity) -> Self {
        Self {
            fragments: entity.segments().iter(),
            current: None,
        }
    }

    /// Load the next fragment if the current one is used up.
    fn refill(&mut self) {
        if self.current.is_some() {
            return;
        }
        self.current = self.fragments.by_ref().find_map(|seg| match *seg {
            Segment::Fragment { offset, size } => Some(Cursor {
                start: offset,
                end: offset + size,
            }),
            Segment::Sparse { .. } => None,
        });
    }

    /// Consume up to `until` if this side starts at `at`; reports membership.
    fn advance(&mut self, at: u64, until: u64) -> bool {
        match self.current.as_mut() {
            Some(cur) if cur.start == at => {
                cur.start = until;
                if cur.start >= cur.end {
                    self.current = None;
                }
                true
            }
            _ => false,
        }
    }
}

/// Iterator over the minimal intervals of two entities.
pub struct Sweep<'a> {
    a: Side<'a>,
    b: Side<'a>,
    master: u64,
}

impl<'a> Sweep<'a> {
    pub fn new(a: &'a Entity, b: &'a Entity) -> Self {
        Self {
            a: Side::new(a),
            b: Side::new(b),
            master: 0,
        }
    }
}

impl Iterator for Sweep<'_> {
    type Item = Interval;

    fn next(&mut self) -> Option<Interval> {
        self.a.refill();
        self.b.refill();

        let starts = [self.a.current, self.b.current];
        let lowest = starts.iter().flatten().map(|c| c.start).min()?;

        if lowest > self.master {
            // Neither side has bytes here.
            let gap = Interval {
                offset: self.master,
                size: lowest - self.master,
                in_a: false,
                in_b: false,
            };
            self.master = lowest;
            return Some(gap);
        }

        // The next boundary is the nearest start or end beyond the cursor.
        let boundary = starts
            .iter()
            .flatten()
            .map(|c| if c.start > lowest { c.start } else { c.end })
            .min()?;

        let in_a = self.a.advance(lowest, boundary);
        let in_b = self.b.advance(lowest, boundary);
        self.master = boundary;
        Some(Interval {
            offset: lowest,
            size: boundary - lowest,
            in_a,
            in_b,
        })
    }
}

/// Run the sweep and build one entity per combinator.
pub fn apply<const N: usize>(a: &Entity, b: &Entity, combinators: &[Combinator; N]) -> [Entity; N] {
    let mut out: [Entity; N] = std::array::from_fn(|_| Entity::new());
    for interval in Sweep::new(a, b) {
        for (entity, combinator) in out.iter_mut().zip(combinators) {
            if combinator(interval.in_a, interval.in_b) {
                entity.push(Segment::fragment(interval.offset, interval.size));
            }
        }
    }
    out
}

/// Short-circuiting test: does any interval satisfy `combinator`?
pub fn satisfies(a: &Entity, b: &Entity, combinator: Combinator) -> bool {
    Sweep::new(a, b).any(|i| combinator(i.in_a, i.in_b))
}

/// Total size of intervals satisfying `combinator`.
pub fn measure(a: &Entity, b: &Entity, combinator: Combinator) -> u64 {
    Sweep::new(a, b)
        .filter(|i| combinator(i.in_a, i.in_b))
        .map(|i| i.size)
        .sum()
}
