//! Pick policies: one sort key per letter, most significant first.

use std::cmp::Ordering;
use std::str::FromStr;

use crate::StackError;

/// One letter of a pick policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyKey {
    /// `R`: overlaps the highest level above 0 that any candidate touches
    HotOverlap,
    /// `r`: overlaps level 0, i.e. shares bytes with anything open
    Referenced,
    /// `O`: lowest backing offset
    Offset,
    /// `D`: density against the level found for `R`
    HotDensity,
    /// `d`: density against level 0
    Density,
    /// `S`: total size
    Size,
    /// `W`: sum of densities against every level
    WeightedDensity,
    /// `H`: fewest bytes left to hash
    HashProgress,
}

impl PolicyKey {
    fn from_letter(letter: char) -> Option<Self> {
        Some(match letter {
            'R' => PolicyKey::HotOverlap,
            'r' => PolicyKey::Referenced,
            'O' => PolicyKey::Offset,
            'D' => PolicyKey::HotDensity,
            'd' => PolicyKey::Density,
            'S' => PolicyKey::Size,
            'W' => PolicyKey::WeightedDensity,
            'H' => PolicyKey::HashProgress,
            _ => return None,
        })
    }
}

/// A parsed pick policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Policy {
    /// `K`: skip ranking, take the next queued item
    Kickstart,
    Rank(Vec<PolicyKey>),
}

impl FromStr for Policy {
    type Err = StackError;

    fn from_str(policy: &str) -> Result<Self, StackError> {
        let invalid = |reason: String| StackError::InvalidPolicy {
            policy: policy.to_string(),
            reason,
        };
        if policy.is_empty() {
            return Err(invalid("empty policy".to_string()));
        }
        if policy == "K" {
            return Ok(Policy::Kickstart);
        }
        policy
            .chars()
            .map(|letter| match letter {
                'K' => Err(invalid("K must be used on its own".to_string())),
                _ => PolicyKey::from_letter(letter)
                    .ok_or_else(|| invalid(format!("unknown letter '{}'", letter))),
            })
            .collect::<Result<Vec<_>, _>>()
            .map(Policy::Rank)
    }
}

/// Outcome of a priority pick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Pick {
    /// The best-ranked candidate address
    Address(String),
    /// The caller should take its next unconditionally queued item
    Kickstart,
}

/// A single sort key value, carrying its own preferred direction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum Score {
    Flag(bool),
    Fraction(f64),
    Ascending(u64),
}

impl Score {
    /// `Less` when `self` ranks before `other`.
    pub(crate) fn rank(&self, other: &Score) -> Ordering {
        match (self, other) {
            (Score::Flag(a), Score::Flag(b)) => b.cmp(a),
            (Score::Fraction(a), Score::Fraction(b)) => b.total_cmp(a),
            (Score::Ascending(a), Score::Ascending(b)) => a.cmp(b),
            // Keys at the same position always share a variant.
            _ => Ordering::Equal,
        }
    }
}

/// Compare two score lists lexicographically.
pub(crate) fn rank_all(a: &[Score], b: &[Score]) -> Ordering {
    a.iter()
        .zip(b)
        .map(|(x, y)| x.rank(y))
        .find(|o| o.is_ne())
        .unwrap_or(Ordering::Equal)
}
