//! The layered refcount stack.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use carvfs_config::{log_stack_debug, log_stack_warn};
use carvfs_ohash::OpportunisticHashCollection;
use carvfs_path::{Context, Entity};

use crate::policy::{rank_all, Score};
use crate::{
    CacheAdvisor, Pick, Policy, PolicyKey, Result, StackError, Transition, TransitionLog,
};

/// Effect of an `add` or `remove` on the stack.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Impact {
    /// Ranges that crossed the 0↔1 boundary
    pub transitioned: Entity,
    /// Ranges of the entity that stay referenced by something else
    pub retained: Entity,
}

struct OpenEntity {
    /// Sparse-stripped entity
    entity: Entity,
    refcount: u32,
}

/// Reference counts of every open address, as a stack of interval sets.
///
/// `levels[i]` holds the bytes referenced by at least `i + 1` open entities.
/// Level 0 always exists; empty levels above it are pruned.
pub struct RefcountStack {
    context: Context,
    open: HashMap<String, OpenEntity>,
    levels: Vec<Entity>,
    hashes: OpportunisticHashCollection,
    advisor: Arc<dyn CacheAdvisor>,
    log: Arc<dyn TransitionLog>,
}

impl RefcountStack {
    pub fn new(
        context: Context,
        hashes: OpportunisticHashCollection,
        advisor: Arc<dyn CacheAdvisor>,
        log: Arc<dyn TransitionLog>,
    ) -> Self {
        Self {
            context,
            open: HashMap::new(),
            levels: vec![Entity::new()],
            hashes,
            advisor,
            log,
        }
    }

    pub fn context(&self) -> &Context {
        &self.context
    }

    pub fn levels(&self) -> &[Entity] {
        &self.levels
    }

    /// Number of bytes referenced by at least one open entity.
    pub fn volume(&self) -> u64 {
        self.levels[0].total_size()
    }

    pub fn refcount(&self, address: &str) -> u32 {
        self.open.get(address).map_or(0, |o| o.refcount)
    }

    /// Sparse-stripped entity of an open address.
    pub fn entity(&self, address: &str) -> Option<&Entity> {
        self.open.get(address).map(|o| &o.entity)
    }

    pub fn addresses(&self) -> impl Iterator<Item = &str> {
        self.open.keys().map(String::as_str)
    }

    pub fn hashes(&self) -> &OpportunisticHashCollection {
        &self.hashes
    }

    pub fn hashes_mut(&mut self) -> &mut OpportunisticHashCollection {
        &mut self.hashes
    }

    /// Open `address` once more.
    pub fn add(&mut self, address: &str) -> Result<Impact> {
        if let Some(open) = self.open.get_mut(address) {
            open.refcount += 1;
            log_stack_debug!("Address reopened", address = address, refcount = open.refcount);
            return Ok(Impact {
                transitioned: Entity::new(),
                retained: open.entity.clone(),
            });
        }

        let entity = self.context.parse(address)?;
        let canonical = self.context.serialize(&entity)?;
        let stripped = entity.stripped();
        self.hashes.add(address, canonical, entity);

        let (transitioned, retained) = self.extend(&stripped);
        self.open.insert(
            address.to_string(),
            OpenEntity {
                entity: stripped,
                refcount: 1,
            },
        );
        log_stack_debug!("Address opened", address = address, levels = self.levels.len());

        self.notify(Transition::Referenced, &transitioned);
        Ok(Impact {
            transitioned,
            retained,
        })
    }

    /// Close `address` once.
    pub fn remove(&mut self, address: &str) -> Result<Impact> {
        let open = self
            .open
            .get_mut(address)
            .ok_or_else(|| StackError::UnknownAddress(address.to_string()))?;
        open.refcount -= 1;
        if open.refcount > 0 {
            log_stack_debug!("Address released", address = address, refcount = open.refcount);
            return Ok(Impact {
                transitioned: Entity::new(),
                retained: open.entity.clone(),
            });
        }

        let Some(OpenEntity { entity, .. }) = self.open.remove(address) else {
            return Err(StackError::UnknownAddress(address.to_string()));
        };
        self.hashes.remove(address);

        let transitioned = self.diminish(&entity)?;
        let mut retained = entity;
        retained.unmerge(&transitioned);
        log_stack_debug!("Address closed", address = address, levels = self.levels.len());

        self.notify(Transition::Released, &transitioned);
        Ok(Impact {
            transitioned,
            retained,
        })
    }

    /// Add `entity` one level at a time. Returns the 0→1 ranges and the part
    /// that was already referenced.
    fn extend(&mut self, entity: &Entity) -> (Entity, Entity) {
        let mut pending = entity.clone();
        let mut level = 0;
        let mut result = (Entity::new(), Entity::new());
        while !pending.is_empty() {
            if level == self.levels.len() {
                self.levels.push(Entity::new());
            }
            let (overlap, new) = self.levels[level].merge(&pending);
            if level == 0 {
                result = (new, overlap.clone());
            }
            pending = overlap;
            level += 1;
        }
        result
    }

    /// Remove `entity` from the top level down. Returns the 1→0 ranges.
    fn diminish(&mut self, entity: &Entity) -> Result<Entity> {
        let mut pending = entity.clone();
        let mut released = Entity::new();
        for level in (0..self.levels.len()).rev() {
            if pending.is_empty() {
                break;
            }
            let (leftover, removed) = self.levels[level].unmerge(&pending);
            if level == 0 {
                if !leftover.is_empty() {
                    return Err(StackError::Corrupted(format!(
                        "{} left over after releasing level 0",
                        leftover
                    )));
                }
                released = removed;
            }
            pending = leftover;
        }
        while self.levels.len() > 1 && self.levels.last().is_some_and(Entity::is_empty) {
            self.levels.pop();
        }
        Ok(released)
    }

    /// Best-effort advice and audit for boundary crossings.
    fn notify(&self, transition: Transition, ranges: &Entity) {
        if ranges.is_empty() {
            return;
        }
        let will_need = transition == Transition::Referenced;
        for (offset, size) in ranges.fragments() {
            if let Err(e) = self.advisor.advise(offset, size, will_need) {
                let error = e.to_string();
                log_stack_warn!(
                    "Cache advice failed",
                    offset = offset,
                    size = size,
                    error = error.as_str()
                );
            }
        }
        if let Err(e) = self.log.record(transition, ranges) {
            let error = e.to_string();
            log_stack_warn!("Failed to record transition", error = error.as_str());
        }
    }

    /// `(referenced, unreferenced)` byte counts of `address` against
    /// everything currently open. The address need not be open itself.
    pub fn advisory_info(&self, address: &str) -> Result<(u64, u64)> {
        let entity = self.context.parse(address)?;
        let referenced = entity.stripped().overlap_size(&self.levels[0]);
        Ok((referenced, entity.total_size() - referenced))
    }

    /// No more writes will happen to `address`; lets its hash complete over
    /// a clean sparse tail.
    pub fn freeze(&mut self, address: &str) -> Result<()> {
        if self.hashes.freeze(address) {
            Ok(())
        } else {
            Err(StackError::UnknownAddress(address.to_string()))
        }
    }

    /// Pick the best of `candidates` according to `policy`.
    ///
    /// Every candidate must be open. Ties on all policy keys go to the
    /// lexicographically smallest address.
    pub fn priority_pick<I, S>(&self, policy: &str, candidates: I) -> Result<Option<Pick>>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let keys = match policy.parse::<Policy>()? {
            Policy::Kickstart => return Ok(Some(Pick::Kickstart)),
            Policy::Rank(keys) => keys,
        };

        let mut open = Vec::new();
        for candidate in candidates {
            let address = candidate.as_ref();
            let (key, entry) = self
                .open
                .get_key_value(address)
                .ok_or_else(|| StackError::UnknownAddress(address.to_string()))?;
            open.push((key.as_str(), &entry.entity));
        }
        if open.is_empty() {
            return Ok(None);
        }

        let hot = self.hot_level(&open);
        let mut scored: Vec<(&str, Vec<Score>)> = open
            .iter()
            .map(|&(address, entity)| {
                let scores = keys
                    .iter()
                    .map(|key| self.score(*key, address, entity, hot))
                    .collect();
                (address, scores)
            })
            .collect();
        scored.sort_by(|(a, sa), (b, sb)| rank_all(sa, sb).then_with(|| a.cmp(b)));

        Ok(scored
            .into_iter()
            .next()
            .map(|(address, _)| Pick::Address(address.to_string())))
    }

    /// Highest level above 0 that any candidate overlaps.
    fn hot_level(&self, candidates: &[(&str, &Entity)]) -> Option<usize> {
        (1..self.levels.len()).rev().find(|&level| {
            candidates
                .iter()
                .any(|(_, entity)| entity.overlaps(&self.levels[level]))
        })
    }

    /// Bytes still to be hashed before `address` completes.
    fn hash_remaining(&self, address: &str) -> u64 {
        self.hashes.get(address).map_or(u64::MAX, |tracked| {
            tracked.hash().total_size().saturating_sub(tracked.offset())
        })
    }

    fn score(&self, key: PolicyKey, address: &str, entity: &Entity, hot: Option<usize>) -> Score {
        match key {
            PolicyKey::HotOverlap => {
                Score::Flag(hot.is_some_and(|level| entity.overlaps(&self.levels[level])))
            }
            PolicyKey::Referenced => Score::Flag(entity.overlaps(&self.levels[0])),
            PolicyKey::Offset => Score::Ascending(entity.lowest_offset().unwrap_or(u64::MAX)),
            PolicyKey::HotDensity => Score::Fraction(
                hot.map_or(0.0, |level| entity.density(&self.levels[level])),
            ),
            PolicyKey::Density => Score::Fraction(entity.density(&self.levels[0])),
            PolicyKey::Size => Score::Ascending(entity.total_size()),
            PolicyKey::WeightedDensity => {
                Score::Fraction(self.levels.iter().map(|l| entity.density(l)).sum())
            }
            PolicyKey::HashProgress => Score::Ascending(self.hash_remaining(address)),
        }
    }
}

impl fmt::Display for RefcountStack {
    /// Debug dump: one line per level, then one per open address.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, level) in self.levels.iter().enumerate() {
            writeln!(f, "   + L{} : {}", index, level)?;
        }
        let mut addresses: Vec<_> = self.open.iter().collect();
        addresses.sort_by(|a, b| a.0.cmp(b.0));
        for (address, open) in addresses {
            writeln!(f, "   * {} : {}", address, open.refcount)?;
        }
        Ok(())
    }
}

impl fmt::Debug for RefcountStack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RefcountStack")
            .field("levels", &self.levels)
            .field("open", &self.open.len())
            .finish_non_exhaustive()
    }
}
