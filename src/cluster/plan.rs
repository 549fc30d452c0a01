//! Replacement roster and plan
//!
//! The roster is the fixed, ordered list of source pools found at plan time.
//! The plan tracks progress against it: the target pool only grows and each
//! roster entry only shrinks, so at every cycle boundary
//! `target_replicas + Σ remaining == total_original`.

use serde::{Deserialize, Serialize};

use super::pool::PoolRef;

/// A source pool and its replica count at plan start
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RosterEntry {
    pub pool: PoolRef,
    pub initial: u32,
    pub remaining: u32,
}

impl RosterEntry {
    pub fn new(pool: PoolRef, initial: u32) -> Self {
        Self {
            pool,
            initial,
            remaining: initial,
        }
    }

    pub fn retired(&self) -> u32 {
        self.initial - self.remaining
    }
}

/// Ordered source pools in discovery order. Never re-discovered mid-run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplacementRoster {
    entries: Vec<RosterEntry>,
}

impl ReplacementRoster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a pool; zero-replica pools are ignored
    pub fn push(&mut self, pool: PoolRef, replicas: u32) {
        if replicas > 0 {
            self.entries.push(RosterEntry::new(pool, replicas));
        }
    }

    pub fn entries(&self) -> &[RosterEntry] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Sum of the initial replica counts
    pub fn total_replicas(&self) -> u32 {
        self.entries.iter().map(|e| e.initial).sum()
    }
}

impl FromIterator<(PoolRef, u32)> for ReplacementRoster {
    fn from_iter<I: IntoIterator<Item = (PoolRef, u32)>>(iter: I) -> Self {
        let mut roster = Self::new();
        for (pool, replicas) in iter {
            roster.push(pool, replicas);
        }
        roster
    }
}

/// One decrement chosen by the plan
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Retirement {
    pub pool: PoolRef,
    /// The source pool's new replica count
    pub remaining: u32,
}

/// A cycle as projected before the run starts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlannedCycle {
    pub index: u32,
    pub target_replicas: u32,
    /// `None` when the roster is exhausted before this cycle's scale-down
    pub source: Option<PoolRef>,
    pub source_replicas: Option<u32>,
}

/// Mutable progress of a run. Lives only in memory for a single run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplacementPlan {
    target: PoolRef,
    target_replicas: u32,
    entries: Vec<RosterEntry>,
    total_original: u32,
    cycle_count: u32,
}

impl ReplacementPlan {
    /// Plan one cycle per discovered old master. The target starts at 0.
    pub fn new(target: PoolRef, roster: ReplacementRoster) -> Self {
        let total_original = roster.total_replicas();
        Self {
            target,
            target_replicas: 0,
            entries: roster.entries,
            total_original,
            cycle_count: total_original,
        }
    }

    /// Override the number of cycles (requested-replica budget)
    pub fn with_cycle_count(mut self, cycles: u32) -> Self {
        self.cycle_count = cycles;
        self
    }

    pub fn target(&self) -> &PoolRef {
        &self.target
    }

    pub fn target_replicas(&self) -> u32 {
        self.target_replicas
    }

    pub fn entries(&self) -> &[RosterEntry] {
        &self.entries
    }

    pub fn total_original(&self) -> u32 {
        self.total_original
    }

    pub fn cycle_count(&self) -> u32 {
        self.cycle_count
    }

    pub fn remaining_total(&self) -> u32 {
        self.entries.iter().map(|e| e.remaining).sum()
    }

    /// Conservation check, valid at cycle boundaries
    pub fn is_balanced(&self) -> bool {
        self.target_replicas + self.remaining_total() == self.total_original
    }

    pub fn is_exhausted(&self) -> bool {
        self.entries.iter().all(|e| e.remaining == 0)
    }

    /// Target count the next scale-up asks for
    pub fn next_target_replicas(&self) -> u32 {
        self.target_replicas + 1
    }

    /// Grow the target by one and return the new count
    pub fn advance_target(&mut self) -> u32 {
        self.target_replicas += 1;
        self.target_replicas
    }

    /// Index of the earliest roster entry that still has replicas
    pub fn next_source(&self) -> Option<usize> {
        self.entries.iter().position(|e| e.remaining > 0)
    }

    /// The decrement `retire_one` would make, without making it
    pub fn next_retirement(&self) -> Option<Retirement> {
        let entry = &self.entries[self.next_source()?];
        Some(Retirement {
            pool: entry.pool.clone(),
            remaining: entry.remaining - 1,
        })
    }

    /// Decrement the earliest entry with replicas left. Drains one pool fully
    /// before touching the next.
    pub fn retire_one(&mut self) -> Option<Retirement> {
        let idx = self.next_source()?;
        let entry = &mut self.entries[idx];
        entry.remaining -= 1;
        Some(Retirement {
            pool: entry.pool.clone(),
            remaining: entry.remaining,
        })
    }

    /// Project every cycle without touching the plan
    pub fn schedule(&self) -> Vec<PlannedCycle> {
        let mut projection = self.clone();
        let mut cycles = Vec::with_capacity(self.cycle_count as usize);

        for index in 1..=self.cycle_count {
            let target_replicas = projection.advance_target();
            let retirement = projection.retire_one();
            let exhausted = retirement.is_none();
            cycles.push(PlannedCycle {
                index,
                target_replicas,
                source_replicas: retirement.as_ref().map(|r| r.remaining),
                source: retirement.map(|r| r.pool),
            });
            if exhausted {
                break;
            }
        }

        cycles
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool(name: &str) -> PoolRef {
        PoolRef::new("openshift-machine-api", name)
    }

    fn roster(counts: &[(&str, u32)]) -> ReplacementRoster {
        counts.iter().map(|(n, c)| (pool(n), *c)).collect()
    }

    #[test]
    fn test_roster_skips_empty_pools() {
        let roster = roster(&[("a", 2), ("b", 0), ("c", 1)]);
        assert_eq!(roster.len(), 2);
        assert_eq!(roster.total_replicas(), 3);
    }

    #[test]
    fn test_new_plan_is_balanced() {
        let plan = ReplacementPlan::new(pool("new"), roster(&[("a", 2), ("b", 1), ("c", 2)]));
        assert_eq!(plan.total_original(), 5);
        assert_eq!(plan.cycle_count(), 5);
        assert_eq!(plan.target_replicas(), 0);
        assert!(plan.is_balanced());
    }

    #[test]
    fn test_retire_drains_in_roster_order() {
        let mut plan = ReplacementPlan::new(pool("new"), roster(&[("a", 2), ("b", 1)]));
        let order: Vec<(String, u32)> = std::iter::from_fn(|| plan.retire_one())
            .map(|r| (r.pool.name, r.remaining))
            .collect();
        assert_eq!(
            order,
            vec![
                ("a".to_string(), 1),
                ("a".to_string(), 0),
                ("b".to_string(), 0)
            ]
        );
        assert!(plan.is_exhausted());
        assert!(plan.retire_one().is_none());
    }

    #[test]
    fn test_peeking_leaves_plan_untouched() {
        let mut plan = ReplacementPlan::new(pool("new"), roster(&[("a", 1), ("b", 2)]));
        assert_eq!(plan.next_target_replicas(), 1);
        assert_eq!(
            plan.next_retirement(),
            Some(Retirement {
                pool: pool("a"),
                remaining: 0
            })
        );
        assert_eq!(plan.target_replicas(), 0);
        assert_eq!(plan.remaining_total(), 3);

        let peeked = plan.next_retirement();
        assert_eq!(plan.retire_one(), peeked);
        assert_eq!(plan.next_retirement().unwrap().pool, pool("b"));
    }

    #[test]
    fn test_balanced_after_each_cycle() {
        let mut plan = ReplacementPlan::new(pool("new"), roster(&[("a", 1), ("b", 2)]));
        for _ in 0..plan.cycle_count() {
            plan.advance_target();
            assert!(!plan.is_balanced());
            plan.retire_one().unwrap();
            assert!(plan.is_balanced());
        }
        assert_eq!(plan.target_replicas(), 3);
        assert_eq!(plan.remaining_total(), 0);
    }

    #[test]
    fn test_schedule_projection() {
        let plan = ReplacementPlan::new(pool("new"), roster(&[("a", 2), ("b", 1), ("c", 2)]));
        let schedule = plan.schedule();
        assert_eq!(schedule.len(), 5);
        let sources: Vec<&str> = schedule
            .iter()
            .map(|c| c.source.as_ref().unwrap().name.as_str())
            .collect();
        assert_eq!(sources, vec!["a", "a", "b", "c", "c"]);
        assert_eq!(schedule[4].target_replicas, 5);
        assert_eq!(schedule[4].source_replicas, Some(0));
        // projection does not mutate the plan
        assert_eq!(plan.target_replicas(), 0);
    }

    #[test]
    fn test_schedule_stops_when_roster_exhausted() {
        let plan =
            ReplacementPlan::new(pool("new"), roster(&[("a", 2)])).with_cycle_count(4);
        let schedule = plan.schedule();
        assert_eq!(schedule.len(), 3);
        assert_eq!(schedule[2].target_replicas, 3);
        assert!(schedule[2].source.is_none());
    }
}
