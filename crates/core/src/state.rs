//! Shared aggregate state: counters, the global timestep and originator
//! rotation.
//!
//! Everything here is mutated by many workers at once, so every field is
//! an atomic with exactly one semantic writer per commit; no lost-update
//! races are possible and no ambient globals exist. The timestep is handed
//! out by fetch-add, making assigned values unique and strictly
//! increasing.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use crate::config::{SimConfig, ORIGINATOR_ROTATION_CADENCE};
use crate::metric::NodeId;
use crate::routing::RouteOutcome;

/// Point-in-time copy of the aggregate counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct CounterSnapshot {
    pub successful_found: u64,
    pub failed_threshold: u64,
    pub failed_access: u64,
    pub committed: u64,
    pub timestep: u64,
    pub originator_index: usize,
}

/// Simulation-wide mutable state shared by all workers.
pub struct SimState {
    originators: Vec<NodeId>,
    same_originator: bool,
    successful_found: AtomicU64,
    failed_threshold: AtomicU64,
    failed_access: AtomicU64,
    committed: AtomicU64,
    timestep: AtomicU64,
    originator_index: AtomicUsize,
}

impl SimState {
    pub fn new(originators: Vec<NodeId>, config: &SimConfig) -> Self {
        debug_assert!(!originators.is_empty());
        Self {
            originators,
            same_originator: config.same_originator,
            successful_found: AtomicU64::new(0),
            failed_threshold: AtomicU64::new(0),
            failed_access: AtomicU64::new(0),
            committed: AtomicU64::new(0),
            timestep: AtomicU64::new(0),
            originator_index: AtomicUsize::new(0),
        }
    }

    /// Hands out the next global timestep (first call returns 1).
    pub fn next_timestep(&self) -> u64 {
        self.timestep.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Advances the bounded originator counter and returns the index to
    /// use for this tick.
    ///
    /// Fixed-cadence mode holds the index and advances it only on cadence
    /// boundaries; per-tick mode advances on every call. Both wrap to 0 at
    /// the originator count.
    pub fn rotate_originator(&self, timestep: u64) -> usize {
        let count = self.originators.len();
        if self.same_originator && timestep % ORIGINATOR_ROTATION_CADENCE != 0 {
            return self.originator_index.load(Ordering::Acquire);
        }
        self.originator_index
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                Some((current + 1) % count)
            })
            .map(|previous| (previous + 1) % count)
            .unwrap_or(0)
    }

    pub fn originator(&self, index: usize) -> NodeId {
        self.originators[index % self.originators.len()]
    }

    /// Folds a routed request into the aggregate counters.
    pub fn record(&self, outcome: &RouteOutcome) {
        if outcome.found {
            self.successful_found.fetch_add(1, Ordering::Relaxed);
        } else if outcome.access_failed {
            self.failed_access.fetch_add(1, Ordering::Relaxed);
        } else if outcome.threshold_failed {
            self.failed_threshold.fetch_add(1, Ordering::Relaxed);
        }
        self.committed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> CounterSnapshot {
        CounterSnapshot {
            successful_found: self.successful_found.load(Ordering::Relaxed),
            failed_threshold: self.failed_threshold.load(Ordering::Relaxed),
            failed_access: self.failed_access.load(Ordering::Relaxed),
            committed: self.committed.load(Ordering::Relaxed),
            timestep: self.timestep.load(Ordering::Acquire),
            originator_index: self.originator_index.load(Ordering::Acquire),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state(count: usize, same_originator: bool) -> SimState {
        let config = SimConfig {
            same_originator,
            ..Default::default()
        };
        SimState::new((0..count as u32).map(NodeId).collect(), &config)
    }

    #[test]
    fn timesteps_are_unique_and_increasing() {
        let state = state(4, false);
        let first = state.next_timestep();
        let second = state.next_timestep();
        assert_eq!(first, 1);
        assert_eq!(second, 2);
    }

    #[test]
    fn per_tick_rotation_wraps() {
        let state = state(3, false);
        let seen: Vec<usize> = (1..=7).map(|t| state.rotate_originator(t)).collect();
        assert_eq!(seen, vec![1, 2, 0, 1, 2, 0, 1]);
    }

    #[test]
    fn fixed_cadence_holds_between_boundaries() {
        let state = state(3, true);
        // Ticks 1..=99 hold the initial index.
        for timestep in 1..ORIGINATOR_ROTATION_CADENCE {
            assert_eq!(state.rotate_originator(timestep), 0);
        }
        // The cadence boundary advances it once.
        assert_eq!(state.rotate_originator(ORIGINATOR_ROTATION_CADENCE), 1);
        assert_eq!(state.rotate_originator(ORIGINATOR_ROTATION_CADENCE + 1), 1);
    }

    #[test]
    fn record_buckets_outcomes() {
        let state = state(1, false);
        state.record(&RouteOutcome {
            found: true,
            ..Default::default()
        });
        state.record(&RouteOutcome {
            access_failed: true,
            ..Default::default()
        });
        state.record(&RouteOutcome {
            threshold_failed: true,
            ..Default::default()
        });
        let snapshot = state.snapshot();
        assert_eq!(snapshot.successful_found, 1);
        assert_eq!(snapshot.failed_access, 1);
        assert_eq!(snapshot.failed_threshold, 1);
        assert_eq!(snapshot.committed, 3);
    }
}
