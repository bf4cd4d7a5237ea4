//! Per-directed-edge mutual exclusion.
//!
//! Models exclusive, single-flight access to a peer during hop selection:
//! at most one routing evaluation may be assessing threshold acceptance on
//! a given directed edge at any instant, so two concurrent requests can
//! never race on the same peer's debt counters.
//!
//! Locks are handed out as RAII [`EdgeGuard`]s, guaranteeing release on
//! every exit path of a hop-selection round, including the
//! invariant-violation abort path.

use std::collections::HashSet;

use parking_lot::{Condvar, Mutex};

use crate::metric::NodeId;

/// Explicit lock table keyed by directed `(from, to)` pairs.
///
/// A disabled table (single-threaded baseline runs) hands out no-op guards
/// without touching any shared state.
pub struct EdgeLockTable {
    enabled: bool,
    held: Mutex<HashSet<(NodeId, NodeId)>>,
    released: Condvar,
}

impl EdgeLockTable {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            held: Mutex::new(HashSet::new()),
            released: Condvar::new(),
        }
    }

    /// Acquires exclusive access to the directed edge, blocking while
    /// another evaluation holds it. A round must never lock the same edge
    /// twice without dropping the first guard, or it will deadlock against
    /// itself.
    pub fn lock(&self, from: NodeId, to: NodeId) -> EdgeGuard<'_> {
        if !self.enabled {
            return EdgeGuard {
                table: None,
                edge: (from, to),
            };
        }
        let edge = (from, to);
        let mut held = self.held.lock();
        while held.contains(&edge) {
            self.released.wait(&mut held);
        }
        held.insert(edge);
        EdgeGuard {
            table: Some(self),
            edge,
        }
    }

    /// Whether the directed edge is currently held.
    pub fn is_locked(&self, from: NodeId, to: NodeId) -> bool {
        self.enabled && self.held.lock().contains(&(from, to))
    }

    fn unlock(&self, edge: (NodeId, NodeId)) {
        let mut held = self.held.lock();
        held.remove(&edge);
        self.released.notify_all();
    }
}

/// Scoped ownership of a directed edge; releases on drop.
pub struct EdgeGuard<'a> {
    table: Option<&'a EdgeLockTable>,
    edge: (NodeId, NodeId),
}

impl Drop for EdgeGuard<'_> {
    fn drop(&mut self) {
        if let Some(table) = self.table {
            table.unlock(self.edge);
        }
    }
}
