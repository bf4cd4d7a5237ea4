//! Immediate-resubmit ledger for failed routes.

use std::collections::{HashMap, HashSet};

use dashmap::DashMap;
use tracing::trace;

use crate::metric::{ChunkId, NodeId};

#[derive(Debug, Default)]
struct RerouteEntry {
    /// Chunk ids currently being retried, most recently failed last.
    chunks: Vec<ChunkId>,
    /// Peers already visited on failed routes, per chunk. Consulted during
    /// next-hop evaluation to avoid re-selecting a dead end.
    rejected: HashMap<ChunkId, HashSet<NodeId>>,
}

/// Per-originator record of peers rejected during failed routes.
///
/// While an entry exists for an originator, the request generator
/// prioritizes resubmitting its most recently failed chunk ahead of fresh
/// random selection, and the routing engine skips every peer recorded
/// against that `(originator, chunk)` pair.
#[derive(Default)]
pub struct RerouteLedger {
    entries: DashMap<NodeId, RerouteEntry>,
}

impl RerouteLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// The chunk the originator should resubmit next, if any (LIFO).
    pub fn current(&self, originator: NodeId) -> Option<ChunkId> {
        self.entries
            .get(&originator)
            .and_then(|e| e.chunks.last().copied())
    }

    /// Whether `peer` was part of a failed route for this
    /// originator/chunk pair.
    pub fn is_rejected(&self, originator: NodeId, chunk: ChunkId, peer: NodeId) -> bool {
        self.entries
            .get(&originator)
            .and_then(|e| e.rejected.get(&chunk).map(|set| set.contains(&peer)))
            .unwrap_or(false)
    }

    /// Records a failed route: the chunk joins the retry list (no
    /// duplicates) and every visited peer beyond the originator joins its
    /// rejected set.
    pub fn record_failure(&self, originator: NodeId, chunk: ChunkId, visited: &[NodeId]) {
        let mut entry = self.entries.entry(originator).or_default();
        if !entry.chunks.contains(&chunk) {
            entry.chunks.push(chunk);
        }
        let rejected = entry.rejected.entry(chunk).or_default();
        rejected.extend(visited.iter().copied());
        trace!(
            %originator,
            %chunk,
            rejected = rejected.len(),
            "recorded failed route for reroute"
        );
    }

    /// Clears the retry state for a chunk once it has been found; drained
    /// entries are deleted.
    pub fn resolve(&self, originator: NodeId, chunk: ChunkId) {
        let mut drained = false;
        if let Some(mut entry) = self.entries.get_mut(&originator) {
            entry.chunks.retain(|&c| c != chunk);
            entry.rejected.remove(&chunk);
            drained = entry.chunks.is_empty() && entry.rejected.is_empty();
        }
        if drained {
            self.entries
                .remove_if(&originator, |_, e| e.chunks.is_empty() && e.rejected.is_empty());
        }
    }
}
