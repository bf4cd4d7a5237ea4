//! Per-node bounded chunk caches.
//!
//! Each node holds a capacity-bounded set of chunk ids with FIFO
//! (insertion-order) eviction. Eviction is deterministic on purpose: the
//! policy feeds directly into the fairness metrics computed downstream, so
//! any change here must be documented. Lookups that short-circuit routing
//! are counted in a global hit counter.

use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;

use crate::metric::{ChunkId, NodeId};

#[derive(Debug, Default)]
struct NodeCache {
    /// Insertion order, oldest at the front.
    order: VecDeque<ChunkId>,
    members: HashSet<ChunkId>,
}

/// Shared cache layer over all nodes.
pub struct CacheLayer {
    enabled: bool,
    capacity: usize,
    entries: DashMap<NodeId, NodeCache>,
    hits: AtomicU64,
}

impl CacheLayer {
    pub fn new(enabled: bool, capacity: usize) -> Self {
        Self {
            enabled,
            capacity,
            entries: DashMap::new(),
            hits: AtomicU64::new(0),
        }
    }

    /// Membership test that counts a hit when it short-circuits routing.
    pub fn contains(&self, node: NodeId, chunk: ChunkId) -> bool {
        let hit = self
            .entries
            .get(&node)
            .map(|cache| cache.members.contains(&chunk))
            .unwrap_or(false);
        if hit {
            self.hits.fetch_add(1, Ordering::Relaxed);
        }
        hit
    }

    /// Inserts `chunk` into `node`'s cache, evicting the oldest entry on
    /// overflow. A no-op when caching is disabled, when the chunk is
    /// already held, or with zero capacity.
    pub fn insert(&self, node: NodeId, chunk: ChunkId) {
        if !self.enabled || self.capacity == 0 {
            return;
        }
        let mut cache = self.entries.entry(node).or_default();
        if !cache.members.insert(chunk) {
            return;
        }
        cache.order.push_back(chunk);
        if cache.order.len() > self.capacity {
            if let Some(evicted) = cache.order.pop_front() {
                cache.members.remove(&evicted);
            }
        }
    }

    /// Total lookups that short-circuited routing.
    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    /// Number of chunks currently held by `node`.
    pub fn len(&self, node: NodeId) -> usize {
        self.entries
            .get(&node)
            .map(|cache| cache.order.len())
            .unwrap_or(0)
    }
}
