//! Epoch-scheduled deferred retry queue.

use dashmap::DashMap;
use tracing::trace;

use crate::metric::{ChunkId, NodeId};

#[derive(Debug, Default)]
struct PendingEntry {
    /// Backlog of chunk ids awaiting reattempt, oldest first.
    chunks: Vec<ChunkId>,
    /// Current backlog size.
    pending: u32,
    /// Remaining pops granted by the last epoch release.
    epoch_decrement: u32,
}

/// Per-originator backlog of content ids awaiting epoch-scheduled
/// reattempt.
///
/// Failures append to the backlog; on each epoch boundary the whole
/// current backlog length becomes a drain allowance, and while that
/// allowance is positive the request generator pops the most recently
/// queued id (LIFO) instead of drawing a fresh one. Bursts of failures are
/// thus resubmitted in controlled waves instead of immediately flooding
/// the same hot chunk.
#[derive(Default)]
pub struct PendingQueue {
    entries: DashMap<NodeId, PendingEntry>,
}

impl PendingQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a failed chunk to the originator's backlog.
    pub fn enqueue(&self, originator: NodeId, chunk: ChunkId) {
        let mut entry = self.entries.entry(originator).or_default();
        entry.chunks.push(chunk);
        entry.pending = entry.chunks.len() as u32;
        trace!(%originator, %chunk, backlog = entry.pending, "queued pending retry");
    }

    /// Current backlog size for the originator.
    pub fn backlog(&self, originator: NodeId) -> usize {
        self.entries
            .get(&originator)
            .map(|e| e.chunks.len())
            .unwrap_or(0)
    }

    pub fn is_empty(&self, originator: NodeId) -> bool {
        self.backlog(originator) == 0
    }

    /// Converts the current backlog length into the drain allowance for
    /// the epoch that just began.
    pub fn release_epoch(&self, originator: NodeId) {
        if let Some(mut entry) = self.entries.get_mut(&originator) {
            if !entry.chunks.is_empty() {
                entry.epoch_decrement = entry.chunks.len() as u32;
            }
        }
    }

    /// Pops the most recently queued chunk while the drain allowance is
    /// positive; `None` otherwise. Drained entries are deleted.
    pub fn pop_released(&self, originator: NodeId) -> Option<ChunkId> {
        let mut entry = self.entries.get_mut(&originator)?;
        if entry.epoch_decrement == 0 {
            return None;
        }
        let chunk = entry.chunks.pop()?;
        entry.epoch_decrement -= 1;
        entry.pending = entry.chunks.len() as u32;
        let drained = entry.chunks.is_empty();
        drop(entry);
        if drained {
            self.entries.remove_if(&originator, |_, e| e.chunks.is_empty());
        }
        Some(chunk)
    }

    /// Drops every queued occurrence of `chunk` once the content has been
    /// found through another path.
    pub fn remove(&self, originator: NodeId, chunk: ChunkId) {
        let mut drained = false;
        if let Some(mut entry) = self.entries.get_mut(&originator) {
            entry.chunks.retain(|&c| c != chunk);
            entry.pending = entry.chunks.len() as u32;
            entry.epoch_decrement = entry.epoch_decrement.min(entry.pending);
            drained = entry.chunks.is_empty();
        }
        if drained {
            self.entries.remove_if(&originator, |_, e| e.chunks.is_empty());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drains_lifo_after_release() {
        let queue = PendingQueue::new();
        let originator = NodeId(42);
        for chunk in [1, 2, 3] {
            queue.enqueue(originator, ChunkId(chunk));
        }
        // Nothing pops before an epoch boundary releases the backlog.
        assert_eq!(queue.pop_released(originator), None);

        queue.release_epoch(originator);
        assert_eq!(queue.pop_released(originator), Some(ChunkId(3)));
        assert_eq!(queue.pop_released(originator), Some(ChunkId(2)));
        assert_eq!(queue.pop_released(originator), Some(ChunkId(1)));
        // Exactly the backlog is drained, then normal selection resumes.
        assert_eq!(queue.pop_released(originator), None);
        assert!(queue.is_empty(originator));
    }

    #[test]
    fn allowance_is_snapshot_of_backlog() {
        let queue = PendingQueue::new();
        let originator = NodeId(7);
        queue.enqueue(originator, ChunkId(1));
        queue.release_epoch(originator);
        // A failure queued after the release does not extend the allowance.
        queue.enqueue(originator, ChunkId(2));
        assert_eq!(queue.pop_released(originator), Some(ChunkId(2)));
        assert_eq!(queue.pop_released(originator), None);
        assert_eq!(queue.backlog(originator), 1);
    }

    #[test]
    fn remove_clears_found_chunks() {
        let queue = PendingQueue::new();
        let originator = NodeId(7);
        queue.enqueue(originator, ChunkId(1));
        queue.enqueue(originator, ChunkId(2));
        queue.enqueue(originator, ChunkId(1));
        queue.remove(originator, ChunkId(1));
        assert_eq!(queue.backlog(originator), 1);
        queue.remove(originator, ChunkId(2));
        assert!(queue.is_empty(originator));
    }
}
