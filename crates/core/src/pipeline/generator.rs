//! Request generation.
//!
//! Selection ladder for the next chunk id, in order: the pending queue's
//! epoch-released backlog, the reroute ledger's most recently failed
//! chunk, then a fresh random draw (optionally biased towards a hot
//! prefix of the content space). The generator owns the run's iteration
//! budget and the seeded RNG; a single-generator configuration with a
//! fixed seed is the deterministic baseline.

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use tracing::trace;

use crate::config::{SimConfig, NUM_PREFERRED_CHUNKS};
use crate::metric::ChunkId;
use crate::retry::{PendingQueue, RerouteLedger};
use crate::routing::Request;
use crate::state::SimState;
use crate::topology::Network;

pub struct RequestGenerator<'a> {
    net: &'a Network,
    pending: &'a PendingQueue,
    reroute: &'a RerouteLedger,
    state: &'a SimState,
    config: &'a SimConfig,
    rng: SmallRng,
    counter: u64,
}

impl<'a> RequestGenerator<'a> {
    pub fn new(
        net: &'a Network,
        pending: &'a PendingQueue,
        reroute: &'a RerouteLedger,
        state: &'a SimState,
        config: &'a SimConfig,
    ) -> Self {
        Self {
            net,
            pending,
            reroute,
            state,
            config,
            rng: SmallRng::seed_from_u64(config.seed),
            counter: 0,
        }
    }

    /// Whether the iteration budget is exhausted.
    pub fn exhausted(&self) -> bool {
        self.counter >= self.config.iterations
    }

    /// Runs one generation tick. Returns `None` when the tick produced no
    /// request (an idle tick near the end of the horizon); the budget may
    /// still have advanced.
    pub fn step(&mut self) -> Option<Request> {
        let timestep = self.state.next_timestep();
        let originator_index = self.state.rotate_originator(timestep);
        let originator = self.state.originator(originator_index);
        let horizon = self.config.iterations;

        let mut chunk: Option<ChunkId> = None;

        if self.config.waiting_enabled {
            let phase = timestep as i64 - originator_index as i64;
            if phase.rem_euclid(self.config.epoch.max(1) as i64) == 0 || timestep > horizon {
                self.pending.release_epoch(originator);
            }
            chunk = self.pending.pop_released(originator);
        }

        if self.config.retry_with_another_peer {
            if let Some(retried) = self.reroute.current(originator) {
                chunk = Some(retried);
            }
        }

        // A retried chunk does not consume an iteration when iterations
        // are defined as unique chunks.
        if !self.config.iteration_means_unique_chunk || chunk.is_none() {
            self.counter += 1;
        }

        if chunk.is_none() && timestep <= horizon {
            chunk = Some(self.draw_chunk());
        }

        let chunk = chunk?;
        trace!(%originator, %chunk, timestep, "generated request");
        Some(Request {
            originator,
            chunk,
            timestep,
            originator_index,
            responsible: self.net.responsible_nodes(chunk),
        })
    }

    fn draw_chunk(&mut self) -> ChunkId {
        let space = self.config.content_space().max(2);
        if self.config.preferred_chunks_enabled && space > NUM_PREFERRED_CHUNKS {
            if self.rng.gen::<f32>() <= 0.5 {
                ChunkId(self.rng.gen_range(0..NUM_PREFERRED_CHUNKS))
            } else {
                ChunkId(self.rng.gen_range(NUM_PREFERRED_CHUNKS..space))
            }
        } else {
            ChunkId(self.rng.gen_range(0..space))
        }
    }
}
