//! Greedy next-hop selection and route assembly over the XOR metric.
//!
//! A request terminates in one of four states: found (frontier reached the
//! storage depth), found by caching (a visited node already held the
//! chunk), threshold-failed (a payable rejecting peer existed but no
//! payment policy permitted continuation) or access-failed (no viable
//! candidate at all). Failures are returned as flags on the outcome, never
//! as errors; retry is entirely the scheduling loop's business. The only
//! `Err` paths are topology corruption and unknown-node lookups, which
//! abort the run.

use tracing::trace;

use crate::cache::CacheLayer;
use crate::config::{PaymentPolicy, SimConfig};
use crate::error::{Result, SimError};
use crate::metric::{self, ChunkId, NodeId};
use crate::payment::Payment;
use crate::retry::RerouteLedger;
use crate::topology::{EdgeGuard, EdgeLockTable, Network};

mod threshold;

/// A single simulated content request.
#[derive(Debug, Clone)]
pub struct Request {
    pub originator: NodeId,
    pub chunk: ChunkId,
    /// Global timestep assigned when the request was generated.
    pub timestep: u64,
    pub originator_index: usize,
    /// The nodes structurally closest to the chunk, precomputed at
    /// generation and independent of routing state.
    pub responsible: Vec<NodeId>,
}

/// Result of routing one request.
#[derive(Debug, Default, Clone)]
pub struct RouteOutcome {
    /// Visited nodes, head = originator. Empty iff the originator's own
    /// cache satisfied the request.
    pub route: Vec<NodeId>,
    pub payments: Vec<Payment>,
    pub found: bool,
    pub found_by_caching: bool,
    pub access_failed: bool,
    pub threshold_failed: bool,
}

/// Outcome of one hop-selection round.
struct Hop {
    next: Option<NodeId>,
    payment: Option<Payment>,
    threshold_failed: bool,
    access_failed: bool,
    /// Carried into the next round for the pay-if-orig-pays chain.
    paid: bool,
}

/// The routing decision engine. Borrows all shared collaborators; holds no
/// state of its own between requests.
pub struct RoutingEngine<'a> {
    net: &'a Network,
    locks: &'a EdgeLockTable,
    cache: &'a CacheLayer,
    reroute: &'a RerouteLedger,
    config: &'a SimConfig,
}

impl<'a> RoutingEngine<'a> {
    pub fn new(
        net: &'a Network,
        locks: &'a EdgeLockTable,
        cache: &'a CacheLayer,
        reroute: &'a RerouteLedger,
        config: &'a SimConfig,
    ) -> Self {
        Self {
            net,
            locks,
            cache,
            reroute,
            config,
        }
    }

    /// Assembles a route for `request`, hop by hop, until a terminal state
    /// is reached.
    pub fn find_route(&self, request: &Request) -> Result<RouteOutcome> {
        let chunk = request.chunk;
        let originator = request.originator;
        let depth = self.config.storage_depth;
        let bits = self.net.bits();

        if self.cache.contains(originator, chunk) {
            return Ok(RouteOutcome {
                found: true,
                found_by_caching: true,
                ..Default::default()
            });
        }

        let mut outcome = RouteOutcome {
            route: vec![originator],
            ..Default::default()
        };

        if metric::proximity(originator, chunk, bits) >= depth {
            outcome.found = true;
            return Ok(outcome);
        }

        let mut current = originator;
        let mut prev_paid = self.config.payment_policy == PaymentPolicy::PayIfOrigPays;
        loop {
            let hop = self.next_hop(request, current, prev_paid)?;
            prev_paid = hop.paid;
            if let Some(payment) = hop.payment {
                outcome.payments.push(payment);
            }
            if let Some(next) = hop.next {
                outcome.route.push(next);
            }
            if hop.threshold_failed || hop.access_failed {
                outcome.threshold_failed = hop.threshold_failed;
                outcome.access_failed = hop.access_failed;
                break;
            }
            // Neither flag set implies a hop was selected.
            let Some(next) = hop.next else {
                break;
            };
            if metric::proximity(next, chunk, bits) >= depth {
                outcome.found = true;
                break;
            }
            if self.config.cache_enabled && self.cache.contains(next, chunk) {
                outcome.found = true;
                outcome.found_by_caching = true;
                break;
            }
            current = next;
        }

        trace!(
            originator = %originator,
            chunk = %chunk,
            hops = outcome.route.len().saturating_sub(1),
            found = outcome.found,
            cached = outcome.found_by_caching,
            "routed request"
        );
        Ok(outcome)
    }

    /// One hop-selection round: scans the adjacency bucket pointed at by
    /// the current distance; the closest accepting peer wins, the closest
    /// payable rejecting peer is kept as a fallback if payments allow it.
    ///
    /// Every edge evaluated here is unlocked before the round returns, on
    /// every path: the guards are scoped to this call.
    fn next_hop(&self, request: &Request, current: NodeId, prev_paid: bool) -> Result<Hop> {
        let chunk = request.chunk;
        let last_distance = metric::distance(current, chunk);
        let bucket = self.net.bits() - metric::bit_length(last_distance);
        let candidates = self.net.adjacency(current, bucket)?;

        let mut curr_dist = last_distance;
        let mut pay_dist = last_distance;
        let mut next: Option<(NodeId, EdgeGuard<'_>)> = None;
        let mut pay: Option<(NodeId, EdgeGuard<'_>)> = None;

        for &candidate in candidates {
            let dist = metric::distance(candidate, chunk);
            if metric::bit_length(dist) >= metric::bit_length(last_distance) {
                // Bucketing guarantees strict progress; anything else is a
                // corrupted topology. Guards release on this path too.
                return Err(SimError::InvariantViolation {
                    current,
                    candidate,
                    chunk,
                });
            }
            if dist >= curr_dist {
                continue;
            }
            if self.config.retry_with_another_peer
                && self.reroute.is_rejected(request.originator, chunk, candidate)
            {
                // Part of an earlier failed route for this chunk.
                continue;
            }

            let guard = self.locks.lock(current, candidate);
            if threshold::accepts(self.net, current, candidate, request.timestep, self.config) {
                // Supersedes any provisional winner and any provisional
                // payment candidate; their locks release here.
                pay = None;
                curr_dist = dist;
                next = Some((candidate, guard));
            } else if self.config.payment_enabled && next.is_none() && dist < pay_dist {
                pay_dist = dist;
                pay = Some((candidate, guard));
            }
        }

        let mut hop = Hop {
            next: None,
            payment: None,
            threshold_failed: false,
            access_failed: false,
            paid: false,
        };

        match (&next, &pay) {
            (Some((winner, _)), _) => {
                hop.next = Some(*winner);
            }
            (None, Some((candidate, _))) => {
                hop.threshold_failed = true;
                let is_originator = current == request.originator;
                let proceed = match self.config.payment_policy {
                    PaymentPolicy::OnlyOriginatorPays => is_originator,
                    PaymentPolicy::PayIfOrigPays => is_originator || prev_paid,
                    PaymentPolicy::AlwaysPays => true,
                };
                if proceed {
                    hop.payment = Some(Payment {
                        payer: current,
                        payee: *candidate,
                        chunk,
                        is_originator,
                    });
                    hop.next = Some(*candidate);
                    hop.threshold_failed = false;
                }
            }
            (None, None) => {
                hop.access_failed = true;
            }
        }
        hop.paid = hop.payment.is_some();
        Ok(hop)
    }
}
