//! The commit stage: folds one routed request into the shared state.
//!
//! Commit is where all mutation driven by a completed route happens: debt
//! accrual on the realized hops, payment settlement, the terminal node's
//! cache insertion, pending/reroute bookkeeping and the aggregate
//! counters. The routing engine itself never mutates anything but edge
//! forgiveness state.

use parking_lot::Mutex;
use tracing::trace;

use crate::cache::CacheLayer;
use crate::config::SimConfig;
use crate::report::WorkReport;
use crate::retry::{PendingQueue, RerouteLedger};
use crate::routing::{Request, RouteOutcome};
use crate::state::SimState;
use crate::topology::Network;

pub struct Committer<'a> {
    net: &'a Network,
    cache: &'a CacheLayer,
    pending: &'a PendingQueue,
    reroute: &'a RerouteLedger,
    state: &'a SimState,
    report: &'a Mutex<WorkReport>,
    config: &'a SimConfig,
}

impl<'a> Committer<'a> {
    pub fn new(
        net: &'a Network,
        cache: &'a CacheLayer,
        pending: &'a PendingQueue,
        reroute: &'a RerouteLedger,
        state: &'a SimState,
        report: &'a Mutex<WorkReport>,
        config: &'a SimConfig,
    ) -> Self {
        Self {
            net,
            cache,
            pending,
            reroute,
            state,
            report,
            config,
        }
    }

    /// Commits one routed request.
    pub fn commit(&self, request: &Request, outcome: &RouteOutcome) {
        // Work was performed on every realized hop whether or not the
        // route ultimately succeeded.
        for pair in outcome.route.windows(2) {
            self.net.accrue_debt(pair[0], pair[1], self.config.price);
        }
        for payment in &outcome.payments {
            self.net.settle_debt(payment.payer, payment.payee);
        }

        if outcome.found {
            // Terminal-node-only insertion; the originator's own cache is
            // left to its own future requests.
            if !outcome.found_by_caching {
                if let Some(&terminal) = outcome.route.last() {
                    if terminal != request.originator {
                        self.cache.insert(terminal, request.chunk);
                    }
                }
            }
            if self.config.waiting_enabled {
                self.pending.remove(request.originator, request.chunk);
            }
            if self.config.retry_with_another_peer {
                self.reroute.resolve(request.originator, request.chunk);
            }
        } else {
            if self.config.waiting_enabled {
                self.pending.enqueue(request.originator, request.chunk);
            }
            if self.config.retry_with_another_peer {
                self.reroute.record_failure(
                    request.originator,
                    request.chunk,
                    outcome.route.get(1..).unwrap_or(&[]),
                );
            }
        }

        self.state.record(outcome);
        self.report.lock().record(request, outcome);
        trace!(
            timestep = request.timestep,
            found = outcome.found,
            "committed request"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metric::{ChunkId, NodeId};
    use crate::topology::NetworkBuilder;

    struct Fixture {
        net: Network,
        cache: CacheLayer,
        pending: PendingQueue,
        reroute: RerouteLedger,
        state: SimState,
        report: Mutex<WorkReport>,
        config: SimConfig,
    }

    impl Fixture {
        fn new(config: SimConfig) -> Self {
            let mut builder = NetworkBuilder::new(4);
            builder.edge(NodeId(1), NodeId(9));
            builder.edge(NodeId(9), NodeId(8));
            let net = builder.build();
            let node_count = net.node_count();
            Self {
                cache: CacheLayer::new(config.cache_enabled, config.cache_size),
                pending: PendingQueue::new(),
                reroute: RerouteLedger::new(),
                state: SimState::new(vec![NodeId(1)], &config),
                report: Mutex::new(WorkReport::new(node_count)),
                net,
                config,
            }
        }

        fn committer(&self) -> Committer<'_> {
            Committer::new(
                &self.net,
                &self.cache,
                &self.pending,
                &self.reroute,
                &self.state,
                &self.report,
                &self.config,
            )
        }

        fn request(&self) -> Request {
            Request {
                originator: NodeId(1),
                chunk: ChunkId(8),
                timestep: 1,
                originator_index: 0,
                responsible: vec![NodeId(8)],
            }
        }
    }

    fn found_route(nodes: &[u32]) -> RouteOutcome {
        RouteOutcome {
            route: nodes.iter().copied().map(NodeId).collect(),
            found: true,
            ..Default::default()
        }
    }

    #[test]
    fn success_accrues_debt_and_caches_at_terminal() {
        let config = SimConfig {
            cache_enabled: true,
            price: 1,
            ..Default::default()
        };
        let fixture = Fixture::new(config);
        let request = fixture.request();
        fixture.committer().commit(&request, &found_route(&[1, 9, 8]));

        assert_eq!(fixture.net.edge_debt(NodeId(1), NodeId(9)), 1);
        assert_eq!(fixture.net.edge_debt(NodeId(9), NodeId(8)), 1);
        assert!(fixture.cache.contains(NodeId(8), ChunkId(8)));
        assert_eq!(fixture.cache.len(NodeId(9)), 0);
        assert_eq!(fixture.state.snapshot().successful_found, 1);
    }

    #[test]
    fn payments_settle_edge_debt() {
        let config = SimConfig {
            price: 1,
            ..Default::default()
        };
        let fixture = Fixture::new(config);
        fixture.net.accrue_debt(NodeId(1), NodeId(9), 10);
        let mut outcome = found_route(&[1, 9]);
        outcome.payments.push(crate::payment::Payment {
            payer: NodeId(1),
            payee: NodeId(9),
            chunk: ChunkId(8),
            is_originator: true,
        });
        fixture.committer().commit(&fixture.request(), &outcome);
        // 10 accrued + 1 for this hop, then settled to zero.
        assert_eq!(fixture.net.edge_debt(NodeId(1), NodeId(9)), 0);
    }

    #[test]
    fn failure_feeds_pending_and_reroute() {
        let config = SimConfig {
            waiting_enabled: true,
            retry_with_another_peer: true,
            ..Default::default()
        };
        let fixture = Fixture::new(config);
        let request = fixture.request();
        let outcome = RouteOutcome {
            route: vec![NodeId(1), NodeId(9)],
            threshold_failed: true,
            ..Default::default()
        };
        fixture.committer().commit(&request, &outcome);

        assert_eq!(fixture.pending.backlog(NodeId(1)), 1);
        assert_eq!(fixture.reroute.current(NodeId(1)), Some(ChunkId(8)));
        assert!(fixture.reroute.is_rejected(NodeId(1), ChunkId(8), NodeId(9)));
        assert_eq!(fixture.state.snapshot().failed_threshold, 1);
    }

    #[test]
    fn success_clears_retry_state() {
        let config = SimConfig {
            waiting_enabled: true,
            retry_with_another_peer: true,
            ..Default::default()
        };
        let fixture = Fixture::new(config);
        let request = fixture.request();
        fixture.pending.enqueue(NodeId(1), ChunkId(8));
        fixture.reroute.record_failure(NodeId(1), ChunkId(8), &[NodeId(9)]);

        fixture.committer().commit(&request, &found_route(&[1, 9, 8]));
        assert!(fixture.pending.is_empty(NodeId(1)));
        assert_eq!(fixture.reroute.current(NodeId(1)), None);
    }

    #[test]
    fn cache_hit_at_originator_inserts_nothing() {
        let config = SimConfig {
            cache_enabled: true,
            ..Default::default()
        };
        let fixture = Fixture::new(config);
        let outcome = RouteOutcome {
            found: true,
            found_by_caching: true,
            ..Default::default()
        };
        fixture.committer().commit(&fixture.request(), &outcome);
        assert_eq!(fixture.cache.len(NodeId(1)), 0);
        assert_eq!(fixture.state.snapshot().successful_found, 1);
    }
}
