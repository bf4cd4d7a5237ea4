//! Payment records and post-hoc settlement rewriting.
//!
//! Payments are an accounting abstraction, not a ledger protocol: each
//! record names who compensates whom for carrying a chunk one hop. The
//! routing engine emits a sparse list (one entry per hop that needed a
//! payment to proceed); the optional settlement pass normalizes that list
//! into a dense per-hop chain for experiments that want every hop
//! compensated uniformly.

use serde::{Deserialize, Serialize};

use crate::metric::{ChunkId, NodeId};
use crate::routing::RouteOutcome;

/// A single hop compensation: `payer` pays `payee` for carrying `chunk`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payment {
    pub payer: NodeId,
    pub payee: NodeId,
    pub chunk: ChunkId,
    /// Whether the payer is the route's original requester.
    pub is_originator: bool,
}

/// The "forwarders pay forces originator to pay" rewrite.
///
/// On a successful route with a non-empty sparse payment list, replaces it
/// with one payment per consecutive hop pair of the realized route, the
/// first marked `is_originator`. On a failed route the payment list is
/// cleared. Routes without payments are left untouched.
pub fn settle(outcome: &mut RouteOutcome, chunk: ChunkId) {
    if !outcome.found {
        outcome.payments.clear();
        return;
    }
    if outcome.payments.is_empty() || outcome.route.len() < 2 {
        return;
    }
    outcome.payments = outcome
        .route
        .windows(2)
        .enumerate()
        .map(|(i, pair)| Payment {
            payer: pair[0],
            payee: pair[1],
            chunk,
            is_originator: i == 0,
        })
        .collect();
}
