//! Deferred-retry bookkeeping for failed requests.
//!
//! Two cooperating structures, both keyed per originator and both consulted
//! by the request generator ahead of fresh random selection:
//!
//! - [`PendingQueue`]: epoch-scheduled backlog; failed chunk ids are
//!   released for reattempt in rate-limited waves.
//! - [`RerouteLedger`]: immediate-resubmit record that also remembers which
//!   peers were part of the failed route, so the next attempt steers around
//!   them.

mod pending;
mod reroute;

pub use pending::PendingQueue;
pub use reroute::RerouteLedger;
