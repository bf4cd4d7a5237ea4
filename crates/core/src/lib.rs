/// Chunk caching layer over the network's nodes.
pub mod cache;

/// Simulation parameters, CLI surface and defaults.
pub mod config;

/// Library error and result types.
pub mod error;

/// XOR distance and proximity over the key space.
pub mod metric;

/// Per-hop payment records and settlement rewriting.
pub mod payment;

/// Concurrent simulation drivers (request generation, routing workers,
/// commit stage).
pub mod pipeline;

/// Work accounting and fairness reporting.
pub mod report;

/// Retry bookkeeping for failed requests.
pub mod retry;

/// Greedy routing over the bucketed topology.
pub mod routing;

/// Shared run counters and originator rotation.
pub mod state;

/// Network topology, edge accounting and edge locking.
pub mod topology;

pub use config::{PaymentPolicy, ScheduleMode, SimConfig};
pub use error::{Result, SimError};
pub use metric::{ChunkId, NodeId};
pub use pipeline::{RunSummary, Simulation};
pub use topology::Network;
