//! Error taxonomy for the simulator.
//!
//! Only configuration errors and topology-corruption signals are surfaced
//! as `Err` values. Access and threshold failures are expected outcomes:
//! they travel as flags on [`crate::routing::RouteOutcome`] and are folded
//! into the aggregate counters, never raised through this type.

use crate::metric::{ChunkId, NodeId};

pub type Result<T> = std::result::Result<T, SimError>;

#[derive(Debug, thiserror::Error)]
pub enum SimError {
    /// A routing candidate was no closer to the chunk than the node that
    /// offered it. The adjacency buckets guarantee strict progress, so this
    /// signals a corrupted topology and aborts the run.
    #[error(
        "routing invariant violated: candidate {candidate} is not closer to chunk {chunk} than {current}"
    )]
    InvariantViolation {
        current: NodeId,
        candidate: NodeId,
        chunk: ChunkId,
    },

    /// The configured key width disagrees with the ingested topology's.
    /// Chunk ids are drawn from the configured space but routed against
    /// the topology's buckets, so the two widths must coincide.
    #[error("configured key width {config} does not match the topology's key width {topology}")]
    KeySpaceMismatch { config: u32, topology: u32 },

    /// The ingested topology has no nodes, so there is nothing to
    /// originate requests from.
    #[error("topology contains no nodes")]
    EmptyTopology,

    /// Lookup of a node id that is not part of the ingested topology.
    #[error("unknown node {0} in topology")]
    UnknownNode(NodeId),

    #[error("failed to read topology file: {0}")]
    TopologyIo(#[from] std::io::Error),

    #[error("malformed topology file at line {line}: {reason}")]
    TopologyParse { line: usize, reason: String },
}
