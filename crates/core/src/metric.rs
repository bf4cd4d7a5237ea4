//! XOR metric over the shared node/chunk key space.
//!
//! Identifiers are compared by bitwise XOR distance; a smaller XOR value
//! means "closer". Proximity is the shared-prefix length in bits, which is
//! also the adjacency bucket index used by the routing engine.

use std::fmt::Display;

/// Identifier of a node in the overlay, a fixed-width integer in the
/// XOR metric space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub struct NodeId(pub u32);

/// Identifier of a content chunk, in the same key space as [`NodeId`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub struct ChunkId(pub u32);

impl Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Display for ChunkId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// XOR distance between two identifiers.
pub fn distance(node: NodeId, chunk: ChunkId) -> u32 {
    node.0 ^ chunk.0
}

/// Number of significant bits in `value` (0 for 0).
pub fn bit_length(value: u32) -> u32 {
    u32::BITS - value.leading_zeros()
}

/// Shared-prefix length of `node` and `chunk` in a `bits`-wide key space.
///
/// Equals `bits` when the identifiers coincide. This is the "closeness"
/// the storage-depth threshold is measured in.
pub fn proximity(node: NodeId, chunk: ChunkId, bits: u32) -> u32 {
    bits - bit_length(distance(node, chunk))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn distance_is_xor() {
        assert_eq!(distance(NodeId(0b0001), ChunkId(0b1000)), 0b1001);
        assert_eq!(distance(NodeId(0b1001), ChunkId(0b1000)), 0b0001);
        assert_eq!(distance(NodeId(7), ChunkId(7)), 0);
    }

    #[test]
    fn bit_length_counts_significant_bits() {
        assert_eq!(bit_length(0), 0);
        assert_eq!(bit_length(1), 1);
        assert_eq!(bit_length(0b1001), 4);
        assert_eq!(bit_length(u32::MAX), 32);
    }

    #[test]
    fn proximity_is_shared_prefix_length() {
        // 0b0001 vs 0b1000 differ at the top bit of a 4-bit space.
        assert_eq!(proximity(NodeId(0b0001), ChunkId(0b1000), 4), 0);
        // 0b1001 vs 0b1000 share the first three bits.
        assert_eq!(proximity(NodeId(0b1001), ChunkId(0b1000), 4), 3);
        // Identical ids are maximally close.
        assert_eq!(proximity(NodeId(0b1000), ChunkId(0b1000), 4), 4);
    }

    #[test]
    fn closer_means_smaller_distance() {
        let chunk = ChunkId(0b1000);
        assert!(distance(NodeId(0b1001), chunk) < distance(NodeId(0b0001), chunk));
    }
}
