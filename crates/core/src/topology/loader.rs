//! Topology ingestion from a node-data file.
//!
//! Format: a header line `<bits> <node-count>`, then one line per node of
//! the form `<id>: <peer> <peer> ...`. Edges are treated as undirected;
//! peers referenced before (or without) their own line are created with an
//! empty adjacency of their own. Bucket indices are derived from the
//! shared-prefix length of the two node ids, so the file only carries the
//! raw neighbor lists.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use tracing::{info, warn};

use crate::error::{Result, SimError};
use crate::metric::NodeId;

use super::{Network, NetworkBuilder};

impl Network {
    /// Ingests a topology from a node-data file.
    pub fn load(path: impl AsRef<Path>) -> Result<Network> {
        let path = path.as_ref();
        let reader = BufReader::new(File::open(path)?);
        let mut lines = reader.lines().enumerate();

        let (bits, declared) = loop {
            let Some((index, line)) = lines.next() else {
                return Err(SimError::TopologyParse {
                    line: 0,
                    reason: "empty file, expected `<bits> <node-count>` header".into(),
                });
            };
            let line = line?;
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }
            break parse_header(index + 1, trimmed)?;
        };

        let mut builder = NetworkBuilder::new(bits);
        let mut parsed = 0usize;
        for (index, line) in lines {
            let line = line?;
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }
            let (id, peers) = parse_node_line(index + 1, trimmed, bits)?;
            builder.node(id);
            for peer in peers {
                builder.edge(id, peer);
            }
            parsed += 1;
        }

        if parsed == 0 {
            return Err(SimError::TopologyParse {
                line: 0,
                reason: "no node lines after the header".into(),
            });
        }

        let network = builder.build();
        if network.node_count() != declared {
            warn!(
                declared,
                nodes = network.node_count(),
                "node count differs from the header's declaration"
            );
        }
        info!(
            path = %path.display(),
            bits,
            declared,
            nodes = network.node_count(),
            "ingested topology"
        );
        Ok(network)
    }
}

fn parse_header(line: usize, text: &str) -> Result<(u32, usize)> {
    let mut parts = text.split_whitespace();
    let bits: u32 = parts
        .next()
        .and_then(|t| t.parse().ok())
        .ok_or_else(|| SimError::TopologyParse {
            line,
            reason: "missing or invalid key width".into(),
        })?;
    if bits == 0 || bits > 32 {
        return Err(SimError::TopologyParse {
            line,
            reason: format!("key width {bits} out of range (1..=32)"),
        });
    }
    let count: usize = parts
        .next()
        .and_then(|t| t.parse().ok())
        .ok_or_else(|| SimError::TopologyParse {
            line,
            reason: "missing or invalid node count".into(),
        })?;
    Ok((bits, count))
}

fn parse_node_line(line: usize, text: &str, bits: u32) -> Result<(NodeId, Vec<NodeId>)> {
    let (id_part, peers_part) = text.split_once(':').ok_or_else(|| SimError::TopologyParse {
        line,
        reason: "expected `<id>: <peer> ...`".into(),
    })?;
    let parse_id = |token: &str| -> Result<NodeId> {
        let raw: u32 = token.trim().parse().map_err(|_| SimError::TopologyParse {
            line,
            reason: format!("invalid node id {token:?}"),
        })?;
        if bits < 32 && raw >= 1 << bits {
            return Err(SimError::TopologyParse {
                line,
                reason: format!("node id {raw} exceeds the {bits}-bit key space"),
            });
        }
        Ok(NodeId(raw))
    };
    let id = parse_id(id_part)?;
    let peers = peers_part
        .split_whitespace()
        .map(parse_id)
        .collect::<Result<Vec<_>>>()?;
    Ok((id, peers))
}
