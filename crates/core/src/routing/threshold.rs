//! Threshold acceptance: the access-control predicate peers apply before
//! agreeing to forward a request.
//!
//! A peer rejects when the requester's net accumulated debt, plus the price
//! of the request at hand, exceeds the configured threshold. Debt decays
//! over time ("forgiveness"): every elapsed epoch since the edge was last
//! forgiven wipes one `price` unit, so a rejected requester becomes
//! acceptable again if it backs off. The caller must hold the directed
//! edge's lock, which is what makes this read-modify-write single-flight.

use crate::config::SimConfig;
use crate::metric::NodeId;
use crate::topology::{EdgeAttrs, Network};

/// Whether `to` accepts a request forwarded by `from` at `timestep`.
pub(crate) fn accepts(
    net: &Network,
    from: NodeId,
    to: NodeId,
    timestep: u64,
    config: &SimConfig,
) -> bool {
    let outbound = net.with_edge(from, to, |edge| {
        forgive(edge, timestep, config);
        edge.debt
    });
    let inbound = net.with_edge(to, from, |edge| {
        forgive(edge, timestep, config);
        edge.debt
    });
    outbound - inbound + config.price <= config.threshold
}

/// Applies elapsed-epoch forgiveness to one direction, preserving the
/// epoch phase in `last_forgiven`.
fn forgive(edge: &mut EdgeAttrs, timestep: u64, config: &SimConfig) {
    if !config.forgiveness_enabled || config.epoch == 0 {
        return;
    }
    let elapsed = timestep.saturating_sub(edge.last_forgiven);
    let epochs = elapsed / config.epoch;
    if epochs == 0 {
        return;
    }
    edge.last_forgiven += epochs * config.epoch;
    if edge.debt > 0 {
        edge.debt = (edge.debt - epochs as i64 * config.price).max(0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metric::NodeId;
    use crate::topology::NetworkBuilder;

    fn config() -> SimConfig {
        SimConfig {
            threshold: 4,
            price: 1,
            epoch: 10,
            forgiveness_enabled: false,
            ..Default::default()
        }
    }

    fn net() -> Network {
        let mut builder = NetworkBuilder::new(4);
        builder.edge(NodeId(1), NodeId(9));
        builder.build()
    }

    #[test]
    fn accepts_until_threshold() {
        let net = net();
        let config = config();
        let (a, b) = (NodeId(1), NodeId(9));
        // debt + price <= threshold.
        net.accrue_debt(a, b, 3);
        assert!(accepts(&net, a, b, 1, &config));
        net.accrue_debt(a, b, 1);
        assert!(!accepts(&net, a, b, 1, &config));
    }

    #[test]
    fn counter_debt_offsets() {
        let net = net();
        let config = config();
        let (a, b) = (NodeId(1), NodeId(9));
        net.accrue_debt(a, b, 6);
        assert!(!accepts(&net, a, b, 1, &config));
        // Work b asked of a cancels out.
        net.accrue_debt(b, a, 3);
        assert!(accepts(&net, a, b, 1, &config));
    }

    #[test]
    fn forgiveness_decays_debt_per_epoch() {
        let net = net();
        let config = SimConfig {
            forgiveness_enabled: true,
            ..config()
        };
        let (a, b) = (NodeId(1), NodeId(9));
        net.accrue_debt(a, b, 6);
        assert!(!accepts(&net, a, b, 5, &config));
        // Three epochs later, three price units have been forgiven.
        assert!(accepts(&net, a, b, 35, &config));
        assert_eq!(net.edge_debt(a, b), 3);
    }

    #[test]
    fn forgiveness_saturates_at_zero() {
        let net = net();
        let config = SimConfig {
            forgiveness_enabled: true,
            ..config()
        };
        let (a, b) = (NodeId(1), NodeId(9));
        net.accrue_debt(a, b, 1);
        assert!(accepts(&net, a, b, 1_000, &config));
        assert_eq!(net.edge_debt(a, b), 0);
    }
}
