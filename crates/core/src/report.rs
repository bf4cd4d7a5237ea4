//! Work-distribution fairness reporting.
//!
//! Consumes committed routes read-only and tallies, per node, how many
//! requests it originated, how many chunks it forwarded and how much total
//! work it performed. Fairness is summarized as the Gini coefficient of
//! the work distribution over the whole network (an idle node counts as
//! zero work).

use std::collections::HashMap;
use std::io::Write;
use std::path::Path;

use serde::Serialize;

use crate::metric::NodeId;
use crate::routing::{Request, RouteOutcome};

/// Aggregated per-node work tallies.
#[derive(Debug, Default)]
pub struct WorkReport {
    /// Total nodes in the network, so idle nodes weigh into fairness.
    node_count: usize,
    /// Requests originated, per node.
    requests: HashMap<NodeId, u64>,
    /// Chunks forwarded onward (every provider except the terminal one).
    forwards: HashMap<NodeId, u64>,
    /// Total work performed (every provider hop).
    work: HashMap<NodeId, u64>,
    /// Successful routes that terminated at one of the chunk's
    /// responsible nodes.
    responsible_hits: u64,
}

/// The summary figures written to the results file.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct FairnessSummary {
    pub work_fairness: f64,
    pub forward_fairness: f64,
    pub max_work: u64,
    pub max_work_non_originator: u64,
    pub median_work: u64,
    pub responsible_hits: u64,
}

impl WorkReport {
    pub fn new(node_count: usize) -> Self {
        Self {
            node_count,
            ..Default::default()
        }
    }

    /// Folds one committed route into the tallies.
    pub fn record(&mut self, request: &Request, outcome: &RouteOutcome) {
        let route = &outcome.route;
        let hops = route.len().saturating_sub(1);
        for (i, pair) in route.windows(2).enumerate() {
            let (requester, provider) = (pair[0], pair[1]);
            if i == 0 {
                *self.requests.entry(requester).or_default() += 1;
            }
            if i != hops - 1 {
                *self.forwards.entry(provider).or_default() += 1;
            }
            *self.work.entry(provider).or_default() += 1;
        }
        if outcome.found {
            if let Some(terminal) = route.last() {
                if request.responsible.contains(terminal) {
                    self.responsible_hits += 1;
                }
            }
        }
    }

    /// Gini coefficient of total work over all nodes.
    pub fn work_fairness(&self) -> f64 {
        gini(self.padded(&self.work))
    }

    /// Gini coefficient of forwarding work over all nodes.
    pub fn forward_fairness(&self) -> f64 {
        gini(self.padded(&self.forwards))
    }

    /// Maximum work, maximum work by a node that originated nothing, and
    /// median work.
    pub fn max_median_work(&self) -> (u64, u64, u64) {
        let mut values: Vec<u64> = self.padded(&self.work);
        values.sort_unstable();
        let max = values.last().copied().unwrap_or(0);
        let median = values.get(values.len() / 2).copied().unwrap_or(0);
        let max_non_originator = self
            .work
            .iter()
            .filter(|(node, _)| self.requests.get(node).copied().unwrap_or(0) == 0)
            .map(|(_, &work)| work)
            .max()
            .unwrap_or(0);
        (max, max_non_originator, median)
    }

    pub fn summary(&self) -> FairnessSummary {
        let (max_work, max_work_non_originator, median_work) = self.max_median_work();
        FairnessSummary {
            work_fairness: self.work_fairness(),
            forward_fairness: self.forward_fairness(),
            max_work,
            max_work_non_originator,
            median_work,
            responsible_hits: self.responsible_hits,
        }
    }

    /// Writes the plain-text summary to `path`.
    pub fn write_summary(&self, path: impl AsRef<Path>) -> std::io::Result<()> {
        let summary = self.summary();
        let mut file = std::fs::File::create(path)?;
        writeln!(file, "Work fairness: {:.6}", summary.work_fairness)?;
        writeln!(file, "Forward work fairness: {:.6}", summary.forward_fairness)?;
        writeln!(
            file,
            "Max, max by non-originator, and median work done: {}, {}, {}",
            summary.max_work, summary.max_work_non_originator, summary.median_work
        )?;
        writeln!(file, "Routes ending at a responsible node: {}", summary.responsible_hits)?;
        Ok(())
    }

    /// Tally values padded with zeros for every idle node.
    fn padded(&self, tallies: &HashMap<NodeId, u64>) -> Vec<u64> {
        let mut values: Vec<u64> = tallies.values().copied().collect();
        values.resize(values.len().max(self.node_count), 0);
        values
    }
}

/// Gini coefficient of a distribution; 0 is perfect equality, values near
/// 1 mean a few nodes do all the work.
fn gini(mut values: Vec<u64>) -> f64 {
    let n = values.len();
    if n == 0 {
        return 0.0;
    }
    values.sort_unstable();
    let total: u64 = values.iter().sum();
    if total == 0 {
        return 0.0;
    }
    let weighted: f64 = values
        .iter()
        .enumerate()
        .map(|(i, &v)| (i as f64 + 1.0) * v as f64)
        .sum();
    (2.0 * weighted) / (n as f64 * total as f64) - (n as f64 + 1.0) / n as f64
}
