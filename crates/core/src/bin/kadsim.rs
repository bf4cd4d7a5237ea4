use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tracing::info;

use kadsim::{Network, SimConfig, Simulation};

#[derive(Parser, Debug)]
#[clap(name = "kadsim", version, about)]
struct Cli {
    /// Node-data file describing the network topology.
    #[clap(long, env = "KADSIM_TOPOLOGY")]
    topology: PathBuf,

    /// Write the plain-text fairness report here.
    #[clap(long, env = "KADSIM_RESULTS")]
    results: Option<PathBuf>,

    /// Print the run summary as JSON on stdout.
    #[clap(long)]
    json: bool,

    #[clap(flatten)]
    config: SimConfig,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();
    let net = Network::load(&cli.topology)
        .with_context(|| format!("loading topology from {}", cli.topology.display()))?;

    let sim = Simulation::new(cli.config, net).context("invalid configuration for this topology")?;
    let summary = sim.run().context("simulation run failed")?;

    if let Some(results) = &cli.results {
        sim.write_report(results)
            .with_context(|| format!("writing report to {}", results.display()))?;
        info!(path = %results.display(), "report written");
    }
    if cli.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        let counters = &summary.counters;
        println!(
            "found {} (cached {}), threshold failures {}, access failures {}",
            counters.successful_found,
            summary.cache_hits,
            counters.failed_threshold,
            counters.failed_access
        );
        println!(
            "work fairness {:.6}, forward fairness {:.6}",
            summary.fairness.work_fairness, summary.fairness.forward_fairness
        );
    }
    Ok(())
}
