use std::fs::File;
use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;

use prodsim::domain::event_log::write_csv;
use prodsim::domain::kpi::write_kpi_csv;
use prodsim::{logger, Runner};

/// Discrete-event simulation of production systems.
#[derive(Parser, Debug)]
#[command(name = "prodsim", version, about)]
struct Cli {
    /// Path to the system model configuration (JSON).
    config: PathBuf,

    /// Simulation horizon in model time units.
    #[arg(long, default_value_t = 2880.0)]
    horizon: f64,

    /// Overrides the seed from the configuration.
    #[arg(long)]
    seed: Option<u64>,

    /// Writes the rendered event log to this CSV file.
    #[arg(long)]
    event_log: Option<PathBuf>,

    /// Writes the KPI summary to this CSV file.
    #[arg(long)]
    kpi_csv: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    logger::init();
    let cli = Cli::parse();

    let mut runner = Runner::from_path(&cli.config, cli.seed)
        .with_context(|| format!("loading configuration from {}", cli.config.display()))?;
    runner.run(cli.horizon).context("simulation run failed")?;

    let kpis = runner.results();

    println!("== Throughput ==");
    for (product_type, count) in &kpis.throughput {
        println!("{product_type:<24} {count}");
    }

    println!("\n== WIP (time-weighted average) ==");
    for (product_type, wip) in &kpis.wip {
        println!("{product_type:<24} {wip:.3}");
    }
    println!("{:<24} {:.3}", "total", kpis.total_wip);

    println!("\n== Throughput time ==");
    for (product_type, time) in &kpis.throughput_time {
        println!("{product_type:<24} {time:.3}");
    }

    println!("\n== Time in state (% of horizon) ==");
    println!("{:<24} {:>7} {:>7} {:>7} {:>7}", "resource", "PR", "SB", "ST", "UD");
    for (resource, times) in &kpis.time_in_state {
        let (pr, sb, st, ud) = times.shares(kpis.horizon);
        println!("{resource:<24} {pr:>6.2}% {sb:>6.2}% {st:>6.2}% {ud:>6.2}%");
    }

    if let Some(path) = &cli.event_log {
        let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
        write_csv(&runner.event_log(), file).context("writing event log")?;
        log::info!("Event log written to '{}'.", path.display());
    }

    if let Some(path) = &cli.kpi_csv {
        let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
        write_kpi_csv(&kpis, file).context("writing KPI summary")?;
        log::info!("KPI summary written to '{}'.", path.display());
    }

    Ok(())
}
