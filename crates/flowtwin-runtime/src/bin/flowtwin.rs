//! Headless runner: load a snapshot, compute a run, print a summary and
//! optionally write the JSON report.
//!
//! ```text
//! flowtwin <snapshot.json> [--config <file>] [--ticks <n>] [--seed <n>] [--out <report.json>]
//! ```

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use flowtwin_runtime::{RuntimeError, Simulation, SimulationConfig, logging};

#[derive(Parser, Debug)]
#[command(name = "flowtwin", version, about = "Run a flowtwin snapshot headless", long_about = None)]
struct Args {
    /// JSON snapshot of the plant.
    snapshot: PathBuf,

    /// Simulation config (RON, TOML or JSON by extension).
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Ticks to compute; overrides the config.
    #[arg(short, long)]
    ticks: Option<u64>,

    /// RNG seed; overrides the config.
    #[arg(short, long)]
    seed: Option<u64>,

    /// Write the JSON report here.
    #[arg(short, long)]
    out: Option<PathBuf>,
}

fn run(args: Args) -> Result<(), RuntimeError> {
    let mut config = match &args.config {
        Some(path) => SimulationConfig::load(path)?,
        None => SimulationConfig::default(),
    };
    if let Some(ticks) = args.ticks {
        config.ticks = ticks;
    }
    if let Some(seed) = args.seed {
        config.seed = seed;
    }

    let mut sim = Simulation::load(&args.snapshot, &config)?;
    tracing::info!(name = sim.name(), ticks = config.ticks, "running simulation");
    sim.run(config.ticks)?;

    let report = sim.report();
    println!("{}", report.simulation_name);
    for kpi in &report.kpis {
        match &kpi.name {
            Some(name) => println!("  {:<18} {:>10.3}  {name}", kpi.key, kpi.value),
            None => println!("  {:<18} {:>10.3}", kpi.key, kpi.value),
        }
    }
    println!("  bottleneck ticks   {:>10}", report.bottlenecks.len());

    if let Some(out) = &args.out {
        let json = report.to_json_pretty()?;
        std::fs::write(out, json).map_err(|source| RuntimeError::Io {
            path: out.clone(),
            source,
        })?;
        tracing::info!(path = %out.display(), "report written");
    }
    Ok(())
}

fn main() -> ExitCode {
    logging::init();
    let args = Args::parse();
    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!(%err, "simulation failed");
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn args_are_well_formed() {
        Args::command().debug_assert();
    }

    #[test]
    fn overrides_parse() {
        let args = Args::try_parse_from([
            "flowtwin", "line.json", "--ticks", "12", "-s", "7", "--out", "r.json",
        ])
        .unwrap();
        assert_eq!(args.snapshot, PathBuf::from("line.json"));
        assert_eq!(args.ticks, Some(12));
        assert_eq!(args.seed, Some(7));
        assert_eq!(args.out, Some(PathBuf::from("r.json")));
        assert!(args.config.is_none());
    }

    #[test]
    fn snapshot_is_required() {
        assert!(Args::try_parse_from(["flowtwin", "--ticks", "3"]).is_err());
        assert!(Args::try_parse_from(["flowtwin", "a.json", "--ticks", "many"]).is_err());
    }
}
