//! Determinant QMC driver for the SDW model
//! (see `Cli` below for all run options; model parameters come from `--conf` / `--set`).

use std::error::Error;
use std::path::PathBuf;

use clap::Parser;
use detsdw::{McParams, ModelParams, ParamMap, Simulation, SimulationSnapshot};
use indicatif::{ProgressBar, ProgressStyle};
use log::info;

#[derive(Parser, Debug)]
#[command(about = "Determinant quantum Monte Carlo simulation of the SDW model")]
struct Cli {
    /// Configuration file with `key = value` lines
    #[arg(long)]
    conf: Option<PathBuf>,

    /// Override a parameter, e.g. `--set L=4` (repeatable)
    #[arg(long = "set", value_name = "KEY=VALUE")]
    set: Vec<String>,

    #[arg(long)]
    sweeps: Option<usize>,

    #[arg(long)]
    thermalization: Option<usize>,

    #[arg(long)]
    measure_interval: Option<usize>,

    #[arg(long)]
    jk_blocks: Option<usize>,

    #[arg(long)]
    seed: Option<u64>,

    /// Store the time series of every scalar observable
    #[arg(long)]
    timeseries: bool,

    /// Sweeps between checkpoints (0 = never)
    #[arg(long)]
    save_interval: Option<usize>,

    /// Continue from a checkpoint written earlier
    #[arg(long)]
    resume: Option<PathBuf>,

    /// Output directory
    #[arg(long, default_value = ".")]
    output: PathBuf,
}

impl Cli {
    /// Configuration file and command-line overrides merged into one map.
    fn param_map(&self) -> detsdw::Result<ParamMap> {
        let mut map = match &self.conf {
            Some(path) => ParamMap::from_file(path)?,
            None => ParamMap::new(),
        };
        for assignment in &self.set {
            map.insert_assignment(assignment)?;
        }
        if let Some(v) = self.sweeps {
            map.set("sweeps", v);
        }
        if let Some(v) = self.thermalization {
            map.set("thermalization", v);
        }
        if let Some(v) = self.measure_interval {
            map.set("measureInterval", v);
        }
        if let Some(v) = self.jk_blocks {
            map.set("jkBlocks", v);
        }
        if let Some(v) = self.seed {
            map.set("seed", v);
        }
        if self.timeseries {
            map.set("timeseries", true);
        }
        if let Some(v) = self.save_interval {
            map.set("saveInterval", v);
        }
        Ok(map)
    }
}

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();
    std::fs::create_dir_all(&cli.output)?;
    let checkpoint = cli.output.join("simulation.state.json");

    let mut sim = match &cli.resume {
        Some(path) => {
            info!("resuming from {}", path.display());
            Simulation::from_snapshot(SimulationSnapshot::load(path)?)?
        }
        None => {
            let map = cli.param_map()?;
            let params = ModelParams::from_map(&map)?;
            let mc = McParams::from_map(&map)?;
            Simulation::new(params, mc)?
        }
    };
    println!("Model parameters:\n{:#?}", sim.model.params());
    println!("Monte Carlo parameters:\n{:#?}", sim.mc);

    let bar = ProgressBar::new(sim.total_sweeps() as u64);
    bar.set_style(ProgressStyle::with_template(
        " {bar:40.cyan/blue} {pos}/{len} [{elapsed_precise}] {msg}",
    )?);
    bar.set_position(sim.completed_sweeps() as u64);

    let save_interval = sim.mc.save_interval;
    while sim.step()? {
        bar.inc(1);
        if sim.thermalization_done() < sim.mc.thermalization {
            bar.set_message("thermalization");
        } else {
            bar.set_message("measurements");
        }
        if save_interval > 0 && sim.completed_sweeps() % save_interval == 0 {
            sim.snapshot().save(&checkpoint)?;
        }
    }
    bar.finish();

    sim.model.consistency_check()?;
    sim.write_output(&cli.output)?;
    if save_interval > 0 {
        sim.snapshot().save(&checkpoint)?;
    }

    for (name, (value, error)) in sim.handlers.scalar_results() {
        println!("{name:>28} = {value:.6} ± {error:.6}");
    }
    println!("Simulation complete → {}", cli.output.join("results.values").display());
    Ok(())
}
