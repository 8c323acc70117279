// simulation.rs - Thermalization/measurement schedule around DetSdw, with JSON checkpoints

use std::path::Path;

use log::info;
use serde::{Deserialize, Serialize};

use crate::accumulator::ObservableHandlers;
use crate::error::Result;
use crate::metadata::MetadataMap;
use crate::model::{DetSdw, ModelState};
use crate::params::{McParams, ModelParams};

/// Serializable state of a whole run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationSnapshot {
    pub model: ModelState,
    pub mc: McParams,
    pub handlers: ObservableHandlers,
    pub thermalization_done: usize,
    pub sweeps_done: usize,
}

impl SimulationSnapshot {
    pub fn save(&self, path: &Path) -> Result<()> {
        let file = std::io::BufWriter::new(std::fs::File::create(path)?);
        serde_json::to_writer(file, self)?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let file = std::io::BufReader::new(std::fs::File::open(path)?);
        Ok(serde_json::from_reader(file)?)
    }
}

/// A model plus the Monte Carlo schedule that drives it.
#[derive(Debug, Clone)]
pub struct Simulation {
    pub model: DetSdw,
    pub mc: McParams,
    pub handlers: ObservableHandlers,
    thermalization_done: usize,
    sweeps_done: usize,
}

impl Simulation {
    pub fn new(params: ModelParams, mc: McParams) -> Result<Self> {
        mc.check()?;
        let model = DetSdw::new(params, mc.seed)?;
        let handlers = ObservableHandlers::new(mc.sweeps, mc.jk_blocks, mc.timeseries);
        Ok(Self { model, mc, handlers, thermalization_done: 0, sweeps_done: 0 })
    }

    pub fn from_snapshot(snapshot: SimulationSnapshot) -> Result<Self> {
        let SimulationSnapshot { model, mc, handlers, thermalization_done, sweeps_done } = snapshot;
        Ok(Self { model: DetSdw::from_state(model)?, mc, handlers, thermalization_done, sweeps_done })
    }

    pub fn snapshot(&self) -> SimulationSnapshot {
        SimulationSnapshot {
            model: self.model.state(),
            mc: self.mc.clone(),
            handlers: self.handlers.clone(),
            thermalization_done: self.thermalization_done,
            sweeps_done: self.sweeps_done,
        }
    }

    pub fn thermalization_done(&self) -> usize {
        self.thermalization_done
    }

    pub fn sweeps_done(&self) -> usize {
        self.sweeps_done
    }

    /// Total sweeps of the schedule, thermalization included.
    pub fn total_sweeps(&self) -> usize {
        self.mc.thermalization + self.mc.sweeps
    }

    pub fn completed_sweeps(&self) -> usize {
        self.thermalization_done + self.sweeps_done
    }

    pub fn is_finished(&self) -> bool {
        self.completed_sweeps() >= self.total_sweeps()
    }

    /// Perform the next sweep of the schedule. Returns false once everything is done.
    pub fn step(&mut self) -> Result<bool> {
        if self.thermalization_done < self.mc.thermalization {
            self.model.sweep_thermalization()?;
            self.thermalization_done += 1;
            if self.thermalization_done == self.mc.thermalization {
                self.model.thermalization_over();
            }
            return Ok(true);
        }
        if self.sweeps_done < self.mc.sweeps {
            let measure = self.sweeps_done % self.mc.measure_interval == 0;
            if let Some(obs) = self.model.sweep(measure)? {
                self.handlers.insert(&obs, self.sweeps_done);
            }
            self.sweeps_done += 1;
            if self.sweeps_done == self.mc.sweeps {
                info!("measurements finished after {} sweeps", self.sweeps_done);
            }
            return Ok(true);
        }
        Ok(false)
    }

    /// Run the remaining schedule, calling `progress` after every sweep.
    pub fn run<F: FnMut(&Simulation)>(&mut self, mut progress: F) -> Result<()> {
        while self.step()? {
            progress(self);
        }
        Ok(())
    }

    /// Model metadata plus the schedule.
    pub fn metadata(&self) -> MetadataMap {
        let mut meta = self.model.metadata();
        meta.insert("sweeps", self.mc.sweeps);
        meta.insert("thermalization", self.mc.thermalization);
        meta.insert("measureInterval", self.mc.measure_interval);
        meta.insert("jkBlocks", self.mc.jk_blocks);
        meta.insert("timeseries", self.mc.timeseries);
        meta.insert("seed", self.mc.seed);
        meta.insert("sweepsDone", self.sweeps_done);
        meta.insert("sweepsDoneThermalization", self.thermalization_done);
        meta
    }

    /// info.dat, results.values, results-<vector>.values and the time series.
    pub fn write_output(&self, dir: &Path) -> Result<()> {
        std::fs::create_dir_all(dir)?;
        self.metadata().write(&dir.join("info.dat"), "Simulation of the SDW model")?;
        self.handlers.write_scalar_results(&dir.join("results.values"))?;
        self.handlers.write_vector_results(dir)?;
        self.handlers.write_time_series(dir)?;
        Ok(())
    }
}
