// accumulator.rs - Jackknife-blocked running sums for measured observables

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::error_analysis::{jackknife, jackknife_vec, naive_error};
use crate::observables::{Observables, TimeSeries};

/// Sums of one scalar observable over a run, split into jackknife blocks.
///
/// `block_sums[b]` holds the sum over every value *not* in block b and
/// `block_counts[b]` the number of values inside it, so a leave-one-out
/// estimate is a single division even when blocks differ in size.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScalarHandler {
    pub name: String,
    jk_blocks: usize,
    jk_block_size_sweeps: usize,
    count: usize,
    total: f64,
    block_sums: Vec<f64>,
    block_counts: Vec<usize>,
    series: Option<TimeSeries>,
}

impl ScalarHandler {
    pub fn new(name: impl Into<String>, sweeps: usize, jk_blocks: usize, timeseries: bool) -> Self {
        let jk_blocks = jk_blocks.max(1);
        Self {
            name: name.into(),
            jk_blocks,
            jk_block_size_sweeps: (sweeps / jk_blocks).max(1),
            count: 0,
            total: 0.0,
            block_sums: vec![0.0; jk_blocks],
            block_counts: vec![0; jk_blocks],
            series: timeseries.then(TimeSeries::new),
        }
    }

    fn block_of(&self, cur_sweep: usize) -> usize {
        (cur_sweep / self.jk_block_size_sweeps).min(self.jk_blocks - 1)
    }

    pub fn insert_value(&mut self, value: f64, cur_sweep: usize) {
        let cur = self.block_of(cur_sweep);
        for (b, sum) in self.block_sums.iter_mut().enumerate() {
            if b != cur {
                *sum += value;
            }
        }
        self.block_counts[cur] += 1;
        self.total += value;
        self.count += 1;
        if let Some(series) = self.series.as_mut() {
            series.push(value);
        }
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn series(&self) -> Option<&TimeSeries> {
        self.series.as_ref()
    }

    /// (mean, error); None before the first value.
    pub fn evaluate(&self) -> Option<(f64, f64)> {
        if self.count == 0 {
            return None;
        }
        let mean = self.total / self.count as f64;
        let error = if self.jk_blocks > 1 {
            let estimates: Vec<f64> = self
                .block_sums
                .iter()
                .zip(&self.block_counts)
                .filter_map(|(s, &n)| leave_out_count(self.count, n).map(|kept| s / kept))
                .collect();
            jackknife(&estimates)
        } else if let Some(series) = self.series.as_ref().filter(|s| s.len() == self.count) {
            naive_error(series.samples(), mean)
        } else {
            0.0
        };
        Some((mean, error))
    }
}

/// Number of values left when one block is dropped; None for an empty block
/// or when nothing remains.
fn leave_out_count(count: usize, in_block: usize) -> Option<f64> {
    (in_block > 0 && count > in_block).then(|| (count - in_block) as f64)
}

/// Vector analogue of `ScalarHandler`; no time series is kept.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorHandler {
    pub name: String,
    pub index_name: String,
    jk_blocks: usize,
    jk_block_size_sweeps: usize,
    count: usize,
    total: Vec<f64>,
    block_sums: Vec<Vec<f64>>,
    block_counts: Vec<usize>,
}

impl VectorHandler {
    pub fn new(name: impl Into<String>, index_name: &str, size: usize, sweeps: usize, jk_blocks: usize) -> Self {
        let jk_blocks = jk_blocks.max(1);
        Self {
            name: name.into(),
            index_name: index_name.to_string(),
            jk_blocks,
            jk_block_size_sweeps: (sweeps / jk_blocks).max(1),
            count: 0,
            total: vec![0.0; size],
            block_sums: vec![vec![0.0; size]; jk_blocks],
            block_counts: vec![0; jk_blocks],
        }
    }

    pub fn insert_value(&mut self, values: &[f64], cur_sweep: usize) {
        let cur = (cur_sweep / self.jk_block_size_sweeps).min(self.jk_blocks - 1);
        for (b, sums) in self.block_sums.iter_mut().enumerate() {
            if b != cur {
                sums.iter_mut().zip(values).for_each(|(s, v)| *s += v);
            }
        }
        self.block_counts[cur] += 1;
        self.total.iter_mut().zip(values).for_each(|(s, v)| *s += v);
        self.count += 1;
    }

    pub fn evaluate(&self) -> Option<(Vec<f64>, Vec<f64>)> {
        if self.count == 0 {
            return None;
        }
        let mean: Vec<f64> = self.total.iter().map(|s| s / self.count as f64).collect();
        let error = if self.jk_blocks > 1 {
            let estimates: Vec<Vec<f64>> = self
                .block_sums
                .iter()
                .zip(&self.block_counts)
                .filter_map(|(sums, &n)| {
                    leave_out_count(self.count, n).map(|kept| sums.iter().map(|s| s / kept).collect())
                })
                .collect();
            jackknife_vec(&estimates)
        } else {
            vec![0.0; mean.len()]
        };
        Some((mean, error))
    }
}

/// All handlers of a run, created lazily from the first measured sweep.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ObservableHandlers {
    sweeps: usize,
    jk_blocks: usize,
    timeseries: bool,
    scalars: Vec<ScalarHandler>,
    vectors: Vec<VectorHandler>,
}

impl ObservableHandlers {
    pub fn new(sweeps: usize, jk_blocks: usize, timeseries: bool) -> Self {
        Self { sweeps, jk_blocks, timeseries, scalars: Vec::new(), vectors: Vec::new() }
    }

    /// Record one sweep's observables, measured during sweep `cur_sweep` of the measurement phase.
    pub fn insert(&mut self, obs: &Observables, cur_sweep: usize) {
        if self.scalars.is_empty() && self.vectors.is_empty() {
            self.scalars = obs
                .scalars
                .iter()
                .map(|s| ScalarHandler::new(s.name.clone(), self.sweeps, self.jk_blocks, self.timeseries))
                .collect();
            self.vectors = obs
                .vectors
                .iter()
                .map(|v| VectorHandler::new(v.name.clone(), v.index_name, v.values.len(), self.sweeps, self.jk_blocks))
                .collect();
        }
        for (handler, s) in self.scalars.iter_mut().zip(&obs.scalars) {
            handler.insert_value(s.value, cur_sweep);
        }
        for (handler, v) in self.vectors.iter_mut().zip(&obs.vectors) {
            handler.insert_value(&v.values, cur_sweep);
        }
    }

    pub fn scalars(&self) -> &[ScalarHandler] {
        &self.scalars
    }

    pub fn vectors(&self) -> &[VectorHandler] {
        &self.vectors
    }

    pub fn scalar(&self, name: &str) -> Option<&ScalarHandler> {
        self.scalars.iter().find(|h| h.name == name)
    }

    pub fn scalar_results(&self) -> BTreeMap<String, (f64, f64)> {
        self.scalars.iter().filter_map(|h| h.evaluate().map(|r| (h.name.clone(), r))).collect()
    }

    /// `results.values`: one CSV row per scalar observable.
    pub fn write_scalar_results(&self, path: &Path) -> Result<()> {
        let mut wtr = csv::WriterBuilder::new().from_path(path)?;
        wtr.write_record(["observable", "value", "error"])?;
        for h in &self.scalars {
            if let Some((mean, err)) = h.evaluate() {
                wtr.write_record([h.name.clone(), mean.to_string(), err.to_string()])?;
            }
        }
        wtr.flush()?;
        Ok(())
    }

    /// `results-<name>.values` for every vector observable.
    pub fn write_vector_results(&self, dir: &Path) -> Result<()> {
        for h in &self.vectors {
            let Some((mean, err)) = h.evaluate() else { continue };
            let mut wtr = csv::WriterBuilder::new().from_path(dir.join(format!("results-{}.values", h.name)))?;
            wtr.write_record([h.index_name.as_str(), "value", "error"])?;
            for (i, (m, e)) in mean.iter().zip(&err).enumerate() {
                wtr.write_record([i.to_string(), m.to_string(), e.to_string()])?;
            }
            wtr.flush()?;
        }
        Ok(())
    }

    /// `<name>.series` for every scalar with a stored time series.
    pub fn write_time_series(&self, dir: &Path) -> Result<()> {
        for h in &self.scalars {
            if let Some(series) = h.series() {
                series.write(&dir.join(format!("{}.series", h.name)))?;
            }
        }
        Ok(())
    }
}
