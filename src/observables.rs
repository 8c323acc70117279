// observables.rs - Named scalar/vector observables and raw time-series buffers

use serde::{Deserialize, Serialize};

/// A measured scalar, as exposed to the measurement scheduler.
#[derive(Debug, Clone, PartialEq)]
pub struct ScalarObservable {
    pub name: String,
    pub value: f64,
}

/// A measured vector (indexed by site, momentum or distance).
#[derive(Debug, Clone, PartialEq)]
pub struct VectorObservable {
    pub name: String,
    pub index_name: &'static str,
    pub values: Vec<f64>,
}

/// One sweep's worth of measured quantities.
#[derive(Debug, Clone, Default)]
pub struct Observables {
    pub scalars: Vec<ScalarObservable>,
    pub vectors: Vec<VectorObservable>,
}

impl Observables {
    pub fn scalar(&mut self, name: impl Into<String>, value: f64) {
        self.scalars.push(ScalarObservable { name: name.into(), value });
    }

    pub fn vector(&mut self, name: impl Into<String>, index_name: &'static str, values: Vec<f64>) {
        self.vectors.push(VectorObservable { name: name.into(), index_name, values });
    }

    pub fn get_scalar(&self, name: &str) -> Option<f64> {
        self.scalars.iter().find(|s| s.name == name).map(|s| s.value)
    }

    pub fn get_vector(&self, name: &str) -> Option<&[f64]> {
        self.vectors.iter().find(|v| v.name == name).map(|v| v.values.as_slice())
    }
}

/// Time series with running moments
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TimeSeries {
    samples: Vec<f64>,
    sum: f64,
    sum_sq: f64,
    sum_4th: f64,
}

impl TimeSeries {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_samples(samples: Vec<f64>) -> Self {
        let mut ts = Self::new();
        for v in samples {
            ts.push(v);
        }
        ts
    }

    pub fn push(&mut self, value: f64) {
        self.samples.push(value);
        self.sum += value;
        self.sum_sq += value * value;
        self.sum_4th += value.powi(4);
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn samples(&self) -> &[f64] {
        &self.samples
    }

    pub fn mean(&self) -> f64 {
        if self.samples.is_empty() { 0.0 } else { self.sum / self.samples.len() as f64 }
    }

    pub fn moment2(&self) -> f64 {
        if self.samples.is_empty() { 0.0 } else { self.sum_sq / self.samples.len() as f64 }
    }

    pub fn moment4(&self) -> f64 {
        if self.samples.is_empty() { 0.0 } else { self.sum_4th / self.samples.len() as f64 }
    }

    /// Write one value per line.
    pub fn write(&self, path: &std::path::Path) -> std::io::Result<()> {
        use std::io::Write;
        let mut out = std::io::BufWriter::new(std::fs::File::create(path)?);
        for v in &self.samples {
            writeln!(out, "{v:.16e}")?;
        }
        out.flush()
    }

    /// Read a series written by `write`; blank lines and `#` comments are skipped.
    pub fn read(path: &std::path::Path) -> std::io::Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let mut ts = Self::new();
        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let v: f64 = line
                .parse()
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, format!("{line}: {e}")))?;
            ts.push(v);
        }
        Ok(ts)
    }
}
