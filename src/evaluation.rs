// evaluation.rs - Offline evaluation of stored time series: averages, jackknife errors, tau_int

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use log::{info, warn};

use crate::error::{Result, SdwError};
use crate::error_analysis::{average, jackknife, jackknife_block_estimates, tau_int};
use crate::metadata::MetadataMap;
use crate::observables::TimeSeries;

/// Metadata keys that differ between otherwise identical runs.
const VOLATILE_KEYS: [&str; 3] = ["sweepsDone", "sweepsDoneThermalization", "seed"];

/// How the stored series are read and evaluated.
#[derive(Debug, Clone)]
pub struct EvalOptions {
    /// Initial entries to drop.
    pub discard: usize,
    /// Entries to read after `discard`, before subsampling; 0 reads all.
    pub read: usize,
    pub subsample: usize,
    pub jk_blocks: usize,
    pub notau: bool,
    pub noexp: bool,
    pub noncollect: Vec<String>,
}

impl Default for EvalOptions {
    fn default() -> Self {
        Self { discard: 0, read: 0, subsample: 1, jk_blocks: 1, notau: false, noexp: false, noncollect: Vec::new() }
    }
}

impl EvalOptions {
    pub fn check(&self) -> Result<()> {
        if self.subsample == 0 {
            return Err(SdwError::wrong("subsample", self.subsample));
        }
        if self.jk_blocks == 0 {
            return Err(SdwError::wrong("jkblocks", self.jk_blocks));
        }
        Ok(())
    }

    /// Apply discard/read/subsample to raw samples.
    pub fn select(&self, samples: &[f64]) -> Vec<f64> {
        let rest = samples.get(self.discard..).unwrap_or(&[]);
        let rest = if self.read > 0 && self.read < rest.len() { &rest[..self.read] } else { rest };
        rest.iter().step_by(self.subsample.max(1)).copied().collect()
    }
}

/// Extent of the space-time lattice, needed for the susceptibility.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SystemSize {
    pub n: usize,
    pub m: usize,
    pub dtau: f64,
}

impl SystemSize {
    pub fn from_metadata(meta: &MetadataMap) -> Result<Self> {
        let l = meta.get_f64("L")? as usize;
        Ok(Self { n: l * l, m: meta.get_f64("m")? as usize, dtau: meta.get_f64("dtau")? })
    }

    /// β·N
    pub fn volume(&self) -> f64 {
        self.dtau * self.m as f64 * self.n as f64
    }
}

/// Estimates of all observables of one evaluation.
#[derive(Debug, Clone, Default)]
pub struct Evaluation {
    pub jk_blocks: usize,
    pub estimates: BTreeMap<String, f64>,
    pub block_estimates: BTreeMap<String, Vec<f64>>,
    pub tauints: BTreeMap<String, f64>,
    pub samples: usize,
}

impl Evaluation {
    pub fn new(jk_blocks: usize) -> Self {
        Self { jk_blocks, ..Self::default() }
    }

    fn add_function<F: Fn(f64) -> f64>(&mut self, name: &str, data: &[f64], f: F) {
        let mapped: Vec<f64> = data.iter().map(|&x| f(x)).collect();
        self.estimates.insert(name.to_string(), average(&mapped));
        if self.jk_blocks > 1 {
            self.block_estimates.insert(name.to_string(), jackknife_block_estimates(data, self.jk_blocks, f));
        }
    }

    /// Evaluate one series; normMeanPhi also yields its second and fourth moments.
    pub fn add_series(&mut self, name: &str, data: &[f64], opts: &EvalOptions) {
        if !opts.noexp {
            self.add_function(name, data, |x| x);
            if name == "normMeanPhi" {
                self.add_function("normMeanPhiSquared", data, |x| x.powi(2));
                self.add_function("normMeanPhiFourth", data, |x| x.powi(4));
            }
        }
        if !opts.notau {
            self.tauints.insert(name.to_string(), tau_int(data));
        }
        self.samples = data.len();
    }

    /// Binder cumulant, Binder ratio and susceptibility from the moments of normMeanPhi.
    pub fn add_phi_derived(&mut self, size: SystemSize) {
        let (Some(&m1), Some(&m2), Some(&m4)) = (
            self.estimates.get("normMeanPhi"),
            self.estimates.get("normMeanPhiSquared"),
            self.estimates.get("normMeanPhiFourth"),
        ) else {
            return;
        };
        let volume = size.volume();
        let binder = |m2: f64, m4: f64| 1.0 - 3.0 * m4 / (5.0 * m2 * m2);
        let ratio = |m2: f64, m4: f64| m4 / (m2 * m2);
        let part = |m2: f64| volume * m2;
        let susc = |m1: f64, m2: f64| volume * (m2 - m1 * m1);

        self.estimates.insert("phiBinder".to_string(), binder(m2, m4));
        self.estimates.insert("phiBinderRatio".to_string(), ratio(m2, m4));
        self.estimates.insert("phiSusceptibilityPart".to_string(), part(m2));
        self.estimates.insert("phiSusceptibility".to_string(), susc(m1, m2));

        let blocks = |name: &str| self.block_estimates.get(name).cloned().unwrap_or_default();
        let (b1, b2, b4) = (blocks("normMeanPhi"), blocks("normMeanPhiSquared"), blocks("normMeanPhiFourth"));
        let zip3 = b1.iter().zip(&b2).zip(&b4).map(|((&a, &b), &c)| (a, b, c));
        let mut bb = Vec::new();
        let mut br = Vec::new();
        let mut bp = Vec::new();
        let mut bs = Vec::new();
        for (x1, x2, x4) in zip3 {
            bb.push(binder(x2, x4));
            br.push(ratio(x2, x4));
            bp.push(part(x2));
            bs.push(susc(x1, x2));
        }
        self.block_estimates.insert("phiBinder".to_string(), bb);
        self.block_estimates.insert("phiBinderRatio".to_string(), br);
        self.block_estimates.insert("phiSusceptibilityPart".to_string(), bp);
        self.block_estimates.insert("phiSusceptibility".to_string(), bs);
    }

    /// Jackknife error of every estimate with block estimates.
    pub fn errors(&self) -> BTreeMap<String, f64> {
        self.block_estimates.iter().map(|(k, blocks)| (k.clone(), jackknife(blocks))).collect()
    }

    fn write_header(out: &mut impl Write, meta: &MetadataMap, opts: &EvalOptions, samples: usize, text: &str) -> Result<()> {
        writeln!(out, "# {text}")?;
        for (k, v) in meta.iter() {
            writeln!(out, "# {k} = {v}")?;
        }
        writeln!(out, "# eval-jackknife-blocks = {}", opts.jk_blocks)?;
        writeln!(out, "# eval-discard = {}", opts.discard)?;
        writeln!(out, "# eval-read = {}", opts.read)?;
        writeln!(out, "# eval-subsample = {}", opts.subsample)?;
        writeln!(out, "# eval-samples = {samples}")?;
        Ok(())
    }

    /// `eval-results.values`; errors only with more than one jackknife block.
    pub fn write_results(&self, dir: &Path, meta: &MetadataMap, opts: &EvalOptions) -> Result<()> {
        if self.estimates.is_empty() {
            return Ok(());
        }
        let mut file = std::io::BufWriter::new(std::fs::File::create(dir.join("eval-results.values"))?);
        let with_errors = self.jk_blocks > 1;
        let text = if with_errors {
            "Averages and jackknife error bars computed from time series"
        } else {
            "Averages computed from time series"
        };
        Self::write_header(&mut file, meta, opts, self.samples, text)?;
        let mut wtr = csv::WriterBuilder::new().from_writer(file);
        let errors = self.errors();
        if with_errors {
            wtr.write_record(["observable", "value", "error"])?;
        } else {
            wtr.write_record(["observable", "value"])?;
        }
        for (name, value) in &self.estimates {
            if with_errors {
                let err = errors.get(name).copied().unwrap_or(0.0);
                wtr.write_record([name.clone(), value.to_string(), err.to_string()])?;
            } else {
                wtr.write_record([name.clone(), value.to_string()])?;
            }
        }
        wtr.flush()?;
        Ok(())
    }

    /// `eval-tauint.values`
    pub fn write_tauints(&self, dir: &Path, meta: &MetadataMap, opts: &EvalOptions) -> Result<()> {
        if self.tauints.is_empty() {
            return Ok(());
        }
        let mut file = std::io::BufWriter::new(std::fs::File::create(dir.join("eval-tauint.values"))?);
        Self::write_header(&mut file, meta, opts, self.samples, "Tauint estimates computed from time series")?;
        let mut wtr = csv::WriterBuilder::new().from_writer(file);
        wtr.write_record(["observable", "tauint"])?;
        for (name, tau) in &self.tauints {
            wtr.write_record([name.clone(), tau.to_string()])?;
        }
        wtr.flush()?;
        Ok(())
    }
}

/// info.dat of a run directory without the keys that vary between runs.
pub fn read_clean_metadata(dir: &Path) -> Result<MetadataMap> {
    let meta = MetadataMap::read(&dir.join("info.dat"))?;
    let mut clean = MetadataMap::new();
    for (k, v) in meta.iter() {
        if !VOLATILE_KEYS.contains(&k.as_str()) {
            clean.insert(k, v);
        }
    }
    Ok(clean)
}

/// All `*.series` files of a directory, sorted by name.
pub fn series_files(dir: &Path) -> Result<Vec<(String, PathBuf)>> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.extension().and_then(|e| e.to_str()) != Some("series") {
            continue;
        }
        if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
            files.push((stem.to_string(), path.clone()));
        }
    }
    files.sort();
    Ok(files)
}

/// Evaluate every time series of a run directory.
pub fn evaluate_directory(dir: &Path, opts: &EvalOptions) -> Result<(MetadataMap, Evaluation)> {
    opts.check()?;
    let meta = read_clean_metadata(dir)?;
    let size = SystemSize::from_metadata(&meta)?;
    let mut eval = Evaluation::new(opts.jk_blocks);
    for (name, path) in series_files(dir)? {
        if opts.noncollect.iter().any(|n| *n == name) {
            info!("skipping {name}");
            continue;
        }
        let data = opts.select(TimeSeries::read(&path)?.samples());
        if data.is_empty() {
            warn!("time series {} is empty, skipped", path.display());
            continue;
        }
        info!("processing {} ({} samples)", path.display(), data.len());
        eval.add_series(&name, &data, opts);
    }
    if !opts.noexp {
        eval.add_phi_derived(size);
    }
    Ok((meta, eval))
}

/// Entries shared with an identical value by all maps.
pub fn common_metadata(maps: &[MetadataMap]) -> MetadataMap {
    let mut common = MetadataMap::new();
    let Some((first, rest)) = maps.split_first() else {
        return common;
    };
    for (k, v) in first.iter() {
        if rest.iter().all(|m| m.get(k) == Some(v.as_str())) {
            common.insert(k, v);
        }
    }
    common
}

/// Average evaluations of the same system under different boundary conditions.
///
/// Estimates and jackknife block estimates are averaged observable by
/// observable; the nonlinear phi quantities are then recomputed from the
/// averaged moments.
pub fn average_evaluations(evals: &[Evaluation], size: SystemSize) -> Result<Evaluation> {
    let Some(first) = evals.first() else {
        return Err(SdwError::Inconsistent("no evaluations to average".to_string()));
    };
    let count = evals.len() as f64;
    let mut avg = Evaluation::new(first.jk_blocks);
    avg.samples = evals.iter().map(|e| e.samples).min().unwrap_or(0);
    for name in first.estimates.keys() {
        if name.starts_with("phi") {
            continue;
        }
        let mut sum = 0.0;
        let mut blocks = vec![0.0; first.jk_blocks];
        for e in evals {
            let value = e.estimates.get(name).ok_or_else(|| SdwError::Inconsistent(format!("{name} missing")))?;
            sum += value;
            if let Some(b) = e.block_estimates.get(name) {
                blocks.iter_mut().zip(b).for_each(|(s, v)| *s += v);
            }
        }
        avg.estimates.insert(name.clone(), sum / count);
        if first.jk_blocks > 1 {
            avg.block_estimates.insert(name.clone(), blocks.into_iter().map(|s| s / count).collect());
        }
    }
    avg.add_phi_derived(size);
    Ok(avg)
}
