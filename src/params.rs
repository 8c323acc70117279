// params.rs - Model and Monte Carlo parameters, their sources and validation

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SdwError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BoundaryCondition {
    Pbc,
    ApbcX,
    ApbcY,
    ApbcXY,
}

impl BoundaryCondition {
    pub const ALL: [BoundaryCondition; 4] =
        [BoundaryCondition::Pbc, BoundaryCondition::ApbcX, BoundaryCondition::ApbcY, BoundaryCondition::ApbcXY];

    pub fn as_str(&self) -> &'static str {
        match self {
            BoundaryCondition::Pbc => "pbc",
            BoundaryCondition::ApbcX => "apbc-x",
            BoundaryCondition::ApbcY => "apbc-y",
            BoundaryCondition::ApbcXY => "apbc-xy",
        }
    }

    #[inline(always)]
    pub fn antiperiodic_x(&self) -> bool {
        matches!(self, BoundaryCondition::ApbcX | BoundaryCondition::ApbcXY)
    }

    #[inline(always)]
    pub fn antiperiodic_y(&self) -> bool {
        matches!(self, BoundaryCondition::ApbcY | BoundaryCondition::ApbcXY)
    }
}

impl FromStr for BoundaryCondition {
    type Err = SdwError;
    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pbc" => Ok(BoundaryCondition::Pbc),
            "apbc-x" => Ok(BoundaryCondition::ApbcX),
            "apbc-y" => Ok(BoundaryCondition::ApbcY),
            "apbc-xy" => Ok(BoundaryCondition::ApbcXY),
            other => Err(SdwError::wrong("bc", other)),
        }
    }
}

impl fmt::Display for BoundaryCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UpdateMethod {
    Iterative,
    Woodbury,
    Delayed,
}

impl UpdateMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            UpdateMethod::Iterative => "iterative",
            UpdateMethod::Woodbury => "woodbury",
            UpdateMethod::Delayed => "delayed",
        }
    }
}

impl FromStr for UpdateMethod {
    type Err = SdwError;
    fn from_str(s: &str) -> Result<Self> {
        match s {
            "iterative" => Ok(UpdateMethod::Iterative),
            "woodbury" => Ok(UpdateMethod::Woodbury),
            "delayed" => Ok(UpdateMethod::Delayed),
            other => Err(SdwError::wrong("updateMethod", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SpinProposalMethod {
    Box,
    RotateThenScale,
    RotateAndScale,
}

impl SpinProposalMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            SpinProposalMethod::Box => "box",
            SpinProposalMethod::RotateThenScale => "rotate_then_scale",
            SpinProposalMethod::RotateAndScale => "rotate_and_scale",
        }
    }
}

impl FromStr for SpinProposalMethod {
    type Err = SdwError;
    fn from_str(s: &str) -> Result<Self> {
        match s {
            "box" => Ok(SpinProposalMethod::Box),
            "rotate_then_scale" => Ok(SpinProposalMethod::RotateThenScale),
            "rotate_and_scale" => Ok(SpinProposalMethod::RotateAndScale),
            other => Err(SdwError::wrong("spinProposalMethod", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CheckerboardMethod {
    None,
    Santos,
    Assaad,
    AssaadBerg,
}

impl CheckerboardMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            CheckerboardMethod::None => "none",
            CheckerboardMethod::Santos => "santos",
            CheckerboardMethod::Assaad => "assaad",
            CheckerboardMethod::AssaadBerg => "assaad_berg",
        }
    }
}

impl FromStr for CheckerboardMethod {
    type Err = SdwError;
    fn from_str(s: &str) -> Result<Self> {
        match s {
            "santos" => Ok(CheckerboardMethod::Santos),
            "assaad" => Ok(CheckerboardMethod::Assaad),
            "assaad_berg" => Ok(CheckerboardMethod::AssaadBerg),
            other => Err(SdwError::wrong("checkerboardMethod", other)),
        }
    }
}

/// Raw `key = value` parameters plus the set of keys that were given explicitly.
#[derive(Debug, Clone, Default)]
pub struct ParamMap {
    values: BTreeMap<String, String>,
}

impl ParamMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read a configuration file: one `key = value` per line, `#` starts a comment.
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let mut map = Self::new();
        for line in text.lines() {
            let line = line.split('#').next().unwrap_or("").trim();
            if line.is_empty() {
                continue;
            }
            map.insert_assignment(line)?;
        }
        Ok(map)
    }

    /// Parse `key=value` (as given on the command line) and insert it.
    pub fn insert_assignment(&mut self, assignment: &str) -> Result<()> {
        let (key, value) = assignment.split_once('=').ok_or_else(|| SdwError::Parse {
            what: "parameter assignment".into(),
            value: assignment.into(),
        })?;
        self.set(key.trim(), value.trim());
        Ok(())
    }

    pub fn set(&mut self, key: &str, value: impl ToString) {
        self.values.insert(key.to_string(), value.to_string());
    }

    /// Later maps override earlier ones.
    pub fn merge(&mut self, other: &ParamMap) {
        for (k, v) in &other.values {
            self.values.insert(k.clone(), v.clone());
        }
    }

    pub fn is_specified(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn specified(&self) -> BTreeSet<String> {
        self.values.keys().cloned().collect()
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn get<T: FromStr>(&self, key: &str) -> Result<Option<T>> {
        match self.values.get(key) {
            None => Ok(None),
            Some(raw) => raw.parse::<T>().map(Some).map_err(|_| SdwError::wrong(key, raw)),
        }
    }

    pub fn get_bool(&self, key: &str) -> Result<Option<bool>> {
        match self.values.get(key).map(String::as_str) {
            None => Ok(None),
            Some("true") | Some("1") | Some("yes") => Ok(Some(true)),
            Some("false") | Some("0") | Some("no") => Ok(Some(false)),
            Some(raw) => Err(SdwError::wrong(key, raw)),
        }
    }

    pub fn require<T: FromStr>(&self, key: &str) -> Result<T> {
        self.get(key)?.ok_or_else(|| SdwError::missing(key))
    }

    pub fn require_bool(&self, key: &str) -> Result<bool> {
        self.get_bool(key)?.ok_or_else(|| SdwError::missing(key))
    }
}

/// Parameters of the SDW model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelParams {
    pub l: usize,
    pub r: f64,
    pub mu: f64,
    pub beta: f64,
    pub m: usize,
    pub dtau: f64,
    /// Slices between stable Green's function recomputations.
    pub s: usize,
    pub acc_ratio: f64,
    pub bc: BoundaryCondition,
    pub txhor: f64,
    pub txver: f64,
    pub tyhor: f64,
    pub tyver: f64,
    pub checkerboard: CheckerboardMethod,
    pub update_method: UpdateMethod,
    pub delay_steps: usize,
    pub spin_proposal_method: SpinProposalMethod,
    pub adapt_scale_variance: bool,
    pub repeat_update_in_slice: usize,
    pub rescale: bool,
    pub rescale_interval: usize,
    pub rescale_growth_factor: f64,
    pub global_shift: bool,
    pub wolff_cluster_update: bool,
    pub global_update_interval: usize,
}

const REQUIRED_MODEL_PARAMS: [&str; 15] = [
    "mu", "L", "r", "accRatio", "bc", "txhor", "txver", "tyhor", "tyver", "rescale",
    "updateMethod", "spinProposalMethod", "repeatUpdateInSlice", "globalShift", "beta",
];

/// Largest divisor of m not exceeding 10.
fn default_stabilization_interval(m: usize) -> usize {
    (1..=m.min(10)).rev().find(|d| m % d == 0).unwrap_or(1)
}

impl ModelParams {
    /// Build and validate model parameters from a raw map.
    pub fn from_map(map: &ParamMap) -> Result<Self> {
        for key in REQUIRED_MODEL_PARAMS {
            if !map.is_specified(key) {
                return Err(SdwError::missing(key));
            }
        }

        let bc: BoundaryCondition = map.require_str_parsed("bc")?;
        let update_method: UpdateMethod = map.require_str_parsed("updateMethod")?;
        let spin_proposal_method: SpinProposalMethod = map.require_str_parsed("spinProposalMethod")?;

        let l_signed: i64 = map.require("L")?;
        if l_signed <= 0 {
            return Err(SdwError::wrong("L", l_signed));
        }
        let l = l_signed as usize;
        let n = l * l;

        let beta: f64 = map.require("beta")?;
        if beta <= 0.0 {
            return Err(SdwError::wrong("beta", beta));
        }
        let m = match (map.get::<i64>("m")?, map.get::<f64>("dtau")?) {
            (Some(m), _) if m <= 0 => return Err(SdwError::wrong("m", m)),
            (Some(m), _) => m as usize,
            (None, Some(dtau)) if dtau <= 0.0 => return Err(SdwError::wrong("dtau", dtau)),
            (None, Some(dtau)) => ((beta / dtau).round() as usize).max(1),
            (None, None) => return Err(SdwError::missing("m")),
        };
        let dtau = beta / m as f64;

        let s = match map.get::<i64>("s")? {
            Some(s) if s <= 0 => return Err(SdwError::wrong("s", s)),
            Some(s) => s as usize,
            None => default_stabilization_interval(m),
        };
        if m % s != 0 {
            return Err(SdwError::wrong("s", s));
        }

        let delay_steps = if update_method == UpdateMethod::Delayed {
            let steps: i64 = map.get("delaySteps")?.ok_or_else(|| SdwError::missing("delaySteps"))?;
            if steps <= 0 || steps as usize > n {
                return Err(SdwError::wrong("delaySteps", steps));
            }
            steps as usize
        } else {
            map.get::<usize>("delaySteps")?.unwrap_or(0)
        };

        let global_shift = map.require_bool("globalShift")?;
        let wolff_cluster_update = map.get_bool("wolffClusterUpdate")?.unwrap_or(false);
        let global_update_interval = map.get::<usize>("globalUpdateInterval")?.unwrap_or(1);
        if (global_shift || wolff_cluster_update) && global_update_interval == 0 {
            return Err(SdwError::wrong("globalUpdateInterval", global_update_interval));
        }

        let checkerboard = if map.get_bool("checkerboard")?.unwrap_or(false) {
            if l % 2 != 0 {
                return Err(SdwError::wrong("L", format!("{l} (checkerboard needs even L)")));
            }
            map.get_str("checkerboardMethod").unwrap_or("santos").parse()?
        } else {
            CheckerboardMethod::None
        };

        let rescale = map.require_bool("rescale")?;
        let rescale_interval = map.get::<usize>("rescaleInterval")?.unwrap_or(1);
        if rescale && rescale_interval == 0 {
            return Err(SdwError::wrong("rescaleInterval", rescale_interval));
        }
        let rescale_growth_factor = map.get::<f64>("rescaleGrowthFactor")?.unwrap_or(1.05);
        if rescale && rescale_growth_factor <= 0.0 {
            return Err(SdwError::wrong("rescaleGrowthFactor", rescale_growth_factor));
        }

        let repeat_update_in_slice: usize = map.require("repeatUpdateInSlice")?;
        if repeat_update_in_slice == 0 {
            return Err(SdwError::wrong("repeatUpdateInSlice", repeat_update_in_slice));
        }

        Ok(Self {
            l,
            r: map.require("r")?,
            mu: map.require("mu")?,
            beta,
            m,
            dtau,
            s,
            acc_ratio: map.require("accRatio")?,
            bc,
            txhor: map.require("txhor")?,
            txver: map.require("txver")?,
            tyhor: map.require("tyhor")?,
            tyver: map.require("tyver")?,
            checkerboard,
            update_method,
            delay_steps,
            spin_proposal_method,
            adapt_scale_variance: map.get_bool("adaptScaleVariance")?.unwrap_or(true),
            repeat_update_in_slice,
            rescale,
            rescale_interval,
            rescale_growth_factor,
            global_shift,
            wolff_cluster_update,
            global_update_interval,
        })
    }

    #[inline(always)]
    pub fn n(&self) -> usize {
        self.l * self.l
    }

    pub fn uses_checkerboard(&self) -> bool {
        self.checkerboard != CheckerboardMethod::None
    }
}

impl ParamMap {
    fn require_str_parsed<T: FromStr<Err = SdwError>>(&self, key: &str) -> Result<T> {
        self.get_str(key).ok_or_else(|| SdwError::missing(key))?.parse()
    }
}

/// Parameters of the Monte Carlo schedule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McParams {
    pub sweeps: usize,
    pub thermalization: usize,
    pub measure_interval: usize,
    pub jk_blocks: usize,
    pub timeseries: bool,
    /// Sweeps between snapshots; 0 disables checkpointing.
    pub save_interval: usize,
    pub seed: u64,
}

impl Default for McParams {
    fn default() -> Self {
        Self {
            sweeps: 1000,
            thermalization: 200,
            measure_interval: 1,
            jk_blocks: 1,
            timeseries: false,
            save_interval: 0,
            seed: 0,
        }
    }
}

impl McParams {
    pub fn from_map(map: &ParamMap) -> Result<Self> {
        let d = Self::default();
        let mc = Self {
            sweeps: map.get("sweeps")?.unwrap_or(d.sweeps),
            thermalization: map.get("thermalization")?.unwrap_or(d.thermalization),
            measure_interval: map.get("measureInterval")?.unwrap_or(d.measure_interval),
            jk_blocks: map.get("jkBlocks")?.unwrap_or(d.jk_blocks),
            timeseries: map.get_bool("timeseries")?.unwrap_or(d.timeseries),
            save_interval: map.get("saveInterval")?.unwrap_or(d.save_interval),
            seed: map.get("seed")?.unwrap_or(d.seed),
        };
        mc.check()?;
        Ok(mc)
    }

    pub fn check(&self) -> Result<()> {
        if self.measure_interval == 0 {
            return Err(SdwError::wrong("measureInterval", self.measure_interval));
        }
        if self.jk_blocks == 0 || self.sweeps / self.jk_blocks == 0 {
            return Err(SdwError::wrong("jkBlocks", self.jk_blocks));
        }
        Ok(())
    }
}
