// proposals.rs - Single-site field proposals and step-size adaptation during thermalization

use std::collections::VecDeque;
use std::f64::consts::PI;

use log::info;
use serde::{Deserialize, Serialize};

use crate::field::{norm_sq, scale, Phi};
use crate::params::SpinProposalMethod;
use crate::utils::rng::RngWrapper;

pub const ACC_RATIO_ADJUSTMENT_SAMPLES: usize = 100;
pub const INITIAL_PHI_DELTA: f64 = 0.5;
pub const INITIAL_ANGLE_DELTA: f64 = 0.0;
pub const MIN_ANGLE_DELTA: f64 = -1.0;
pub const MAX_ANGLE_DELTA: f64 = 0.99;
pub const INITIAL_SCALE_DELTA: f64 = 0.1;
pub const MIN_SCALE_DELTA: f64 = 0.0;
pub const MAX_SCALE_DELTA: f64 = 2.0;

/// The elementary move in use for a given sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MoveKind {
    Box,
    Rotate,
    Scale,
    RotateAndScale,
}

/// φ + uniform(-δ, δ) per component.
pub fn propose_box(rng: &mut RngWrapper, old: &Phi, delta: f64) -> Phi {
    [
        old[0] + rng.rand_range(-delta, delta),
        old[1] + rng.rand_range(-delta, delta),
        old[2] + rng.rand_range(-delta, delta),
    ]
}

/// Rotate the direction of `old` into a cone with cos θ ∈ [angle_delta, 1]
/// around it, and give the result length `radius`. A zero `old` has no
/// direction, so a uniform one is drawn.
pub fn propose_rotate(rng: &mut RngWrapper, old: &Phi, angle_delta: f64, radius: f64) -> Phi {
    let r = norm_sq(old).sqrt();
    if r == 0.0 {
        return scale(&rng.rand_point_on_sphere(), radius);
    }
    let (xn, yn, zn) = (old[0] / r, old[1] / r, old[2] / r);
    let cos_theta = rng.rand01() * (1.0 - angle_delta) + angle_delta;
    let sin_theta = (1.0 - cos_theta * cos_theta).max(0.0).sqrt();
    let varphi = 2.0 * PI * rng.rand01();
    let (sin_phi, cos_phi) = varphi.sin_cos();

    let x2n = xn * xn;
    let y2n = yn * yn;
    let dir = if x2n + y2n < 1e-24 {
        // old direction is (anti)parallel to z
        [sin_theta * cos_phi, sin_theta * sin_phi, zn.signum() * cos_theta]
    } else {
        let inv = sin_theta / (x2n + y2n);
        [
            inv * ((x2n * zn + y2n) * cos_phi + (zn - 1.0) * xn * yn * sin_phi) + xn * cos_theta,
            inv * ((zn - 1.0) * xn * yn * cos_phi + (x2n + y2n * zn) * sin_phi) + yn * cos_theta,
            -sin_theta * (xn * cos_phi + yn * sin_phi) + zn * cos_theta,
        ]
    };
    scale(&dir, radius)
}

/// Gaussian in |φ|³ around the current |φ|³; None if the draw is not positive.
pub fn propose_scale(rng: &mut RngWrapper, old: &Phi, scale_delta: f64) -> Option<Phi> {
    let r3 = norm_sq(old).sqrt().powi(3);
    let new_r3 = rng.gaussian(scale_delta, r3);
    if new_r3 <= 0.0 || r3 == 0.0 {
        return None;
    }
    Some(scale(old, (new_r3 / r3).cbrt()))
}

/// Gaussian length update followed by a rotation with the new length.
pub fn propose_rotate_and_scale(rng: &mut RngWrapper, old: &Phi, angle_delta: f64, scale_delta: f64) -> Option<Phi> {
    let r3 = norm_sq(old).sqrt().powi(3);
    let new_r3 = rng.gaussian(scale_delta, r3);
    if new_r3 <= 0.0 {
        return None;
    }
    Some(propose_rotate(rng, old, angle_delta, new_r3.cbrt()))
}

/// Average of the most recent `capacity` samples.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunningAverage {
    capacity: usize,
    values: VecDeque<f64>,
    added: usize,
}

impl RunningAverage {
    pub fn new(capacity: usize) -> Self {
        Self { capacity, values: VecDeque::with_capacity(capacity), added: 0 }
    }

    pub fn push(&mut self, v: f64) {
        if self.values.len() == self.capacity {
            self.values.pop_front();
        }
        self.values.push_back(v);
        self.added += 1;
    }

    pub fn samples_added(&self) -> usize {
        self.added
    }

    pub fn get(&self) -> f64 {
        if self.values.is_empty() {
            0.0
        } else {
            self.values.iter().sum::<f64>() / self.values.len() as f64
        }
    }
}

/// Bisection state for one bounded step-size parameter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bracket {
    pub value: f64,
    cur_min: f64,
    cur_max: f64,
    min: f64,
    max: f64,
}

impl Bracket {
    pub fn new(value: f64, min: f64, max: f64) -> Self {
        Self { value, cur_min: min, cur_max: max, min, max }
    }

    /// Move halfway toward the upper bracket end.
    fn grow(&mut self) {
        if self.value < self.max {
            self.cur_min = self.value;
            self.value += (self.cur_max - self.value) / 2.0;
        }
    }

    /// Move halfway toward the lower bracket end.
    fn shrink(&mut self) {
        if self.value > self.min {
            self.cur_max = self.value;
            self.value -= (self.value - self.cur_min) / 2.0;
        }
    }
}

/// Draws new field values and tunes the proposal widths toward the target acceptance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Proposer {
    method: SpinProposalMethod,
    target: f64,
    adapt_scale_variance: bool,
    pub phi_delta: f64,
    pub angle: Bracket,
    pub scale: Bracket,
    ra_box: RunningAverage,
    ra_rotate: RunningAverage,
    ra_scale: RunningAverage,
}

impl Proposer {
    pub fn new(method: SpinProposalMethod, target: f64, adapt_scale_variance: bool) -> Self {
        Self {
            method,
            target,
            adapt_scale_variance,
            phi_delta: INITIAL_PHI_DELTA,
            angle: Bracket::new(INITIAL_ANGLE_DELTA, MIN_ANGLE_DELTA, MAX_ANGLE_DELTA),
            scale: Bracket::new(INITIAL_SCALE_DELTA, MIN_SCALE_DELTA, MAX_SCALE_DELTA),
            ra_box: RunningAverage::new(ACC_RATIO_ADJUSTMENT_SAMPLES),
            ra_rotate: RunningAverage::new(ACC_RATIO_ADJUSTMENT_SAMPLES),
            ra_scale: RunningAverage::new(ACC_RATIO_ADJUSTMENT_SAMPLES),
        }
    }

    pub fn method(&self) -> SpinProposalMethod {
        self.method
    }

    /// Move used during sweep number `performed_sweeps`.
    pub fn move_kind(&self, performed_sweeps: usize) -> MoveKind {
        match self.method {
            SpinProposalMethod::Box => MoveKind::Box,
            SpinProposalMethod::RotateThenScale if performed_sweeps % 2 == 0 => MoveKind::Rotate,
            SpinProposalMethod::RotateThenScale => MoveKind::Scale,
            SpinProposalMethod::RotateAndScale => MoveKind::RotateAndScale,
        }
    }

    /// New value for `old`, or None for an invalid proposal that must be rejected.
    pub fn propose(&self, rng: &mut RngWrapper, old: &Phi, kind: MoveKind) -> Option<Phi> {
        match kind {
            MoveKind::Box => Some(propose_box(rng, old, self.phi_delta)),
            MoveKind::Rotate => Some(propose_rotate(rng, old, self.angle.value, norm_sq(old).sqrt())),
            MoveKind::Scale => propose_scale(rng, old, self.scale.value),
            MoveKind::RotateAndScale => propose_rotate_and_scale(rng, old, self.angle.value, self.scale.value),
        }
    }

    /// Feed the acceptance ratio of one slice; adjusts a width every
    /// ACC_RATIO_ADJUSTMENT_SAMPLES samples.
    pub fn record_acceptance(&mut self, acc_ratio: f64, performed_sweeps: usize) {
        let tuned = match self.move_kind(performed_sweeps) {
            MoveKind::Box => MoveKind::Box,
            MoveKind::Rotate => MoveKind::Rotate,
            MoveKind::Scale => MoveKind::Scale,
            MoveKind::RotateAndScale if performed_sweeps % (2 * ACC_RATIO_ADJUSTMENT_SAMPLES) < ACC_RATIO_ADJUSTMENT_SAMPLES => {
                MoveKind::Rotate
            }
            MoveKind::RotateAndScale => MoveKind::Scale,
        };
        let target = self.target;
        match tuned {
            MoveKind::Box => {
                self.ra_box.push(acc_ratio);
                if self.ra_box.samples_added() % ACC_RATIO_ADJUSTMENT_SAMPLES == 0 {
                    if self.ra_box.get() < target {
                        self.phi_delta *= 0.95;
                    } else {
                        self.phi_delta *= 1.05;
                    }
                }
            }
            MoveKind::Rotate => {
                self.ra_rotate.push(acc_ratio);
                if self.ra_rotate.samples_added() % ACC_RATIO_ADJUSTMENT_SAMPLES == 0 {
                    let avg = self.ra_rotate.get();
                    // a larger angleDelta means a narrower cone
                    if avg < target {
                        self.angle.grow();
                    } else if avg > target {
                        self.angle.shrink();
                    }
                }
            }
            _ => {
                self.ra_scale.push(acc_ratio);
                if self.adapt_scale_variance && self.ra_scale.samples_added() % ACC_RATIO_ADJUSTMENT_SAMPLES == 0 {
                    let avg = self.ra_scale.get();
                    if avg > target {
                        self.scale.grow();
                    } else if avg < target {
                        self.scale.shrink();
                    }
                }
            }
        }
    }

    /// Running acceptance averages (box, rotate, scale).
    pub fn running_acceptance(&self) -> (f64, f64, f64) {
        (self.ra_box.get(), self.ra_rotate.get(), self.ra_scale.get())
    }

    pub fn log_step_sizes(&self) {
        let (b, r, s) = self.running_acceptance();
        match self.method {
            SpinProposalMethod::Box => info!("phiDelta = {:.4} (acc. {b:.3})", self.phi_delta),
            _ => info!(
                "angleDelta = {:.4} (acc. {r:.3}), scaleDelta = {:.4} (acc. {s:.3})",
                self.angle.value, self.scale.value
            ),
        }
    }
}
