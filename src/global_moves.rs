// global_moves.rs - Whole-configuration moves: global shift, Wolff cluster flip, timeslice rescale

use std::collections::VecDeque;

use log::debug;
use nalgebra::DMatrix;
use num_complex::Complex64;
use serde::{Deserialize, Serialize};

use crate::action::{BosonAction, C};
use crate::checkerboard::CMat;
use crate::error::{Result, SdwError};
use crate::field::{add, dot, scale, PhiField};
use crate::green::GreenEngine;
use crate::local_update::pivots;
use crate::propagator::{Hopping, FLAVORS};
use crate::transfer::{delta_matrix, Transfer};
use crate::udv::singular_values;
use crate::utils::rng::RngWrapper;

/// Π old_i / new_i over the descending singular values of the two Green's functions.
///
/// The weight ratio det(G_old)/det(G_new) as a product of O(1) factors.
pub fn singular_value_ratio(old_sv: &[f64], new_sv: &[f64]) -> f64 {
    old_sv.iter().zip(new_sv).map(|(o, n)| o / n).product()
}

/// Attempt/accept counters of all non-local moves.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GlobalMoveStats {
    pub attempted_shifts: u64,
    pub accepted_shifts: u64,
    pub attempted_wolff: u64,
    pub accepted_wolff: u64,
    pub added_wolff_cluster_size: u64,
    pub attempted_rescales: u64,
    pub accepted_rescales: u64,
}

fn ratio(num: u64, den: u64) -> Option<f64> {
    (den > 0).then(|| num as f64 / den as f64)
}

impl GlobalMoveStats {
    pub fn shift_acc_ratio(&self) -> Option<f64> {
        ratio(self.accepted_shifts, self.attempted_shifts)
    }

    pub fn wolff_acc_ratio(&self) -> Option<f64> {
        ratio(self.accepted_wolff, self.attempted_wolff)
    }

    /// None until a cluster update has been accepted.
    pub fn average_accepted_cluster_size(&self) -> Option<f64> {
        ratio(self.added_wolff_cluster_size, self.accepted_wolff)
    }

    pub fn rescale_acc_ratio(&self) -> Option<f64> {
        ratio(self.accepted_rescales, self.attempted_rescales)
    }
}

/// Render an optional ratio for reports.
pub fn or_no_data(v: Option<f64>) -> String {
    v.map_or_else(|| "no data".to_string(), |x| x.to_string())
}

/// Everything a global move reads besides the mutable state.
#[derive(Clone, Copy)]
pub struct MoveContext<'a> {
    pub hopping: &'a Hopping,
    pub action: BosonAction<'a>,
}

/// Metropolis test on a fully recomputed configuration; rolls back on rejection.
fn accept_or_rollback(
    field: &mut PhiField,
    green: &mut GreenEngine,
    field_backup: PhiField,
    green_backup: GreenEngine,
    prob: f64,
    rng: &mut RngWrapper,
) -> bool {
    if prob > 1.0 || rng.rand01() < prob {
        true
    } else {
        *field = field_backup;
        *green = green_backup;
        false
    }
}

/// Shift φ at every site and slice by one common uniform vector in [-δ, δ]³.
pub fn attempt_global_shift(
    ctx: &MoveContext,
    field: &mut PhiField,
    green: &mut GreenEngine,
    phi_delta: f64,
    rng: &mut RngWrapper,
    stats: &mut GlobalMoveStats,
) -> Result<bool> {
    stats.attempted_shifts += 1;
    let old_action = ctx.action.total(field);
    let old_sv = singular_values(green.green())?;
    let field_backup = field.clone();
    let green_backup = green.clone();

    let shift = [
        rng.rand_range(-phi_delta, phi_delta),
        rng.rand_range(-phi_delta, phi_delta),
        rng.rand_range(-phi_delta, phi_delta),
    ];
    for k in 1..=field.m() {
        for site in 0..field.n() {
            let shifted = add(field.get(site, k), &shift);
            field.set_raw(site, k, shifted);
        }
    }
    field.update_all_caches();
    green.recompute_from_scratch(&Transfer::new(ctx.hopping, field))?;

    let new_action = ctx.action.total(field);
    let new_sv = singular_values(green.green())?;
    let prob = (old_action - new_action).exp() * singular_value_ratio(&old_sv, &new_sv);
    debug!("global shift {shift:?}: dS = {:.4}, prob = {prob:.4}", new_action - old_action);

    let accepted = accept_or_rollback(field, green, field_backup, green_backup, prob, rng);
    if accepted {
        stats.accepted_shifts += 1;
    }
    Ok(accepted)
}

/// Reflect a cluster of φ values at a random plane, grown with Wolff bond probabilities.
pub fn attempt_wolff_cluster_update(
    ctx: &MoveContext,
    field: &mut PhiField,
    green: &mut GreenEngine,
    rng: &mut RngWrapper,
    stats: &mut GlobalMoveStats,
) -> Result<bool> {
    stats.attempted_wolff += 1;
    let (n, m) = (field.n(), field.m());
    let dtau = ctx.action.dtau;
    let lattice = ctx.action.lattice;
    let chain = ctx.action.chain;

    let old_sv = singular_values(green.green())?;
    let field_backup = field.clone();
    let green_backup = green.clone();

    let axis = rng.rand_point_on_sphere();
    let flip = |f: &mut PhiField, site: usize, k: usize| {
        let p = *f.get(site, k);
        let proj = dot(&p, &axis);
        f.set_raw(site, k, add(&p, &scale(&axis, -2.0 * proj)));
    };

    let k0 = rng.rand_int(1, m);
    let s0 = rng.rand_int(0, n - 1);
    let mut in_cluster = vec![false; n * m];
    let idx = |site: usize, k: usize| (k - 1) * n + site;
    in_cluster[idx(s0, k0)] = true;
    flip(field, s0, k0);
    let mut queue = VecDeque::from([(s0, k0)]);
    let mut cluster_size = 1u64;

    while let Some((site, k)) = queue.pop_front() {
        let p_i = dot(field.get(site, k), &axis);
        let spatial = lattice.neighbors(site).iter().map(|&j| (j, k, 2.0 * dtau));
        let temporal = [chain.plus(k), chain.minus(k)].into_iter().map(|kt| (site, kt, 2.0 / (C * C * dtau)));
        let candidates: Vec<(usize, usize, f64)> = spatial.chain(temporal).collect();
        for (j, kj, coupling) in candidates {
            if in_cluster[idx(j, kj)] {
                continue;
            }
            let bond_arg = coupling * p_i * dot(field.get(j, kj), &axis);
            if bond_arg < 0.0 && rng.rand01() <= 1.0 - bond_arg.exp() {
                in_cluster[idx(j, kj)] = true;
                flip(field, j, kj);
                queue.push_back((j, kj));
                cluster_size += 1;
            }
        }
    }
    field.update_all_caches();
    green.recompute_from_scratch(&Transfer::new(ctx.hopping, field))?;

    let new_sv = singular_values(green.green())?;
    let prob = singular_value_ratio(&old_sv, &new_sv);
    debug!("wolff cluster of size {cluster_size}: prob = {prob:.4}");

    let accepted = accept_or_rollback(field, green, field_backup, green_backup, prob, rng);
    if accepted {
        stats.accepted_wolff += 1;
        stats.added_wolff_cluster_size += cluster_size;
    }
    Ok(accepted)
}

/// I + D(I - G) for the block-diagonal change D of a whole slice rescaled by f.
pub fn rescale_ratio_matrix(g: &CMat, field: &PhiField, k: usize, f: f64) -> CMat {
    let dim = g.nrows();
    let n = dim / FLAVORS;
    let mut mat = DMatrix::<Complex64>::identity(dim, dim);
    for site in 0..n {
        let old = field.get(site, k);
        let delta = delta_matrix(field.dtau(), old, &scale(old, f));
        let p = pivots(site, n);
        for r in 0..FLAVORS {
            for col in 0..dim {
                let mut v = Complex64::new(0.0, 0.0);
                for c in 0..FLAVORS {
                    let id = if col == p[c] { 1.0 } else { 0.0 };
                    v += delta[(r, c)] * (Complex64::new(id, 0.0) - g[(p[c], col)]);
                }
                mat[(p[r], col)] += v;
            }
        }
    }
    mat
}

/// φ(·,k) -> f·φ(·,k) with f = growth or 1/growth; G must belong to slice k.
pub fn attempt_timeslice_rescale(
    action: &BosonAction,
    k: usize,
    g: &mut CMat,
    field: &mut PhiField,
    growth: f64,
    rng: &mut RngWrapper,
    stats: &mut GlobalMoveStats,
) -> Result<bool> {
    stats.attempted_rescales += 1;
    let f = if rng.rand01() < 0.5 { growth } else { 1.0 / growth };
    let ds = action.delta_rescale(field, k, f);
    let mat = rescale_ratio_matrix(g, field, k, f);
    let det = mat.clone().lu().determinant();
    let prob = det.re * (-ds).exp();
    if prob > 1.0 || rng.rand01() < prob {
        let inv = mat.try_inverse().ok_or(SdwError::SingularMatrix("rescale ratio matrix"))?;
        *g = &*g * inv;
        for site in 0..field.n() {
            let scaled = scale(field.get(site, k), f);
            field.set(site, k, scaled);
        }
        stats.accepted_rescales += 1;
        Ok(true)
    } else {
        Ok(false)
    }
}
