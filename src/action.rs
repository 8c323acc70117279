// action.rs - Bosonic action of the φ field and its closed-form differences

use crate::field::{dot, norm_sq, sub, Phi, PhiField};
use crate::lattice::{NeighDir, PeriodicChain, PeriodicSquareLattice, Z};

/// Velocity of the order-parameter field.
pub const C: f64 = 1.0;
/// Quartic coupling.
pub const U: f64 = 1.0;

/// Geometry and couplings the action depends on.
#[derive(Debug, Clone, Copy)]
pub struct BosonAction<'a> {
    pub lattice: &'a PeriodicSquareLattice,
    pub chain: PeriodicChain,
    pub dtau: f64,
    pub r: f64,
}

impl<'a> BosonAction<'a> {
    pub fn new(lattice: &'a PeriodicSquareLattice, m: usize, dtau: f64, r: f64) -> Self {
        Self { lattice, chain: PeriodicChain::new(m), dtau, r }
    }

    /// Full S_φ of the configuration.
    pub fn total(&self, field: &PhiField) -> f64 {
        let dtau = self.dtau;
        let mut s = 0.0;
        for k in 1..=self.chain.len() {
            let km = self.chain.minus(k);
            for i in 0..self.lattice.n() {
                let p = field.get(i, k);
                let dt = scaled_norm_sq(&sub(p, field.get(i, km)), 1.0 / dtau);
                s += dtau / (2.0 * C * C) * dt;
                let px = field.get(self.lattice.neighbor(NeighDir::XPlus, i), k);
                let py = field.get(self.lattice.neighbor(NeighDir::YPlus, i), k);
                s += 0.5 * dtau * norm_sq(&sub(p, px));
                s += 0.5 * dtau * norm_sq(&sub(p, py));
                let p2 = norm_sq(p);
                s += 0.5 * dtau * self.r * p2 + 0.25 * dtau * U * p2 * p2;
            }
        }
        s
    }

    /// S_φ(φ with φ(site,k) = new) - S_φ(φ).
    pub fn delta_local(&self, field: &PhiField, site: usize, k: usize, new: &Phi) -> f64 {
        let dtau = self.dtau;
        let old = field.get(site, k);
        let old_sq = norm_sq(old);
        let new_sq = norm_sq(new);
        let d_sq = new_sq - old_sq;
        let d_four = new_sq * new_sq - old_sq * old_sq;
        let d_phi = sub(new, old);

        let mut time = 0.0;
        if self.chain.len() > 1 {
            let later = field.get(site, self.chain.plus(k));
            let earlier = field.get(site, self.chain.minus(k));
            let sum_t = [later[0] + earlier[0], later[1] + earlier[1], later[2] + earlier[2]];
            time = (d_sq - dot(&sum_t, &d_phi)) / (C * C * dtau);
        }

        let mut nb_sum = [0.0; 3];
        for &j in self.lattice.neighbors(site) {
            let p = field.get(j, k);
            nb_sum = [nb_sum[0] + p[0], nb_sum[1] + p[1], nb_sum[2] + p[2]];
        }
        let space = 0.5 * dtau * (Z as f64 * d_sq - 2.0 * dot(&nb_sum, &d_phi));

        let local = dtau * (0.5 * self.r * d_sq + 0.25 * U * d_four);
        time + space + local
    }

    /// Action difference for φ(·,k) -> f·φ(·,k) on the whole slice.
    pub fn delta_rescale(&self, field: &PhiField, k: usize, f: f64) -> f64 {
        let dtau = self.dtau;
        let f2 = f * f - 1.0;
        let f4 = f.powi(4) - 1.0;
        let (kp, km) = (self.chain.plus(k), self.chain.minus(k));
        let mut grad = 0.0;
        let mut sq = 0.0;
        let mut quart = 0.0;
        let mut time = 0.0;
        for i in 0..self.lattice.n() {
            let p = field.get(i, k);
            grad += norm_sq(&sub(p, field.get(self.lattice.neighbor(NeighDir::XPlus, i), k)));
            grad += norm_sq(&sub(p, field.get(self.lattice.neighbor(NeighDir::YPlus, i), k)));
            let p2 = norm_sq(p);
            sq += p2;
            quart += p2 * p2;
            if self.chain.len() > 1 {
                let pp = field.get(i, kp);
                let pm = field.get(i, km);
                let around = [pp[0] + pm[0], pp[1] + pm[1], pp[2] + pm[2]];
                time += f2 * p2 - (f - 1.0) * dot(p, &around);
            }
        }
        0.5 * dtau * f2 * grad + 0.5 * dtau * self.r * f2 * sq + 0.25 * dtau * U * f4 * quart + time / (C * C * dtau)
    }
}

#[inline(always)]
fn scaled_norm_sq(p: &Phi, f: f64) -> f64 {
    norm_sq(p) * f * f
}
