// measure.rs - Per-slice measurements of the SDW model on the shifted Green's function

use std::f64::consts::PI;

use num_complex::Complex64;

use crate::checkerboard::CMat;
use crate::field::{dot, norm_sq, Phi, PhiField};
use crate::lattice::{NeighDir, PeriodicSquareLattice};
use crate::observables::Observables;
use crate::params::BoundaryCondition;

pub const BAND_NAMES: [&str; 2] = ["X", "Y"];
pub const BAND_SPIN_NAMES: [&str; 4] = ["XUP", "XDOWN", "YUP", "YDOWN"];
const UP: usize = 0;
const DOWN: usize = 1;

#[inline(always)]
fn band_spin(band: usize, spin: usize) -> usize {
    2 * band + spin
}

/// Accumulates the observables of one sweep, slice by slice.
#[derive(Debug, Clone)]
pub struct SdwMeasurements {
    l: usize,
    n: usize,
    m: usize,
    dtau: f64,
    bc: BoundaryCondition,
    hoppings: [(f64, f64); 2],
    slices: usize,
    norm_phi: f64,
    mean_phi: Phi,
    occ_x: Vec<f64>,
    occ_y: Vec<f64>,
    k_occ_x: Vec<f64>,
    k_occ_y: Vec<f64>,
    pair_plus: Vec<f64>,
    pair_minus: Vec<f64>,
    e_kinetic: f64,
    e_couple: f64,
    occ: [f64; 4],
    double_occ: [[f64; 4]; 4],
    mag_corr: [[Vec<f64>; 2]; 2],
    staggered_mag_corr: [[Vec<f64>; 2]; 2],
    occ_corr: [[Vec<f64>; 4]; 4],
}

impl SdwMeasurements {
    pub fn new(l: usize, m: usize, dtau: f64, bc: BoundaryCondition, hoppings: [(f64, f64); 2]) -> Self {
        let n = l * l;
        let zero = vec![0.0; n];
        Self {
            l,
            n,
            m,
            dtau,
            bc,
            hoppings,
            slices: 0,
            norm_phi: 0.0,
            mean_phi: [0.0; 3],
            occ_x: zero.clone(),
            occ_y: zero.clone(),
            k_occ_x: zero.clone(),
            k_occ_y: zero.clone(),
            pair_plus: zero.clone(),
            pair_minus: zero.clone(),
            e_kinetic: 0.0,
            e_couple: 0.0,
            occ: [0.0; 4],
            double_occ: [[0.0; 4]; 4],
            mag_corr: std::array::from_fn(|_| std::array::from_fn(|_| zero.clone())),
            staggered_mag_corr: std::array::from_fn(|_| std::array::from_fn(|_| zero.clone())),
            occ_corr: std::array::from_fn(|_| std::array::from_fn(|_| zero.clone())),
        }
    }

    /// Start a new sweep.
    pub fn reset(&mut self) {
        *self = Self::new(self.l, self.m, self.dtau, self.bc, self.hoppings);
    }

    pub fn slices_measured(&self) -> usize {
        self.slices
    }

    /// Add the contributions of slice k; `g` is the shifted G(k).
    pub fn measure_slice(&mut self, k: usize, g: &CMat, field: &PhiField, lattice: &PeriodicSquareLattice) {
        let n = self.n;
        self.slices += 1;
        let gl = |s1: usize, b1: usize, sp1: usize, s2: usize, b2: usize, sp2: usize| -> Complex64 {
            g[(s1 + 2 * n * b1 + n * sp1, s2 + 2 * n * b2 + n * sp2)]
        };

        for site in 0..n {
            let p = field.get(site, k);
            for c in 0..3 {
                self.mean_phi[c] += p[c];
            }
            self.norm_phi += norm_sq(p).sqrt();
        }

        for i in 0..n {
            self.occ_x[i] += (g[(i, i)] + g[(i + n, i + n)]).re;
            self.occ_y[i] += (g[(i + 2 * n, i + 2 * n)] + g[(i + 3 * n, i + 3 * n)]).re;
        }

        self.measure_k_occupation(g);

        // pairing correlations between site i and the origin, both orderings
        for i in 0..n {
            let mut plus = Complex64::new(0.0, 0.0);
            let mut minus = Complex64::new(0.0, 0.0);
            for (a, b) in [(i, 0), (0, i)] {
                let t = |b1: usize, b2: usize| {
                    gl(a, b1, DOWN, b, b2, UP) * gl(a, b1, UP, b, b2, DOWN)
                        - gl(a, b1, DOWN, b, b2, DOWN) * gl(a, b1, UP, b, b2, UP)
                };
                let (xx, xy, yx, yy) = (t(0, 0), t(0, 1), t(1, 0), t(1, 1));
                plus += -4.0 * (xx + xy + yx + yy);
                minus += -4.0 * (xx - xy - yx + yy);
            }
            self.pair_plus[i] += plus.re;
            self.pair_minus[i] += minus.re;
        }

        // kinetic energy
        for i in 0..n {
            for spin in [UP, DOWN] {
                for band in 0..2 {
                    let (th, tv) = self.hoppings[band];
                    let e = (gl(i, band, spin, lattice.neighbor(NeighDir::XPlus, i), band, spin)
                        + gl(i, band, spin, lattice.neighbor(NeighDir::XMinus, i), band, spin))
                        * th
                        + (gl(i, band, spin, lattice.neighbor(NeighDir::YPlus, i), band, spin)
                            + gl(i, band, spin, lattice.neighbor(NeighDir::YMinus, i), band, spin))
                            * tv;
                    self.e_kinetic += e.re;
                }
            }
        }

        // coupling energy, overall factor -1 included
        for i in 0..n {
            let p = field.get(i, k);
            let up_up = Complex64::new(-p[2], 0.0);
            let up_dn = Complex64::new(-p[0], p[1]);
            let dn_up = Complex64::new(-p[0], -p[1]);
            let dn_dn = Complex64::new(p[2], 0.0);
            let both = |s1: usize, s2: usize| gl(i, 0, s1, i, 1, s2) + gl(i, 1, s1, i, 0, s2);
            let e = up_up * both(UP, UP) + up_dn * both(UP, DOWN) + dn_up * both(DOWN, UP) + dn_dn * both(DOWN, DOWN);
            self.e_couple += e.re;
        }

        for bs in 0..4 {
            let off = bs * n;
            self.occ[bs] += (0..n).map(|i| g[(i + off, i + off)].re).sum::<f64>();
        }

        for bs1 in 0..4 {
            for bs2 in bs1 + 1..4 {
                let (b1, s1, b2, s2) = (bs1 / 2, bs1 % 2, bs2 / 2, bs2 % 2);
                for i in 0..n {
                    let c = -(gl(i, b1, s1, i, b2, s2) * gl(i, b2, s2, i, b1, s1))
                        + (gl(i, b1, s1, i, b1, s1) - 1.0) * (gl(i, b2, s2, i, b2, s2) - 1.0);
                    self.double_occ[bs1][bs2] += c.re;
                }
            }
        }

        // spin-spin correlations, distance index d = j - i (mod N)
        for b1 in 0..2 {
            for b2 in b1..2 {
                for i in 0..n {
                    let mut staggered_sign = -1.0;
                    for d in 1..n {
                        let j = (i + d) % n;
                        let c = -(gl(i, b2, DOWN, j, b1, DOWN) * gl(j, b1, DOWN, i, b2, DOWN))
                            + gl(i, b2, UP, j, b1, DOWN) * gl(j, b1, DOWN, i, b2, UP)
                            + gl(i, b2, DOWN, i, b2, DOWN) * gl(j, b1, DOWN, j, b1, DOWN)
                            - gl(i, b2, UP, i, b2, UP) * gl(j, b1, DOWN, j, b1, DOWN)
                            + gl(i, b2, DOWN, j, b1, UP) * gl(j, b1, UP, i, b2, DOWN)
                            - gl(i, b2, UP, j, b1, UP) * gl(j, b1, UP, i, b2, UP)
                            - gl(i, b2, DOWN, i, b2, DOWN) * gl(j, b1, UP, j, b1, UP)
                            + gl(i, b2, UP, i, b2, UP) * gl(j, b1, UP, j, b1, UP);
                        self.mag_corr[b1][b2][d] += c.re;
                        self.staggered_mag_corr[b1][b2][d] += staggered_sign * c.re;
                        staggered_sign = -staggered_sign;
                    }
                }
            }
        }

        // density-density correlations
        for bs1 in 0..4 {
            for bs2 in bs1..4 {
                let (b1, s1, b2, s2) = (bs1 / 2, bs1 % 2, bs2 / 2, bs2 % 2);
                for i in 0..n {
                    for d in 1..n {
                        let j = (i + d) % n;
                        let v = -(gl(i, b1, s1, j, b2, s2) * gl(j, b2, s2, i, b1, s1))
                            + (gl(i, b1, s1, i, b1, s1) - 1.0) * (gl(j, b2, s2, j, b2, s2) - 1.0);
                        self.occ_corr[bs1][bs2][d] += v.re;
                    }
                }
            }
        }
    }

    fn measure_k_occupation(&mut self, g: &CMat) {
        let (l, n) = (self.l, self.n);
        let offset_x = if self.bc.antiperiodic_x() { 0.5 } else { 0.0 };
        let offset_y = if self.bc.antiperiodic_y() { 0.5 } else { 0.0 };
        let coords: Vec<(f64, f64)> = (0..n).map(|i| ((i % l) as f64, (i / l) as f64)).collect();
        for ksite in 0..n {
            let kx = -PI + ((ksite % l) as f64 + offset_x) * 2.0 * PI / l as f64;
            let ky = -PI + ((ksite / l) as f64 + offset_y) * 2.0 * PI / l as f64;
            let mut sum_x = 0.0;
            let mut sum_y = 0.0;
            for i in 0..n {
                for j in 0..n {
                    let arg = kx * (coords[i].0 - coords[j].0) + ky * (coords[i].1 - coords[j].1);
                    let phase = Complex64::from_polar(1.0, arg);
                    sum_x += (phase * (g[(i, j)] + g[(i + n, j + n)])).re;
                    sum_y += (phase * (g[(i + 2 * n, j + 2 * n)] + g[(i + 3 * n, j + 3 * n)])).re;
                }
            }
            self.k_occ_x[ksite] += sum_x;
            self.k_occ_y[ksite] += sum_y;
        }
    }

    /// Normalize the sums of all m slices into this sweep's observables.
    pub fn finish(&self, field: &PhiField) -> Observables {
        let (l, n, m) = (self.l, self.n, self.m);
        let nm = (n * m) as f64;
        let mut obs = Observables::default();

        let mean_phi = [self.mean_phi[0] / nm, self.mean_phi[1] / nm, self.mean_phi[2] / nm];
        obs.scalar("normPhi", self.norm_phi / nm);
        obs.scalar("normMeanPhi", norm_sq(&mean_phi).sqrt());
        obs.scalar("meanPhiSquared", norm_sq(&mean_phi));
        let phi_0 = *field.get(0, m);
        let mut susc = 0.0;
        for k in 1..=m {
            for site in 0..n {
                susc += dot(&phi_0, field.get(site, k));
            }
        }
        obs.scalar("sdwSusceptibility", self.dtau * susc);

        let pair_plus: Vec<f64> = self.pair_plus.iter().map(|v| v / m as f64).collect();
        let pair_minus: Vec<f64> = self.pair_minus.iter().map(|v| v / m as f64).collect();
        let far = far_sites(l);
        obs.scalar("pairPlusMax", far.iter().map(|&i| pair_plus[i]).sum::<f64>() / far.len() as f64);
        obs.scalar("pairMinusMax", far.iter().map(|&i| pair_minus[i]).sum::<f64>() / far.len() as f64);

        obs.scalar("fermionEkinetic", self.e_kinetic / nm);
        obs.scalar("fermionEcouple", self.e_couple / nm);

        let occ: [f64; 4] = std::array::from_fn(|bs| 1.0 - self.occ[bs] / nm);
        for (bs, name) in BAND_SPIN_NAMES.iter().enumerate() {
            obs.scalar(format!("occ{name}"), occ[bs]);
        }
        let mut double_occ = [[0.0; 4]; 4];
        for bs1 in 0..4 {
            for bs2 in bs1 + 1..4 {
                double_occ[bs1][bs2] = self.double_occ[bs1][bs2] / nm;
                obs.scalar(
                    format!("doubleOcc{}{}", BAND_SPIN_NAMES[bs1], BAND_SPIN_NAMES[bs2]),
                    double_occ[bs1][bs2],
                );
            }
        }

        let mut mag: [[Vec<f64>; 2]; 2] = Default::default();
        let mut smag: [[Vec<f64>; 2]; 2] = Default::default();
        for b1 in 0..2 {
            for b2 in b1..2 {
                let mut mgc: Vec<f64> = self.mag_corr[b1][b2].iter().map(|v| v / nm).collect();
                let mut smgc: Vec<f64> = self.staggered_mag_corr[b1][b2].iter().map(|v| v / nm).collect();
                // squared local moment
                let up = band_spin(b1, UP);
                let down = band_spin(b2, DOWN);
                let local = occ[up] - 2.0 * double_occ[up.min(down)][up.max(down)] + occ[down];
                mgc[0] = local;
                smgc[0] = local;
                mag[b1][b2] = mgc;
                smag[b1][b2] = smgc;
            }
        }
        let total = |c: &[[Vec<f64>; 2]; 2]| -> Vec<f64> {
            (0..n).map(|d| c[0][0][d] + 2.0 * c[0][1][d] + c[1][1][d]).collect()
        };
        for b1 in 0..2 {
            for b2 in b1..2 {
                let pair = format!("{}{}", BAND_NAMES[b1], BAND_NAMES[b2]);
                let (s00, spp) = structure_factors(l, &mag[b1][b2]);
                let (ss00, sspp) = structure_factors(l, &smag[b1][b2]);
                obs.scalar(format!("magStruct00{pair}"), s00);
                obs.scalar(format!("magStructPiPi{pair}"), spp);
                obs.scalar(format!("staggeredMagStruct00{pair}"), ss00);
                obs.scalar(format!("staggeredMagStructPiPi{pair}"), sspp);
            }
        }

        obs.vector("meanPhi", "component", mean_phi.to_vec());
        obs.vector("occX", "site", self.occ_x.iter().map(|v| v / nm).collect());
        obs.vector("occY", "site", self.occ_y.iter().map(|v| v / nm).collect());
        // 2 rather than 1: both spins are summed
        obs.vector("kOccX", "ksite", self.k_occ_x.iter().map(|v| 2.0 - v / nm).collect());
        obs.vector("kOccY", "ksite", self.k_occ_y.iter().map(|v| 2.0 - v / nm).collect());
        obs.vector("pairPlus", "site", pair_plus);
        obs.vector("pairMinus", "site", pair_minus);
        for b1 in 0..2 {
            for b2 in b1..2 {
                let pair = format!("{}{}", BAND_NAMES[b1], BAND_NAMES[b2]);
                obs.vector(format!("magCorr{pair}"), "distance", mag[b1][b2].clone());
                obs.vector(format!("staggeredMagCorr{pair}"), "distance", smag[b1][b2].clone());
            }
        }
        obs.vector("magCorrTotal", "distance", total(&mag));
        obs.vector("staggeredMagCorrTotal", "distance", total(&smag));
        for bs1 in 0..4 {
            for bs2 in bs1..4 {
                let mut oc: Vec<f64> = self.occ_corr[bs1][bs2].iter().map(|v| v / nm).collect();
                oc[0] = if bs1 == bs2 { occ[bs1] } else { double_occ[bs1][bs2] };
                obs.vector(format!("occCorr{}{}", BAND_SPIN_NAMES[bs1], BAND_SPIN_NAMES[bs2]), "distance", oc);
            }
        }
        obs
    }
}

/// The 3×3 sites around (L/2, L/2).
fn far_sites(l: usize) -> Vec<usize> {
    let c = l / 2;
    let mut sites = Vec::with_capacity(9);
    for dy in [c + l - 1, c, c + 1] {
        for dx in [c + l - 1, c, c + 1] {
            sites.push((dy % l) * l + dx % l);
        }
    }
    sites
}

/// (S(0,0), S(π,π)) of a correlation indexed by distance site j.
fn structure_factors(l: usize, corr: &[f64]) -> (f64, f64) {
    let mut s00 = 0.0;
    let mut spp = 0.0;
    for (j, c) in corr.iter().enumerate() {
        let (jx, jy) = ((j % l) as f64, (j / l) as f64);
        s00 += c;
        spp += (PI * jx + PI * jy).cos() * c;
    }
    (s00, spp)
}
