// checkerboard.rs - Checkerboard-decomposed hopping exponentials applied as O(N) bond blends

use nalgebra::DMatrix;
use num_complex::Complex64;

use crate::lattice::{NeighDir, PeriodicSquareLattice};
use crate::params::{BoundaryCondition, CheckerboardMethod};

pub type CMat = DMatrix<Complex64>;

/// Which side of the matrix a factor is applied from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Left,
    Right,
}

/// Whole or half imaginary-time step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Full,
    Half,
}

/// cosh/sinh of dτ·t for the horizontal and vertical hoppings of one band.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BondFactors {
    pub ch_hor: f64,
    pub sh_hor: f64,
    pub ch_ver: f64,
    pub sh_ver: f64,
}

impl BondFactors {
    pub fn new(dtau: f64, t_hor: f64, t_ver: f64) -> Self {
        Self {
            ch_hor: (dtau * t_hor).cosh(),
            sh_hor: (dtau * t_hor).sinh(),
            ch_ver: (dtau * t_ver).cosh(),
            sh_ver: (dtau * t_ver).sinh(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Axis {
    X,
    Y,
}

/// One factor of the decomposition: all bonds (or plaquettes) of one subgroup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Bond { axis: Axis, subgroup: usize, step: Step },
    Plaquette { subgroup: usize, step: Step },
}

/// Factors in the order they are applied to a matrix from the left for e^{+dτT}.
fn stages(method: CheckerboardMethod, step: Step) -> Vec<Stage> {
    use Stage::*;
    match method {
        CheckerboardMethod::None => Vec::new(),
        CheckerboardMethod::Santos => vec![
            Bond { axis: Axis::X, subgroup: 0, step },
            Bond { axis: Axis::Y, subgroup: 0, step },
            Bond { axis: Axis::X, subgroup: 1, step },
            Bond { axis: Axis::Y, subgroup: 1, step },
        ],
        CheckerboardMethod::Assaad => vec![Plaquette { subgroup: 0, step }, Plaquette { subgroup: 1, step }],
        CheckerboardMethod::AssaadBerg => match step {
            Step::Full => vec![
                Plaquette { subgroup: 1, step: Step::Half },
                Plaquette { subgroup: 0, step: Step::Full },
                Plaquette { subgroup: 1, step: Step::Half },
            ],
            // squares to the full step when combined with its transpose
            Step::Half => vec![Plaquette { subgroup: 0, step: Step::Half }, Plaquette { subgroup: 1, step: Step::Half }],
        },
    }
}

/// Checkerboard approximation of e^{∓dτK} for the two bands.
///
/// K = -μ - T with T the nearest-neighbor hopping; bonds crossing an
/// antiperiodic boundary carry a flipped sinh factor.
#[derive(Debug, Clone)]
pub struct Checkerboard {
    method: CheckerboardMethod,
    lattice: PeriodicSquareLattice,
    apbc_x: bool,
    apbc_y: bool,
    dtau: f64,
    mu: f64,
    full: [BondFactors; 2],
    half: [BondFactors; 2],
}

impl Checkerboard {
    pub fn new(
        method: CheckerboardMethod,
        lattice: &PeriodicSquareLattice,
        bc: BoundaryCondition,
        dtau: f64,
        mu: f64,
        hoppings: [(f64, f64); 2],
    ) -> Self {
        let full = [
            BondFactors::new(dtau, hoppings[0].0, hoppings[0].1),
            BondFactors::new(dtau, hoppings[1].0, hoppings[1].1),
        ];
        let half = [
            BondFactors::new(0.5 * dtau, hoppings[0].0, hoppings[0].1),
            BondFactors::new(0.5 * dtau, hoppings[1].0, hoppings[1].1),
        ];
        Self {
            method,
            lattice: lattice.clone(),
            apbc_x: bc.antiperiodic_x(),
            apbc_y: bc.antiperiodic_y(),
            dtau,
            mu,
            full,
            half,
        }
    }

    pub fn method(&self) -> CheckerboardMethod {
        self.method
    }

    pub fn factors(&self, band: usize, step: Step) -> &BondFactors {
        match step {
            Step::Full => &self.full[band],
            Step::Half => &self.half[band],
        }
    }

    /// Apply e^{-dτK} (or its inverse, or the half step) of `band` to the N
    /// rows (Left) or columns (Right) of `a` starting at `offset`.
    pub fn apply(&self, a: &mut CMat, side: Side, offset: usize, band: usize, step: Step, inverse: bool) {
        let mut order = stages(self.method, step);
        // left: F_last..F_first; inverse reverses; right-multiplication reverses again
        let reversed = (side == Side::Left) == inverse;
        if reversed {
            order.reverse();
        }
        let sign = if inverse { -1.0 } else { 1.0 };
        for stage in order {
            match stage {
                Stage::Bond { axis, subgroup, step } => {
                    self.apply_bonds(a, side, offset, band, axis, subgroup, step, sign)
                }
                Stage::Plaquette { subgroup, step } => self.apply_plaquettes(a, side, offset, band, subgroup, step, sign),
            }
        }
        let tau = match step {
            Step::Full => self.dtau,
            Step::Half => 0.5 * self.dtau,
        };
        let mu_factor = (sign * tau * self.mu).exp();
        scale_block(a, side, offset, self.lattice.n(), mu_factor);
    }

    #[allow(clippy::too_many_arguments)]
    fn apply_bonds(&self, a: &mut CMat, side: Side, offset: usize, band: usize, axis: Axis, subgroup: usize, step: Step, sign: f64) {
        let l = self.lattice.l();
        let f = self.factors(band, step);
        let (ch, sh, apbc, dir) = match axis {
            Axis::X => (f.ch_hor, sign * f.sh_hor, self.apbc_x, NeighDir::XPlus),
            Axis::Y => (f.ch_ver, sign * f.sh_ver, self.apbc_y, NeighDir::YPlus),
        };
        for i1 in (subgroup..l).step_by(2) {
            let sh_bond = if apbc && i1 == l - 1 { -sh } else { sh };
            for i2 in 0..l {
                let i = match axis {
                    Axis::X => self.lattice.coords_to_site(i1, i2),
                    Axis::Y => self.lattice.coords_to_site(i2, i1),
                };
                let j = self.lattice.neighbor(dir, i);
                blend2(a, side, offset + i, offset + j, ch, sh_bond);
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn apply_plaquettes(&self, a: &mut CMat, side: Side, offset: usize, band: usize, subgroup: usize, step: Step, sign: f64) {
        let l = self.lattice.l();
        let f = self.factors(band, step);
        for i1 in (subgroup..l).step_by(2) {
            let shh = if self.apbc_x && i1 == l - 1 { -sign * f.sh_hor } else { sign * f.sh_hor };
            for i2 in (subgroup..l).step_by(2) {
                let shv = if self.apbc_y && i2 == l - 1 { -sign * f.sh_ver } else { sign * f.sh_ver };
                let i = self.lattice.coords_to_site(i1, i2);
                let j = self.lattice.neighbor(NeighDir::XPlus, i);
                let k = self.lattice.neighbor(NeighDir::YPlus, i);
                let m = self.lattice.neighbor(NeighDir::XPlus, k);
                let sites = [offset + i, offset + j, offset + k, offset + m];
                blend4(a, side, sites, f.ch_hor, shh, f.ch_ver, shv);
            }
        }
    }
}

/// (r_i, r_j) <- (ch r_i + sh r_j, sh r_i + ch r_j) on rows or columns.
#[inline]
fn blend2(a: &mut CMat, side: Side, i: usize, j: usize, ch: f64, sh: f64) {
    match side {
        Side::Left => {
            for c in 0..a.ncols() {
                let ri = a[(i, c)];
                let rj = a[(j, c)];
                a[(i, c)] = ri * ch + rj * sh;
                a[(j, c)] = ri * sh + rj * ch;
            }
        }
        Side::Right => {
            for r in 0..a.nrows() {
                let ri = a[(r, i)];
                let rj = a[(r, j)];
                a[(r, i)] = ri * ch + rj * sh;
                a[(r, j)] = ri * sh + rj * ch;
            }
        }
    }
}

/// Plaquette factor (ch_h + sh_h h_x)(ch_v + sh_v h_y) on sites i, i+x, i+y, i+x+y.
#[inline]
fn blend4(a: &mut CMat, side: Side, s: [usize; 4], chh: f64, shh: f64, chv: f64, shv: f64) {
    let cc = chh * chv;
    let sc = shh * chv;
    let cs = chh * shv;
    let ss = shh * shv;
    let mix = |ri: Complex64, rj: Complex64, rk: Complex64, rl: Complex64| {
        [
            ri * cc + rj * sc + rk * cs + rl * ss,
            ri * sc + rj * cc + rk * ss + rl * cs,
            ri * cs + rj * ss + rk * cc + rl * sc,
            ri * ss + rj * cs + rk * sc + rl * cc,
        ]
    };
    match side {
        Side::Left => {
            for c in 0..a.ncols() {
                let out = mix(a[(s[0], c)], a[(s[1], c)], a[(s[2], c)], a[(s[3], c)]);
                for (q, v) in s.iter().zip(out) {
                    a[(*q, c)] = v;
                }
            }
        }
        Side::Right => {
            for r in 0..a.nrows() {
                let out = mix(a[(r, s[0])], a[(r, s[1])], a[(r, s[2])], a[(r, s[3])]);
                for (q, v) in s.iter().zip(out) {
                    a[(r, *q)] = v;
                }
            }
        }
    }
}

fn scale_block(a: &mut CMat, side: Side, offset: usize, n: usize, factor: f64) {
    match side {
        Side::Left => a.rows_mut(offset, n).iter_mut().for_each(|v| *v *= factor),
        Side::Right => a.columns_mut(offset, n).iter_mut().for_each(|v| *v *= factor),
    }
}
