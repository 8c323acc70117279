// propagator.rs - Single-particle hopping propagators e^{-dτK}, direct or checkerboard

use nalgebra::{DMatrix, SymmetricEigen};
use num_complex::Complex64;

use crate::checkerboard::{CMat, Checkerboard, Side, Step};
use crate::error::{Result, SdwError};
use crate::lattice::{NeighDir, PeriodicSquareLattice, NEIGH_DIRS};
use crate::params::{BoundaryCondition, ModelParams};

/// Number of band-spin flavors; the Green's function has 4 blocks of N.
pub const FLAVORS: usize = 4;

/// Band of flavor block `b` (XUP, XDOWN, YUP, YDOWN).
#[inline(always)]
pub fn band_of_block(b: usize) -> usize {
    b / 2
}

/// Does the bond from `site` in `dir` wrap around the lattice edge?
pub fn crosses_boundary(lattice: &PeriodicSquareLattice, site: usize, dir: NeighDir) -> bool {
    let l = lattice.l();
    let (x, y) = lattice.site_to_coords(site);
    match dir {
        NeighDir::XPlus => x == l - 1,
        NeighDir::XMinus => x == 0,
        NeighDir::YPlus => y == l - 1,
        NeighDir::YMinus => y == 0,
    }
}

/// Dense N×N hopping matrix K = -μ - Σ t·c†c for one band.
pub fn hopping_matrix(
    lattice: &PeriodicSquareLattice,
    bc: BoundaryCondition,
    mu: f64,
    t_hor: f64,
    t_ver: f64,
) -> DMatrix<f64> {
    let n = lattice.n();
    let mut k = DMatrix::from_diagonal_element(n, n, -mu);
    for site in 0..n {
        for dir in NEIGH_DIRS {
            let horizontal = matches!(dir, NeighDir::XPlus | NeighDir::XMinus);
            let t = if horizontal { t_hor } else { t_ver };
            let antiperiodic = if horizontal { bc.antiperiodic_x() } else { bc.antiperiodic_y() };
            let sign = if antiperiodic && crosses_boundary(lattice, site, dir) { -1.0 } else { 1.0 };
            let j = lattice.neighbor(dir, site);
            k[(site, j)] -= sign * t;
        }
    }
    k
}

/// e^{factor·K} for a real symmetric K via its eigendecomposition.
pub fn exp_symmetric(k: &DMatrix<f64>, factor: f64) -> DMatrix<f64> {
    let eig = SymmetricEigen::new(k.clone());
    let exp_diag = DMatrix::from_diagonal(&eig.eigenvalues.map(|ev| (factor * ev).exp()));
    &eig.eigenvectors * exp_diag * eig.eigenvectors.transpose()
}

/// Hopping amplitudes (horizontal, vertical) for band X and band Y.
pub fn band_hoppings(params: &ModelParams) -> [(f64, f64); 2] {
    [(params.txhor, params.txver), (params.tyhor, params.tyver)]
}

/// Exact propagators for both bands, stored complex for direct multiplication.
#[derive(Debug, Clone)]
pub struct DirectPropagators {
    full: [CMat; 2],
    full_inv: [CMat; 2],
    half: [CMat; 2],
    half_inv: [CMat; 2],
}

impl DirectPropagators {
    pub fn new(lattice: &PeriodicSquareLattice, bc: BoundaryCondition, dtau: f64, mu: f64, hoppings: [(f64, f64); 2]) -> Self {
        let build = |factor: f64| -> [CMat; 2] {
            let mk = |band: usize| {
                let (th, tv) = hoppings[band];
                exp_symmetric(&hopping_matrix(lattice, bc, mu, th, tv), factor).map(|x| Complex64::new(x, 0.0))
            };
            [mk(0), mk(1)]
        };
        Self {
            full: build(-dtau),
            full_inv: build(dtau),
            half: build(-0.5 * dtau),
            half_inv: build(0.5 * dtau),
        }
    }

    fn matrix(&self, band: usize, step: Step, inverse: bool) -> &CMat {
        match (step, inverse) {
            (Step::Full, false) => &self.full[band],
            (Step::Full, true) => &self.full_inv[band],
            (Step::Half, false) => &self.half[band],
            (Step::Half, true) => &self.half_inv[band],
        }
    }

    fn apply(&self, a: &mut CMat, side: Side, offset: usize, band: usize, step: Step, inverse: bool) {
        let n = self.full[0].nrows();
        let p = self.matrix(band, step, inverse);
        match side {
            Side::Left => {
                let block = p * a.rows(offset, n);
                a.rows_mut(offset, n).copy_from(&block);
            }
            Side::Right => {
                let block = a.columns(offset, n) * p;
                a.columns_mut(offset, n).copy_from(&block);
            }
        }
    }
}

/// The hopping part of the transfer matrix, resolved once at construction.
#[derive(Debug, Clone)]
pub enum Hopping {
    Direct(DirectPropagators),
    Checkerboard(Checkerboard),
}

impl Hopping {
    pub fn new(params: &ModelParams, lattice: &PeriodicSquareLattice) -> Result<Self> {
        let hoppings = band_hoppings(params);
        if params.uses_checkerboard() {
            if lattice.l() % 2 != 0 {
                return Err(SdwError::wrong("L", format!("{} (checkerboard needs even L)", lattice.l())));
            }
            Ok(Hopping::Checkerboard(Checkerboard::new(
                params.checkerboard,
                lattice,
                params.bc,
                params.dtau,
                params.mu,
                hoppings,
            )))
        } else {
            Ok(Hopping::Direct(DirectPropagators::new(lattice, params.bc, params.dtau, params.mu, hoppings)))
        }
    }

    /// The checkerboard primitive; calling it on a direct configuration is a bug.
    pub fn checkerboard(&self) -> Result<&Checkerboard> {
        match self {
            Hopping::Checkerboard(cb) => Ok(cb),
            Hopping::Direct(_) => Err(SdwError::UnsupportedCodePath("checkerboard multiplication without checkerboard")),
        }
    }

    /// a <- e^{∓dτK}·a (or a·e^{∓dτK}) applied to all four flavor blocks of a 4N-sized side.
    pub fn apply(&self, a: &mut CMat, side: Side, step: Step, inverse: bool) {
        let dim = match side {
            Side::Left => a.nrows(),
            Side::Right => a.ncols(),
        };
        let n = dim / FLAVORS;
        for b in 0..FLAVORS {
            let band = band_of_block(b);
            match self {
                Hopping::Direct(d) => d.apply(a, side, b * n, band, step, inverse),
                Hopping::Checkerboard(cb) => cb.apply(a, side, b * n, band, step, inverse),
            }
        }
    }

    pub fn mult_left(&self, a: &mut CMat, step: Step, inverse: bool) {
        self.apply(a, Side::Left, step, inverse)
    }

    pub fn mult_right(&self, a: &mut CMat, step: Step, inverse: bool) {
        self.apply(a, Side::Right, step, inverse)
    }
}
