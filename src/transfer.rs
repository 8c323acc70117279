// transfer.rs - Time-slice transfer matrices B_k = e^{-dτV_k} e^{-dτK}

use nalgebra::{DMatrix, Matrix4};
use num_complex::Complex64;

use crate::checkerboard::{CMat, Side, Step};
use crate::field::{exp_factors, Phi, PhiField};
use crate::propagator::{Hopping, FLAVORS};

pub type Mat4 = Matrix4<Complex64>;

/// Site-local coupling matrix V(φ) in flavor space (XUP, XDOWN, YUP, YDOWN).
pub fn potential_matrix(phi: &Phi) -> Mat4 {
    let a = Complex64::new(phi[2], 0.0);
    let b = Complex64::new(phi[0], -phi[1]);
    let bc = b.conj();
    let z = Complex64::new(0.0, 0.0);
    Mat4::new(
        z, z, a, b, //
        z, z, bc, -a, //
        a, b, z, z, //
        bc, -a, z, z,
    )
}

/// e^{sign·dτ·V(φ)} = cosh·I + sign·(sinh/|φ|)·V, from cached factors.
pub fn potential_exp(phi: &Phi, cosh: f64, sinh: f64, sign: f64) -> Mat4 {
    Mat4::identity() * Complex64::new(cosh, 0.0) + potential_matrix(phi) * Complex64::new(sign * sinh, 0.0)
}

/// Δ = e^{-dτV(φ_new)}·e^{+dτV(φ_old)} - I for one site.
pub fn delta_matrix(dtau: f64, old: &Phi, new: &Phi) -> Mat4 {
    let (co, so) = exp_factors(dtau, old);
    let (cn, sn) = exp_factors(dtau, new);
    potential_exp(new, cn, sn, -1.0) * potential_exp(old, co, so, 1.0) - Mat4::identity()
}

/// Mix the four flavor rows (Left) or columns (Right) of every site by e^{sign·dτ·V_k}.
pub fn mult_potential(a: &mut CMat, field: &PhiField, k: usize, sign: f64, side: Side) {
    let n = field.n();
    for site in 0..n {
        let e = potential_exp(field.get(site, k), field.cosh(site, k), field.sinh(site, k), sign);
        let idx = [site, site + n, site + 2 * n, site + 3 * n];
        match side {
            Side::Left => {
                for c in 0..a.ncols() {
                    let v = [a[(idx[0], c)], a[(idx[1], c)], a[(idx[2], c)], a[(idx[3], c)]];
                    for r in 0..FLAVORS {
                        a[(idx[r], c)] = e[(r, 0)] * v[0] + e[(r, 1)] * v[1] + e[(r, 2)] * v[2] + e[(r, 3)] * v[3];
                    }
                }
            }
            Side::Right => {
                for r in 0..a.nrows() {
                    let v = [a[(r, idx[0])], a[(r, idx[1])], a[(r, idx[2])], a[(r, idx[3])]];
                    for c in 0..FLAVORS {
                        a[(r, idx[c])] = v[0] * e[(0, c)] + v[1] * e[(1, c)] + v[2] * e[(2, c)] + v[3] * e[(3, c)];
                    }
                }
            }
        }
    }
}

/// Slice transfer matrices built from the hopping propagator and the current field.
#[derive(Clone, Copy)]
pub struct Transfer<'a> {
    pub hopping: &'a Hopping,
    pub field: &'a PhiField,
}

impl<'a> Transfer<'a> {
    pub fn new(hopping: &'a Hopping, field: &'a PhiField) -> Self {
        Self { hopping, field }
    }

    /// a <- B_k·a
    pub fn left(&self, k: usize, a: &mut CMat) {
        self.hopping.mult_left(a, Step::Full, false);
        mult_potential(a, self.field, k, -1.0, Side::Left);
    }

    /// a <- B_k^{-1}·a
    pub fn left_inv(&self, k: usize, a: &mut CMat) {
        mult_potential(a, self.field, k, 1.0, Side::Left);
        self.hopping.mult_left(a, Step::Full, true);
    }

    /// a <- a·B_k
    pub fn right(&self, k: usize, a: &mut CMat) {
        mult_potential(a, self.field, k, -1.0, Side::Right);
        self.hopping.mult_right(a, Step::Full, false);
    }

    /// a <- a·B_k^{-1}
    pub fn right_inv(&self, k: usize, a: &mut CMat) {
        self.hopping.mult_right(a, Step::Full, true);
        mult_potential(a, self.field, k, 1.0, Side::Right);
    }

    /// B(k2, k1) = B_{k2}···B_{k1+1}; the identity for k2 == k1.
    pub fn product(&self, k2: usize, k1: usize) -> CMat {
        let dim = FLAVORS * self.field.n();
        let mut b = DMatrix::identity(dim, dim);
        for k in k1 + 1..=k2 {
            self.left(k, &mut b);
        }
        b
    }
}
