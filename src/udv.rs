// udv.rs - Scale-separated matrix products and the stable Green's function

use nalgebra::{DMatrix, DVector, SVD};
use num_complex::Complex64;
use serde::{Deserialize, Serialize};

use crate::checkerboard::CMat;
use crate::error::{Result, SdwError};

/// Stable representation of long products of transfer matrices.
pub trait StableFactorization: Clone {
    fn identity(dim: usize) -> Self;

    /// B·self
    fn mult_left(&self, b: &CMat) -> Result<Self>;

    /// self·B
    fn mult_right(&self, b: &CMat) -> Result<Self>;

    /// [I + right·left]^{-1}
    fn green(right: &Self, left: &Self) -> Result<CMat>;
}

/// A = U·diag(d)·V with unitary U, V and real non-negative d.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UdV {
    pub u: CMat,
    pub d: DVector<f64>,
    pub v: CMat,
}

fn svd(a: CMat) -> Result<(CMat, DVector<f64>, CMat)> {
    let svd = SVD::try_new(a, true, true, f64::EPSILON, 0).ok_or(SdwError::SingularMatrix("svd did not converge"))?;
    let u = svd.u.ok_or(SdwError::SingularMatrix("svd without U"))?;
    let v_t = svd.v_t.ok_or(SdwError::SingularMatrix("svd without V"))?;
    Ok((u, svd.singular_values, v_t))
}

/// Singular values of a complex matrix, in descending order.
pub fn singular_values(a: &CMat) -> Result<Vec<f64>> {
    let svd = SVD::try_new(a.clone(), false, false, f64::EPSILON, 0)
        .ok_or(SdwError::SingularMatrix("svd did not converge"))?;
    let mut sv: Vec<f64> = svd.singular_values.iter().copied().collect();
    sv.sort_by(|a, b| b.total_cmp(a));
    Ok(sv)
}

/// diag(v)·m
pub fn scale_rows(m: &mut CMat, v: &DVector<f64>) {
    for (i, mut row) in m.row_iter_mut().enumerate() {
        row *= Complex64::new(v[i], 0.0);
    }
}

/// m·diag(v)
pub fn scale_cols(m: &mut CMat, v: &DVector<f64>) {
    for (j, mut col) in m.column_iter_mut().enumerate() {
        col *= Complex64::new(v[j], 0.0);
    }
}

impl UdV {
    pub fn from_matrix(a: CMat) -> Result<Self> {
        let (u, d, v) = svd(a)?;
        Ok(Self { u, d, v })
    }

    pub fn to_matrix(&self) -> CMat {
        let mut ud = self.u.clone();
        scale_cols(&mut ud, &self.d);
        ud * &self.v
    }
}

impl StableFactorization for UdV {
    fn identity(dim: usize) -> Self {
        Self { u: DMatrix::identity(dim, dim), d: DVector::from_element(dim, 1.0), v: DMatrix::identity(dim, dim) }
    }

    fn mult_left(&self, b: &CMat) -> Result<Self> {
        let mut bud = b * &self.u;
        scale_cols(&mut bud, &self.d);
        let (u, d, v) = svd(bud)?;
        Ok(Self { u, d, v: v * &self.v })
    }

    fn mult_right(&self, b: &CMat) -> Result<Self> {
        let mut dvb = &self.v * b;
        scale_rows(&mut dvb, &self.d);
        let (u, d, v) = svd(dvb)?;
        Ok(Self { u: &self.u * u, d, v })
    }

    fn green(right: &Self, left: &Self) -> Result<CMat> {
        let big_inv = |d: &DVector<f64>| d.map(|x| 1.0 / x.max(1.0));
        let small = |d: &DVector<f64>| d.map(|x| x.min(1.0));
        let drb_inv = big_inv(&right.d);
        let dlb_inv = big_inv(&left.d);

        let ur_inv = right.u.adjoint();
        let vl_inv = left.v.adjoint();

        let mut first = &ur_inv * &vl_inv;
        scale_rows(&mut first, &drb_inv);
        scale_cols(&mut first, &dlb_inv);

        let mut second = &right.v * &left.u;
        scale_rows(&mut second, &small(&right.d));
        scale_cols(&mut second, &small(&left.d));

        let inner_inv = (first + second).try_inverse().ok_or(SdwError::SingularMatrix("stable green inner matrix"))?;

        let mut lhs = vl_inv;
        scale_cols(&mut lhs, &dlb_inv);
        let mut rhs = ur_inv;
        scale_rows(&mut rhs, &drb_inv);
        Ok(lhs * inner_inv * rhs)
    }
}

/// Plain dense products; only trustworthy for short, well-conditioned chains.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DenseProduct(pub CMat);

impl StableFactorization for DenseProduct {
    fn identity(dim: usize) -> Self {
        DenseProduct(DMatrix::identity(dim, dim))
    }

    fn mult_left(&self, b: &CMat) -> Result<Self> {
        Ok(DenseProduct(b * &self.0))
    }

    fn mult_right(&self, b: &CMat) -> Result<Self> {
        Ok(DenseProduct(&self.0 * b))
    }

    fn green(right: &Self, left: &Self) -> Result<CMat> {
        let dim = right.0.nrows();
        (DMatrix::identity(dim, dim) + &right.0 * &left.0)
            .try_inverse()
            .ok_or(SdwError::SingularMatrix("dense green"))
    }
}
