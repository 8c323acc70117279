// Stable factorizations of long matrix products

mod common;

use common::{identity, max_abs, max_abs_diff, random_matrix};
use detsdw::checkerboard::CMat;
use detsdw::udv::{singular_values, DenseProduct, StableFactorization, UdV};
use nalgebra::DMatrix;
use num_complex::Complex64;

fn well_conditioned(dim: usize, seed: u64) -> CMat {
    identity(dim) + random_matrix(dim, seed) * Complex64::new(0.3, 0.0)
}

#[test]
fn test_udv_reconstructs_its_matrix() {
    let a = random_matrix(12, 0xDEADBEEF);
    let udv = UdV::from_matrix(a.clone()).unwrap();
    assert!(max_abs_diff(&udv.to_matrix(), &a) < 1e-12);
    assert!(udv.d.iter().all(|&x| x >= 0.0));
    let unitary = udv.u.adjoint() * &udv.u;
    assert!(max_abs_diff(&unitary, &identity(12)) < 1e-12);
}

#[test]
fn test_singular_values_are_descending() {
    let sv = singular_values(&random_matrix(10, 5)).unwrap();
    assert_eq!(sv.len(), 10);
    assert!(sv.windows(2).all(|w| w[0] >= w[1]));
    let scaled = singular_values(&(identity(3) * Complex64::new(2.0, 0.0))).unwrap();
    assert!(scaled.iter().all(|&x| (x - 2.0).abs() < 1e-14));
}

#[test]
fn test_products_match_dense_products() {
    let dim = 10;
    let (a, b, c) = (well_conditioned(dim, 1), well_conditioned(dim, 2), well_conditioned(dim, 3));

    let udv = UdV::identity(dim).mult_left(&a).unwrap().mult_left(&b).unwrap().mult_right(&c).unwrap();
    let dense = &b * &a * &c;
    assert!(max_abs_diff(&udv.to_matrix(), &dense) < 1e-12 * max_abs(&dense));

    let right = UdV::identity(dim).mult_left(&a).unwrap().mult_left(&b).unwrap();
    let left = UdV::identity(dim).mult_left(&c).unwrap();
    let g_stable = UdV::green(&right, &left).unwrap();
    let right_d = DenseProduct::identity(dim).mult_left(&a).unwrap().mult_left(&b).unwrap();
    let left_d = DenseProduct::identity(dim).mult_left(&c).unwrap();
    let g_dense = DenseProduct::green(&right_d, &left_d).unwrap();
    let diff = max_abs_diff(&g_stable, &g_dense);
    assert!(diff < 1e-10 * max_abs(&g_dense), "stable and dense G differ by {diff:.3e}");

    // G·(I + R·L) = I
    let check = &g_dense * (identity(dim) + &b * &a * &c);
    assert!(max_abs_diff(&check, &identity(dim)) < 1e-10);
}

#[test]
fn test_green_survives_widely_separated_scales() {
    let dim = 8;
    let q = random_matrix(dim, 77).qr().q();
    let exponents = [30.0, 20.0, 10.0, 0.0, -5.0, -15.0, -25.0, -35.0];
    let diag = |f: &dyn Fn(f64) -> f64| {
        DMatrix::from_diagonal(&nalgebra::DVector::from_iterator(
            dim,
            exponents.iter().map(|&x| Complex64::new(f(x), 0.0)),
        ))
    };
    let b = &q * diag(&|x: f64| x.exp()) * q.adjoint();

    let mut right = UdV::identity(dim);
    for _ in 0..3 {
        right = right.mult_left(&b).unwrap();
    }
    let g = UdV::green(&right, &UdV::identity(dim)).unwrap();
    let exact = &q * diag(&|x: f64| 1.0 / (1.0 + (3.0 * x).exp())) * q.adjoint();
    let diff = max_abs_diff(&g, &exact);
    assert!(diff < 1e-8, "stable G off by {diff:.3e} for scales e^(±100)");
    assert!(g.iter().all(|v| v.re.is_finite() && v.im.is_finite()));
}
