//! Shared fixtures for the integration tests.
#![allow(dead_code)]

use detsdw::checkerboard::CMat;
use detsdw::params::{ModelParams, ParamMap};
use nalgebra::DMatrix;
use num_complex::Complex64;
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg64;

/// A complete, valid parameter set for a small system; `extra` overrides.
pub fn param_map(l: usize, m: usize, beta: f64, extra: &[(&str, &str)]) -> ParamMap {
    let mut map = ParamMap::new();
    for (k, v) in [
        ("mu", "0.5"),
        ("r", "1.0"),
        ("accRatio", "0.5"),
        ("bc", "pbc"),
        ("txhor", "-1.0"),
        ("txver", "-0.5"),
        ("tyhor", "0.5"),
        ("tyver", "1.0"),
        ("rescale", "false"),
        ("updateMethod", "woodbury"),
        ("spinProposalMethod", "box"),
        ("repeatUpdateInSlice", "1"),
        ("globalShift", "false"),
    ] {
        map.set(k, v);
    }
    map.set("L", l);
    map.set("m", m);
    map.set("beta", beta);
    for (k, v) in extra {
        map.set(k, v);
    }
    map
}

pub fn model_params(l: usize, m: usize, beta: f64, extra: &[(&str, &str)]) -> ModelParams {
    ModelParams::from_map(&param_map(l, m, beta, extra)).expect("valid test parameters")
}

pub fn random_matrix(dim: usize, seed: u64) -> CMat {
    let mut rng = Pcg64::seed_from_u64(seed);
    DMatrix::from_fn(dim, dim, |_, _| Complex64::new(rng.gen_range(-1.0..1.0), rng.gen_range(-1.0..1.0)))
}

pub fn identity(dim: usize) -> CMat {
    DMatrix::identity(dim, dim)
}

pub fn max_abs_diff(a: &CMat, b: &CMat) -> f64 {
    assert_eq!(a.shape(), b.shape(), "shape mismatch");
    a.iter().zip(b.iter()).map(|(x, y)| (x - y).norm()).fold(0.0, f64::max)
}

pub fn max_abs(a: &CMat) -> f64 {
    a.iter().map(|x| x.norm()).fold(0.0, f64::max)
}

/// Fresh scratch directory below the system temp dir.
pub fn scratch_dir(name: &str) -> std::path::PathBuf {
    let dir = std::env::temp_dir().join(format!("detsdw-test-{name}-{}", std::process::id()));
    let _ = std::fs::remove_dir_all(&dir);
    std::fs::create_dir_all(&dir).expect("create scratch dir");
    dir
}
