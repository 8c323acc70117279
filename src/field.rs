// field.rs - The bosonic order-parameter field and its cached exponential factors

use serde::{Deserialize, Serialize};

use crate::error::{Result, SdwError};
use crate::utils::rng::RngWrapper;

/// Three-component vector, the value of φ at one (site, slice).
pub type Phi = [f64; 3];

#[inline(always)]
pub fn norm_sq(p: &Phi) -> f64 {
    p[0] * p[0] + p[1] * p[1] + p[2] * p[2]
}

#[inline(always)]
pub fn dot(a: &Phi, b: &Phi) -> f64 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}

#[inline(always)]
pub fn sub(a: &Phi, b: &Phi) -> Phi {
    [a[0] - b[0], a[1] - b[1], a[2] - b[2]]
}

#[inline(always)]
pub fn add(a: &Phi, b: &Phi) -> Phi {
    [a[0] + b[0], a[1] + b[1], a[2] + b[2]]
}

#[inline(always)]
pub fn scale(a: &Phi, f: f64) -> Phi {
    [a[0] * f, a[1] * f, a[2] * f]
}

/// cosh(dτ|φ|) and sinh(dτ|φ|)/|φ| for one field value.
#[inline]
pub fn exp_factors(dtau: f64, p: &Phi) -> (f64, f64) {
    let norm = norm_sq(p).sqrt();
    let arg = dtau * norm;
    let cosh = arg.cosh();
    // sinh(dτ|φ|)/|φ| -> dτ as |φ| -> 0
    let sinh = if norm > 1e-300 { arg.sinh() / norm } else { dtau };
    (cosh, sinh)
}

/// φ(site, k) for k in 1..=m, together with the per-entry cosh/sinh caches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhiField {
    n: usize,
    m: usize,
    dtau: f64,
    phi: Vec<Phi>,
    cosh: Vec<f64>,
    sinh: Vec<f64>,
}

impl PhiField {
    /// All components uniform in [-1, 1).
    pub fn random(n: usize, m: usize, dtau: f64, rng: &mut RngWrapper) -> Self {
        let phi = (0..n * m)
            .map(|_| [rng.rand_range(-1.0, 1.0), rng.rand_range(-1.0, 1.0), rng.rand_range(-1.0, 1.0)])
            .collect();
        Self::from_values(n, m, dtau, phi)
    }

    pub fn constant(n: usize, m: usize, dtau: f64, value: Phi) -> Self {
        Self::from_values(n, m, dtau, vec![value; n * m])
    }

    fn from_values(n: usize, m: usize, dtau: f64, phi: Vec<Phi>) -> Self {
        let mut field = Self { n, m, dtau, phi, cosh: vec![0.0; n * m], sinh: vec![0.0; n * m] };
        field.update_all_caches();
        field
    }

    #[inline(always)]
    fn idx(&self, site: usize, k: usize) -> usize {
        debug_assert!(k >= 1 && k <= self.m && site < self.n);
        (k - 1) * self.n + site
    }

    #[inline(always)]
    pub fn n(&self) -> usize {
        self.n
    }

    #[inline(always)]
    pub fn m(&self) -> usize {
        self.m
    }

    #[inline(always)]
    pub fn dtau(&self) -> f64 {
        self.dtau
    }

    #[inline(always)]
    pub fn get(&self, site: usize, k: usize) -> &Phi {
        &self.phi[self.idx(site, k)]
    }

    #[inline(always)]
    pub fn cosh(&self, site: usize, k: usize) -> f64 {
        self.cosh[self.idx(site, k)]
    }

    #[inline(always)]
    pub fn sinh(&self, site: usize, k: usize) -> f64 {
        self.sinh[self.idx(site, k)]
    }

    /// Set φ and refresh the caches of this entry.
    pub fn set(&mut self, site: usize, k: usize, value: Phi) {
        let i = self.idx(site, k);
        let (c, s) = exp_factors(self.dtau, &value);
        self.phi[i] = value;
        self.cosh[i] = c;
        self.sinh[i] = s;
    }

    /// Set φ without touching the caches; callers must call `update_all_caches`.
    #[inline(always)]
    pub fn set_raw(&mut self, site: usize, k: usize, value: Phi) {
        let i = self.idx(site, k);
        self.phi[i] = value;
    }

    pub fn slice(&self, k: usize) -> &[Phi] {
        let start = self.idx(0, k);
        &self.phi[start..start + self.n]
    }

    pub fn values(&self) -> &[Phi] {
        &self.phi
    }

    pub fn update_all_caches(&mut self) {
        for i in 0..self.phi.len() {
            let (c, s) = exp_factors(self.dtau, &self.phi[i]);
            self.cosh[i] = c;
            self.sinh[i] = s;
        }
    }

    pub fn update_slice_caches(&mut self, k: usize) {
        let start = self.idx(0, k);
        for i in start..start + self.n {
            let (c, s) = exp_factors(self.dtau, &self.phi[i]);
            self.cosh[i] = c;
            self.sinh[i] = s;
        }
    }

    /// Every cached factor must match a fresh evaluation to 1e-10 relative.
    pub fn consistency_check(&self) -> Result<()> {
        const TOL: f64 = 1e-10;
        let rel = |cached: f64, fresh: f64| {
            if fresh == 0.0 { cached.abs() } else { ((cached - fresh) / fresh).abs() }
        };
        for k in 1..=self.m {
            for site in 0..self.n {
                let i = self.idx(site, k);
                let (c, s) = exp_factors(self.dtau, &self.phi[i]);
                let dc = rel(self.cosh[i], c);
                let ds = rel(self.sinh[i], s);
                if !(dc <= TOL) || !(ds <= TOL) {
                    return Err(SdwError::Inconsistent(format!(
                        "cosh/sinh cache at site {site}, slice {k}: rel. deviation {dc:.3e}/{ds:.3e}"
                    )));
                }
            }
        }
        Ok(())
    }

    /// Corrupt one cached value; used by tests of the consistency check.
    #[doc(hidden)]
    pub fn poison_cache(&mut self, site: usize, k: usize, factor: f64) {
        let i = self.idx(site, k);
        self.cosh[i] *= factor;
    }
}
