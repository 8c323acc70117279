// local_update.rs - Single-site Metropolis updates with rank-4 Green's function corrections

use log::warn;
use nalgebra::DMatrix;
use num_complex::Complex64;
use serde::{Deserialize, Serialize};

use crate::action::BosonAction;
use crate::checkerboard::CMat;
use crate::error::{Result, SdwError};
use crate::field::PhiField;
use crate::params::UpdateMethod;
use crate::proposals::{MoveKind, Proposer};
use crate::propagator::FLAVORS;
use crate::transfer::{delta_matrix, Mat4};
use crate::utils::rng::RngWrapper;

const ONE: Complex64 = Complex64 { re: 1.0, im: 0.0 };
const ZERO: Complex64 = Complex64 { re: 0.0, im: 0.0 };

/// Matrix indices of the four flavors at `site`.
#[inline(always)]
pub fn pivots(site: usize, n: usize) -> [usize; 4] {
    [site, site + n, site + 2 * n, site + 3 * n]
}

/// The 4×4 block of G at one site.
pub fn sub_block(g: &CMat, p: &[usize; 4]) -> Mat4 {
    Mat4::from_fn(|r, c| g[(p[r], p[c])])
}

fn to_dyn(m: &Mat4) -> CMat {
    DMatrix::from_fn(4, 4, |r, c| m[(r, c)])
}

/// M = I + (I - G_sub)·Δ
pub fn ratio_matrix(g_sub: &Mat4, delta: &Mat4) -> Mat4 {
    Mat4::identity() + (Mat4::identity() - g_sub) * delta
}

/// Fermionic weight ratio det(I + Δ(I - G)) of a change at `site`.
pub fn det_ratio(g: &CMat, site: usize, delta: &Mat4) -> Complex64 {
    let p = pivots(site, g.nrows() / FLAVORS);
    ratio_matrix(&sub_block(g, &p), delta).determinant()
}

/// G <- G + (G·U)·M^{-1}·V with U, V the site-local low-rank factors.
pub fn woodbury_update(g: &mut CMat, site: usize, delta: &Mat4) -> Result<()> {
    let dim = g.nrows();
    let p = pivots(site, dim / FLAVORS);
    let m_inv = ratio_matrix(&sub_block(g, &p), delta)
        .try_inverse()
        .ok_or(SdwError::SingularMatrix("woodbury ratio matrix"))?;

    let mut v = g.select_rows(&p);
    for r in 0..FLAVORS {
        v[(r, p[r])] -= ONE;
    }
    let gu = g.select_columns(&p) * to_dyn(delta);
    let mv = to_dyn(&m_inv) * v;
    *g += gu * mv;
    Ok(())
}

/// Same result as `woodbury_update`, built from four Sherman-Morrison steps.
/// Returns the determinant ratio accumulated along the way.
pub fn iterative_update(g: &mut CMat, site: usize, delta: &Mat4) -> Complex64 {
    let dim = g.nrows();
    let p = pivots(site, dim / FLAVORS);

    // rows of Δ(I - G) at the pivots
    let mut orig = DMatrix::<Complex64>::zeros(FLAVORS, dim);
    for r in 0..FLAVORS {
        for col in 0..dim {
            let mut v = ZERO;
            for dc in 0..FLAVORS {
                let e = if col == p[dc] { ONE } else { ZERO };
                v += delta[(r, dc)] * (e - g[(p[dc], col)]);
            }
            orig[(r, col)] = v;
        }
    }

    // rows[l] becomes row p_l of [I + Δ(I - G)]^{-1}
    let mut rows = orig.clone();
    let mut det = ONE;
    for l in 0..FLAVORS {
        let mut row: Vec<Complex64> = orig.row(l).iter().copied().collect();
        for &pk in &p[..l] {
            row[pk] = ZERO;
        }
        for k in 0..l {
            let coef = orig[(l, p[k])];
            for col in 0..dim {
                row[col] += coef * rows[(k, col)];
            }
        }
        let divisor = ONE + row[p[l]];
        for k in 0..l {
            let coef = rows[(k, p[l])] / divisor;
            for col in 0..dim {
                rows[(k, col)] -= coef * row[col];
            }
        }
        for col in 0..dim {
            rows[(l, col)] = -row[col] / divisor;
        }
        rows[(l, p[l])] += ONE;
        det *= divisor;
    }
    for r in 0..FLAVORS {
        rows[(r, p[r])] -= ONE;
    }

    let cols = g.select_columns(&p);
    *g += cols * rows;
    det
}

/// Accepted but not yet applied corrections: G_eff = G + Σ X_l·Y_l.
#[derive(Debug, Clone, Default)]
pub struct DelayedUpdates {
    x: Vec<CMat>,
    y: Vec<CMat>,
}

impl DelayedUpdates {
    pub fn len(&self) -> usize {
        self.x.len()
    }

    pub fn is_empty(&self) -> bool {
        self.x.is_empty()
    }

    /// Rows p of G_eff (4×dim).
    pub fn rows(&self, g: &CMat, p: &[usize; 4]) -> CMat {
        let mut rj = g.select_rows(p);
        for (x, y) in self.x.iter().zip(&self.y) {
            rj += x.select_rows(p) * y;
        }
        rj
    }

    /// Columns p of G_eff (dim×4).
    pub fn columns(&self, g: &CMat, p: &[usize; 4]) -> CMat {
        let mut cj = g.select_columns(p);
        for (x, y) in self.x.iter().zip(&self.y) {
            cj += x * y.select_columns(p);
        }
        cj
    }

    /// Queue the correction of an accepted change; `rj` are the G_eff rows at the site.
    pub fn accept(&mut self, g: &CMat, p: &[usize; 4], mut rj: CMat, delta: &Mat4) -> Result<()> {
        let sj = Mat4::from_fn(|r, c| rj[(r, p[c])]);
        let mj_inv = ratio_matrix(&sj, delta)
            .try_inverse()
            .ok_or(SdwError::SingularMatrix("delayed ratio matrix"))?;
        let cj = self.columns(g, p);
        for r in 0..FLAVORS {
            rj[(r, p[r])] -= ONE;
        }
        self.x.push(cj * to_dyn(delta));
        self.y.push(to_dyn(&mj_inv) * rj);
        Ok(())
    }

    /// G <- G + X·Y for all queued corrections at once.
    pub fn flush(&mut self, g: &mut CMat) {
        if self.x.is_empty() {
            return;
        }
        let dim = g.nrows();
        let width = FLAVORS * self.x.len();
        let mut x_all = DMatrix::<Complex64>::zeros(dim, width);
        let mut y_all = DMatrix::<Complex64>::zeros(width, dim);
        for (j, (x, y)) in self.x.iter().zip(&self.y).enumerate() {
            x_all.columns_mut(FLAVORS * j, FLAVORS).copy_from(x);
            y_all.rows_mut(FLAVORS * j, FLAVORS).copy_from(y);
        }
        *g += x_all * y_all;
        self.x.clear();
        self.y.clear();
    }
}

/// Metropolis sweep over the sites of one time slice.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalUpdater {
    method: UpdateMethod,
    delay_steps: usize,
    #[serde(skip)]
    delayed: DelayedUpdates,
    /// Acceptance fraction of the most recent slice pass.
    pub last_acc_ratio: f64,
    pub attempted: u64,
    pub accepted: u64,
}

impl LocalUpdater {
    pub fn new(method: UpdateMethod, delay_steps: usize) -> Self {
        Self {
            method,
            delay_steps: delay_steps.max(1),
            delayed: DelayedUpdates::default(),
            last_acc_ratio: 0.0,
            attempted: 0,
            accepted: 0,
        }
    }

    pub fn method(&self) -> UpdateMethod {
        self.method
    }

    /// One proposal per site of slice k; G stays the Green's function of slice k.
    #[allow(clippy::too_many_arguments)]
    pub fn update_slice(
        &mut self,
        k: usize,
        g: &mut CMat,
        field: &mut PhiField,
        action: &BosonAction,
        proposer: &Proposer,
        kind: MoveKind,
        rng: &mut RngWrapper,
    ) -> Result<f64> {
        let n = field.n();
        let mut accepted = 0usize;
        for site in 0..n {
            self.attempted += 1;
            let old = *field.get(site, k);
            let Some(new) = proposer.propose(rng, &old, kind) else {
                continue;
            };
            let ds = action.delta_local(field, site, k, &new);
            let delta = delta_matrix(field.dtau(), &old, &new);
            let p = pivots(site, n);

            let (det, rj) = match self.method {
                UpdateMethod::Delayed => {
                    let rj = self.delayed.rows(g, &p);
                    let sj = Mat4::from_fn(|r, c| rj[(r, p[c])]);
                    (ratio_matrix(&sj, &delta).determinant(), Some(rj))
                }
                _ => (det_ratio(g, site, &delta), None),
            };
            if det.re < 0.0 {
                warn!("negative fermion determinant ratio {:.3e} at site {site}, slice {k}", det.re);
            }
            let prob = (-ds).exp() * det.re;
            if prob > 1.0 || rng.rand01() < prob {
                accepted += 1;
                field.set(site, k, new);
                match (self.method, rj) {
                    (UpdateMethod::Iterative, _) => {
                        iterative_update(g, site, &delta);
                    }
                    (UpdateMethod::Delayed, Some(rj)) => {
                        self.delayed.accept(g, &p, rj, &delta)?;
                        if self.delayed.len() >= self.delay_steps {
                            self.delayed.flush(g);
                        }
                    }
                    _ => woodbury_update(g, site, &delta)?,
                }
            }
        }
        self.delayed.flush(g);
        self.accepted += accepted as u64;
        self.last_acc_ratio = accepted as f64 / n as f64;
        Ok(self.last_acc_ratio)
    }
}
