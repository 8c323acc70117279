// green.rs - Equal-time Green's function: propagation, stabilization and sweeps

use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};

use crate::checkerboard::{CMat, Step};
use crate::error::Result;
use crate::field::PhiField;
use crate::propagator::Hopping;
use crate::transfer::Transfer;
use crate::udv::{StableFactorization, UdV};

/// e^{-dτK/2}·G·e^{+dτK/2}, the estimator used for measurements.
pub fn shifted_green(hopping: &Hopping, g: &CMat) -> CMat {
    let mut shifted = g.clone();
    hopping.mult_left(&mut shifted, Step::Half, false);
    hopping.mult_right(&mut shifted, Step::Half, true);
    shifted
}

/// Direction of the next sweep through the time slices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SweepDirection {
    Up,
    Down,
}

/// Work done at each time slice while the engine holds G(k).
pub trait SliceVisitor {
    fn visit_slice(&mut self, k: usize, green: &mut CMat, field: &mut PhiField) -> Result<()>;
}

/// Maintains G(k) = [I + B(k,0)·B(β,k)]^{-1} across sweeps.
///
/// Chunk l covers slices (l-1)s+1 ..= ls. `right[l]` holds B(ls, 0) and
/// `left[l]` holds B(β, ls), both as stable factorizations; G is rebuilt from
/// them at every chunk boundary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GreenEngine<F: StableFactorization = UdV> {
    dim: usize,
    m: usize,
    s: usize,
    g: CMat,
    slice: usize,
    next: SweepDirection,
    right: Vec<F>,
    left: Vec<F>,
}

impl<F: StableFactorization> GreenEngine<F> {
    /// Empty engine; `recompute_from_scratch` must run before the first sweep.
    pub fn new(dim: usize, m: usize, s: usize) -> Self {
        let chunks = m / s;
        Self {
            dim,
            m,
            s,
            g: DMatrix::zeros(dim, dim),
            slice: m,
            next: SweepDirection::Down,
            right: vec![F::identity(dim); chunks + 1],
            left: vec![F::identity(dim); chunks + 1],
        }
    }

    #[inline(always)]
    pub fn green(&self) -> &CMat {
        &self.g
    }

    #[inline(always)]
    pub fn green_mut(&mut self) -> &mut CMat {
        &mut self.g
    }

    /// Slice the stored G belongs to; 0 and m denote the same physical slice.
    pub fn slice(&self) -> usize {
        self.slice
    }

    pub fn next_direction(&self) -> SweepDirection {
        self.next
    }

    fn chunks(&self) -> usize {
        self.m / self.s
    }

    fn chunk_matrix(&self, transfer: &Transfer, l: usize) -> CMat {
        transfer.product(l * self.s, (l - 1) * self.s)
    }

    /// Rebuild every right-storage entry and set G = [I + B(β,0)]^{-1} at slice m.
    pub fn recompute_from_scratch(&mut self, transfer: &Transfer) -> Result<()> {
        let n = self.chunks();
        self.right[0] = F::identity(self.dim);
        for l in 1..=n {
            let b = self.chunk_matrix(transfer, l);
            self.right[l] = self.right[l - 1].mult_left(&b)?;
        }
        for left in self.left.iter_mut() {
            *left = F::identity(self.dim);
        }
        self.g = F::green(&self.right[n], &self.left[n])?;
        self.slice = self.m;
        self.next = SweepDirection::Down;
        Ok(())
    }

    /// G(k) built from scratch for any slice, independent of the stored state.
    pub fn compute_green_at(&self, transfer: &Transfer, k: usize) -> Result<CMat> {
        let mut right = F::identity(self.dim);
        let mut left = F::identity(self.dim);
        for j in 1..=k {
            right = right.mult_left(&transfer.product(j, j - 1))?;
        }
        for j in k + 1..=self.m {
            left = left.mult_left(&transfer.product(j, j - 1))?;
        }
        F::green(&right, &left)
    }

    /// G(k-1) = B_k^{-1}·G(k)·B_k
    pub fn wrap_down(&mut self, transfer: &Transfer, k: usize) {
        transfer.left_inv(k, &mut self.g);
        transfer.right(k, &mut self.g);
        self.slice = k - 1;
    }

    /// G(k) = B_k·G(k-1)·B_k^{-1}
    pub fn wrap_up(&mut self, transfer: &Transfer, k: usize) {
        transfer.left(k, &mut self.g);
        transfer.right_inv(k, &mut self.g);
        self.slice = k;
    }

    /// One pass through all slices in the stored direction, visiting each slice once.
    pub fn sweep<V: SliceVisitor>(&mut self, hopping: &Hopping, field: &mut PhiField, visitor: &mut V) -> Result<()> {
        match self.next {
            SweepDirection::Down => self.sweep_down(hopping, field, visitor),
            SweepDirection::Up => self.sweep_up(hopping, field, visitor),
        }
    }

    fn sweep_down<V: SliceVisitor>(&mut self, hopping: &Hopping, field: &mut PhiField, visitor: &mut V) -> Result<()> {
        let n = self.chunks();
        for l in (1..=n).rev() {
            for k in ((l - 1) * self.s + 1..=l * self.s).rev() {
                visitor.visit_slice(k, &mut self.g, field)?;
                self.wrap_down(&Transfer::new(hopping, field), k);
            }
            let transfer = Transfer::new(hopping, field);
            let b = self.chunk_matrix(&transfer, l);
            self.left[l - 1] = self.left[l].mult_right(&b)?;
            self.g = F::green(&self.right[l - 1], &self.left[l - 1])?;
        }
        self.slice = 0;
        self.next = SweepDirection::Up;
        Ok(())
    }

    fn sweep_up<V: SliceVisitor>(&mut self, hopping: &Hopping, field: &mut PhiField, visitor: &mut V) -> Result<()> {
        let n = self.chunks();
        for l in 1..=n {
            for k in (l - 1) * self.s + 1..=l * self.s {
                self.wrap_up(&Transfer::new(hopping, field), k);
                visitor.visit_slice(k, &mut self.g, field)?;
            }
            let transfer = Transfer::new(hopping, field);
            let b = self.chunk_matrix(&transfer, l);
            self.right[l] = self.right[l - 1].mult_left(&b)?;
            self.g = F::green(&self.right[l], &self.left[l])?;
        }
        self.slice = self.m;
        self.next = SweepDirection::Down;
        Ok(())
    }
}
