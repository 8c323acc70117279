// lattice.rs - Neighbor tables for the periodic square lattice and the imaginary-time chain

use serde::{Deserialize, Serialize};

/// Spatial neighbor directions, in table order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NeighDir {
    XPlus = 0,
    YPlus = 1,
    XMinus = 2,
    YMinus = 3,
}

pub const NEIGH_DIRS: [NeighDir; 4] = [NeighDir::XPlus, NeighDir::YPlus, NeighDir::XMinus, NeighDir::YMinus];

/// Coordination number of the square lattice.
pub const Z: usize = 4;

/// L x L square lattice with periodic wrap-around; site = y * L + x.
///
/// Antiperiodic boundary conditions are not a property of the table: the
/// hopping code flips signs on boundary-crossing bonds itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeriodicSquareLattice {
    l: usize,
    neigh: Vec<[usize; Z]>,
}

impl PeriodicSquareLattice {
    pub fn new(l: usize) -> Self {
        let n = l * l;
        let mut neigh = Vec::with_capacity(n);
        for site in 0..n {
            let x = site % l;
            let y = site / l;
            let xp = (x + 1) % l;
            let xm = (x + l - 1) % l;
            let yp = (y + 1) % l;
            let ym = (y + l - 1) % l;
            neigh.push([y * l + xp, yp * l + x, y * l + xm, ym * l + x]);
        }
        Self { l, neigh }
    }

    #[inline(always)]
    pub fn l(&self) -> usize {
        self.l
    }

    #[inline(always)]
    pub fn n(&self) -> usize {
        self.l * self.l
    }

    #[inline(always)]
    pub fn neighbor(&self, dir: NeighDir, site: usize) -> usize {
        self.neigh[site][dir as usize]
    }

    #[inline(always)]
    pub fn neighbors(&self, site: usize) -> &[usize; Z] {
        &self.neigh[site]
    }

    #[inline(always)]
    pub fn coords_to_site(&self, x: usize, y: usize) -> usize {
        y * self.l + x
    }

    #[inline(always)]
    pub fn site_to_coords(&self, site: usize) -> (usize, usize) {
        (site % self.l, site / self.l)
    }
}

/// Periodic chain of time slices 1..=m (slice 0 is never addressed).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PeriodicChain {
    m: usize,
}

impl PeriodicChain {
    pub fn new(m: usize) -> Self {
        Self { m }
    }

    #[inline(always)]
    pub fn len(&self) -> usize {
        self.m
    }

    pub fn is_empty(&self) -> bool {
        self.m == 0
    }

    /// Later slice, wrapping m -> 1.
    #[inline(always)]
    pub fn plus(&self, k: usize) -> usize {
        if k == self.m { 1 } else { k + 1 }
    }

    /// Earlier slice, wrapping 1 -> m.
    #[inline(always)]
    pub fn minus(&self, k: usize) -> usize {
        if k == 1 { self.m } else { k - 1 }
    }
}
