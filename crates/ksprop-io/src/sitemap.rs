//! Coordinate-to-owner maps
//!
//! The transport never computes ownership itself. It asks a [`SiteMap`]
//! which rank holds a coordinate and where on that rank the site lives.

use crate::error::{Result, TransferError};
use ksprop_formats::{Coord, LatticeShape, shape::AXES};

/// Distribution of lattice sites over ranks
pub trait SiteMap: Send + Sync {
    /// Number of ranks the lattice is spread over
    fn ranks(&self) -> usize;

    /// Rank holding `coord`
    fn owner_of(&self, coord: Coord) -> usize;

    /// Index of `coord` in its owner's local storage
    fn local_slot(&self, coord: Coord) -> usize;

    /// Number of sites held by `rank`
    fn sites_on(&self, rank: usize) -> usize;
}

/// Contiguous natural-order blocks, one per rank
#[derive(Debug, Clone, Copy)]
pub struct SliceLayout {
    shape: LatticeShape,
    ranks: usize,
    chunk: usize,
}

impl SliceLayout {
    /// Split the natural order into `ranks` blocks of equal size (the last
    /// block may be shorter, trailing ranks may be empty)
    pub fn new(shape: LatticeShape, ranks: usize) -> Self {
        let ranks = ranks.max(1);
        Self {
            shape,
            ranks,
            chunk: shape.volume().div_ceil(ranks),
        }
    }
}

impl SiteMap for SliceLayout {
    fn ranks(&self) -> usize {
        self.ranks
    }

    fn owner_of(&self, coord: Coord) -> usize {
        self.shape.natural_rank(coord) / self.chunk
    }

    fn local_slot(&self, coord: Coord) -> usize {
        self.shape.natural_rank(coord) % self.chunk
    }

    fn sites_on(&self, rank: usize) -> usize {
        let start = (rank * self.chunk).min(self.shape.volume());
        let end = ((rank + 1) * self.chunk).min(self.shape.volume());
        end - start
    }
}

/// Site `i` of the natural order lives on rank `i mod ranks`
#[derive(Debug, Clone, Copy)]
pub struct RoundRobinLayout {
    shape: LatticeShape,
    ranks: usize,
}

impl RoundRobinLayout {
    /// Deal sites to `ranks` ranks in turn
    pub fn new(shape: LatticeShape, ranks: usize) -> Self {
        Self {
            shape,
            ranks: ranks.max(1),
        }
    }
}

impl SiteMap for RoundRobinLayout {
    fn ranks(&self) -> usize {
        self.ranks
    }

    fn owner_of(&self, coord: Coord) -> usize {
        self.shape.natural_rank(coord) % self.ranks
    }

    fn local_slot(&self, coord: Coord) -> usize {
        self.shape.natural_rank(coord) / self.ranks
    }

    fn sites_on(&self, rank: usize) -> usize {
        if rank >= self.ranks {
            return 0;
        }
        (self.shape.volume() + self.ranks - 1 - rank) / self.ranks
    }
}

/// Rectangular sublattices of equal shape.
///
/// The rank count is factored into primes, smallest first. Each factor
/// divides the longest sublattice extent it divides evenly. On ties an axis
/// that was already split is split again, otherwise the first one. Ranks are
/// numbered with the x grid coordinate varying fastest and sites inside a
/// sublattice are stored in natural order.
#[derive(Debug, Clone, Copy)]
pub struct HypercubeLayout {
    shape: LatticeShape,
    ranks: usize,
    sub: [usize; AXES],
    grid: [usize; AXES],
}

impl HypercubeLayout {
    /// Decompose `shape` over `ranks` ranks.
    ///
    /// # Errors
    ///
    /// Returns `TransferError::Config` when some prime factor of `ranks`
    /// divides no remaining sublattice extent.
    pub fn new(shape: LatticeShape, ranks: usize) -> Result<Self> {
        let ranks = ranks.max(1);
        let mut sub = shape.dims();
        let mut grid = [1usize; AXES];

        for prime in prime_factors(ranks) {
            let longest = (0..AXES)
                .filter(|&a| sub[a] % prime == 0)
                .map(|a| sub[a])
                .max()
                .ok_or_else(|| {
                    TransferError::Config(format!(
                        "cannot lay out a {shape} lattice on {ranks} ranks"
                    ))
                })?;
            let candidates = || (0..AXES).filter(|&a| sub[a] == longest);
            let axis = candidates()
                .find(|&a| grid[a] > 1)
                .or_else(|| candidates().next())
                .unwrap_or(0);
            sub[axis] /= prime;
            grid[axis] *= prime;
        }

        Ok(Self {
            shape,
            ranks,
            sub,
            grid,
        })
    }

    /// Sublattice extents held by every rank
    pub const fn sublattice(&self) -> [usize; AXES] {
        self.sub
    }

    /// Number of ranks along each axis
    pub const fn grid(&self) -> [usize; AXES] {
        self.grid
    }
}

impl SiteMap for HypercubeLayout {
    fn ranks(&self) -> usize {
        self.ranks
    }

    fn owner_of(&self, coord: Coord) -> usize {
        let c = coord.as_array();
        (0..AXES)
            .rev()
            .fold(0, |acc, a| acc * self.grid[a] + c[a] / self.sub[a])
    }

    fn local_slot(&self, coord: Coord) -> usize {
        let c = coord.as_array();
        (0..AXES)
            .rev()
            .fold(0, |acc, a| acc * self.sub[a] + c[a] % self.sub[a])
    }

    fn sites_on(&self, rank: usize) -> usize {
        if rank < self.ranks {
            self.shape.volume() / self.ranks
        } else {
            0
        }
    }
}

fn prime_factors(mut n: usize) -> Vec<usize> {
    let mut factors = Vec::new();
    let mut p = 2;
    while p * p <= n {
        while n % p == 0 {
            factors.push(p);
            n /= p;
        }
        p += 1;
    }
    if n > 1 {
        factors.push(n);
    }
    factors
}
