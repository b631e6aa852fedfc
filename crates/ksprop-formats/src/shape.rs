//! Lattice extents and natural-order site arithmetic

use crate::error::{FormatError, Result};

/// Number of lattice axes
pub const AXES: usize = 4;

/// Position of a site on the lattice
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Coord {
    /// Fastest-varying axis
    pub x: usize,
    /// Second axis
    pub y: usize,
    /// Third axis
    pub z: usize,
    /// Slowest-varying axis (time)
    pub t: usize,
}

impl Coord {
    /// Create a coordinate
    pub const fn new(x: usize, y: usize, z: usize, t: usize) -> Self {
        Self { x, y, z, t }
    }

    /// Components in axis order
    pub const fn as_array(&self) -> [usize; AXES] {
        [self.x, self.y, self.z, self.t]
    }
}

/// Extents of a 4-dimensional lattice, resolved once at open time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LatticeShape {
    dims: [usize; AXES],
}

impl LatticeShape {
    /// Create a shape.
    ///
    /// Every extent must be positive, and the site count must fit a wire
    /// int32 so that all offset arithmetic stays in range.
    pub fn new(dims: [usize; AXES]) -> Result<Self> {
        let invalid = || FormatError::InvalidDimensions(dims.map(|d| d as i64));
        if dims.iter().any(|&d| d == 0 || i32::try_from(d).is_err()) {
            return Err(invalid());
        }
        let volume = dims
            .iter()
            .try_fold(1usize, |acc, &d| acc.checked_mul(d))
            .ok_or_else(invalid)?;
        if i32::try_from(volume).is_err() {
            return Err(invalid());
        }
        Ok(Self { dims })
    }

    /// Create a shape from extents stored on file
    pub fn from_wire(dims: [i32; AXES]) -> Result<Self> {
        if dims.iter().any(|&d| d <= 0) {
            return Err(FormatError::InvalidDimensions(dims.map(i64::from)));
        }
        Self::new(dims.map(|d| d as usize))
    }

    /// Extents as stored on file
    pub fn to_wire(&self) -> [i32; AXES] {
        self.dims.map(|d| d as i32)
    }

    /// Extents in axis order
    pub const fn dims(&self) -> [usize; AXES] {
        self.dims
    }

    /// Extent along x
    pub const fn nx(&self) -> usize {
        self.dims[0]
    }

    /// Extent along y
    pub const fn ny(&self) -> usize {
        self.dims[1]
    }

    /// Extent along z
    pub const fn nz(&self) -> usize {
        self.dims[2]
    }

    /// Extent along t
    pub const fn nt(&self) -> usize {
        self.dims[3]
    }

    /// Total number of sites
    pub const fn volume(&self) -> usize {
        self.dims[0] * self.dims[1] * self.dims[2] * self.dims[3]
    }

    /// Number of sites in one timeslice
    pub const fn slice_volume(&self) -> usize {
        self.dims[0] * self.dims[1] * self.dims[2]
    }

    /// Natural-order rank `t*(nz*ny*nx) + z*(ny*nx) + y*nx + x`
    pub const fn natural_rank(&self, c: Coord) -> usize {
        let [nx, ny, nz, _] = self.dims;
        ((c.t * nz + c.z) * ny + c.y) * nx + c.x
    }

    /// Coordinate at a natural-order rank
    pub const fn coord(&self, rank: usize) -> Coord {
        let [nx, ny, nz, nt] = self.dims;
        let mut r = rank;
        let x = r % nx;
        r /= nx;
        let y = r % ny;
        r /= ny;
        let z = r % nz;
        r /= nz;
        Coord::new(x, y, z, r % nt)
    }

    /// Natural-order ranks covered by timeslice `t`
    pub const fn timeslice(&self, t: usize) -> std::ops::Range<usize> {
        let v3 = self.slice_volume();
        t * v3..(t + 1) * v3
    }
}

impl std::fmt::Display for LatticeShape {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let [nx, ny, nz, nt] = self.dims;
        write!(f, "{nx}x{ny}x{nz}x{nt}")
    }
}

/// Lattice extents a reader expects to find on file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpectedShape {
    /// Extents are known; the file must match exactly
    Known(LatticeShape),
    /// Extents are unknown; adopt whatever the file says
    Discover,
}

impl ExpectedShape {
    /// Resolve the stored extents against the expectation
    pub fn resolve(&self, stored: [i32; AXES]) -> Result<LatticeShape> {
        match self {
            Self::Known(shape) if shape.to_wire() == stored => Ok(*shape),
            Self::Known(shape) => Err(FormatError::DimensionMismatch {
                expected: shape.dims(),
                found: stored,
            }),
            Self::Discover => LatticeShape::from_wire(stored),
        }
    }
}

impl From<LatticeShape> for ExpectedShape {
    fn from(shape: LatticeShape) -> Self {
        Self::Known(shape)
    }
}
