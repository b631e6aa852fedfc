//! Rolling XOR checksums over 32-bit words
//!
//! Every color block carries two checksums, `sum29` and `sum31`. The word at
//! global position `k` within the block is rotated left by `k mod 29` (resp.
//! `k mod 31`) bits and XORed into the matching accumulator.
//!
//! Positions are global to the natural-order scan of the block, not to the
//! rank that happens to hold the word. A rank that only sees some of the
//! words calls [`ChecksumAccumulator::skip`] for the words it does not own,
//! so that XOR-combining the per-rank sums gives exactly the serial result.

use crate::error::Result;
use binrw::{BinRead, BinWrite};
use std::ops::{BitXor, BitXorAssign};

/// Pair of checksums for one color block
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Checksums {
    /// XOR of words rotated by `k mod 29`
    pub sum29: u32,
    /// XOR of words rotated by `k mod 31`
    pub sum31: u32,
}

impl Checksums {
    /// Create a checksum pair from its two halves
    pub const fn new(sum29: u32, sum31: u32) -> Self {
        Self { sum29, sum31 }
    }
}

impl BitXor for Checksums {
    type Output = Self;

    fn bitxor(self, rhs: Self) -> Self {
        Self {
            sum29: self.sum29 ^ rhs.sum29,
            sum31: self.sum31 ^ rhs.sum31,
        }
    }
}

impl BitXorAssign for Checksums {
    fn bitxor_assign(&mut self, rhs: Self) {
        *self = *self ^ rhs;
    }
}

impl std::fmt::Display for Checksums {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:x} {:x}", self.sum29, self.sum31)
    }
}

/// Running checksum state for one color block on one rank
#[derive(Debug, Clone, Default)]
pub struct ChecksumAccumulator {
    sums: Checksums,
    rank29: u32,
    rank31: u32,
}

impl ChecksumAccumulator {
    /// Start a new block at position zero
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a block whose first observed word sits at `position`
    pub fn starting_at(position: u64) -> Self {
        Self {
            sums: Checksums::default(),
            rank29: (position % 29) as u32,
            rank31: (position % 31) as u32,
        }
    }

    /// Fold the next word of the scan into both sums
    pub fn absorb(&mut self, word: u32) {
        self.sums.sum29 ^= word.rotate_left(self.rank29);
        self.sums.sum31 ^= word.rotate_left(self.rank31);
        self.rank29 += 1;
        if self.rank29 >= 29 {
            self.rank29 = 0;
        }
        self.rank31 += 1;
        if self.rank31 >= 31 {
            self.rank31 = 0;
        }
    }

    /// Fold a run of consecutive words
    pub fn absorb_words(&mut self, words: &[u32]) {
        for &word in words {
            self.absorb(word);
        }
    }

    /// Advance past `count` words observed by some other rank
    pub fn skip(&mut self, count: u64) {
        self.rank29 = ((u64::from(self.rank29) + count % 29) % 29) as u32;
        self.rank31 = ((u64::from(self.rank31) + count % 31) % 31) as u32;
    }

    /// Current partial sums
    pub fn sums(&self) -> Checksums {
        self.sums
    }
}

/// Checksum of a complete word sequence, computed serially
pub fn checksum_words(words: &[u32]) -> Checksums {
    let mut acc = ChecksumAccumulator::new();
    acc.absorb_words(words);
    acc.sums()
}

/// Per-color trailer stored next to each binary color block
///
/// Byte order is supplied at read/write time: the file's order is only
/// known after the header magic number has been checked.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, BinRead, BinWrite)]
pub struct ChecksumRecord {
    /// Color index the following block belongs to
    pub color: i32,
    /// Stored `sum29`
    pub sum29: u32,
    /// Stored `sum31`
    pub sum31: u32,
}

impl ChecksumRecord {
    /// Encoded size on file
    pub const SIZE: u64 = 12;

    /// Trailer for `color` carrying `sums`
    pub fn new(color: u32, sums: Checksums) -> Self {
        Self {
            color: color as i32,
            sum29: sums.sum29,
            sum31: sums.sum31,
        }
    }

    /// Stored checksum pair
    pub fn checksums(&self) -> Checksums {
        Checksums::new(self.sum29, self.sum31)
    }

    /// Read a trailer in the given byte order
    pub fn read_from<R: std::io::Read + std::io::Seek>(
        reader: &mut R,
        order: crate::ByteOrder,
    ) -> Result<Self> {
        Ok(Self::read_options(reader, order.endian(), ())?)
    }

    /// Write a trailer in the given byte order
    pub fn write_to<W: std::io::Write + std::io::Seek>(
        &self,
        writer: &mut W,
        order: crate::ByteOrder,
    ) -> Result<()> {
        self.write_options(writer, order.endian(), ())
            .map_err(|e| crate::FormatError::BinWrite(e.to_string()))
    }
}
