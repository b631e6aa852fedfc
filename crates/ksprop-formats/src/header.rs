//! Binary file header
//!
//! ```text
//! magic_number : int32
//! dims[4]      : int32 each (nx, ny, nz, nt)
//! time_stamp   : char[64], null padded
//! order        : int32 (0 = natural, otherwise listed)
//! ```
//!
//! All fields are in the writer's byte order. Readers inspect the magic number
//! first to learn that order.

use crate::byte_order::{ByteOrder, WORD_BYTES};
use crate::error::{FormatError, Result};
use crate::shape::{AXES, ExpectedShape, LatticeShape};
use binrw::{BinRead, BinWrite};
use std::io::{Read, Seek, SeekFrom, Write};

/// Magic number of the current format (binary and ASCII)
pub const KSPROP_VERSION_NUMBER: i32 = 59355;

/// Magic number of the legacy ASCII dialect
pub const KSPROP_VERSION_NUMBER_V0: i32 = 59354;

/// Width of the on-file time stamp field
pub const TIME_STAMP_BYTES: usize = 64;

/// Size of the encoded header
pub const HEADER_BYTES: u64 = (WORD_BYTES + AXES * WORD_BYTES + TIME_STAMP_BYTES + WORD_BYTES) as u64;

/// Fixed-width, null-padded creation time stamp
#[derive(Clone, Copy, PartialEq, Eq, BinRead, BinWrite)]
pub struct TimeStamp([u8; TIME_STAMP_BYTES]);

impl TimeStamp {
    /// Build from text, truncating so at least one terminating null remains
    ///
    /// A trailing newline is stripped.
    pub fn new(text: &str) -> Self {
        let text = text.strip_suffix('\n').unwrap_or(text);
        let mut bytes = [0u8; TIME_STAMP_BYTES];
        let len = text.len().min(TIME_STAMP_BYTES - 1);
        bytes[..len].copy_from_slice(&text.as_bytes()[..len]);
        Self(bytes)
    }

    /// Current local time in `ctime` layout, e.g. `Thu Oct 16 09:03:11 2026`
    pub fn now() -> Self {
        Self::new(&chrono::Local::now().format("%a %b %e %H:%M:%S %Y").to_string())
    }

    /// Text up to the first null, with any trailing newline removed
    pub fn as_str(&self) -> String {
        let end = self.0.iter().position(|&b| b == 0).unwrap_or(TIME_STAMP_BYTES);
        let text = String::from_utf8_lossy(&self.0[..end]);
        text.strip_suffix('\n').unwrap_or(&text).to_string()
    }

    /// Raw field bytes
    pub const fn as_bytes(&self) -> &[u8; TIME_STAMP_BYTES] {
        &self.0
    }
}

impl std::fmt::Debug for TimeStamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "TimeStamp({:?})", self.as_str())
    }
}

/// How sites are ordered within a color block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SiteOrder {
    /// Natural coordinate scan, x fastest
    Natural,
    /// Order given by an explicit coordinate list after the header
    Listed,
}

impl SiteOrder {
    /// Decode the wire enum
    pub const fn from_wire(value: i32) -> Self {
        if value == 0 { Self::Natural } else { Self::Listed }
    }

    /// Encode to the wire enum
    pub const fn to_wire(self) -> i32 {
        match self {
            Self::Natural => 0,
            Self::Listed => 1,
        }
    }
}

/// Propagator file header
#[derive(Debug, Clone, PartialEq, Eq, BinRead, BinWrite)]
pub struct PropHeader {
    /// Format version marker, also used to detect byte order
    pub magic_number: i32,
    /// Lattice extents nx, ny, nz, nt
    pub dims: [i32; AXES],
    /// Creation time stamp
    pub time_stamp: TimeStamp,
    /// Site order enum, see [`SiteOrder`]
    pub order: i32,
}

impl PropHeader {
    /// Header for a new file of the current format in natural order
    pub fn new(shape: &LatticeShape, time_stamp: TimeStamp) -> Self {
        Self::with_magic(KSPROP_VERSION_NUMBER, shape, time_stamp)
    }

    /// Header carrying an explicit magic number
    pub fn with_magic(magic_number: i32, shape: &LatticeShape, time_stamp: TimeStamp) -> Self {
        Self {
            magic_number,
            dims: shape.to_wire(),
            time_stamp,
            order: SiteOrder::Natural.to_wire(),
        }
    }

    /// Encoded size, derived from the fields rather than stored
    pub const fn header_bytes(&self) -> u64 {
        HEADER_BYTES
    }

    /// Decoded site order
    pub const fn site_order(&self) -> SiteOrder {
        SiteOrder::from_wire(self.order)
    }

    /// Whether color blocks carry checksum trailers worth verifying
    pub const fn has_checksums(&self) -> bool {
        self.magic_number == KSPROP_VERSION_NUMBER
    }

    /// Resolve the stored extents against what the caller expects
    pub fn resolve_shape(&self, expected: &ExpectedShape) -> Result<LatticeShape> {
        expected.resolve(self.dims)
    }

    /// Read a header, detecting the byte order from its magic number
    pub fn read_detect<R: Read + Seek>(reader: &mut R) -> Result<(Self, ByteOrder)> {
        let mut raw = [0u8; WORD_BYTES];
        reader.read_exact(&mut raw)?;
        let order = ByteOrder::detect(raw, KSPROP_VERSION_NUMBER)?;
        reader.seek(SeekFrom::Current(-(WORD_BYTES as i64)))?;
        let header = Self::read_options(reader, order.endian(), ())?;
        Ok((header, order))
    }

    /// Write the header in `order`
    pub fn write_to<W: Write + Seek>(&self, writer: &mut W, order: ByteOrder) -> Result<()> {
        self.write_options(writer, order.endian(), ())
            .map_err(|e| FormatError::BinWrite(e.to_string()))
    }

    /// Encode in host order, for shipping between ranks
    pub fn to_native_bytes(&self) -> Result<Vec<u8>> {
        let mut cursor = std::io::Cursor::new(Vec::with_capacity(HEADER_BYTES as usize));
        self.write_to(&mut cursor, ByteOrder::native())?;
        Ok(cursor.into_inner())
    }

    /// Decode from host-order bytes produced by [`Self::to_native_bytes`]
    pub fn from_native_bytes(bytes: &[u8]) -> Result<Self> {
        let mut cursor = std::io::Cursor::new(bytes);
        Ok(Self::read_options(
            &mut cursor,
            ByteOrder::native().endian(),
            (),
        )?)
    }
}
