//! Error types for propagator file codecs

use thiserror::Error;

/// Errors that can occur when encoding or decoding propagator files
#[derive(Debug, Error)]
pub enum FormatError {
    /// Magic number matches neither host nor swapped byte order
    #[error("Unrecognized magic number: expected {expected:#x}, read {found:#x}")]
    InvalidMagic {
        /// Magic number this reader understands
        expected: i32,
        /// Raw value found on file
        found: i32,
    },

    /// Stored lattice extents differ from the caller's extents
    #[error("Incorrect lattice dimensions: expected {expected:?}, file has {found:?}")]
    DimensionMismatch {
        /// Extents supplied by the caller
        expected: [usize; 4],
        /// Extents stored in the file header
        found: [i32; 4],
    },

    /// Lattice extents that cannot describe a lattice
    #[error("Invalid lattice dimensions {0:?}")]
    InvalidDimensions([i64; 4]),

    /// Byte reversal requested but float and word widths differ
    #[error("Can't byte reverse: requires size of int32 ({word_bytes}) = size of real ({real_bytes})")]
    PrecisionMismatch {
        /// Width of the 32-bit swap unit
        word_bytes: usize,
        /// Width of the wire floating-point type
        real_bytes: usize,
    },

    /// Site ordering the reader cannot follow
    #[error("Unsupported site order {0} (only natural order is supported)")]
    UnsupportedOrder(i32),

    /// Color recorded on file differs from the requested color
    #[error("Color {expected} does not match check record (file says {found})")]
    ColorMismatch {
        /// Color the caller asked for
        expected: u32,
        /// Color recorded on file
        found: i32,
    },

    /// Color index outside 0..3
    #[error("Invalid color index {0}")]
    InvalidColor(u32),

    /// Malformed ASCII content
    #[error("ASCII parse error reading {what}: {reason}")]
    AsciiParse {
        /// Field being read
        what: &'static str,
        /// Description of the problem
        reason: String,
    },

    /// File content matches no known propagator format
    #[error("Unknown propagator file format")]
    UnknownFormat,

    /// Binary read error
    #[error("Binary parsing error: {0}")]
    BinRead(String),

    /// Binary write error
    #[error("Binary write error: {0}")]
    BinWrite(String),

    /// IO error during parsing or building
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl FormatError {
    /// Build an ASCII parse error
    pub fn ascii(what: &'static str, reason: impl Into<String>) -> Self {
        Self::AsciiParse {
            what,
            reason: reason.into(),
        }
    }
}

impl From<binrw::Error> for FormatError {
    fn from(e: binrw::Error) -> Self {
        match e {
            binrw::Error::Io(io) => Self::Io(io),
            other => Self::BinRead(other.to_string()),
        }
    }
}

/// Result type alias for propagator format operations
pub type Result<T> = std::result::Result<T, FormatError>;
