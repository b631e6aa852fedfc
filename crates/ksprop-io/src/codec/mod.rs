//! Propagator file codecs
//!
//! A codec owns the file on the I/O rank and hands the transport one
//! [`BodyStream`] per block. Binary files and current ASCII files store one
//! block per color; legacy ASCII files store the whole propagator as a single
//! block with three vectors per site.

mod ascii;
mod binary;

pub use ascii::AsciiCodec;
pub use binary::BinaryCodec;

use crate::error::{Result, TransferError};
use crate::transport::BodyStream;
use ksprop_formats::{
    AsciiDialect, ByteOrder, Checksums, Color, FormatError, KSPROP_VERSION_NUMBER, LatticeShape,
    PropHeader,
};
use serde::{Deserialize, Serialize};
use std::io::Read;
use std::path::Path;

/// On-disk encoding of a propagator file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FormatKind {
    /// Binary, per-color blocks with checksum trailers
    Binary,
    /// Text, per-color blocks
    Ascii,
    /// Text, all colors per site, older magic number
    LegacyAscii,
}

impl FormatKind {
    /// Wire value used when broadcasting a file descriptor
    pub const fn to_u32(self) -> u32 {
        match self {
            Self::Binary => 0,
            Self::Ascii => 1,
            Self::LegacyAscii => 2,
        }
    }

    /// Decode a wire value
    pub const fn from_u32(value: u32) -> Option<Self> {
        match value {
            0 => Some(Self::Binary),
            1 => Some(Self::Ascii),
            2 => Some(Self::LegacyAscii),
            _ => None,
        }
    }

    /// Whether each color is stored as its own block
    pub const fn is_per_color(self) -> bool {
        !matches!(self, Self::LegacyAscii)
    }

    /// ASCII dialect, for text formats
    pub const fn dialect(self) -> Option<AsciiDialect> {
        match self {
            Self::Binary => None,
            Self::Ascii => Some(AsciiDialect::Current),
            Self::LegacyAscii => Some(AsciiDialect::Legacy),
        }
    }

    /// Guess the format from the first bytes of a file
    pub fn sniff(prefix: &[u8]) -> Result<Self> {
        if let Some(raw) = prefix.first_chunk::<4>() {
            if ByteOrder::detect(*raw, KSPROP_VERSION_NUMBER).is_ok() {
                return Ok(Self::Binary);
            }
        }

        let text = prefix
            .iter()
            .skip_while(|b| b.is_ascii_whitespace())
            .take_while(|b| b.is_ascii_digit())
            .map(|&b| char::from(b))
            .collect::<String>();
        match text.parse::<i32>().ok().and_then(AsciiDialect::from_magic) {
            Some(AsciiDialect::Current) => Ok(Self::Ascii),
            Some(AsciiDialect::Legacy) => Ok(Self::LegacyAscii),
            None => Err(FormatError::UnknownFormat.into()),
        }
    }

    /// Detect the format of the file at `path`
    pub fn detect(path: &Path) -> Result<Self> {
        let file = std::fs::File::open(path).map_err(|e| TransferError::io("open", e))?;
        let mut prefix = Vec::with_capacity(16);
        file.take(16)
            .read_to_end(&mut prefix)
            .map_err(|e| TransferError::io("read", e))?;
        Self::sniff(&prefix)
    }
}

impl std::fmt::Display for FormatKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Binary => "binary",
            Self::Ascii => "ascii",
            Self::LegacyAscii => "legacy-ascii",
        })
    }
}

/// A block opened for reading, with the checksums stored for it
pub struct BlockReader<'a> {
    /// Record source
    pub stream: Box<dyn BodyStream + 'a>,
    /// Stored checksums, when the format keeps them
    pub stored: Option<Checksums>,
}

/// File-side strategy for one propagator format
pub trait PropagatorCodec: Send {
    /// Encoding handled by this codec
    fn format(&self) -> FormatKind;

    /// Header as written or as read
    fn header(&self) -> &PropHeader;

    /// Lattice the file describes
    fn shape(&self) -> LatticeShape;

    /// Byte order of records exchanged with the transport
    fn byte_order(&self) -> ByteOrder;

    /// Stream accepting the records of `color`
    fn color_writer(&mut self, _color: Color) -> Result<Box<dyn BodyStream + '_>> {
        Err(self.wrong_layout("per-color write"))
    }

    /// Record the checksums of a color block once its records are written
    fn finish_color(&mut self, _color: Color, _sums: Checksums) -> Result<()> {
        Ok(())
    }

    /// Stream producing the records of `color`
    fn color_reader(&mut self, _color: Color) -> Result<BlockReader<'_>> {
        Err(self.wrong_layout("per-color read"))
    }

    /// Stream accepting whole-propagator records (three vectors per site)
    fn propagator_writer(&mut self) -> Result<Box<dyn BodyStream + '_>> {
        Err(self.wrong_layout("whole-propagator write"))
    }

    /// Stream producing whole-propagator records
    fn propagator_reader(&mut self) -> Result<Box<dyn BodyStream + '_>> {
        Err(self.wrong_layout("whole-propagator read"))
    }

    /// Flush and release the file
    fn close(&mut self) -> Result<()>;

    /// Error for an operation the file layout does not support
    fn wrong_layout(&self, op: &str) -> TransferError {
        TransferError::InvalidOperation(format!("{op} is not supported by {} files", self.format()))
    }
}

/// Create a file of the given format and write its header
pub fn create_codec(
    path: &Path,
    format: FormatKind,
    header: PropHeader,
    order: ByteOrder,
    buffer_records: usize,
) -> Result<Box<dyn PropagatorCodec>> {
    Ok(match format {
        FormatKind::Binary => Box::new(BinaryCodec::create(path, header, order, buffer_records)?),
        FormatKind::Ascii | FormatKind::LegacyAscii => {
            let dialect = format.dialect().unwrap_or(AsciiDialect::Current);
            Box::new(AsciiCodec::create(path, dialect, header)?)
        }
    })
}

/// Open an existing file and read its header.
///
/// With `format` unset the encoding is detected from the file contents.
pub fn open_codec(
    path: &Path,
    format: Option<FormatKind>,
    buffer_records: usize,
) -> Result<Box<dyn PropagatorCodec>> {
    let format = match format {
        Some(format) => format,
        None => FormatKind::detect(path)?,
    };
    Ok(match format {
        FormatKind::Binary => Box::new(BinaryCodec::open(path, buffer_records)?),
        FormatKind::Ascii | FormatKind::LegacyAscii => Box::new(AsciiCodec::open(path, format)?),
    })
}
