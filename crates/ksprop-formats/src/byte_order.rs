//! Byte-order detection and 32-bit word reversal
//!
//! Files are written in the writer's byte order. A reader compares the raw
//! magic number against the expected constant; if it only matches after a
//! byte swap, every fixed-width field on file has to be reversed word by
//! word. That is only sound when the wire float is exactly as wide as the
//! 32-bit swap unit.

use crate::error::{FormatError, Result};
use serde::{Deserialize, Serialize};

/// Width of the byte-reversal unit
pub const WORD_BYTES: usize = 4;

/// Byte order of fixed-width fields on file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ByteOrder {
    /// Least significant byte first
    Little,
    /// Most significant byte first
    Big,
}

impl ByteOrder {
    /// Byte order of the running host
    pub const fn native() -> Self {
        if cfg!(target_endian = "big") {
            Self::Big
        } else {
            Self::Little
        }
    }

    /// The other byte order
    pub const fn swapped(self) -> Self {
        match self {
            Self::Little => Self::Big,
            Self::Big => Self::Little,
        }
    }

    /// Whether data in this order must be reversed before native use
    pub fn needs_reversal(self) -> bool {
        self != Self::native()
    }

    /// Equivalent binrw endianness
    pub const fn endian(self) -> binrw::Endian {
        match self {
            Self::Little => binrw::Endian::Little,
            Self::Big => binrw::Endian::Big,
        }
    }

    /// Decode one 32-bit word stored in this order
    pub fn read_u32(self, bytes: [u8; WORD_BYTES]) -> u32 {
        match self {
            Self::Little => u32::from_le_bytes(bytes),
            Self::Big => u32::from_be_bytes(bytes),
        }
    }

    /// Encode one 32-bit word in this order
    pub fn write_u32(self, word: u32) -> [u8; WORD_BYTES] {
        match self {
            Self::Little => word.to_le_bytes(),
            Self::Big => word.to_be_bytes(),
        }
    }

    /// Inspect a raw magic number and return the byte order it was written in
    ///
    /// Fails when neither the raw nor the swapped value matches `expected`,
    /// or when a swap is needed but the wire real type cannot be reversed as
    /// 32-bit words.
    pub fn detect(raw: [u8; WORD_BYTES], expected: i32) -> Result<Self> {
        let host = Self::native();
        if i32::from_ne_bytes(raw) == expected {
            return Ok(host);
        }

        let mut swapped = raw;
        swapped.reverse();
        if i32::from_ne_bytes(swapped) == expected {
            require_swappable::<crate::site::WireReal>()?;
            return Ok(host.swapped());
        }

        Err(FormatError::InvalidMagic {
            expected,
            found: i32::from_ne_bytes(raw),
        })
    }
}

impl Default for ByteOrder {
    fn default() -> Self {
        Self::native()
    }
}

impl std::fmt::Display for ByteOrder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Little => f.write_str("little-endian"),
            Self::Big => f.write_str("big-endian"),
        }
    }
}

/// Ensure values of `T` can be byte-reversed as whole 32-bit words
pub fn require_swappable<T>() -> Result<()> {
    let real_bytes = std::mem::size_of::<T>();
    if real_bytes == WORD_BYTES {
        Ok(())
    } else {
        Err(FormatError::PrecisionMismatch {
            word_bytes: WORD_BYTES,
            real_bytes,
        })
    }
}

/// Reverse the bytes of every 32-bit word in `buf` in place
///
/// Trailing bytes that do not fill a whole word are left untouched.
pub fn reverse_words(buf: &mut [u8]) {
    for word in buf.chunks_exact_mut(WORD_BYTES) {
        word.reverse();
    }
}
