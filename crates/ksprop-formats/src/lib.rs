//! Wire codecs for staggered quark propagator files
//!
#![allow(clippy::cast_possible_truncation)] // Intentional for binary format parsing
#![allow(clippy::cast_possible_wrap)] // Extents are validated to fit int32
#![allow(clippy::cast_lossless)] // Sometimes clearer than From
#![allow(clippy::uninlined_format_args)] // Backwards compatibility
#![allow(clippy::float_cmp)] // Bit-exact wire comparisons
#![allow(clippy::cast_precision_loss)] // Precision conversion is part of the format
//! A propagator file stores three color blocks of a lattice field, one
//! color vector per site, at single precision regardless of the precision
//! the caller computes in. This crate holds everything about those files
//! that does not involve moving data between ranks.
//!
//! # Formats
//!
//! - **Binary**: fixed header, then per color a checksum trailer followed by
//!   the site records in natural order, all in the writer's byte order
//! - **ASCII**: text header, then per color a color line and one
//!   `%.7e\t%.7e` line per complex component
//! - **Legacy ASCII**: older magic number, all three colors per site, no
//!   color lines
//!
//! # Example
//!
//! ```rust
//! use ksprop_formats::{ByteOrder, LatticeShape, PropHeader, TimeStamp};
//! use std::io::Cursor;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let shape = LatticeShape::new([4, 4, 4, 8])?;
//! let header = PropHeader::new(&shape, TimeStamp::now());
//!
//! let mut file = Cursor::new(Vec::new());
//! header.write_to(&mut file, ByteOrder::Big)?;
//!
//! file.set_position(0);
//! let (parsed, order) = PropHeader::read_detect(&mut file)?;
//! assert_eq!(order, ByteOrder::Big);
//! assert_eq!(parsed.dims, [4, 4, 4, 8]);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

pub mod ascii;
pub mod byte_order;
pub mod checksum;
pub mod error;
pub mod header;
pub mod info;
pub mod layout;
pub mod shape;
pub mod site;

pub use ascii::{AsciiDialect, AsciiHeader, AsciiScanner, AsciiWriter, format_sci};
pub use byte_order::{ByteOrder, require_swappable, reverse_words};
pub use checksum::{ChecksumAccumulator, ChecksumRecord, Checksums, checksum_words};
pub use error::{FormatError, Result};
pub use header::{
    HEADER_BYTES, KSPROP_VERSION_NUMBER, KSPROP_VERSION_NUMBER_V0, PropHeader, SiteOrder,
    TimeStamp,
};
pub use info::{InfoFile, InfoItem, info_path};
pub use layout::{COLORS, Color, FileLayout};
pub use shape::{Coord, ExpectedShape, LatticeShape};
pub use site::{
    ColorVector, Complex, SITE_RECORD_BYTES, WORDS_PER_VECTOR, WireReal, WorkingReal,
};
