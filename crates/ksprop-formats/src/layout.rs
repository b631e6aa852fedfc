//! Random-access addressing of color blocks in a binary file
//!
//! ```text
//! [header][coordinate list][trailer 0][body 0][trailer 1][body 1][trailer 2][body 2]
//! ```
//!
//! Each color block is its checksum trailer immediately followed by the
//! site records, so the start of any color is
//! `header + coord_list + color * (sites * record + trailer)`.

use crate::checksum::ChecksumRecord;
use crate::error::{FormatError, Result};
use crate::header::{PropHeader, SiteOrder};
use crate::shape::LatticeShape;

/// Number of source colors in a propagator
pub const COLORS: u32 = 3;

/// Index of one source color, always below [`COLORS`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Color(u32);

impl Color {
    /// All colors in ascending order
    pub const ALL: [Self; COLORS as usize] = [Self(0), Self(1), Self(2)];

    /// Validate a color index
    pub fn new(index: u32) -> Result<Self> {
        if index < COLORS {
            Ok(Self(index))
        } else {
            Err(FormatError::InvalidColor(index))
        }
    }

    /// Numeric index
    pub const fn index(self) -> u32 {
        self.0
    }
}

impl std::fmt::Display for Color {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Byte offsets of every color block in a binary file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileLayout {
    header_bytes: u64,
    coord_list_bytes: u64,
    site_count: u64,
    site_record_bytes: u64,
}

impl FileLayout {
    /// Layout for a file with the given header and lattice
    pub fn new(header: &PropHeader, shape: &LatticeShape, site_record_bytes: usize) -> Self {
        let site_count = shape.volume() as u64;
        let coord_list_bytes = match header.site_order() {
            SiteOrder::Natural => 0,
            SiteOrder::Listed => 4 * site_count,
        };
        Self {
            header_bytes: header.header_bytes(),
            coord_list_bytes,
            site_count,
            site_record_bytes: site_record_bytes as u64,
        }
    }

    /// Number of site records per color
    pub const fn site_count(&self) -> u64 {
        self.site_count
    }

    /// Header plus coordinate list
    pub const fn head_bytes(&self) -> u64 {
        self.header_bytes + self.coord_list_bytes
    }

    /// Records plus trailer for one color
    pub const fn body_bytes_per_color(&self) -> u64 {
        self.site_count * self.site_record_bytes + ChecksumRecord::SIZE
    }

    /// Start of a color's block, which is where its trailer sits
    pub const fn color_offset(&self, color: Color) -> u64 {
        self.head_bytes() + color.index() as u64 * self.body_bytes_per_color()
    }

    /// Offset of a color's checksum trailer
    pub const fn checksum_offset(&self, color: Color) -> u64 {
        self.color_offset(color)
    }

    /// Offset of a color's first site record
    pub const fn records_offset(&self, color: Color) -> u64 {
        self.color_offset(color) + ChecksumRecord::SIZE
    }

    /// Length of a file holding all colors
    pub const fn file_bytes(&self) -> u64 {
        self.head_bytes() + COLORS as u64 * self.body_bytes_per_color()
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::header::TimeStamp;
    use crate::site::SITE_RECORD_BYTES;

    fn layout(order: SiteOrder) -> FileLayout {
        let shape = LatticeShape::new([4, 4, 4, 4]).unwrap();
        let mut header = PropHeader::new(&shape, TimeStamp::new("t"));
        header.order = order.to_wire();
        FileLayout::new(&header, &shape, SITE_RECORD_BYTES)
    }

    #[test]
    fn test_color_offsets_natural() {
        let l = layout(SiteOrder::Natural);
        let body = 256 * 24 + 12;
        assert_eq!(l.body_bytes_per_color(), body);
        assert_eq!(l.color_offset(Color::ALL[0]), 88);
        assert_eq!(l.records_offset(Color::ALL[0]), 100);
        assert_eq!(l.checksum_offset(Color::ALL[2]), 88 + 2 * body);
        assert_eq!(l.file_bytes(), 88 + 3 * body);
    }

    #[test]
    fn test_listed_order_reserves_coordinate_list() {
        let l = layout(SiteOrder::Listed);
        assert_eq!(l.head_bytes(), 88 + 4 * 256);
    }

    #[test]
    fn test_color_bounds() {
        assert!(Color::new(2).is_ok());
        assert!(matches!(Color::new(3), Err(FormatError::InvalidColor(3))));
    }
}
