//! Binary propagator files.
//!
//! The header is followed by one block per color, each a checksum trailer
//! and then the site records in natural order. Byte order is detected from
//! the magic number on open and chosen by the caller on create.

use super::{BlockReader, FormatKind, PropagatorCodec};
use crate::buffer::{BulkReader, BulkWriter};
use crate::error::{Result, TransferError};
use crate::transport::BodyStream;
use ksprop_formats::{
    ByteOrder, ChecksumRecord, Checksums, Color, FileLayout, FormatError, LatticeShape,
    PropHeader, SITE_RECORD_BYTES, SiteOrder,
};
use std::fs::File;
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Binary propagator file: header, then per color a checksum trailer
/// followed by the site records.
///
/// Colors can be written and read in any order; every block is addressed
/// through [`FileLayout`].
#[derive(Debug)]
pub struct BinaryCodec {
    path: PathBuf,
    file: File,
    header: PropHeader,
    shape: LatticeShape,
    order: ByteOrder,
    layout: FileLayout,
    buffer_records: usize,
}

impl BinaryCodec {
    /// Create `path` and write `header` in `order`
    pub fn create(
        path: &Path,
        header: PropHeader,
        order: ByteOrder,
        buffer_records: usize,
    ) -> Result<Self> {
        let shape = LatticeShape::from_wire(header.dims)?;
        let mut file = File::create(path).map_err(|e| TransferError::io("create", e))?;
        header.write_to(&mut file, order)?;
        debug!("Wrote {} header to {}", order, path.display());

        Ok(Self {
            path: path.to_path_buf(),
            file,
            layout: FileLayout::new(&header, &shape, SITE_RECORD_BYTES),
            header,
            shape,
            order,
            buffer_records,
        })
    }

    /// Open `path` and read its header, detecting the byte order
    pub fn open(path: &Path, buffer_records: usize) -> Result<Self> {
        let mut file = File::open(path).map_err(|e| TransferError::io("open", e))?;
        let (header, order) = PropHeader::read_detect(&mut file)?;
        if header.site_order() != SiteOrder::Natural {
            return Err(FormatError::UnsupportedOrder(header.order).into());
        }
        let shape = LatticeShape::from_wire(header.dims)?;
        if order.needs_reversal() {
            debug!("Reading {} with byte reversal", path.display());
        }

        Ok(Self {
            path: path.to_path_buf(),
            file,
            layout: FileLayout::new(&header, &shape, SITE_RECORD_BYTES),
            header,
            shape,
            order,
            buffer_records,
        })
    }

    /// Offsets of every block in this file
    pub const fn layout(&self) -> &FileLayout {
        &self.layout
    }

    /// Read the trailer stored for `color` without touching its records
    pub fn read_trailer(&mut self, color: Color) -> Result<ChecksumRecord> {
        self.seek(self.layout.checksum_offset(color))?;
        Ok(ChecksumRecord::read_from(&mut self.file, self.order)?)
    }

    fn seek(&mut self, offset: u64) -> Result<()> {
        debug!("Seek to {} in {}", offset, self.path.display());
        self.file
            .seek(SeekFrom::Start(offset))
            .map_err(|e| TransferError::io("seek", e))?;
        Ok(())
    }
}

impl PropagatorCodec for BinaryCodec {
    fn format(&self) -> FormatKind {
        FormatKind::Binary
    }

    fn header(&self) -> &PropHeader {
        &self.header
    }

    fn shape(&self) -> LatticeShape {
        self.shape
    }

    fn byte_order(&self) -> ByteOrder {
        self.order
    }

    fn color_writer(&mut self, color: Color) -> Result<Box<dyn BodyStream + '_>> {
        self.seek(self.layout.records_offset(color))?;
        Ok(Box::new(RecordWriter {
            bulk: BulkWriter::new(&mut self.file, self.buffer_records, SITE_RECORD_BYTES),
        }))
    }

    fn finish_color(&mut self, color: Color, sums: Checksums) -> Result<()> {
        self.seek(self.layout.checksum_offset(color))?;
        ChecksumRecord::new(color.index(), sums).write_to(&mut self.file, self.order)?;
        Ok(())
    }

    fn color_reader(&mut self, color: Color) -> Result<BlockReader<'_>> {
        let trailer = self.read_trailer(color)?;
        if trailer.color != color.index() as i32 {
            return Err(FormatError::ColorMismatch {
                expected: color.index(),
                found: trailer.color,
            }
            .into());
        }
        let stored = self.header.has_checksums().then(|| trailer.checksums());

        // The records follow the trailer directly.
        Ok(BlockReader {
            stream: Box::new(RecordReader {
                bulk: BulkReader::new(
                    &mut self.file,
                    self.buffer_records,
                    SITE_RECORD_BYTES,
                    self.layout.site_count(),
                ),
            }),
            stored,
        })
    }

    fn close(&mut self) -> Result<()> {
        self.file.flush().map_err(|e| TransferError::io("flush", e))
    }
}

struct RecordWriter<'a> {
    bulk: BulkWriter<&'a mut File>,
}

impl BodyStream for RecordWriter<'_> {
    fn put_record(&mut self, record: &[u8]) -> Result<()> {
        self.bulk.push(record)
    }

    fn finish(&mut self) -> Result<()> {
        self.bulk.finish()
    }
}

struct RecordReader<'a> {
    bulk: BulkReader<&'a mut File>,
}

impl BodyStream for RecordReader<'_> {
    fn next_record(&mut self) -> Result<&[u8]> {
        self.bulk.next_record()
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use ksprop_formats::{HEADER_BYTES, TimeStamp};

    fn header() -> PropHeader {
        let shape = LatticeShape::new([2, 1, 1, 2]).unwrap();
        PropHeader::new(&shape, TimeStamp::new("Thu Oct 16 09:03:11 2026"))
    }

    fn write_color(codec: &mut BinaryCodec, color: Color, fill: u8) {
        let mut stream = codec.color_writer(color).unwrap();
        for _ in 0..4 {
            stream.put_record(&[fill; SITE_RECORD_BYTES]).unwrap();
        }
        stream.finish().unwrap();
        drop(stream);
        codec
            .finish_color(color, Checksums::new(u32::from(fill), 7))
            .unwrap();
    }

    #[test]
    fn test_colors_land_at_their_offsets() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prop.bin");

        let mut codec = BinaryCodec::create(&path, header(), ByteOrder::Big, 3).unwrap();
        // Out of order on purpose
        write_color(&mut codec, Color::ALL[2], 0x22);
        write_color(&mut codec, Color::ALL[0], 0x00);
        write_color(&mut codec, Color::ALL[1], 0x11);
        codec.close().unwrap();
        drop(codec);

        let bytes = std::fs::read(&path).unwrap();
        let body = 4 * SITE_RECORD_BYTES as u64 + ChecksumRecord::SIZE;
        assert_eq!(bytes.len() as u64, HEADER_BYTES + 3 * body);

        let color1 = (HEADER_BYTES + body) as usize;
        assert_eq!(&bytes[color1..color1 + 4], &1i32.to_be_bytes());
        assert_eq!(&bytes[color1 + 4..color1 + 8], &0x11u32.to_be_bytes());
        assert_eq!(bytes[color1 + 12], 0x11);
    }

    #[test]
    fn test_random_access_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prop.bin");
        let mut codec = BinaryCodec::create(&path, header(), ByteOrder::Little, 4096).unwrap();
        for (i, color) in Color::ALL.into_iter().enumerate() {
            write_color(&mut codec, color, i as u8 + 1);
        }
        codec.close().unwrap();
        drop(codec);

        let mut codec = BinaryCodec::open(&path, 2).unwrap();
        assert_eq!(codec.byte_order(), ByteOrder::Little);
        assert_eq!(codec.shape().volume(), 4);

        let mut block = codec.color_reader(Color::ALL[2]).unwrap();
        assert_eq!(block.stored, Some(Checksums::new(3, 7)));
        for _ in 0..4 {
            assert_eq!(block.stream.next_record().unwrap(), &[3; SITE_RECORD_BYTES]);
        }
    }

    #[test]
    fn test_color_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prop.bin");
        let mut codec = BinaryCodec::create(&path, header(), ByteOrder::native(), 8).unwrap();
        write_color(&mut codec, Color::ALL[0], 0);
        // Trailer of color 1 never written: its color field reads as zero
        write_color(&mut codec, Color::ALL[2], 2);
        drop(codec);

        let mut codec = BinaryCodec::open(&path, 8).unwrap();
        assert!(matches!(
            codec.color_reader(Color::ALL[1]),
            Err(TransferError::Format(FormatError::ColorMismatch {
                expected: 1,
                found: 0
            }))
        ));
    }

    #[test]
    fn test_listed_order_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prop.bin");
        let mut h = header();
        h.order = SiteOrder::Listed.to_wire();
        let mut file = File::create(&path).unwrap();
        h.write_to(&mut file, ByteOrder::native()).unwrap();
        drop(file);

        assert!(matches!(
            BinaryCodec::open(&path, 8),
            Err(TransferError::Format(FormatError::UnsupportedOrder(1)))
        ));
    }

    #[test]
    fn test_bad_magic() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("junk.bin");
        std::fs::write(&path, [0xde, 0xad, 0xbe, 0xef, 0, 0, 0, 0]).unwrap();
        assert!(matches!(
            BinaryCodec::open(&path, 8),
            Err(TransferError::Format(FormatError::InvalidMagic { .. }))
        ));
    }
}
