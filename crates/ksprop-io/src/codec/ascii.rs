//! Text propagator files, current and legacy dialects.
//!
//! Each color vector is written as three lines of values in scientific
//! notation. The legacy dialect keeps the whole propagator in one block.

use super::{BlockReader, FormatKind, PropagatorCodec};
use crate::error::{Result, TransferError};
use crate::transport::BodyStream;
use ksprop_formats::{
    AsciiDialect, AsciiHeader, AsciiScanner, AsciiWriter, ByteOrder, COLORS, Color, ColorVector,
    FormatError, LatticeShape, PropHeader, SITE_RECORD_BYTES, TimeStamp,
};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

enum Mode {
    Write(AsciiWriter<BufWriter<File>>),
    Read(AsciiScanner<BufReader<File>>),
    Closed,
}

/// Text propagator file in either dialect.
///
/// Text is read strictly front to back, so colors must be transferred in
/// the order they appear in the file. Records are exchanged in host byte
/// order and carry no checksums.
pub struct AsciiCodec {
    dialect: AsciiDialect,
    header: PropHeader,
    shape: LatticeShape,
    mode: Mode,
}

impl AsciiCodec {
    /// Create `path` and write the text header
    pub fn create(path: &Path, dialect: AsciiDialect, header: PropHeader) -> Result<Self> {
        let shape = LatticeShape::from_wire(header.dims)?;
        let header = PropHeader {
            magic_number: dialect.magic(),
            ..header
        };
        let file = File::create(path).map_err(|e| TransferError::io("create", e))?;
        let mut writer = AsciiWriter::new(BufWriter::new(file));
        writer.write_header(dialect, &header.time_stamp, &shape)?;

        Ok(Self {
            dialect,
            header,
            shape,
            mode: Mode::Write(writer),
        })
    }

    /// Open `path` and read the text header.
    ///
    /// The magic number on file must name the dialect of `format`.
    pub fn open(path: &Path, format: FormatKind) -> Result<Self> {
        let wanted = format.dialect().unwrap_or(AsciiDialect::Current);
        let file = File::open(path).map_err(|e| TransferError::io("open", e))?;
        let mut scanner = AsciiScanner::new(BufReader::new(file));
        let text = AsciiHeader::read(&mut scanner)?;
        if text.dialect != wanted {
            return Err(FormatError::InvalidMagic {
                expected: wanted.magic(),
                found: text.dialect.magic(),
            }
            .into());
        }

        let shape = LatticeShape::from_wire(text.dims)?;
        let header = PropHeader::with_magic(
            text.dialect.magic(),
            &shape,
            TimeStamp::new(&text.time_stamp),
        );
        Ok(Self {
            dialect: text.dialect,
            header,
            shape,
            mode: Mode::Read(scanner),
        })
    }

    fn writer(&mut self) -> Result<&mut AsciiWriter<BufWriter<File>>> {
        match &mut self.mode {
            Mode::Write(writer) => Ok(writer),
            _ => Err(TransferError::InvalidOperation(
                "ASCII file is not open for writing".to_string(),
            )),
        }
    }

    fn scanner(&mut self) -> Result<&mut AsciiScanner<BufReader<File>>> {
        match &mut self.mode {
            Mode::Read(scanner) => Ok(scanner),
            _ => Err(TransferError::InvalidOperation(
                "ASCII file is not open for reading".to_string(),
            )),
        }
    }
}

impl PropagatorCodec for AsciiCodec {
    fn format(&self) -> FormatKind {
        match self.dialect {
            AsciiDialect::Current => FormatKind::Ascii,
            AsciiDialect::Legacy => FormatKind::LegacyAscii,
        }
    }

    fn header(&self) -> &PropHeader {
        &self.header
    }

    fn shape(&self) -> LatticeShape {
        self.shape
    }

    fn byte_order(&self) -> ByteOrder {
        ByteOrder::native()
    }

    fn color_writer(&mut self, color: Color) -> Result<Box<dyn BodyStream + '_>> {
        if self.dialect != AsciiDialect::Current {
            return Err(self.wrong_layout("per-color write"));
        }
        let writer = self.writer()?;
        writer.write_color(color.index())?;
        Ok(Box::new(TextWriter { writer }))
    }

    fn color_reader(&mut self, color: Color) -> Result<BlockReader<'_>> {
        if self.dialect != AsciiDialect::Current {
            return Err(self.wrong_layout("per-color read"));
        }
        let scanner = self.scanner()?;
        let found = scanner.next_i32("color")?;
        if found != color.index() as i32 {
            return Err(FormatError::ColorMismatch {
                expected: color.index(),
                found,
            }
            .into());
        }
        Ok(BlockReader {
            stream: Box::new(TextReader::new(scanner, 1)),
            stored: None,
        })
    }

    fn propagator_writer(&mut self) -> Result<Box<dyn BodyStream + '_>> {
        if self.dialect != AsciiDialect::Legacy {
            return Err(self.wrong_layout("whole-propagator write"));
        }
        let writer = self.writer()?;
        Ok(Box::new(TextWriter { writer }))
    }

    fn propagator_reader(&mut self) -> Result<Box<dyn BodyStream + '_>> {
        if self.dialect != AsciiDialect::Legacy {
            return Err(self.wrong_layout("whole-propagator read"));
        }
        let scanner = self.scanner()?;
        Ok(Box::new(TextReader::new(scanner, COLORS as usize)))
    }

    fn close(&mut self) -> Result<()> {
        if let Mode::Write(writer) = &mut self.mode {
            writer.flush()?;
        }
        self.mode = Mode::Closed;
        Ok(())
    }
}

/// Writes each 24-byte vector of a record as three text lines
struct TextWriter<'a> {
    writer: &'a mut AsciiWriter<BufWriter<File>>,
}

impl BodyStream for TextWriter<'_> {
    fn put_record(&mut self, record: &[u8]) -> Result<()> {
        for bytes in record.chunks_exact(SITE_RECORD_BYTES) {
            let v = ColorVector::decode(bytes, ByteOrder::native());
            self.writer.write_vector(&v)?;
        }
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        Ok(self.writer.flush()?)
    }
}

/// Parses `vectors` color vectors per record
struct TextReader<'a> {
    scanner: &'a mut AsciiScanner<BufReader<File>>,
    record: Vec<u8>,
}

impl<'a> TextReader<'a> {
    fn new(scanner: &'a mut AsciiScanner<BufReader<File>>, vectors: usize) -> Self {
        Self {
            scanner,
            record: vec![0; vectors * SITE_RECORD_BYTES],
        }
    }
}

impl BodyStream for TextReader<'_> {
    fn next_record(&mut self) -> Result<&[u8]> {
        for out in self.record.chunks_exact_mut(SITE_RECORD_BYTES) {
            self.scanner
                .next_vector()?
                .encode(ByteOrder::native(), out);
        }
        Ok(&self.record)
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use ksprop_formats::Complex;
    use pretty_assertions::assert_eq;

    fn header(shape: &LatticeShape) -> PropHeader {
        PropHeader::new(shape, TimeStamp::new("Thu Oct 16 09:03:11 2026"))
    }

    fn record(x: f32) -> Vec<u8> {
        let v = ColorVector::new([
            Complex::new(x, 0.5),
            Complex::new(-x, 0.0),
            Complex::new(1.0, -0.25),
        ]);
        let mut out = vec![0; SITE_RECORD_BYTES];
        v.encode(ByteOrder::native(), &mut out);
        out
    }

    #[test]
    fn test_current_dialect_text() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prop.txt");
        let shape = LatticeShape::new([1, 1, 1, 1]).unwrap();

        let mut codec = AsciiCodec::create(&path, AsciiDialect::Current, header(&shape)).unwrap();
        {
            let mut stream = codec.color_writer(Color::ALL[0]).unwrap();
            stream.put_record(&record(2.0)).unwrap();
            stream.finish().unwrap();
        }
        codec.close().unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(
            text,
            "59355\n\"Thu Oct 16 09:03:11 2026\"\n1\t1\t1\t1\n0\n\
             2.0000000e+00\t5.0000000e-01\n\
             -2.0000000e+00\t0.0000000e+00\n\
             1.0000000e+00\t-2.5000000e-01\n"
        );
    }

    #[test]
    fn test_sequential_colors_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prop.txt");
        let shape = LatticeShape::new([2, 1, 1, 1]).unwrap();

        let mut codec = AsciiCodec::create(&path, AsciiDialect::Current, header(&shape)).unwrap();
        for color in Color::ALL {
            let mut stream = codec.color_writer(color).unwrap();
            stream.put_record(&record(color.index() as f32 + 1.0)).unwrap();
            stream.put_record(&record(10.0)).unwrap();
            stream.finish().unwrap();
        }
        codec.close().unwrap();

        let mut codec = AsciiCodec::open(&path, FormatKind::Ascii).unwrap();
        assert_eq!(codec.shape(), shape);
        assert_eq!(
            codec.header().time_stamp.as_str(),
            "Thu Oct 16 09:03:11 2026"
        );
        for color in Color::ALL {
            let mut block = codec.color_reader(color).unwrap();
            assert_eq!(block.stored, None);
            assert_eq!(
                block.stream.next_record().unwrap(),
                record(color.index() as f32 + 1.0).as_slice()
            );
            assert_eq!(block.stream.next_record().unwrap(), record(10.0).as_slice());
        }
    }

    #[test]
    fn test_out_of_order_color_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prop.txt");
        let shape = LatticeShape::new([1, 1, 1, 1]).unwrap();
        let mut codec = AsciiCodec::create(&path, AsciiDialect::Current, header(&shape)).unwrap();
        {
            let mut stream = codec.color_writer(Color::ALL[0]).unwrap();
            stream.put_record(&record(1.0)).unwrap();
            stream.finish().unwrap();
        }
        codec.close().unwrap();

        let mut codec = AsciiCodec::open(&path, FormatKind::Ascii).unwrap();
        assert!(matches!(
            codec.color_reader(Color::ALL[2]),
            Err(TransferError::Format(FormatError::ColorMismatch {
                expected: 2,
                found: 0
            }))
        ));
    }

    #[test]
    fn test_legacy_dialect_has_no_color_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("legacy.txt");
        let shape = LatticeShape::new([1, 1, 1, 1]).unwrap();
        let site: Vec<u8> = [record(1.0), record(2.0), record(3.0)].concat();

        let mut codec = AsciiCodec::create(&path, AsciiDialect::Legacy, header(&shape)).unwrap();
        assert!(codec.color_writer(Color::ALL[0]).is_err());
        {
            let mut stream = codec.propagator_writer().unwrap();
            stream.put_record(&site).unwrap();
            stream.finish().unwrap();
        }
        codec.close().unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("59354\n"));
        assert_eq!(text.lines().count(), 3 + 9);

        let mut codec = AsciiCodec::open(&path, FormatKind::LegacyAscii).unwrap();
        assert_eq!(codec.format(), FormatKind::LegacyAscii);
        let mut stream = codec.propagator_reader().unwrap();
        assert_eq!(stream.next_record().unwrap(), site.as_slice());
    }

    #[test]
    fn test_dialect_must_match_request() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("legacy.txt");
        std::fs::write(&path, "59354\n\"now\"\n1 1 1 1\n").unwrap();
        assert!(matches!(
            AsciiCodec::open(&path, FormatKind::Ascii),
            Err(TransferError::Format(FormatError::InvalidMagic { .. }))
        ));
    }
}
