//! ASCII propagator encoding
//!
//! ```text
//! 59355
//! "Thu Oct 16 09:03:11 2026"
//! nx	ny	nz	nt
//! color                      (current dialect only, once per color block)
//! re	im                   (one line per complex component, %.7e)
//! ```
//!
//! The legacy dialect (magic 59354) has no color lines; every site carries
//! all three source colors back to back. Text is byte-order neutral and
//! carries no checksums.

use crate::error::{FormatError, Result};
use crate::header::{KSPROP_VERSION_NUMBER, KSPROP_VERSION_NUMBER_V0, TimeStamp};
use crate::shape::{AXES, LatticeShape};
use crate::site::{COMPONENTS, ColorVector, Complex, WireReal};
use std::io::{BufRead, Write};

/// Flavor of ASCII file, selected by magic number
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AsciiDialect {
    /// Per-color blocks introduced by a color line
    Current,
    /// All three colors interleaved per site
    Legacy,
}

impl AsciiDialect {
    /// Magic number written at the top of the file
    pub const fn magic(self) -> i32 {
        match self {
            Self::Current => KSPROP_VERSION_NUMBER,
            Self::Legacy => KSPROP_VERSION_NUMBER_V0,
        }
    }

    /// Dialect for a magic number, if it names one
    pub const fn from_magic(magic: i32) -> Option<Self> {
        match magic {
            KSPROP_VERSION_NUMBER => Some(Self::Current),
            KSPROP_VERSION_NUMBER_V0 => Some(Self::Legacy),
            _ => None,
        }
    }
}

/// Format a value the way C's `%.7e` does (`-1.2345670e-05`)
pub fn format_sci(value: f64) -> String {
    if value.is_nan() {
        return "nan".to_string();
    }
    if value.is_infinite() {
        return if value < 0.0 { "-inf" } else { "inf" }.to_string();
    }
    let rust = format!("{value:.7e}");
    let (mantissa, exponent) = rust.split_once('e').unwrap_or((rust.as_str(), "0"));
    let exponent: i32 = exponent.parse().unwrap_or(0);
    let sign = if exponent < 0 { '-' } else { '+' };
    format!("{mantissa}e{sign}{:02}", exponent.unsigned_abs())
}

/// Parsed ASCII header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AsciiHeader {
    /// Dialect named by the magic number
    pub dialect: AsciiDialect,
    /// Time stamp text without quotes
    pub time_stamp: String,
    /// Stored extents nx, ny, nz, nt
    pub dims: [i32; AXES],
}

impl AsciiHeader {
    /// Read the header lines
    pub fn read<R: BufRead>(scanner: &mut AsciiScanner<R>) -> Result<Self> {
        let magic = scanner.next_i32("magic number")?;
        let dialect = AsciiDialect::from_magic(magic).ok_or(FormatError::InvalidMagic {
            expected: KSPROP_VERSION_NUMBER,
            found: magic,
        })?;
        let time_stamp = scanner.next_quoted("time stamp")?;
        let mut dims = [0i32; AXES];
        for d in &mut dims {
            *d = scanner.next_i32("lattice dimensions")?;
        }
        Ok(Self {
            dialect,
            time_stamp,
            dims,
        })
    }
}

/// Line-oriented writer for ASCII propagator files
#[derive(Debug)]
pub struct AsciiWriter<W> {
    inner: W,
}

impl<W: Write> AsciiWriter<W> {
    /// Wrap an output stream
    pub const fn new(inner: W) -> Self {
        Self { inner }
    }

    /// Write magic, quoted time stamp and extents
    pub fn write_header(
        &mut self,
        dialect: AsciiDialect,
        time_stamp: &TimeStamp,
        shape: &LatticeShape,
    ) -> Result<()> {
        let [nx, ny, nz, nt] = shape.dims();
        writeln!(self.inner, "{}", dialect.magic())?;
        writeln!(self.inner, "\"{}\"", time_stamp.as_str())?;
        writeln!(self.inner, "{nx}\t{ny}\t{nz}\t{nt}")?;
        Ok(())
    }

    /// Write the line that opens a color block
    pub fn write_color(&mut self, color: u32) -> Result<()> {
        writeln!(self.inner, "{color}")?;
        Ok(())
    }

    /// Write one color vector, one component per line
    pub fn write_vector(&mut self, v: &ColorVector<WireReal>) -> Result<()> {
        for z in &v.c {
            writeln!(
                self.inner,
                "{}\t{}",
                format_sci(f64::from(z.re)),
                format_sci(f64::from(z.im))
            )?;
        }
        Ok(())
    }

    /// Flush buffered output
    pub fn flush(&mut self) -> Result<()> {
        self.inner.flush()?;
        Ok(())
    }

    /// Unwrap the output stream
    pub fn into_inner(self) -> W {
        self.inner
    }
}

/// Whitespace-token reader for ASCII propagator files
#[derive(Debug)]
pub struct AsciiScanner<R> {
    inner: R,
}

impl<R: BufRead> AsciiScanner<R> {
    /// Wrap an input stream
    pub const fn new(inner: R) -> Self {
        Self { inner }
    }

    fn peek(&mut self) -> Result<Option<u8>> {
        Ok(self.inner.fill_buf()?.first().copied())
    }

    fn skip_whitespace(&mut self) -> Result<()> {
        while let Some(b) = self.peek()? {
            if !b.is_ascii_whitespace() {
                break;
            }
            self.inner.consume(1);
        }
        Ok(())
    }

    fn take_until(&mut self, stop: impl Fn(u8) -> bool) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        while let Some(b) = self.peek()? {
            if stop(b) {
                break;
            }
            out.push(b);
            self.inner.consume(1);
        }
        Ok(out)
    }

    /// Next whitespace-delimited token
    pub fn next_token(&mut self, what: &'static str) -> Result<String> {
        self.skip_whitespace()?;
        let token = self.take_until(|b| b.is_ascii_whitespace())?;
        if token.is_empty() {
            return Err(FormatError::ascii(what, "unexpected end of file"));
        }
        String::from_utf8(token).map_err(|e| FormatError::ascii(what, e.to_string()))
    }

    /// Next token as a decimal integer
    pub fn next_i32(&mut self, what: &'static str) -> Result<i32> {
        let token = self.next_token(what)?;
        token
            .parse()
            .map_err(|_| FormatError::ascii(what, format!("expected integer, found {token:?}")))
    }

    /// Next token as a single-precision value
    pub fn next_f32(&mut self, what: &'static str) -> Result<f32> {
        let token = self.next_token(what)?;
        token
            .parse()
            .map_err(|_| FormatError::ascii(what, format!("expected number, found {token:?}")))
    }

    /// Next double-quoted string, quotes removed
    pub fn next_quoted(&mut self, what: &'static str) -> Result<String> {
        self.skip_whitespace()?;
        if self.peek()? != Some(b'"') {
            return Err(FormatError::ascii(what, "expected opening quote"));
        }
        self.inner.consume(1);
        let body = self.take_until(|b| b == b'"')?;
        if self.peek()? != Some(b'"') {
            return Err(FormatError::ascii(what, "missing closing quote"));
        }
        self.inner.consume(1);
        String::from_utf8(body).map_err(|e| FormatError::ascii(what, e.to_string()))
    }

    /// Next color vector, three lines of `re im`
    pub fn next_vector(&mut self) -> Result<ColorVector<WireReal>> {
        let mut c = [Complex::default(); COMPONENTS];
        for z in &mut c {
            z.re = self.next_f32("site record")?;
            z.im = self.next_f32("site record")?;
        }
        Ok(ColorVector { c })
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Cursor;

    #[test]
    fn test_format_sci_matches_c() {
        assert_eq!(format_sci(1.0), "1.0000000e+00");
        assert_eq!(format_sci(-2.5e-5), "-2.5000000e-05");
        assert_eq!(format_sci(0.0), "0.0000000e+00");
        assert_eq!(format_sci(123_456_789.0), "1.2345679e+08");
        assert_eq!(format_sci(1.0e-300), "1.0000000e-300");
    }

    #[test]
    fn test_header_round_trip() {
        let shape = LatticeShape::new([4, 4, 4, 8]).unwrap();
        let mut writer = AsciiWriter::new(Vec::new());
        writer
            .write_header(AsciiDialect::Current, &TimeStamp::new("Thu Oct 16 09:03:11 2026"), &shape)
            .unwrap();
        let text = String::from_utf8(writer.into_inner()).unwrap();
        assert_eq!(text, "59355\n\"Thu Oct 16 09:03:11 2026\"\n4\t4\t4\t8\n");

        let mut scanner = AsciiScanner::new(Cursor::new(text.into_bytes()));
        let header = AsciiHeader::read(&mut scanner).unwrap();
        assert_eq!(header.dialect, AsciiDialect::Current);
        assert_eq!(header.time_stamp, "Thu Oct 16 09:03:11 2026");
        assert_eq!(header.dims, [4, 4, 4, 8]);
    }

    #[test]
    fn test_legacy_magic_selects_legacy_dialect() {
        let mut scanner = AsciiScanner::new(Cursor::new(b"59354\n \"old\"\n2 2 2 2\n".to_vec()));
        let header = AsciiHeader::read(&mut scanner).unwrap();
        assert_eq!(header.dialect, AsciiDialect::Legacy);
        assert_eq!(header.time_stamp, "old");
    }

    #[test]
    fn test_unknown_magic_is_rejected() {
        let mut scanner = AsciiScanner::new(Cursor::new(b"12345\n\"x\"\n1 1 1 1\n".to_vec()));
        assert!(matches!(
            AsciiHeader::read(&mut scanner),
            Err(FormatError::InvalidMagic { found: 12345, .. })
        ));
    }

    #[test]
    fn test_vector_lines() {
        let v = ColorVector::new([
            Complex::new(0.5, -0.25),
            Complex::new(1.0, 2.0),
            Complex::new(-3.0, 0.125),
        ]);
        let mut writer = AsciiWriter::new(Vec::new());
        writer.write_color(1).unwrap();
        writer.write_vector(&v).unwrap();
        let text = String::from_utf8(writer.into_inner()).unwrap();
        assert!(text.starts_with("1\n5.0000000e-01\t-2.5000000e-01\n"));

        let mut scanner = AsciiScanner::new(Cursor::new(text.into_bytes()));
        assert_eq!(scanner.next_i32("color").unwrap(), 1);
        assert_eq!(scanner.next_vector().unwrap(), v);
    }

    #[test]
    fn test_truncated_record_is_an_error() {
        let mut scanner = AsciiScanner::new(Cursor::new(b"1.0 2.0\n3.0".to_vec()));
        assert!(matches!(
            scanner.next_vector(),
            Err(FormatError::AsciiParse { what: "site record", .. })
        ));
    }
}
