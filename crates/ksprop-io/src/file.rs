//! Open, transfer and close propagator files collectively.
//!
//! Every function here is collective: all ranks call it in the same order
//! with equal arguments (apart from their local fields). Only the I/O rank
//! holds a codec; the others learn the header, byte order and format from a
//! descriptor the I/O rank broadcasts at open time.
//!
//! # Example
//!
//! ```rust
//! use ksprop_formats::{Color, ColorVector, ExpectedShape, LatticeShape};
//! use ksprop_io::{FormatKind, IoConfig, PropFile, SingleRank, SliceLayout, zeroed_field};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let dir = tempfile::tempdir()?;
//! let path = dir.path().join("prop");
//! let shape = LatticeShape::new([2, 2, 2, 2])?;
//! let map = SliceLayout::new(shape, 1);
//! let config = IoConfig::default();
//!
//! let field: Vec<ColorVector<f64>> = zeroed_field(16);
//! let mut file = PropFile::create(&SingleRank, &path, shape, FormatKind::Binary, config.clone())?;
//! for color in Color::ALL {
//!     file.write_color(&map, color, &field)?;
//! }
//! file.close()?;
//!
//! let mut back: Vec<ColorVector<f64>> = zeroed_field(16);
//! let mut file = PropFile::open(&SingleRank, &path, ExpectedShape::Discover, None, config)?;
//! let report = file.read_color(&map, Color::ALL[1], &mut back)?;
//! assert!(report.is_ok());
//! file.close()?;
//! # Ok(())
//! # }
//! ```

use crate::codec::{FormatKind, PropagatorCodec, create_codec, open_codec};
use crate::comm::Communicator;
use crate::config::IoConfig;
use crate::error::{Result, TransferError};
use crate::field::FieldSlot;
use crate::sitemap::SiteMap;
use crate::status::agree;
use crate::transport::{BodyStream, Direction, Traversal, transfer};
use ksprop_formats::{
    ByteOrder, COLORS, Checksums, Color, ExpectedShape, FormatError, HEADER_BYTES, InfoFile,
    InfoItem, KSPROP_VERSION_NUMBER_V0, LatticeShape, PropHeader, TimeStamp, info_path,
};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

const DESCRIPTOR_BYTES: usize = HEADER_BYTES as usize + 8;

/// Direction a file was opened in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    /// Opened with [`PropFile::open`]
    Read,
    /// Opened with [`PropFile::create`]
    Write,
}

/// Outcome of comparing computed and stored checksums
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Stored and computed checksums agree
    Match,
    /// Stored and computed checksums differ
    Mismatch,
    /// The format stores no checksums
    Unchecked,
}

/// Checksums of one color block read from file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChecksumReport {
    /// Color block
    pub color: Color,
    /// Checksums of the records as decoded
    pub computed: Checksums,
    /// Checksums stored on file, when the format keeps them
    pub stored: Option<Checksums>,
    /// Comparison result
    pub verdict: Verdict,
}

impl ChecksumReport {
    fn new(color: Color, computed: Checksums, stored: Option<Checksums>) -> Self {
        let verdict = match stored {
            Some(stored) if stored == computed => Verdict::Match,
            Some(_) => Verdict::Mismatch,
            None => Verdict::Unchecked,
        };
        Self {
            color,
            computed,
            stored,
            verdict,
        }
    }

    /// Whether the block passed (or could not be checked)
    pub fn is_ok(&self) -> bool {
        self.verdict != Verdict::Mismatch
    }
}

/// A propagator file open on every rank of a communicator
pub struct PropFile<'c, C: ?Sized> {
    comm: &'c C,
    config: IoConfig,
    path: PathBuf,
    mode: OpenMode,
    header: PropHeader,
    shape: LatticeShape,
    byte_order: ByteOrder,
    format: FormatKind,
    codec: Option<Box<dyn PropagatorCodec>>,
    written: [Option<Checksums>; COLORS as usize],
    info_items: Vec<InfoItem>,
}

impl<'c, C: Communicator + ?Sized> PropFile<'c, C> {
    /// Create a file for writing.
    ///
    /// The I/O rank stamps the header with the current local time and
    /// writes it; the header is then shared with every rank.
    pub fn create(
        comm: &'c C,
        path: &Path,
        shape: LatticeShape,
        format: FormatKind,
        config: IoConfig,
    ) -> Result<Self> {
        config.validate_for(comm.size())?;
        let io_rank = config.io_rank;

        let local = if comm.rank() == io_rank {
            let header = match format {
                FormatKind::LegacyAscii => {
                    PropHeader::with_magic(KSPROP_VERSION_NUMBER_V0, &shape, TimeStamp::now())
                }
                FormatKind::Binary | FormatKind::Ascii => {
                    PropHeader::new(&shape, TimeStamp::now())
                }
            };
            create_codec(
                path,
                format,
                header,
                config.write_order(),
                config.buffer_records,
            )
            .map(Some)
        } else {
            Ok(None)
        };
        let codec = agree(comm, io_rank, local)?;
        let (header, byte_order, format) = share_descriptor(comm, io_rank, codec.as_deref())?;

        if comm.rank() == io_rank {
            info!(
                "Created {} file {} ({}, {})",
                format,
                path.display(),
                shape,
                byte_order
            );
        }

        Ok(Self {
            comm,
            config,
            path: path.to_path_buf(),
            mode: OpenMode::Write,
            header,
            shape,
            byte_order,
            format,
            codec,
            written: [None; COLORS as usize],
            info_items: Vec::new(),
        })
    }

    /// Open an existing file for reading.
    ///
    /// With [`ExpectedShape::Discover`] the stored extents are adopted;
    /// otherwise they must match exactly. With `format` unset the encoding
    /// is detected from the file contents.
    pub fn open(
        comm: &'c C,
        path: &Path,
        expected: ExpectedShape,
        format: Option<FormatKind>,
        config: IoConfig,
    ) -> Result<Self> {
        config.validate_for(comm.size())?;
        let io_rank = config.io_rank;

        let local = if comm.rank() == io_rank {
            open_codec(path, format, config.buffer_records).and_then(|codec| {
                codec.header().resolve_shape(&expected)?;
                Ok(Some(codec))
            })
        } else {
            Ok(None)
        };
        let codec = agree(comm, io_rank, local)?;
        let (header, byte_order, format) = share_descriptor(comm, io_rank, codec.as_deref())?;
        let shape = header.resolve_shape(&expected)?;

        if comm.rank() == io_rank {
            info!(
                "Opened {} file {} ({}, {}, written {})",
                format,
                path.display(),
                shape,
                byte_order,
                header.time_stamp.as_str()
            );
        }

        Ok(Self {
            comm,
            config,
            path: path.to_path_buf(),
            mode: OpenMode::Read,
            header,
            shape,
            byte_order,
            format,
            codec,
            written: [None; COLORS as usize],
            info_items: Vec::new(),
        })
    }

    /// Lattice the file describes
    pub const fn shape(&self) -> LatticeShape {
        self.shape
    }

    /// File header, identical on every rank
    pub const fn header(&self) -> &PropHeader {
        &self.header
    }

    /// Byte order of the file
    pub const fn byte_order(&self) -> ByteOrder {
        self.byte_order
    }

    /// Encoding of the file
    pub const fn format(&self) -> FormatKind {
        self.format
    }

    /// Direction the file was opened in
    pub const fn mode(&self) -> OpenMode {
        self.mode
    }

    /// Path of the file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether the calling rank holds the file handle
    pub fn is_io_rank(&self) -> bool {
        self.comm.rank() == self.config.io_rank
    }

    /// Add an application item to the info file written at close
    pub fn add_info(&mut self, item: InfoItem) {
        self.info_items.push(item);
    }

    fn require(&self, mode: OpenMode, per_color: bool) -> Result<()> {
        if self.mode != mode {
            return Err(TransferError::InvalidOperation(format!(
                "{} is open for {}",
                self.path.display(),
                match self.mode {
                    OpenMode::Read => "reading",
                    OpenMode::Write => "writing",
                }
            )));
        }
        if self.format.is_per_color() != per_color {
            return Err(TransferError::InvalidOperation(format!(
                "{} files store {}",
                self.format,
                if self.format.is_per_color() {
                    "one block per color"
                } else {
                    "whole propagators"
                }
            )));
        }
        Ok(())
    }

    /// Write one color of the propagator.
    ///
    /// Returns the checksums of the color block, identical on every rank.
    pub fn write_color<F: FieldSlot>(
        &mut self,
        map: &dyn SiteMap,
        color: Color,
        field: &F,
    ) -> Result<Checksums> {
        self.require(OpenMode::Write, true)?;
        let traversal = Traversal::whole(self.shape, map, self.byte_order);
        traversal.check(self.comm)?;
        let fields: [&dyn FieldSlot; 1] = [field];

        let opened = match self.codec.as_mut() {
            Some(codec) => codec.color_writer(color).map(Some),
            None => Ok(None),
        };
        let sums = funnel(
            self.comm,
            &self.config,
            opened,
            &traversal,
            Direction::Write(&fields),
        )?;

        let local = match self.codec.as_mut() {
            Some(codec) => codec.finish_color(color, sums),
            None => Ok(()),
        };
        agree(self.comm, self.config.io_rank, local)?;

        self.written[color.index() as usize] = Some(sums);
        if self.is_io_rank() {
            info!(
                "Wrote color {} to {} checksums {}",
                color,
                self.path.display(),
                sums
            );
        }
        Ok(sums)
    }

    /// Read one color of the propagator into `field`.
    ///
    /// Binary files allow colors in any order; text files must be read in
    /// file order. A checksum mismatch is logged and reported, or returned
    /// as [`TransferError::Integrity`] under `strict_checksums`.
    pub fn read_color<F: FieldSlot>(
        &mut self,
        map: &dyn SiteMap,
        color: Color,
        field: &mut F,
    ) -> Result<ChecksumReport> {
        self.require(OpenMode::Read, true)?;
        let traversal = Traversal::whole(self.shape, map, self.byte_order);
        traversal.check(self.comm)?;
        let mut fields: [&mut dyn FieldSlot; 1] = [field];

        let mut stored = None;
        let opened = match self.codec.as_mut() {
            Some(codec) => codec.color_reader(color).map(|block| {
                stored = block.stored;
                Some(block.stream)
            }),
            None => Ok(None),
        };
        let computed = funnel(
            self.comm,
            &self.config,
            opened,
            &traversal,
            Direction::Read(&mut fields),
        )?;

        let stored = share_checksums(self.comm, self.config.io_rank, stored)?;
        let report = ChecksumReport::new(color, computed, stored);
        self.judge(&report)?;
        Ok(report)
    }

    fn judge(&self, report: &ChecksumReport) -> Result<()> {
        let Some(stored) = report.stored else {
            return Ok(());
        };
        if report.verdict == Verdict::Mismatch {
            if self.is_io_rank() {
                warn!(
                    "Checksum violation color {} file {}: computed {}, read {}",
                    report.color,
                    self.path.display(),
                    report.computed,
                    stored
                );
            }
            if self.config.strict_checksums {
                return Err(TransferError::Integrity {
                    color: report.color.index(),
                    computed: report.computed,
                    stored,
                });
            }
        } else if self.is_io_rank() {
            info!(
                "Read color {} from {} checksums {} OK",
                report.color,
                self.path.display(),
                stored
            );
        }
        Ok(())
    }

    /// Write all three colors.
    ///
    /// Per-color formats write one block per color; the legacy text format
    /// writes a single block with every color per site. Returns the
    /// checksums of each block written.
    pub fn write_propagator<F: FieldSlot>(
        &mut self,
        map: &dyn SiteMap,
        fields: [&F; COLORS as usize],
    ) -> Result<Vec<Checksums>> {
        if self.format.is_per_color() {
            return Color::ALL
                .into_iter()
                .zip(fields)
                .map(|(color, field)| self.write_color(map, color, field))
                .collect();
        }

        self.require(OpenMode::Write, false)?;
        let traversal = Traversal::whole(self.shape, map, self.byte_order);
        traversal.check(self.comm)?;
        let slots: [&dyn FieldSlot; COLORS as usize] = fields.map(|f| f as &dyn FieldSlot);
        let opened = match self.codec.as_mut() {
            Some(codec) => codec.propagator_writer().map(Some),
            None => Ok(None),
        };
        let sums = funnel(
            self.comm,
            &self.config,
            opened,
            &traversal,
            Direction::Write(&slots),
        )?;
        if self.is_io_rank() {
            info!("Wrote propagator to {}", self.path.display());
        }
        Ok(vec![sums])
    }

    /// Read all three colors.
    ///
    /// Returns one report per color for per-color formats and none for the
    /// legacy text format, which stores no checksums.
    pub fn read_propagator<F: FieldSlot>(
        &mut self,
        map: &dyn SiteMap,
        fields: [&mut F; COLORS as usize],
    ) -> Result<Vec<ChecksumReport>> {
        if self.format.is_per_color() {
            return Color::ALL
                .into_iter()
                .zip(fields)
                .map(|(color, field)| self.read_color(map, color, field))
                .collect();
        }

        self.require(OpenMode::Read, false)?;
        let traversal = Traversal::whole(self.shape, map, self.byte_order);
        traversal.check(self.comm)?;
        let mut slots: [&mut dyn FieldSlot; COLORS as usize] =
            fields.map(|f| f as &mut dyn FieldSlot);
        let opened = match self.codec.as_mut() {
            Some(codec) => codec.propagator_reader().map(Some),
            None => Ok(None),
        };
        funnel(
            self.comm,
            &self.config,
            opened,
            &traversal,
            Direction::Read(&mut slots),
        )?;
        if self.is_io_rank() {
            info!("Read propagator from {}", self.path.display());
        }
        Ok(Vec::new())
    }

    /// Close the file on every rank.
    ///
    /// Files opened for writing get a `<file>.info` sidecar (unless disabled
    /// or legacy text) listing the header fields and the checksums of every
    /// color written.
    pub fn close(mut self) -> Result<()> {
        self.comm.barrier()?;
        let local = match self.codec.take() {
            Some(mut codec) => codec.close().and_then(|()| self.write_info()),
            None => Ok(()),
        };
        agree(self.comm, self.config.io_rank, local)?;
        if self.is_io_rank() {
            info!("Closed {}", self.path.display());
        }
        Ok(())
    }

    fn write_info(&self) -> Result<()> {
        if self.mode != OpenMode::Write
            || !self.config.write_info_file
            || self.format == FormatKind::LegacyAscii
        {
            return Ok(());
        }
        let sums: Vec<Checksums> = self.written.iter().flatten().copied().collect();
        let mut info = InfoFile::for_propagator(
            self.header.magic_number,
            &self.header.time_stamp,
            &sums,
            &self.shape,
        );
        info.extend(self.info_items.iter().cloned());

        let path = info_path(&self.path);
        let file = File::create(&path).map_err(|e| TransferError::io("create info", e))?;
        let mut out = BufWriter::new(file);
        info.write_to(&mut out)
            .and_then(|()| out.flush())
            .map_err(|e| TransferError::io("write info", e))
    }
}

impl<C: ?Sized> std::fmt::Debug for PropFile<'_, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PropFile")
            .field("path", &self.path)
            .field("mode", &self.mode)
            .field("format", &self.format)
            .field("shape", &self.shape)
            .field("byte_order", &self.byte_order)
            .finish_non_exhaustive()
    }
}

/// Agree on the block the I/O rank opened, then run the transfer.
///
/// When the I/O rank could not open the block every rank returns before
/// the traversal, leaving local fields untouched.
pub(crate) fn funnel<'s, C: Communicator + ?Sized>(
    comm: &C,
    config: &IoConfig,
    opened: Result<Option<Box<dyn BodyStream + 's>>>,
    traversal: &Traversal<'_>,
    direction: Direction<'_, '_>,
) -> Result<Checksums> {
    let mut stream = agree(comm, config.io_rank, opened)?;
    transfer(comm, config, stream.as_deref_mut(), traversal, direction)
}

/// Broadcast header, byte order and format from the I/O rank
fn share_descriptor<C: Communicator + ?Sized>(
    comm: &C,
    io_rank: usize,
    codec: Option<&dyn PropagatorCodec>,
) -> Result<(PropHeader, ByteOrder, FormatKind)> {
    let mut buf = vec![0u8; DESCRIPTOR_BYTES];
    if let Some(codec) = codec {
        let header = codec.header().to_native_bytes()?;
        buf[..header.len()].copy_from_slice(&header);
        let order: u32 = match codec.byte_order() {
            ByteOrder::Little => 0,
            ByteOrder::Big => 1,
        };
        let at = HEADER_BYTES as usize;
        buf[at..at + 4].copy_from_slice(&order.to_ne_bytes());
        buf[at + 4..].copy_from_slice(&codec.format().to_u32().to_ne_bytes());
    }
    comm.broadcast(&mut buf, io_rank)?;

    let header = PropHeader::from_native_bytes(&buf[..HEADER_BYTES as usize])?;
    let at = HEADER_BYTES as usize;
    let word = |i: usize| {
        let mut raw = [0u8; 4];
        raw.copy_from_slice(&buf[at + 4 * i..at + 4 * i + 4]);
        u32::from_ne_bytes(raw)
    };
    let order = if word(0) == 0 {
        ByteOrder::Little
    } else {
        ByteOrder::Big
    };
    let format = FormatKind::from_u32(word(1)).ok_or(FormatError::UnknownFormat)?;
    Ok((header, order, format))
}

/// Broadcast the stored checksums of a block from the I/O rank
fn share_checksums<C: Communicator + ?Sized>(
    comm: &C,
    io_rank: usize,
    stored: Option<Checksums>,
) -> Result<Option<Checksums>> {
    let present = comm.broadcast_u32(u32::from(stored.is_some()), io_rank)?;
    let sums = stored.unwrap_or_default();
    let sum29 = comm.broadcast_u32(sums.sum29, io_rank)?;
    let sum31 = comm.broadcast_u32(sums.sum31, io_rank)?;
    Ok((present != 0).then_some(Checksums::new(sum29, sum31)))
}
