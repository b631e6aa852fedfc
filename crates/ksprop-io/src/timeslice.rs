//! One file per timeslice.
//!
//! Each `<base>.t<t>` file holds the sites of one timeslice in natural
//! order, every site carrying all three colors. There is no header and no
//! checksum trailer. These files are only ever written.

use crate::buffer::BulkWriter;
use crate::comm::Communicator;
use crate::config::IoConfig;
use crate::error::{Result, TransferError};
use crate::field::FieldSlot;
use crate::file::funnel;
use crate::sitemap::SiteMap;
use crate::transport::{BodyStream, Direction, Traversal};
use ksprop_formats::{AsciiWriter, ByteOrder, COLORS, ColorVector, LatticeShape, SITE_RECORD_BYTES};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use tracing::info;

const RECORD_BYTES: usize = COLORS as usize * SITE_RECORD_BYTES;

/// Encoding of timeslice files
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimesliceFormat {
    /// Raw single-precision words in the configured write order
    Binary,
    /// One `%.7e\t%.7e` line per complex component
    Ascii,
}

/// Path of the file holding timeslice `t`
pub fn timeslice_path(base: &Path, t: usize) -> PathBuf {
    let mut name = base.as_os_str().to_owned();
    name.push(format!(".t{t}"));
    PathBuf::from(name)
}

/// Write all three colors of a propagator, one file per timeslice.
///
/// Collective. Returns the paths written, in `t` order.
pub fn write_timeslices<C, F>(
    comm: &C,
    base: &Path,
    shape: LatticeShape,
    map: &dyn SiteMap,
    fields: [&F; COLORS as usize],
    format: TimesliceFormat,
    config: &IoConfig,
) -> Result<Vec<PathBuf>>
where
    C: Communicator + ?Sized,
    F: FieldSlot,
{
    config.validate_for(comm.size())?;
    let order = match format {
        TimesliceFormat::Binary => config.write_order(),
        TimesliceFormat::Ascii => ByteOrder::native(),
    };
    let slots: [&dyn FieldSlot; COLORS as usize] = fields.map(|f| f as &dyn FieldSlot);
    let mut paths = Vec::with_capacity(shape.nt());

    for t in 0..shape.nt() {
        let path = timeslice_path(base, t);
        let traversal = Traversal::timeslice(shape, map, t, order);
        traversal.check(comm)?;
        let opened = if comm.rank() == config.io_rank {
            open_slice(&path, format, config).map(Some)
        } else {
            Ok(None)
        };
        funnel(
            comm,
            config,
            opened,
            &traversal,
            Direction::Write(&slots),
        )?;
        if comm.rank() == config.io_rank {
            info!("Wrote timeslice {} to {}", t, path.display());
        }
        paths.push(path);
    }
    Ok(paths)
}

fn open_slice(
    path: &Path,
    format: TimesliceFormat,
    config: &IoConfig,
) -> Result<Box<dyn BodyStream>> {
    let file = File::create(path).map_err(|e| TransferError::io("create", e))?;
    Ok(match format {
        TimesliceFormat::Binary => Box::new(BinarySlice(BulkWriter::new(
            file,
            config.buffer_records,
            RECORD_BYTES,
        ))),
        TimesliceFormat::Ascii => Box::new(TextSlice(AsciiWriter::new(BufWriter::new(file)))),
    })
}

struct BinarySlice(BulkWriter<File>);

impl BodyStream for BinarySlice {
    fn put_record(&mut self, record: &[u8]) -> Result<()> {
        self.0.push(record)
    }

    fn finish(&mut self) -> Result<()> {
        self.0.finish()
    }
}

struct TextSlice(AsciiWriter<BufWriter<File>>);

impl BodyStream for TextSlice {
    fn put_record(&mut self, record: &[u8]) -> Result<()> {
        for bytes in record.chunks_exact(SITE_RECORD_BYTES) {
            self.0
                .write_vector(&ColorVector::decode(bytes, ByteOrder::native()))?;
        }
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        Ok(self.0.flush()?)
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::comm::SingleRank;
    use crate::sitemap::SliceLayout;
    use ksprop_formats::Complex;

    #[test]
    fn test_timeslice_path() {
        assert_eq!(
            timeslice_path(Path::new("out/prop"), 12),
            PathBuf::from("out/prop.t12")
        );
    }

    #[test]
    fn test_binary_slices_hold_one_timeslice_each() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("prop");
        let shape = LatticeShape::new([2, 1, 1, 3]).unwrap();
        let map = SliceLayout::new(shape, 1);
        let field: Vec<ColorVector<f32>> = (0..shape.volume())
            .map(|i| ColorVector::new([Complex::new(i as f32, 0.0); 3]))
            .collect();
        let config = IoConfig {
            write_byte_order: crate::config::WriteOrder::Big,
            ..IoConfig::default()
        };

        let paths = write_timeslices(
            &SingleRank,
            &base,
            shape,
            &map,
            [&field, &field, &field],
            TimesliceFormat::Binary,
            &config,
        )
        .unwrap();
        assert_eq!(paths.len(), 3);

        let bytes = std::fs::read(&paths[2]).unwrap();
        assert_eq!(bytes.len(), 2 * RECORD_BYTES);
        // First word of timeslice 2 is site 4
        assert_eq!(&bytes[..4], &4.0f32.to_be_bytes());
        assert_eq!(&bytes[RECORD_BYTES..RECORD_BYTES + 4], &5.0f32.to_be_bytes());
    }

    #[test]
    fn test_ascii_slices_have_nine_lines_per_site() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("prop");
        let shape = LatticeShape::new([1, 1, 2, 2]).unwrap();
        let map = SliceLayout::new(shape, 1);
        let field: Vec<ColorVector<f64>> = vec![ColorVector::default(); 4];

        let paths = write_timeslices(
            &SingleRank,
            &base,
            shape,
            &map,
            [&field, &field, &field],
            TimesliceFormat::Ascii,
            &IoConfig::default(),
        )
        .unwrap();
        let text = std::fs::read_to_string(&paths[0]).unwrap();
        assert_eq!(text.lines().count(), 2 * 9);
        assert!(text.starts_with("0.0000000e+00\t0.0000000e+00\n"));
    }
}
