//! Funneled serial I/O of distributed staggered quark propagators
//!
#![allow(clippy::cast_possible_truncation)] // u64 file offsets and sizes narrow to usize
#![allow(clippy::cast_lossless)] // Sometimes clearer than From
#![allow(clippy::uninlined_format_args)] // Backwards compatibility
#![allow(clippy::float_cmp)] // Round trips are compared bit for bit
#![allow(clippy::cast_precision_loss)] // Synthetic field values
//! A propagator lives scattered over many ranks, each owning a disjoint set
//! of lattice sites, while the file on disk is a single natural-order
//! stream. This crate moves the data between the two through one I/O rank:
//! every other rank only exchanges its own site records with that rank, so
//! memory stays bounded and the file bytes do not depend on how many ranks
//! took part.
//!
//! # Layers
//!
//! - [`comm`]: the communication fabric ([`Communicator`]) with an
//!   in-process [`LocalCluster`] and a [`SingleRank`] fallback
//! - [`sitemap`]: which rank owns which site
//! - [`transport`]: the funnel itself, in [`IoOwner`] and [`DataOwner`] roles
//! - [`codec`]: binary and text file encodings behind [`PropagatorCodec`]
//! - [`file`]: the collective open, transfer and close API, [`PropFile`]
//! - [`timeslice`]: one headerless file per timeslice
//!
//! # Example
//!
//! ```rust
//! use ksprop_formats::{Color, ColorVector, Complex, LatticeShape};
//! use ksprop_io::{Communicator, FormatKind, IoConfig, LocalCluster, PropFile, SiteMap, SliceLayout};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let dir = tempfile::tempdir()?;
//! let path = dir.path().join("prop");
//! let shape = LatticeShape::new([2, 2, 2, 2])?;
//! let map = SliceLayout::new(shape, 4);
//!
//! let sums = LocalCluster::new(4).run(|comm| {
//!     let rank = comm.rank();
//!     let field: Vec<ColorVector<f64>> = (0..map.sites_on(rank))
//!         .map(|i| ColorVector::new([Complex::new((rank * 10 + i) as f64, 0.0); 3]))
//!         .collect();
//!     let mut file = PropFile::create(&comm, &path, shape, FormatKind::Binary, IoConfig::default())?;
//!     let sums = file.write_color(&map, Color::ALL[0], &field)?;
//!     file.close()?;
//!     Ok::<_, ksprop_io::TransferError>(sums)
//! });
//! assert!(sums.iter().all(|s| s.as_ref().ok() == sums[0].as_ref().ok()));
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

pub mod buffer;
pub mod codec;
pub mod comm;
pub mod config;
pub mod error;
pub mod field;
pub mod file;
pub mod sitemap;
pub mod status;
pub mod timeslice;
pub mod transport;

pub use buffer::{BulkReader, BulkWriter};
pub use codec::{FormatKind, PropagatorCodec, create_codec, open_codec};
pub use comm::{Communicator, LocalCluster, LocalComm, SingleRank};
pub use config::{IoConfig, WriteOrder};
pub use error::{CommError, Result, TransferError};
pub use field::{FieldSlot, zeroed_field};
pub use file::{ChecksumReport, OpenMode, PropFile, Verdict};
pub use sitemap::{HypercubeLayout, RoundRobinLayout, SiteMap, SliceLayout};
pub use status::{StatusCode, agree, gather_failures};
pub use timeslice::{TimesliceFormat, timeslice_path, write_timeslices};
pub use transport::{BodyStream, DataOwner, Direction, IoMediator, IoOwner, Traversal, transfer};
