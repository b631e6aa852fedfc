//! Funnel transport
//!
//! One I/O rank moves every site record between the file and the ranks that
//! own the sites. All ranks walk the same natural-order traversal; at each
//! coordinate they ask the [`SiteMap`] for the owner and act according to
//! their role:
//!
//! - [`IoOwner`] (the I/O rank) streams records to or from a [`BodyStream`]
//!   and exchanges them with owners.
//! - [`DataOwner`] (every other rank) only exchanges its own sites with the
//!   I/O rank.
//!
//! Records travel as raw bytes in the file's byte order. On write, a data
//! owner waits for a ready token from the I/O rank each time ownership moves
//! to it, then sends its records; the I/O rank checksums each record as it
//! lands. On read, the I/O rank forwards padded records eagerly and the
//! receiving rank decodes and checksums them, skipping positions it does not
//! own. Partial checksums are combined with one XOR reduction per sum.
//!
//! A failure on any rank does not break the message pattern: the rank keeps
//! exchanging (zeroed) records until the traversal ends. Data owners then
//! report their status to the I/O rank, which broadcasts the combined status
//! so every rank fails together.

use crate::comm::Communicator;
use crate::config::IoConfig;
use crate::error::{Result, TransferError};
use crate::field::FieldSlot;
use crate::sitemap::SiteMap;
use crate::status::{agree, gather_failures};
use ksprop_formats::{
    ByteOrder, ChecksumAccumulator, Checksums, ColorVector, Coord, LatticeShape,
    SITE_RECORD_BYTES, byte_order::WORD_BYTES,
};
use std::ops::Range;
use tracing::debug;

/// Token the I/O rank sends before an owner may start sending
const READY_TOKEN: [u8; 4] = *b"rdy\0";

/// Record source or sink on the I/O rank.
///
/// A stream moves whole site records, each `vectors * 24` bytes in the
/// byte order of the traversal.
pub trait BodyStream {
    /// Append one record
    fn put_record(&mut self, _record: &[u8]) -> Result<()> {
        Err(TransferError::InvalidOperation(
            "stream does not accept records".to_string(),
        ))
    }

    /// Next record of the block
    fn next_record(&mut self) -> Result<&[u8]> {
        Err(TransferError::InvalidOperation(
            "stream does not produce records".to_string(),
        ))
    }

    /// Complete the block; called once after the last record of a write
    fn finish(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Stand-in stream for an I/O rank that has no usable file
#[derive(Debug, Default)]
struct Unavailable;

impl BodyStream for Unavailable {
    fn put_record(&mut self, _record: &[u8]) -> Result<()> {
        Err(TransferError::InvalidOperation(
            "no open file on the I/O rank".to_string(),
        ))
    }

    fn next_record(&mut self) -> Result<&[u8]> {
        Err(TransferError::InvalidOperation(
            "no open file on the I/O rank".to_string(),
        ))
    }
}

/// The set of sites visited by one transfer, in natural order
#[derive(Clone)]
pub struct Traversal<'m> {
    shape: LatticeShape,
    map: &'m dyn SiteMap,
    sites: Range<usize>,
    wire_order: ByteOrder,
}

impl<'m> Traversal<'m> {
    /// Every site of the lattice
    pub fn whole(shape: LatticeShape, map: &'m dyn SiteMap, wire_order: ByteOrder) -> Self {
        Self {
            shape,
            map,
            sites: 0..shape.volume(),
            wire_order,
        }
    }

    /// The sites of one timeslice
    pub fn timeslice(
        shape: LatticeShape,
        map: &'m dyn SiteMap,
        t: usize,
        wire_order: ByteOrder,
    ) -> Self {
        Self {
            shape,
            map,
            sites: shape.timeslice(t),
            wire_order,
        }
    }

    /// Number of sites visited
    pub fn len(&self) -> usize {
        self.sites.len()
    }

    /// Whether the traversal visits no site
    pub fn is_empty(&self) -> bool {
        self.sites.is_empty()
    }

    /// Byte order of records in flight
    pub const fn wire_order(&self) -> ByteOrder {
        self.wire_order
    }

    fn coords(&self) -> impl Iterator<Item = Coord> + '_ {
        self.sites.clone().map(move |i| self.shape.coord(i))
    }

    /// Fail unless the site map spans exactly the ranks of `comm`
    pub(crate) fn check<C: Communicator + ?Sized>(&self, comm: &C) -> Result<()> {
        if self.map.ranks() == comm.size() {
            Ok(())
        } else {
            Err(TransferError::Config(format!(
                "site map covers {} ranks, communicator has {}",
                self.map.ranks(),
                comm.size()
            )))
        }
    }
}

impl std::fmt::Debug for Traversal<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Traversal")
            .field("shape", &self.shape)
            .field("sites", &self.sites)
            .field("wire_order", &self.wire_order)
            .finish_non_exhaustive()
    }
}

/// Which way records move, with the caller's local storage.
///
/// Each site record carries one vector per field; a single color transfer
/// passes one field, whole-propagator formats pass three.
pub enum Direction<'a, 'f> {
    /// Local storage to file
    Write(&'a [&'f dyn FieldSlot]),
    /// File to local storage
    Read(&'a mut [&'f mut dyn FieldSlot]),
}

impl Direction<'_, '_> {
    /// Color vectors per site record
    pub fn vectors(&self) -> usize {
        match self {
            Self::Write(fields) => fields.len(),
            Self::Read(fields) => fields.len(),
        }
    }

    /// Bytes per site record
    pub fn record_bytes(&self) -> usize {
        self.vectors() * SITE_RECORD_BYTES
    }
}

/// One rank's part in a funneled transfer
pub trait IoMediator {
    /// Move every site of `traversal` in `direction`.
    ///
    /// Collective: every rank must call it with the same traversal and
    /// record size. Returns the checksums of the records in traversal order,
    /// identical on every rank.
    fn transfer(
        &mut self,
        traversal: &Traversal<'_>,
        direction: Direction<'_, '_>,
    ) -> Result<Checksums>;
}

/// Mediator role of the rank that owns the file
pub struct IoOwner<'a, C: ?Sized> {
    comm: &'a C,
    config: &'a IoConfig,
    stream: &'a mut dyn BodyStream,
}

impl<'a, C: Communicator + ?Sized> IoOwner<'a, C> {
    /// Role for the I/O rank, streaming through `stream`
    pub fn new(comm: &'a C, config: &'a IoConfig, stream: &'a mut dyn BodyStream) -> Self {
        Self {
            comm,
            config,
            stream,
        }
    }

    fn gather(
        &mut self,
        traversal: &Traversal<'_>,
        fields: &[&dyn FieldSlot],
        acc: &mut ChecksumAccumulator,
    ) -> Result<Option<TransferError>> {
        let io_rank = self.config.io_rank;
        let order = traversal.wire_order;
        let mut record = vec![0u8; fields.len() * SITE_RECORD_BYTES];
        let mut failure = None;
        let mut current = io_rank;

        for coord in traversal.coords() {
            let owner = traversal.map.owner_of(coord);
            if owner != current {
                if owner != io_rank {
                    debug!("Owner switch to rank {} at {:?}", owner, coord);
                    self.comm.send(owner, &READY_TOKEN)?;
                }
                current = owner;
            }

            if owner == io_rank {
                let slot = traversal.map.local_slot(coord);
                if let Err(e) = encode_site(fields, slot, order, &mut record) {
                    record.fill(0);
                    failure.get_or_insert(e);
                }
            } else {
                self.comm.receive(owner, &mut record)?;
            }

            absorb_record(acc, &record, order);
            if failure.is_none() {
                if let Err(e) = self.stream.put_record(&record) {
                    failure = Some(e);
                }
            }
        }

        if failure.is_none() {
            if let Err(e) = self.stream.finish() {
                failure = Some(e);
            }
        }
        Ok(failure)
    }

    fn scatter(
        &mut self,
        traversal: &Traversal<'_>,
        fields: &mut [&mut dyn FieldSlot],
        acc: &mut ChecksumAccumulator,
    ) -> Result<Option<TransferError>> {
        let io_rank = self.config.io_rank;
        let order = traversal.wire_order;
        let record_bytes = fields.len() * SITE_RECORD_BYTES;
        let words = (record_bytes / WORD_BYTES) as u64;
        let mut msg = vec![0u8; record_bytes + self.config.send_padding];
        let mut failure = None;

        for coord in traversal.coords() {
            let owner = traversal.map.owner_of(coord);

            let fetched = if failure.is_none() {
                match self.stream.next_record() {
                    Ok(record) if record.len() == record_bytes => {
                        msg[..record_bytes].copy_from_slice(record);
                        true
                    }
                    Ok(record) => {
                        failure = Some(TransferError::ShortTransfer {
                            expected: record_bytes,
                            actual: record.len(),
                        });
                        false
                    }
                    Err(e) => {
                        failure = Some(e);
                        false
                    }
                }
            } else {
                false
            };
            if !fetched {
                msg.fill(0);
            }

            if owner == io_rank {
                absorb_record(acc, &msg[..record_bytes], order);
                let slot = traversal.map.local_slot(coord);
                if let Err(e) = decode_site(fields, slot, order, &msg[..record_bytes]) {
                    failure.get_or_insert(e);
                }
            } else {
                self.comm.send(owner, &msg)?;
                acc.skip(words);
            }
        }
        Ok(failure)
    }
}

impl<C: Communicator + ?Sized> IoMediator for IoOwner<'_, C> {
    fn transfer(
        &mut self,
        traversal: &Traversal<'_>,
        direction: Direction<'_, '_>,
    ) -> Result<Checksums> {
        traversal.check(self.comm)?;
        self.comm.barrier()?;

        let mut acc = ChecksumAccumulator::new();
        let failure = match direction {
            Direction::Write(fields) => self.gather(traversal, fields, &mut acc)?,
            Direction::Read(fields) => self.scatter(traversal, fields, &mut acc)?,
        };

        let outcome = failure.map_or(Ok(()), Err);
        conclude(self.comm, self.config.io_rank, outcome, None, &acc)
    }
}

/// Mediator role of every rank except the I/O rank
pub struct DataOwner<'a, C: ?Sized> {
    comm: &'a C,
    config: &'a IoConfig,
}

impl<'a, C: Communicator + ?Sized> DataOwner<'a, C> {
    /// Role for a rank that holds data but no file
    pub const fn new(comm: &'a C, config: &'a IoConfig) -> Self {
        Self { comm, config }
    }

    fn send_own(
        &self,
        traversal: &Traversal<'_>,
        fields: &[&dyn FieldSlot],
    ) -> Result<Option<TransferError>> {
        let me = self.comm.rank();
        let io_rank = self.config.io_rank;
        let mut record = vec![0u8; fields.len() * SITE_RECORD_BYTES];
        let mut token = [0u8; READY_TOKEN.len()];
        let mut failure = None;
        let mut current = io_rank;

        for coord in traversal.coords() {
            let owner = traversal.map.owner_of(coord);
            if owner != current {
                if owner == me {
                    self.comm.receive(io_rank, &mut token)?;
                }
                current = owner;
            }
            if owner == me {
                let slot = traversal.map.local_slot(coord);
                if let Err(e) = encode_site(fields, slot, traversal.wire_order, &mut record) {
                    record.fill(0);
                    failure.get_or_insert(e);
                }
                self.comm.send(io_rank, &record)?;
            }
        }
        Ok(failure)
    }

    fn receive_own(
        &self,
        traversal: &Traversal<'_>,
        fields: &mut [&mut dyn FieldSlot],
        acc: &mut ChecksumAccumulator,
    ) -> Result<Option<TransferError>> {
        let me = self.comm.rank();
        let order = traversal.wire_order;
        let record_bytes = fields.len() * SITE_RECORD_BYTES;
        let words = (record_bytes / WORD_BYTES) as u64;
        let mut msg = vec![0u8; record_bytes + self.config.send_padding];
        let mut failure = None;

        for coord in traversal.coords() {
            if traversal.map.owner_of(coord) == me {
                self.comm.receive(self.config.io_rank, &mut msg)?;
                absorb_record(acc, &msg[..record_bytes], order);
                let slot = traversal.map.local_slot(coord);
                if let Err(e) = decode_site(fields, slot, order, &msg[..record_bytes]) {
                    failure.get_or_insert(e);
                }
            } else {
                acc.skip(words);
            }
        }
        Ok(failure)
    }
}

impl<C: Communicator + ?Sized> IoMediator for DataOwner<'_, C> {
    fn transfer(
        &mut self,
        traversal: &Traversal<'_>,
        direction: Direction<'_, '_>,
    ) -> Result<Checksums> {
        traversal.check(self.comm)?;
        self.comm.barrier()?;

        let mut acc = ChecksumAccumulator::new();
        let local = match direction {
            Direction::Write(fields) => self.send_own(traversal, fields)?,
            Direction::Read(fields) => self.receive_own(traversal, fields, &mut acc)?,
        };

        conclude(self.comm, self.config.io_rank, Ok(()), local, &acc)
    }
}

/// Run one transfer in whichever role the calling rank plays.
///
/// `stream` is only consulted on the I/O rank; if it is missing there the
/// transfer fails on every rank instead of hanging.
pub fn transfer<C: Communicator + ?Sized>(
    comm: &C,
    config: &IoConfig,
    stream: Option<&mut (dyn BodyStream + '_)>,
    traversal: &Traversal<'_>,
    direction: Direction<'_, '_>,
) -> Result<Checksums> {
    if comm.rank() != config.io_rank {
        return DataOwner::new(comm, config).transfer(traversal, direction);
    }
    match stream {
        Some(stream) => IoOwner::new(comm, config, stream).transfer(traversal, direction),
        None => IoOwner::new(comm, config, &mut Unavailable).transfer(traversal, direction),
    }
}

/// Closing barrier, status agreement and checksum reduction.
///
/// Failures seen by data owners are gathered on the I/O rank first, so the
/// broadcast status covers every rank. A failing data owner keeps its own
/// error; the rest see the agreed status.
fn conclude<C: Communicator + ?Sized>(
    comm: &C,
    io_rank: usize,
    io_outcome: Result<()>,
    local: Option<TransferError>,
    acc: &ChecksumAccumulator,
) -> Result<Checksums> {
    comm.barrier()?;
    let peer = gather_failures(comm, io_rank, local.as_ref())?;
    let io_outcome = match (io_outcome, peer) {
        (Ok(()), Some((rank, status))) => Err(TransferError::PeerFailed { rank, status }),
        (outcome, _) => outcome,
    };
    if let Err(e) = agree(comm, io_rank, io_outcome) {
        return Err(local.unwrap_or(e));
    }

    let partial = acc.sums();
    Ok(Checksums::new(
        comm.xor_reduce32(partial.sum29)?,
        comm.xor_reduce32(partial.sum31)?,
    ))
}

fn encode_site(
    fields: &[&dyn FieldSlot],
    slot: usize,
    order: ByteOrder,
    record: &mut [u8],
) -> Result<()> {
    for (field, out) in fields.iter().zip(record.chunks_exact_mut(SITE_RECORD_BYTES)) {
        field.wire_site(slot)?.encode(order, out);
    }
    Ok(())
}

fn decode_site(
    fields: &mut [&mut dyn FieldSlot],
    slot: usize,
    order: ByteOrder,
    record: &[u8],
) -> Result<()> {
    for (field, bytes) in fields.iter_mut().zip(record.chunks_exact(SITE_RECORD_BYTES)) {
        field.store_wire_site(slot, &ColorVector::decode(bytes, order))?;
    }
    Ok(())
}

fn absorb_record(acc: &mut ChecksumAccumulator, record: &[u8], order: ByteOrder) {
    for chunk in record.chunks_exact(WORD_BYTES) {
        let mut raw = [0u8; WORD_BYTES];
        raw.copy_from_slice(chunk);
        acc.absorb(order.read_u32(raw));
    }
}
