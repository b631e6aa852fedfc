//! Communication fabric consumed by the funnel transport.
//!
//! The transport only needs blocking point-to-point messages, a barrier, a
//! broadcast and a 32-bit XOR reduction. Two implementations ship with the
//! crate: [`SingleRank`] for serial runs and [`LocalCluster`], which runs
//! every rank on its own thread inside one process.

mod local;
mod single;

pub use local::{LocalCluster, LocalComm};
pub use single::SingleRank;

use crate::error::CommError;

/// Blocking collective and point-to-point operations over a fixed set of ranks.
///
/// Every rank must issue collective calls in the same order. Calls block
/// until the matching peers arrive; there are no timeouts.
pub trait Communicator {
    /// Index of the calling rank
    fn rank(&self) -> usize;

    /// Number of ranks
    fn size(&self) -> usize;

    /// Send `payload` to `dest`
    fn send(&self, dest: usize, payload: &[u8]) -> Result<(), CommError>;

    /// Receive a message from `source` into `buf`; lengths must agree
    fn receive(&self, source: usize, buf: &mut [u8]) -> Result<(), CommError>;

    /// Wait until every rank has reached the barrier
    fn barrier(&self) -> Result<(), CommError>;

    /// Replace `buf` on every rank with the contents held by `root`
    fn broadcast(&self, buf: &mut [u8], root: usize) -> Result<(), CommError>;

    /// Bitwise XOR of `word` over all ranks, returned on every rank
    fn xor_reduce32(&self, word: u32) -> Result<u32, CommError>;

    /// Broadcast a single 32-bit word
    fn broadcast_u32(&self, word: u32, root: usize) -> Result<u32, CommError> {
        let mut buf = word.to_ne_bytes();
        self.broadcast(&mut buf, root)?;
        Ok(u32::from_ne_bytes(buf))
    }
}

impl<C: Communicator + ?Sized> Communicator for &C {
    fn rank(&self) -> usize {
        (**self).rank()
    }

    fn size(&self) -> usize {
        (**self).size()
    }

    fn send(&self, dest: usize, payload: &[u8]) -> Result<(), CommError> {
        (**self).send(dest, payload)
    }

    fn receive(&self, source: usize, buf: &mut [u8]) -> Result<(), CommError> {
        (**self).receive(source, buf)
    }

    fn barrier(&self) -> Result<(), CommError> {
        (**self).barrier()
    }

    fn broadcast(&self, buf: &mut [u8], root: usize) -> Result<(), CommError> {
        (**self).broadcast(buf, root)
    }

    fn xor_reduce32(&self, word: u32) -> Result<u32, CommError> {
        (**self).xor_reduce32(word)
    }
}
