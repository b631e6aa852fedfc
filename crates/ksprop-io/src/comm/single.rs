use super::Communicator;
use crate::error::CommError;

/// Communicator of exactly one rank.
///
/// Every site is local, so the transport never sends point-to-point
/// messages; collectives are no-ops.
#[derive(Debug, Clone, Copy, Default)]
pub struct SingleRank;

impl Communicator for SingleRank {
    fn rank(&self) -> usize {
        0
    }

    fn size(&self) -> usize {
        1
    }

    fn send(&self, dest: usize, _payload: &[u8]) -> Result<(), CommError> {
        Err(CommError::NoPeer(dest))
    }

    fn receive(&self, source: usize, _buf: &mut [u8]) -> Result<(), CommError> {
        Err(CommError::NoPeer(source))
    }

    fn barrier(&self) -> Result<(), CommError> {
        Ok(())
    }

    fn broadcast(&self, _buf: &mut [u8], root: usize) -> Result<(), CommError> {
        if root == 0 {
            Ok(())
        } else {
            Err(CommError::InvalidRank { rank: root, size: 1 })
        }
    }

    fn xor_reduce32(&self, word: u32) -> Result<u32, CommError> {
        Ok(word)
    }
}
