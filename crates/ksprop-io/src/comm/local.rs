//! In-process cluster: one thread per rank, mailboxes behind a single lock.

use super::Communicator;
use crate::error::CommError;
use parking_lot::{Condvar, Mutex};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

/// Separates collective traffic from point-to-point traffic between the
/// same pair of ranks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Lane {
    PointToPoint,
    Collective,
}

#[derive(Debug, Default)]
struct HubState {
    queues: HashMap<(usize, usize, Lane), VecDeque<Vec<u8>>>,
    barrier_arrived: usize,
    barrier_generation: u64,
    lost: bool,
}

#[derive(Debug)]
struct Hub {
    size: usize,
    state: Mutex<HubState>,
    wake: Condvar,
}

impl Hub {
    fn check_rank(&self, rank: usize) -> Result<(), CommError> {
        if rank < self.size {
            Ok(())
        } else {
            Err(CommError::InvalidRank {
                rank,
                size: self.size,
            })
        }
    }

    fn post(&self, from: usize, to: usize, lane: Lane, payload: Vec<u8>) {
        let mut state = self.state.lock();
        state
            .queues
            .entry((from, to, lane))
            .or_default()
            .push_back(payload);
        self.wake.notify_all();
    }

    fn take(&self, from: usize, to: usize, lane: Lane, buf: &mut [u8]) -> Result<(), CommError> {
        let mut state = self.state.lock();
        loop {
            if let Some(msg) = state
                .queues
                .get_mut(&(from, to, lane))
                .and_then(VecDeque::pop_front)
            {
                if msg.len() != buf.len() {
                    return Err(CommError::SizeMismatch {
                        source_rank: from,
                        expected: buf.len(),
                        actual: msg.len(),
                    });
                }
                buf.copy_from_slice(&msg);
                return Ok(());
            }
            if state.lost {
                return Err(CommError::PeerLost);
            }
            self.wake.wait(&mut state);
        }
    }
}

/// Marks the cluster as broken when a rank thread unwinds, so peers blocked
/// on it return [`CommError::PeerLost`] instead of waiting forever.
struct DepartureGuard {
    hub: Arc<Hub>,
}

impl Drop for DepartureGuard {
    fn drop(&mut self) {
        if std::thread::panicking() {
            self.hub.state.lock().lost = true;
            self.hub.wake.notify_all();
        }
    }
}

/// Handle of one rank inside a [`LocalCluster`].
#[derive(Debug, Clone)]
pub struct LocalComm {
    rank: usize,
    hub: Arc<Hub>,
}

impl Communicator for LocalComm {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.hub.size
    }

    fn send(&self, dest: usize, payload: &[u8]) -> Result<(), CommError> {
        self.hub.check_rank(dest)?;
        self.hub
            .post(self.rank, dest, Lane::PointToPoint, payload.to_vec());
        Ok(())
    }

    fn receive(&self, source: usize, buf: &mut [u8]) -> Result<(), CommError> {
        self.hub.check_rank(source)?;
        self.hub.take(source, self.rank, Lane::PointToPoint, buf)
    }

    fn barrier(&self) -> Result<(), CommError> {
        let mut state = self.hub.state.lock();
        let generation = state.barrier_generation;
        state.barrier_arrived += 1;
        if state.barrier_arrived == self.hub.size {
            state.barrier_arrived = 0;
            state.barrier_generation += 1;
            self.hub.wake.notify_all();
            return Ok(());
        }
        loop {
            self.hub.wake.wait(&mut state);
            if state.barrier_generation != generation {
                return Ok(());
            }
            if state.lost {
                return Err(CommError::PeerLost);
            }
        }
    }

    fn broadcast(&self, buf: &mut [u8], root: usize) -> Result<(), CommError> {
        self.hub.check_rank(root)?;
        if self.rank == root {
            for dest in (0..self.hub.size).filter(|&r| r != root) {
                self.hub.post(root, dest, Lane::Collective, buf.to_vec());
            }
            Ok(())
        } else {
            self.hub.take(root, self.rank, Lane::Collective, buf)
        }
    }

    fn xor_reduce32(&self, word: u32) -> Result<u32, CommError> {
        let mut total = word;
        if self.rank == 0 {
            for source in 1..self.hub.size {
                let mut buf = [0u8; 4];
                self.hub.take(source, 0, Lane::Collective, &mut buf)?;
                total ^= u32::from_ne_bytes(buf);
            }
        } else {
            self.hub
                .post(self.rank, 0, Lane::Collective, word.to_ne_bytes().to_vec());
        }
        self.broadcast_u32(total, 0)
    }
}

/// A fixed set of ranks running as threads of the current process.
///
/// ```rust
/// use ksprop_io::comm::{Communicator, LocalCluster};
///
/// let sums = LocalCluster::new(4).run(|comm| comm.xor_reduce32(1 << comm.rank()).unwrap_or(0));
/// assert_eq!(sums, vec![0b1111; 4]);
/// ```
#[derive(Debug, Clone, Copy)]
pub struct LocalCluster {
    size: usize,
}

impl LocalCluster {
    /// Cluster of `size` ranks (at least one)
    pub fn new(size: usize) -> Self {
        Self {
            size: size.max(1),
        }
    }

    /// Number of ranks
    pub const fn size(&self) -> usize {
        self.size
    }

    /// Run `body` once per rank, each on its own thread, and collect the
    /// results in rank order.
    ///
    /// A panic on any rank is re-raised on the caller after every thread has
    /// stopped.
    pub fn run<T, F>(&self, body: F) -> Vec<T>
    where
        T: Send,
        F: Fn(LocalComm) -> T + Sync,
    {
        let hub = Arc::new(Hub {
            size: self.size,
            state: Mutex::new(HubState::default()),
            wake: Condvar::new(),
        });

        std::thread::scope(|scope| {
            let handles: Vec<_> = (0..self.size)
                .map(|rank| {
                    let comm = LocalComm {
                        rank,
                        hub: Arc::clone(&hub),
                    };
                    let body = &body;
                    scope.spawn(move || {
                        let _guard = DepartureGuard {
                            hub: Arc::clone(&comm.hub),
                        };
                        body(comm)
                    })
                })
                .collect();

            handles
                .into_iter()
                .map(|handle| match handle.join() {
                    Ok(value) => value,
                    Err(payload) => std::panic::resume_unwind(payload),
                })
                .collect()
        })
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_point_to_point_is_fifo_per_pair() {
        let got = LocalCluster::new(2).run(|comm| {
            if comm.rank() == 0 {
                comm.send(1, &[1]).unwrap();
                comm.send(1, &[2]).unwrap();
                Vec::new()
            } else {
                let mut a = [0u8; 1];
                let mut b = [0u8; 1];
                comm.receive(0, &mut a).unwrap();
                comm.receive(0, &mut b).unwrap();
                vec![a[0], b[0]]
            }
        });
        assert_eq!(got[1], vec![1, 2]);
    }

    #[test]
    fn test_size_mismatch_is_reported() {
        let got = LocalCluster::new(2).run(|comm| {
            if comm.rank() == 0 {
                comm.send(1, &[0; 8]).unwrap();
                None
            } else {
                let mut buf = [0u8; 4];
                Some(comm.receive(0, &mut buf))
            }
        });
        assert!(matches!(
            got[1],
            Some(Err(CommError::SizeMismatch {
                expected: 4,
                actual: 8,
                ..
            }))
        ));
    }

    #[test]
    fn test_broadcast_and_reduce() {
        let got = LocalCluster::new(5).run(|comm| {
            let mut buf = if comm.rank() == 2 { *b"root" } else { [0u8; 4] };
            comm.broadcast(&mut buf, 2).unwrap();
            let x = comm.xor_reduce32(1 << comm.rank()).unwrap();
            (buf, x)
        });
        for (buf, x) in got {
            assert_eq!(&buf, b"root");
            assert_eq!(x, 0b11111);
        }
    }

    #[test]
    fn test_barrier_repeats() {
        let got = LocalCluster::new(3).run(|comm| {
            for _ in 0..10 {
                comm.barrier().unwrap();
            }
            comm.rank()
        });
        assert_eq!(got, vec![0, 1, 2]);
    }

    #[test]
    fn test_invalid_rank() {
        let got = LocalCluster::new(1).run(|comm| comm.send(3, &[]));
        assert!(matches!(
            got[0],
            Err(CommError::InvalidRank { rank: 3, size: 1 })
        ));
    }
}
