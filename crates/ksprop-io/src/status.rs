//! Collective status agreement
//!
//! Only the I/O rank touches the file, so only it can observe most failures.
//! After each fallible step it broadcasts a one-word status; every rank turns
//! a non-zero status into an error before the next collective call.

use crate::comm::Communicator;
use crate::error::{Result, TransferError};
use tracing::error;

/// One-word status broadcast by the I/O rank
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum StatusCode {
    /// Step succeeded
    Ok = 0,
    /// Open, seek, read or write failure, including short transfers
    Io = 1,
    /// Unusable file contents
    Format = 2,
    /// Checksum violation under strict policy
    Integrity = 3,
    /// Communication failure
    Comm = 4,
    /// Anything else
    Other = 5,
}

impl StatusCode {
    /// Wire value
    pub const fn to_u32(self) -> u32 {
        self as u32
    }

    /// Decode a wire value; unknown values map to [`StatusCode::Other`]
    pub const fn from_u32(value: u32) -> Self {
        match value {
            0 => Self::Ok,
            1 => Self::Io,
            2 => Self::Format,
            3 => Self::Integrity,
            4 => Self::Comm,
            _ => Self::Other,
        }
    }

    /// Whether the status is fatal
    pub const fn is_failure(self) -> bool {
        !matches!(self, Self::Ok)
    }
}

impl std::fmt::Display for StatusCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Ok => "ok",
            Self::Io => "I/O failure",
            Self::Format => "format error",
            Self::Integrity => "integrity violation",
            Self::Comm => "communication failure",
            Self::Other => "failure",
        };
        f.write_str(name)
    }
}

/// Make every rank agree on the outcome of a step run on the I/O rank.
///
/// The I/O rank broadcasts the status of `local`; it keeps its own detailed
/// error. Every other rank returns its local value when the status is
/// [`StatusCode::Ok`] and [`TransferError::Aborted`] otherwise.
pub fn agree<C, T>(comm: &C, io_rank: usize, local: Result<T>) -> Result<T>
where
    C: Communicator + ?Sized,
{
    let status = if comm.rank() == io_rank {
        match &local {
            Ok(_) => StatusCode::Ok,
            Err(e) => {
                error!("I/O rank {} failed: {}", io_rank, e);
                e.status_code()
            }
        }
    } else {
        StatusCode::Ok
    };

    let status = StatusCode::from_u32(comm.broadcast_u32(status.to_u32(), io_rank)?);

    if comm.rank() == io_rank || !status.is_failure() {
        return local;
    }
    Err(TransferError::Aborted { status, io_rank })
}

/// Collect the outcome of every rank's local work on the I/O rank.
///
/// Collective. Each other rank sends the status of `local` to the I/O rank,
/// which returns the first failing rank and its status, if any. Other ranks
/// always get `None`; the I/O rank is expected to fold the answer into the
/// status it broadcasts with [`agree`].
pub fn gather_failures<C>(
    comm: &C,
    io_rank: usize,
    local: Option<&TransferError>,
) -> Result<Option<(usize, StatusCode)>>
where
    C: Communicator + ?Sized,
{
    if comm.rank() != io_rank {
        let status = local.map_or(StatusCode::Ok, TransferError::status_code);
        comm.send(io_rank, &status.to_u32().to_ne_bytes())?;
        return Ok(None);
    }

    let mut first = None;
    for rank in (0..comm.size()).filter(|&r| r != io_rank) {
        let mut raw = [0u8; 4];
        comm.receive(rank, &mut raw)?;
        let status = StatusCode::from_u32(u32::from_ne_bytes(raw));
        if status.is_failure() {
            error!("Rank {} failed with {}", rank, status);
            first.get_or_insert((rank, status));
        }
    }
    Ok(first)
}
