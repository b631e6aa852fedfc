//! Error types for distributed propagator I/O.
//!
//! Every fatal condition is returned on every rank. The I/O rank reports the
//! concrete cause; the other ranks observe [`TransferError::Aborted`] carrying
//! the status code the I/O rank broadcast.

use crate::status::StatusCode;
use ksprop_formats::{Checksums, FormatError};
use thiserror::Error;

/// Errors raised by a communicator implementation.
#[derive(Debug, Error)]
pub enum CommError {
    /// Rank index outside the communicator
    #[error("Rank {rank} is out of range for a communicator of size {size}")]
    InvalidRank {
        /// Offending rank
        rank: usize,
        /// Communicator size
        size: usize,
    },

    /// Received message length differs from the posted receive
    #[error("Message from rank {source_rank} has {actual} bytes, expected {expected}")]
    SizeMismatch {
        /// Sending rank
        source_rank: usize,
        /// Length of the posted receive buffer
        expected: usize,
        /// Length of the delivered message
        actual: usize,
    },

    /// A peer rank exited while others were still waiting on it
    #[error("A peer rank left the communicator")]
    PeerLost,

    /// Point-to-point traffic on a communicator without peers
    #[error("Single-rank communicator has no peer {0}")]
    NoPeer(usize),
}

/// Errors raised while opening, transferring or closing a propagator file.
#[derive(Debug, Error)]
pub enum TransferError {
    /// Bad magic number, dimension mismatch, unreadable header and similar
    #[error("Format error: {0}")]
    Format(#[from] FormatError),

    /// Failure in the communication fabric
    #[error("Communication error: {0}")]
    Comm(#[from] CommError),

    /// Open, seek, read or write failure on the I/O rank
    #[error("I/O error during {op}: {source}")]
    Io {
        /// Operation that failed
        op: &'static str,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// Fewer bytes moved than the protocol requires
    #[error("Short transfer: expected {expected} bytes, got {actual}")]
    ShortTransfer {
        /// Bytes requested
        expected: usize,
        /// Bytes actually moved
        actual: usize,
    },

    /// The I/O rank broadcast a fatal status
    #[error("Operation aborted: I/O rank {io_rank} reported {status}")]
    Aborted {
        /// Status broadcast by the I/O rank
        status: StatusCode,
        /// Rank that owns the file
        io_rank: usize,
    },

    /// A rank other than the I/O rank failed during a transfer
    #[error("Rank {rank} reported {status} during the transfer")]
    PeerFailed {
        /// Failing rank
        rank: usize,
        /// Status it reported
        status: StatusCode,
    },

    /// Checksum mismatch under strict checksum policy
    #[error("Checksum violation color {color}: computed {computed}, read {stored}")]
    Integrity {
        /// Color block that failed
        color: u32,
        /// Checksums computed while decoding
        computed: Checksums,
        /// Checksums stored on file
        stored: Checksums,
    },

    /// Invalid configuration or site map
    #[error("Configuration error: {0}")]
    Config(String),

    /// Operation not valid for how the file was opened
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),
}

impl TransferError {
    /// Wrap an I/O error with the failing operation
    pub fn io(op: &'static str, source: std::io::Error) -> Self {
        Self::Io { op, source }
    }

    /// Status code broadcast to the other ranks for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Format(_) => StatusCode::Format,
            Self::Comm(_) => StatusCode::Comm,
            Self::Io { .. } | Self::ShortTransfer { .. } => StatusCode::Io,
            Self::Integrity { .. } => StatusCode::Integrity,
            Self::Aborted { status, .. } | Self::PeerFailed { status, .. } => *status,
            Self::Config(_) | Self::InvalidOperation(_) => StatusCode::Other,
        }
    }
}

/// Result type alias for transfer operations.
pub type Result<T> = std::result::Result<T, TransferError>;

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        let err = TransferError::ShortTransfer {
            expected: 24,
            actual: 3,
        };
        assert_eq!(err.status_code(), StatusCode::Io);

        let err: TransferError = FormatError::UnknownFormat.into();
        assert_eq!(err.status_code(), StatusCode::Format);

        let err = TransferError::Aborted {
            status: StatusCode::Format,
            io_rank: 0,
        };
        assert_eq!(err.status_code(), StatusCode::Format);
    }

    #[test]
    fn test_error_display() {
        let err = TransferError::Integrity {
            color: 1,
            computed: Checksums::new(0xa, 0xb),
            stored: Checksums::new(0xc, 0xd),
        };
        assert_eq!(
            err.to_string(),
            "Checksum violation color 1: computed a b, read c d"
        );

        let err = CommError::SizeMismatch {
            source_rank: 3,
            expected: 32,
            actual: 4,
        };
        assert!(err.to_string().contains("rank 3"));
    }
}
