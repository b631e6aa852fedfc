//! Transfer configuration.
//!
//! Every field has a default, so a partial JSON document (or none at all) is
//! a valid configuration.
//!
//! # Example
//!
//! ```rust
//! use ksprop_io::{IoConfig, WriteOrder};
//!
//! let config: IoConfig = serde_json::from_str(r#"{"write_byte_order": "big"}"#).unwrap();
//! assert_eq!(config.write_byte_order, WriteOrder::Big);
//! assert_eq!(config.buffer_records, 4096);
//! config.validate().unwrap();
//! ```

use crate::error::{Result, TransferError};
use ksprop_formats::ByteOrder;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default bulk I/O capacity in site records
pub const DEFAULT_BUFFER_RECORDS: usize = 4096;

/// Default padding appended to every forwarded site message
pub const DEFAULT_SEND_PADDING: usize = 8;

/// Byte order used when writing binary files
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WriteOrder {
    /// Order of the running host
    #[default]
    Native,
    /// Little-endian regardless of host
    Little,
    /// Big-endian regardless of host
    Big,
}

impl WriteOrder {
    /// Concrete byte order
    pub const fn resolve(self) -> ByteOrder {
        match self {
            Self::Native => ByteOrder::native(),
            Self::Little => ByteOrder::Little,
            Self::Big => ByteOrder::Big,
        }
    }
}

/// Settings shared by every rank taking part in a file operation.
///
/// All ranks must use equal configurations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IoConfig {
    /// Rank that owns the file handle
    pub io_rank: usize,
    /// Bulk I/O buffer capacity, in site records
    pub buffer_records: usize,
    /// Extra bytes appended to each site message sent to an owner
    pub send_padding: usize,
    /// Byte order of binary files produced by this run
    pub write_byte_order: WriteOrder,
    /// Write `<file>.info` when closing a file opened for writing
    pub write_info_file: bool,
    /// Turn checksum mismatches into errors instead of warnings
    pub strict_checksums: bool,
}

impl Default for IoConfig {
    fn default() -> Self {
        Self {
            io_rank: 0,
            buffer_records: DEFAULT_BUFFER_RECORDS,
            send_padding: DEFAULT_SEND_PADDING,
            write_byte_order: WriteOrder::Native,
            write_info_file: true,
            strict_checksums: false,
        }
    }
}

impl IoConfig {
    /// Load a configuration from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns `TransferError::Io` if the file cannot be read and
    /// `TransferError::Config` if it is not valid configuration JSON.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let text =
            std::fs::read_to_string(path).map_err(|e| TransferError::io("read config", e))?;
        let config: Self = serde_json::from_str(&text)
            .map_err(|e| TransferError::Config(format!("{}: {e}", path.display())))?;
        config.validate()?;
        Ok(config)
    }

    /// Check internal consistency.
    ///
    /// # Errors
    ///
    /// Returns `TransferError::Config` if the buffer capacity is zero.
    pub fn validate(&self) -> Result<()> {
        if self.buffer_records == 0 {
            return Err(TransferError::Config(
                "buffer_records must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Check the configuration against a communicator size.
    ///
    /// # Errors
    ///
    /// Returns `TransferError::Config` if the I/O rank does not exist.
    pub fn validate_for(&self, size: usize) -> Result<()> {
        self.validate()?;
        if self.io_rank >= size {
            return Err(TransferError::Config(format!(
                "io_rank {} is out of range for {} ranks",
                self.io_rank, size
            )));
        }
        Ok(())
    }

    /// Byte order for new binary files
    pub const fn write_order(&self) -> ByteOrder {
        self.write_byte_order.resolve()
    }
}
