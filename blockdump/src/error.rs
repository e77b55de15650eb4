//! Error types for blockdump.

use std::io;
use thiserror::Error;

/// Result type for blockdump operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Fault reported by a link channel.
///
/// Link faults are never retried: a dead link cannot produce a block.
#[derive(Debug, Error)]
pub enum LinkError {
    /// The transport rejected or could not accept a write.
    #[error("link write failed: {0}")]
    WriteFailed(#[source] io::Error),

    /// The transport failed while polling, reading or discarding input.
    #[error("link read failed: {0}")]
    ReadFailed(#[source] io::Error),
}

/// Error type for blockdump operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Serial port error (opening or enumerating ports).
    #[cfg(feature = "native")]
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    /// Link channel fault during a transfer.
    #[error(transparent)]
    Link(#[from] LinkError),

    /// Writing a completed block to the output sink failed.
    #[error("Output write failed: {0}")]
    Sink(#[source] io::Error),

    /// Too many consecutive attempts for one block timed out.
    #[error(
        "Transfer aborted at block {block} after {attempts} consecutive timeouts \
         ({completed} blocks completed)"
    )]
    TransferAborted {
        /// Block index that could not be retrieved.
        block: u32,
        /// Number of blocks written before the abort.
        completed: u32,
        /// Consecutive attempts made for `block`.
        attempts: u32,
    },

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Whether this error came from the serial transport rather than the protocol.
    pub fn is_link_failure(&self) -> bool {
        match self {
            Self::Link(_) => true,
            #[cfg(feature = "native")]
            Self::Serial(_) => true,
            _ => false,
        }
    }
}
