//! # blockdump
//!
//! A library for retrieving a fixed number of data blocks from a device over
//! a serial link.
//!
//! The device speaks a small text protocol: the host sends
//! `printblock:<index>\n` and the device answers with the block as lines of
//! text. This crate provides:
//!
//! - A [`LinkChannel`] abstraction over the serial port
//! - The [`BlockTransfer`] engine (request, accumulate, retry, abort)
//! - Serial port discovery helpers
//!
//! ## Features
//!
//! - `native` (default): Native serial port support via the `serialport` crate
//! - `serde`: Serialization support for data types
//!
//! ## Example
//!
//! ```rust,no_run
//! use blockdump::{BlockTransfer, NativePort, SerialConfig, TransferConfig};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let link = NativePort::open(&SerialConfig::new("/dev/ttyUSB0", 9600))?;
//!     let sink = std::fs::File::create("output.txt")?;
//!
//!     let config = TransferConfig::default().with_total_blocks(16);
//!     let mut transfer = BlockTransfer::new(link, sink, config);
//!     transfer.run_with(|event| println!("{event:?}"))?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod device;
pub mod error;
pub mod port;
pub mod protocol;
pub mod transfer;

// Re-exports for convenience
#[cfg(feature = "native")]
pub use port::NativePort;
pub use {
    device::{DetectedPort, DeviceKind, TransportKind, detect_ports, format_port_list},
    error::{Error, LinkError, Result},
    port::{DEFAULT_BAUD, DEFAULT_PORT, LinkChannel, SerialConfig},
    protocol::block::{NEWLINE_THRESHOLD, request_command, strip_trailing_cr},
    transfer::{
        AttemptBuffer, BlockTransfer, TransferConfig, TransferEvent, TransferPhase,
        TransferSummary,
    },
};
