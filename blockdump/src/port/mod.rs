//! Link channel abstraction over a byte-oriented serial link.
//!
//! The transfer engine never touches a serial port directly. It talks to a
//! [`LinkChannel`], which exposes exactly the four operations the block
//! protocol needs:
//!
//! ```text
//! +---------------------------+
//! |   Block Transfer Engine   |  deadlines, retry policy
//! +-------------+-------------+
//!               |
//!               v
//! +-------------+-------------+
//! |    LinkChannel trait      |  send / pending / read / discard
//! +-------------+-------------+
//!               |
//!               v
//! +-------------+-------------+
//! |  NativePort (serialport)  |  or an in-memory test double
//! +---------------------------+
//! ```
//!
//! Channels have no internal retry or timeout logic. Every wait is bounded by
//! the engine.
//!
//! ## Example
//!
//! ```rust,no_run
//! use blockdump::port::{LinkChannel, NativePort, SerialConfig};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut link = NativePort::open(&SerialConfig::new("/dev/ttyUSB0", 9600))?;
//!     link.send(b"printblock:0\n")?;
//!
//!     let pending = link.pending_byte_count()?;
//!     let bytes = link.read_available(pending)?;
//!     println!("Received {} bytes", bytes.len());
//!     Ok(())
//! }
//! ```

#[cfg(feature = "native")]
pub mod native;

use std::time::Duration;

use crate::error::LinkError;

/// Baud rate used when nothing else is configured.
///
/// Matches the default line settings of the host tooling the device firmware
/// was written against (9600 8N1).
pub const DEFAULT_BAUD: u32 = 9600;

/// Port used when no port is given on the command line or in configuration.
#[cfg(windows)]
pub const DEFAULT_PORT: &str = "COM36";

/// Port used when no port is given on the command line or in configuration.
#[cfg(not(windows))]
pub const DEFAULT_PORT: &str = "/dev/ttyUSB0";

/// Serial port configuration.
#[derive(Debug, Clone)]
pub struct SerialConfig {
    /// Port name/path (e.g., "/dev/ttyUSB0", "COM3").
    pub port_name: String,
    /// Baud rate.
    pub baud_rate: u32,
    /// Timeout of a single transport read or write.
    pub timeout: Duration,
    /// Data bits (typically 8).
    pub data_bits: DataBits,
    /// Parity (typically None).
    pub parity: Parity,
    /// Stop bits (typically One).
    pub stop_bits: StopBits,
    /// Flow control (typically None).
    pub flow_control: FlowControl,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port_name: DEFAULT_PORT.to_string(),
            baud_rate: DEFAULT_BAUD,
            timeout: Duration::from_millis(100),
            data_bits: DataBits::Eight,
            parity: Parity::None,
            stop_bits: StopBits::One,
            flow_control: FlowControl::None,
        }
    }
}

impl SerialConfig {
    /// Create a new configuration with port name and baud rate.
    pub fn new(port_name: impl Into<String>, baud_rate: u32) -> Self {
        Self {
            port_name: port_name.into(),
            baud_rate,
            ..Default::default()
        }
    }
}

/// Number of data bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DataBits {
    /// 7 data bits.
    Seven,
    /// 8 data bits.
    #[default]
    Eight,
}

/// Parity checking mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Parity {
    /// No parity.
    #[default]
    None,
    /// Odd parity.
    Odd,
    /// Even parity.
    Even,
}

/// Number of stop bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StopBits {
    /// 1 stop bit.
    #[default]
    One,
    /// 2 stop bits.
    Two,
}

/// Flow control mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FlowControl {
    /// No flow control.
    #[default]
    None,
    /// Hardware flow control (RTS/CTS).
    Hardware,
    /// Software flow control (XON/XOFF).
    Software,
}

/// Duplex byte stream used by the block transfer engine.
pub trait LinkChannel {
    /// Write all bytes to the link.
    fn send(&mut self, bytes: &[u8]) -> Result<(), LinkError>;

    /// Number of bytes that can be read right now without blocking.
    ///
    /// This is a point-in-time estimate; more bytes may have arrived by the
    /// time [`read_available`](Self::read_available) runs.
    fn pending_byte_count(&mut self) -> Result<usize, LinkError>;

    /// Read up to `max` bytes that are already available.
    ///
    /// Returns fewer bytes (possibly none) when fewer are available. Never
    /// waits for more data to arrive.
    fn read_available(&mut self, max: usize) -> Result<Vec<u8>, LinkError>;

    /// Drop any received bytes that have not been read yet.
    fn discard_input_buffer(&mut self) -> Result<(), LinkError>;

    /// Name of the underlying endpoint, for diagnostics.
    fn name(&self) -> &str;
}

impl<L: LinkChannel + ?Sized> LinkChannel for &mut L {
    fn send(&mut self, bytes: &[u8]) -> Result<(), LinkError> {
        (**self).send(bytes)
    }

    fn pending_byte_count(&mut self) -> Result<usize, LinkError> {
        (**self).pending_byte_count()
    }

    fn read_available(&mut self, max: usize) -> Result<Vec<u8>, LinkError> {
        (**self).read_available(max)
    }

    fn discard_input_buffer(&mut self) -> Result<(), LinkError> {
        (**self).discard_input_buffer()
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

// Re-export the native implementation
#[cfg(feature = "native")]
pub use native::NativePort;
