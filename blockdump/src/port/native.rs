//! Native serial port implementation using the `serialport` crate.
//!
//! This module provides the link channel for native platforms
//! (Linux, macOS, Windows, FreeBSD, etc.).

use {
    crate::{
        error::{LinkError, Result},
        port::{DataBits, FlowControl, LinkChannel, Parity, SerialConfig, StopBits},
    },
    log::trace,
    serialport::ClearBuffer,
    std::io::{self, Read, Write},
};

/// Native serial port implementation.
pub struct NativePort {
    port: Option<Box<dyn serialport::SerialPort>>,
    name: String,
}

impl NativePort {
    /// Open a serial port with the given configuration.
    pub fn open(config: &SerialConfig) -> Result<Self> {
        let port = serialport::new(&config.port_name, config.baud_rate)
            .timeout(config.timeout)
            .data_bits(
                config
                    .data_bits
                    .into(),
            )
            .parity(
                config
                    .parity
                    .into(),
            )
            .stop_bits(
                config
                    .stop_bits
                    .into(),
            )
            .flow_control(
                config
                    .flow_control
                    .into(),
            )
            .open()?;

        Ok(Self {
            port: Some(port),
            name: config
                .port_name
                .clone(),
        })
    }

    /// Close the port and release resources.
    ///
    /// After calling this method every channel operation fails with
    /// `NotConnected`.
    pub fn close(&mut self) {
        // Take ownership of the port and let it drop (close)
        self.port
            .take();
    }

    fn inner(&mut self) -> io::Result<&mut Box<dyn serialport::SerialPort>> {
        self.port
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "port closed"))
    }
}

impl LinkChannel for NativePort {
    fn send(&mut self, bytes: &[u8]) -> std::result::Result<(), LinkError> {
        trace!("TX {} bytes", bytes.len());
        let port = self
            .inner()
            .map_err(LinkError::WriteFailed)?;
        port.write_all(bytes)
            .and_then(|()| port.flush())
            .map_err(LinkError::WriteFailed)
    }

    fn pending_byte_count(&mut self) -> std::result::Result<usize, LinkError> {
        let port = self
            .inner()
            .map_err(LinkError::ReadFailed)?;
        port.bytes_to_read()
            .map(|n| n as usize)
            .map_err(|e| LinkError::ReadFailed(e.into()))
    }

    fn read_available(&mut self, max: usize) -> std::result::Result<Vec<u8>, LinkError> {
        if max == 0 {
            return Ok(Vec::new());
        }

        let port = self
            .inner()
            .map_err(LinkError::ReadFailed)?;
        let mut buf = vec![0u8; max];
        match port.read(&mut buf) {
            Ok(n) => {
                buf.truncate(n);
                trace!("RX {n} bytes");
                Ok(buf)
            },
            Err(e) if e.kind() == io::ErrorKind::TimedOut => Ok(Vec::new()),
            Err(e) => Err(LinkError::ReadFailed(e)),
        }
    }

    fn discard_input_buffer(&mut self) -> std::result::Result<(), LinkError> {
        let port = self
            .inner()
            .map_err(LinkError::ReadFailed)?;
        port.clear(ClearBuffer::Input)
            .map_err(|e| LinkError::ReadFailed(e.into()))
    }

    fn name(&self) -> &str {
        &self.name
    }
}

// Type conversions from our types to serialport types

impl From<DataBits> for serialport::DataBits {
    fn from(bits: DataBits) -> Self {
        match bits {
            DataBits::Seven => Self::Seven,
            DataBits::Eight => Self::Eight,
        }
    }
}

impl From<Parity> for serialport::Parity {
    fn from(parity: Parity) -> Self {
        match parity {
            Parity::None => Self::None,
            Parity::Odd => Self::Odd,
            Parity::Even => Self::Even,
        }
    }
}

impl From<StopBits> for serialport::StopBits {
    fn from(bits: StopBits) -> Self {
        match bits {
            StopBits::One => Self::One,
            StopBits::Two => Self::Two,
        }
    }
}

impl From<FlowControl> for serialport::FlowControl {
    fn from(flow: FlowControl) -> Self {
        match flow {
            FlowControl::None => Self::None,
            FlowControl::Hardware => Self::Hardware,
            FlowControl::Software => Self::Software,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_missing_port_fails() {
        let result = NativePort::open(&SerialConfig::new("/nonexistent/blockdump-test-port", 9600));
        assert!(result.is_err());
    }

    #[test]
    fn test_line_setting_conversions() {
        assert_eq!(
            serialport::Parity::from(Parity::Odd),
            serialport::Parity::Odd
        );
        assert_eq!(
            serialport::DataBits::from(DataBits::Seven),
            serialport::DataBits::Seven
        );
        assert_eq!(
            serialport::StopBits::from(StopBits::Two),
            serialport::StopBits::Two
        );
        assert_eq!(
            serialport::FlowControl::from(FlowControl::Hardware),
            serialport::FlowControl::Hardware
        );
    }
}
