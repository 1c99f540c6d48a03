//! RS-232 transport built on the `serialport` crate.

use super::Transport;
use crate::config::InstrumentSettings;
use crate::error::IviResult;
use std::time::Duration;

#[cfg(feature = "instrument_serial")]
use super::{ieee_block, read_line};
#[cfg(feature = "instrument_serial")]
use crate::error::IviError;
#[cfg(feature = "instrument_serial")]
use serialport::SerialPort;
#[cfg(feature = "instrument_serial")]
use std::io::Write;
#[cfg(feature = "instrument_serial")]
use tracing::debug;

/// Serial adapter for RS-232 / USB-CDC instruments.
pub struct SerialAdapter {
    /// Port name (e.g., "/dev/ttyUSB0", "COM3")
    port_name: String,

    /// Baud rate (e.g., 9600, 115200)
    baud_rate: u32,

    /// Overall read timeout
    timeout: Duration,

    /// Line terminator for commands (e.g., "\n")
    line_terminator: String,

    #[cfg(feature = "instrument_serial")]
    port: Box<dyn SerialPort>,
}

impl SerialAdapter {
    /// Open `port_name` with the baud rate, timeout, and terminator from `settings`.
    #[cfg(feature = "instrument_serial")]
    pub fn open(port_name: &str, settings: &InstrumentSettings) -> IviResult<Self> {
        let port = serialport::new(port_name, settings.baud_rate)
            .timeout(Duration::from_millis(100)) // Internal read timeout
            .open()
            .map_err(|e| {
                IviError::Transport(format!(
                    "Failed to open serial port '{}' at {} baud: {}",
                    port_name, settings.baud_rate, e
                ))
            })?;

        debug!("Serial port '{}' opened at {} baud", port_name, settings.baud_rate);

        Ok(Self {
            port_name: port_name.to_string(),
            baud_rate: settings.baud_rate,
            timeout: settings.timeout(),
            line_terminator: settings.line_terminator.clone(),
            port,
        })
    }

    /// Serial support was compiled out; always fails.
    #[cfg(not(feature = "instrument_serial"))]
    pub fn open(_port_name: &str, _settings: &InstrumentSettings) -> IviResult<Self> {
        Err(super::not_enabled("instrument_serial"))
    }

    /// OS name of the open port.
    pub fn port_name(&self) -> &str {
        &self.port_name
    }
}

#[cfg(feature = "instrument_serial")]
impl Transport for SerialAdapter {
    fn write(&mut self, command: &str) -> IviResult<()> {
        let command_str = format!("{}{}", command, self.line_terminator);
        self.port.write_all(command_str.as_bytes())?;
        self.port.flush()?;
        debug!("Sent serial command: {}", command);
        Ok(())
    }

    fn read(&mut self) -> IviResult<String> {
        let response = read_line(&mut self.port, b'\n', self.timeout)?;
        debug!("Received serial response: {}", response);
        Ok(response)
    }

    fn write_block(&mut self, data: &[u8], prefix: &str) -> IviResult<()> {
        let mut frame = ieee_block(data, prefix);
        frame.extend_from_slice(self.line_terminator.as_bytes());
        self.port.write_all(&frame)?;
        self.port.flush()?;
        debug!("Sent serial block: {}<{} bytes>", prefix, data.len());
        Ok(())
    }

    fn clear(&mut self) -> IviResult<()> {
        self.port
            .clear(serialport::ClearBuffer::All)
            .map_err(|e| IviError::Transport(format!("Failed to clear serial buffers: {}", e)))
    }

    fn info(&self) -> String {
        format!("SerialAdapter({} @ {} baud)", self.port_name, self.baud_rate)
    }
}

#[cfg(not(feature = "instrument_serial"))]
impl Transport for SerialAdapter {
    fn write(&mut self, _command: &str) -> IviResult<()> {
        Err(super::not_enabled("instrument_serial"))
    }

    fn read(&mut self) -> IviResult<String> {
        Err(super::not_enabled("instrument_serial"))
    }

    fn write_block(&mut self, _data: &[u8], _prefix: &str) -> IviResult<()> {
        Err(super::not_enabled("instrument_serial"))
    }

    fn info(&self) -> String {
        format!(
            "SerialAdapter({} @ {} baud, {:?}, {:?})",
            self.port_name, self.baud_rate, self.timeout, self.line_terminator
        )
    }
}
