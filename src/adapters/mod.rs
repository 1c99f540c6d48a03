//! Transport implementations
//!
//! A [`Transport`] is one exclusive, synchronous request/response session with
//! one instrument. Drivers never retry; every failure here propagates to the
//! caller unchanged.
//!
//! Resource strings select the concrete transport in [`open`]:
//! - `TCPIP0::<host>::<port>::SOCKET` → [`TcpAdapter`]
//! - `ASRL<port>::INSTR` → [`SerialAdapter`] (feature `instrument_serial`)
//! - anything else → [`VisaAdapter`] (feature `instrument_visa`)

pub mod mock;
pub mod serial_adapter;
pub mod tcp_adapter;
pub mod visa_adapter;

pub use mock::MockTransport;
pub use serial_adapter::SerialAdapter;
pub use tcp_adapter::TcpAdapter;
pub use visa_adapter::VisaAdapter;

use crate::config::InstrumentSettings;
use crate::error::{IviError, IviResult};
use std::io::Read;
use std::time::{Duration, Instant};

/// Synchronous ASCII command/response channel to a single instrument.
pub trait Transport: Send {
    /// Send one command. The transport appends its line terminator.
    fn write(&mut self, command: &str) -> IviResult<()>;

    /// Read one reply line, trimmed.
    fn read(&mut self) -> IviResult<String>;

    /// Send a binary payload framed as an IEEE 488.2 definite-length block
    /// following `prefix`.
    fn write_block(&mut self, data: &[u8], prefix: &str) -> IviResult<()>;

    /// Send a query and read its reply.
    fn ask(&mut self, command: &str) -> IviResult<String> {
        self.write(command)?;
        self.read()
    }

    /// Interface clear. Transports without a device-clear primitive do nothing.
    fn clear(&mut self) -> IviResult<()> {
        Ok(())
    }

    /// Short description for logs.
    fn info(&self) -> String;
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn write(&mut self, command: &str) -> IviResult<()> {
        (**self).write(command)
    }

    fn read(&mut self) -> IviResult<String> {
        (**self).read()
    }

    fn write_block(&mut self, data: &[u8], prefix: &str) -> IviResult<()> {
        (**self).write_block(data, prefix)
    }

    fn ask(&mut self, command: &str) -> IviResult<String> {
        (**self).ask(command)
    }

    fn clear(&mut self) -> IviResult<()> {
        (**self).clear()
    }

    fn info(&self) -> String {
        (**self).info()
    }
}

/// Build `prefix#<ndigits><len><data>`.
pub fn ieee_block(data: &[u8], prefix: &str) -> Vec<u8> {
    let len = data.len().to_string();
    let mut frame = Vec::with_capacity(prefix.len() + 2 + len.len() + data.len());
    frame.extend_from_slice(prefix.as_bytes());
    frame.push(b'#');
    frame.extend_from_slice(len.len().to_string().as_bytes());
    frame.extend_from_slice(len.as_bytes());
    frame.extend_from_slice(data);
    frame
}

/// Open the transport named by `settings.resource`.
pub fn open(settings: &InstrumentSettings) -> IviResult<Box<dyn Transport>> {
    let resource = settings.resource.trim();

    if let Some((host, port)) = parse_socket_resource(resource) {
        let adapter = TcpAdapter::connect(&host, port, settings)?;
        return Ok(Box::new(adapter));
    }

    if let Some(port_name) = parse_serial_resource(resource) {
        let adapter = SerialAdapter::open(&port_name, settings)?;
        return Ok(Box::new(adapter));
    }

    let adapter = VisaAdapter::open(resource, settings)?;
    Ok(Box::new(adapter))
}

fn parse_socket_resource(resource: &str) -> Option<(String, u16)> {
    let parts: Vec<&str> = resource.split("::").collect();
    match parts.as_slice() {
        [interface, host, port, kind]
            if interface.to_ascii_uppercase().starts_with("TCPIP")
                && kind.eq_ignore_ascii_case("SOCKET") =>
        {
            port.parse().ok().map(|port| (host.to_string(), port))
        }
        _ => None,
    }
}

fn parse_serial_resource(resource: &str) -> Option<String> {
    let upper = resource.to_ascii_uppercase();
    if !upper.starts_with("ASRL") {
        return None;
    }
    let rest = &resource[4..];
    let port = rest
        .strip_suffix("::INSTR")
        .or_else(|| rest.strip_suffix("::instr"))
        .unwrap_or(rest);
    if port.is_empty() {
        None
    } else {
        Some(port.to_string())
    }
}

pub(crate) fn not_enabled(feature: &str) -> IviError {
    IviError::FeatureNotEnabled(feature.to_string())
}

/// Read bytes one at a time until `delimiter`, giving up after `timeout`.
///
/// Short per-read timeouts from the underlying port are retried until the
/// overall deadline passes.
pub(crate) fn read_line(
    reader: &mut dyn Read,
    delimiter: u8,
    timeout: Duration,
) -> IviResult<String> {
    let mut response = Vec::new();
    let mut buffer = [0u8; 1];
    let start = Instant::now();

    loop {
        if start.elapsed() > timeout {
            return Err(IviError::Transport(format!(
                "read timeout after {:?}",
                timeout
            )));
        }

        match reader.read(&mut buffer) {
            Ok(1) => {
                if buffer[0] == delimiter {
                    break;
                }
                response.push(buffer[0]);
            }
            Ok(0) => {
                return Err(IviError::Transport("unexpected EOF".to_string()));
            }
            Ok(_) => {
                return Err(IviError::Transport(
                    "single-byte read returned more than one byte".to_string(),
                ));
            }
            Err(e)
                if e.kind() == std::io::ErrorKind::TimedOut
                    || e.kind() == std::io::ErrorKind::WouldBlock =>
            {
                continue;
            }
            Err(e) => return Err(IviError::Io(e)),
        }
    }

    Ok(String::from_utf8_lossy(&response).trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ieee_block_framing() {
        let frame = ieee_block(&[0x0f, 0xfe, 0x00, 0x00], ":curve ");
        assert_eq!(&frame[..10], b":curve #14");
        assert_eq!(&frame[10..], &[0x0f, 0xfe, 0x00, 0x00]);
    }

    #[test]
    fn test_ieee_block_multi_digit_length() {
        let data = vec![0u8; 1024];
        let frame = ieee_block(&data, "");
        assert_eq!(&frame[..6], b"#41024");
        assert_eq!(frame.len(), 6 + 1024);
    }

    #[test]
    fn test_read_line_strips_terminator() {
        let mut reader: &[u8] = b"Rohde&Schwarz,HMP2020,123,2.51\r\nrest";
        let line = read_line(&mut reader, b'\n', Duration::from_secs(1)).unwrap();
        assert_eq!(line, "Rohde&Schwarz,HMP2020,123,2.51");
    }

    #[test]
    fn test_read_line_eof() {
        let mut reader: &[u8] = b"partial";
        let err = read_line(&mut reader, b'\n', Duration::from_secs(1)).unwrap_err();
        assert!(err.is_transport_failure());
    }

    #[test]
    fn test_socket_resource() {
        assert_eq!(
            parse_socket_resource("TCPIP0::192.168.1.50::5025::SOCKET"),
            Some(("192.168.1.50".to_string(), 5025))
        );
        assert_eq!(parse_socket_resource("TCPIP0::192.168.1.50::INSTR"), None);
    }

    #[test]
    fn test_serial_resource() {
        assert_eq!(
            parse_serial_resource("ASRL/dev/ttyUSB0::INSTR"),
            Some("/dev/ttyUSB0".to_string())
        );
        assert_eq!(parse_serial_resource("ASRLCOM3::INSTR"), Some("COM3".to_string()));
        assert_eq!(parse_serial_resource("USB0::0x1AB1::0x0642::INSTR"), None);
    }
}
