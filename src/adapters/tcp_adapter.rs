//! Raw SCPI-over-TCP transport (LXI socket, usually port 5025).

use super::{ieee_block, read_line, Transport};
use crate::config::InstrumentSettings;
use crate::error::{IviError, IviResult};
use std::io::Write;
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;
use tracing::debug;

/// Newline-delimited SCPI over a plain TCP socket.
///
/// Reads poll the socket with a short timeout and give up once the
/// configured overall timeout has passed, the same way the serial adapter
/// does.
pub struct TcpAdapter {
    peer: String,
    stream: TcpStream,
    timeout: Duration,
    line_terminator: String,
}

impl TcpAdapter {
    /// Resolve `host` and connect, bounded by the configured timeout.
    pub fn connect(host: &str, port: u16, settings: &InstrumentSettings) -> IviResult<Self> {
        let peer = format!("{}:{}", host, port);
        let timeout = settings.timeout();

        let addr = (host, port)
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| IviError::Transport(format!("Cannot resolve '{}'", peer)))?;

        let stream = TcpStream::connect_timeout(&addr, timeout)?;
        stream.set_read_timeout(Some(Duration::from_millis(100)))?;
        stream.set_nodelay(true)?;

        debug!("TCP socket '{}' connected", peer);

        Ok(Self {
            peer,
            stream,
            timeout,
            line_terminator: settings.line_terminator.clone(),
        })
    }
}

impl Transport for TcpAdapter {
    fn write(&mut self, command: &str) -> IviResult<()> {
        let command_str = format!("{}{}", command, self.line_terminator);
        self.stream.write_all(command_str.as_bytes())?;
        debug!("[{}] Sent command: {}", self.peer, command);
        Ok(())
    }

    fn read(&mut self) -> IviResult<String> {
        let response = read_line(&mut self.stream, b'\n', self.timeout)?;
        debug!("[{}] Received response: {}", self.peer, response);
        Ok(response)
    }

    fn write_block(&mut self, data: &[u8], prefix: &str) -> IviResult<()> {
        let mut frame = ieee_block(data, prefix);
        frame.extend_from_slice(self.line_terminator.as_bytes());
        self.stream.write_all(&frame)?;
        debug!("[{}] Sent block: {}<{} bytes>", self.peer, prefix, data.len());
        Ok(())
    }

    fn info(&self) -> String {
        format!("TcpAdapter({} @ {}ms timeout)", self.peer, self.timeout.as_millis())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{BufRead, BufReader};
    use std::net::TcpListener;
    use std::thread;

    #[test]
    fn test_round_trip_against_local_listener() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();

        let server = thread::spawn(move || {
            let (socket, _) = listener.accept().unwrap();
            let mut reader = BufReader::new(socket.try_clone().unwrap());
            let mut writer = socket;
            let mut line = String::new();
            reader.read_line(&mut line).unwrap();
            assert_eq!(line, "*IDN?\n");
            writer
                .write_all(b"Rigol Technologies,DG1022Z,DG1ZA0000,00.02.00\n")
                .unwrap();
        });

        let settings = InstrumentSettings {
            resource: format!("TCPIP0::127.0.0.1::{}::SOCKET", port),
            timeout_ms: 2000,
            ..InstrumentSettings::default()
        };
        let mut adapter = TcpAdapter::connect("127.0.0.1", port, &settings).unwrap();
        let reply = adapter.ask("*IDN?").unwrap();
        assert_eq!(reply, "Rigol Technologies,DG1022Z,DG1ZA0000,00.02.00");
        server.join().unwrap();
    }
}
