use std::io::{self, Read, Write};
use std::time::Duration;

use thiserror::Error;
use tracing::error;

// A blocked reply read returns within this bound so the link worker can
// check its stop flag between reads.
const READ_TIMEOUT: Duration = Duration::from_millis(200);

#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("Error: Unable to open serial port {port}: {source}")]
    Open {
        port: String,
        #[source]
        source: io::Error,
    },
    #[error("I/O error on serial port: {0}")]
    Io(#[from] io::Error),
    #[error("Failed to close serial port: {0}")]
    Close(#[source] io::Error),
}

pub trait SerialStream: Read + Write + Send {}

impl<T: Read + Write + Send> SerialStream for T {}

/// Opens the underlying byte stream for a (port, baud) pair.
pub trait Transport {
    fn connect(&mut self, port: &str, baud: u32) -> io::Result<Box<dyn SerialStream>>;
}

pub struct SystemSerial;

impl Transport for SystemSerial {
    fn connect(&mut self, port: &str, baud: u32) -> io::Result<Box<dyn SerialStream>> {
        let port = serialport::new(port, baud)
            .data_bits(serialport::DataBits::Eight)
            .stop_bits(serialport::StopBits::One)
            .parity(serialport::Parity::None)
            .timeout(READ_TIMEOUT)
            .open()?;

        Ok(Box::new(port))
    }
}

/// A single open serial connection. Constructed only by a successful
/// `open`, so a handle exists for exactly as long as the value does.
pub struct Connection {
    port: String,
    baud: u32,
    handle: Box<dyn SerialStream>,
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("port", &self.port)
            .field("baud", &self.baud)
            .finish_non_exhaustive()
    }
}

impl Connection {
    pub fn open(
        transport: &mut dyn Transport,
        port: &str,
        baud: u32,
    ) -> Result<Self, ConnectionError> {
        match transport.connect(port, baud) {
            Ok(handle) => Ok(Connection {
                port: port.to_string(),
                baud,
                handle,
            }),
            Err(e) => {
                error!("failed to open {port} at {baud}: {e}");
                Err(ConnectionError::Open {
                    port: port.to_string(),
                    source: e,
                })
            }
        }
    }

    pub fn port(&self) -> &str {
        &self.port
    }

    pub fn baud(&self) -> u32 {
        self.baud
    }

    /// Writes the UTF-8 bytes of `data`, exactly those bytes, then blocks
    /// for one reply line. `Ok(None)` means the device sent nothing back
    /// within the read timeout.
    pub fn send(&mut self, data: &str) -> Result<Option<String>, ConnectionError> {
        self.handle
            .write_all(data.as_bytes())
            .inspect_err(|e| error!("write to {} failed: {e}", self.port))?;

        self.listen()
    }

    /// Blocks for one newline-terminated line from the device.
    pub fn listen(&mut self) -> Result<Option<String>, ConnectionError> {
        let line = read_reply(&mut self.handle)
            .inspect_err(|e| error!("read from {} failed: {e}", self.port))?;

        Ok(line)
    }

    /// Flushes and drops the handle. The handle is gone either way.
    pub fn close(mut self) -> Result<(), ConnectionError> {
        self.handle.flush().map_err(|e| {
            error!("closing {} failed: {e}", self.port);
            ConnectionError::Close(e)
        })
    }
}

fn read_reply<R: Read>(stream: &mut R) -> io::Result<Option<String>> {
    let mut buf = Vec::new();
    let mut byte = [0u8; 1];

    loop {
        match stream.read(&mut byte) {
            Ok(1) => {
                if byte[0] == b'\n' {
                    break;
                }
                buf.push(byte[0]);
            }
            // End of stream: a partial line is still a line
            Ok(_) => {
                if buf.is_empty() {
                    return Ok(None);
                }
                break;
            }
            Err(e) if e.kind() == io::ErrorKind::TimedOut => {
                if buf.is_empty() {
                    return Ok(None);
                }
                break;
            }
            Err(e) => return Err(e),
        }
    }

    if buf.last() == Some(&b'\r') {
        buf.pop();
    }

    Ok(Some(String::from_utf8_lossy(&buf).to_string()))
}
