use std::io::{ErrorKind, Read, Write};
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::time::Duration;

use bytes::Bytes;
use tracing::{debug, trace};

use crate::error::{Result, TransportError};
use crate::traits::{HexDump, Transport};

/// Stream socket transport.
///
/// `tx` performs a full blocking write. `rx` waits up to its deadline for the
/// first bytes and returns whatever arrived in that read, without spinning
/// until `size` bytes are available.
#[derive(Debug)]
pub struct TcpTransport {
    stream: Option<TcpStream>,
    address: Option<(String, u16)>,
    timeout: Duration,
}

impl TcpTransport {
    /// Receive deadline used when `connect` is given a zero timeout.
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(100);

    /// Create a disconnected transport.
    pub fn new() -> Self {
        Self {
            stream: None,
            address: None,
            timeout: Self::DEFAULT_TIMEOUT,
        }
    }

    /// Wrap an already connected stream, e.g. one returned by `accept`.
    pub fn from_stream(stream: TcpStream, timeout: Duration) -> Result<Self> {
        stream.set_nodelay(true)?;
        let address = stream
            .peer_addr()
            .ok()
            .map(|addr| (addr.ip().to_string(), addr.port()));
        Ok(Self {
            stream: Some(stream),
            address,
            timeout: non_zero(timeout),
        })
    }

    /// The `(host, port)` this transport last connected to.
    pub fn address(&self) -> Option<&(String, u16)> {
        self.address.as_ref()
    }

    fn stream(&mut self) -> Result<&mut TcpStream> {
        self.stream.as_mut().ok_or(TransportError::NotConnected)
    }
}

impl Default for TcpTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for TcpTransport {
    type Address = (String, u16);

    fn connect(&mut self, address: &Self::Address, timeout: Duration) -> Result<()> {
        self.disconnect();
        let timeout = non_zero(timeout);
        let target = format!("{}:{}", address.0, address.1);
        let connect_err = |source| TransportError::Connect {
            address: target.clone(),
            source,
        };

        let mut last_err = None;
        let candidates = (address.0.as_str(), address.1)
            .to_socket_addrs()
            .map_err(connect_err)?;
        for addr in candidates {
            match TcpStream::connect_timeout(&addr, timeout) {
                Ok(stream) => {
                    stream.set_nodelay(true).map_err(connect_err)?;
                    debug!(address = %target, ?timeout, "connected tcp transport");
                    self.stream = Some(stream);
                    self.address = Some(address.clone());
                    self.timeout = timeout;
                    return Ok(());
                }
                Err(err) => last_err = Some(err),
            }
        }

        Err(connect_err(last_err.unwrap_or_else(|| {
            std::io::Error::new(ErrorKind::NotFound, "address resolved to nothing")
        })))
    }

    fn disconnect(&mut self) {
        if let Some(stream) = self.stream.take() {
            let _ = stream.shutdown(Shutdown::Both);
            debug!(address = ?self.address, "disconnected tcp transport");
        }
    }

    fn connected(&self) -> bool {
        self.stream.is_some()
    }

    fn tx(&mut self, data: &[u8]) -> Result<()> {
        let timeout = self.timeout;
        let stream = self.stream()?;

        let mut offset = 0usize;
        while offset < data.len() {
            match stream.write(&data[offset..]) {
                Ok(0) => {
                    return Err(TransportError::ShortWrite {
                        written: offset,
                        expected: data.len(),
                    })
                }
                Ok(n) => offset += n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if is_timeout_kind(err.kind()) => {
                    return Err(TransportError::Timeout {
                        waited: timeout,
                        received: 0,
                    })
                }
                Err(err) => return Err(TransportError::Io(err)),
            }
        }
        stream.flush()?;

        trace!(len = data.len(), data = %HexDump(data), "tcp tx");
        Ok(())
    }

    fn rx(&mut self, size: usize, timeout: Option<Duration>) -> Result<Bytes> {
        let waited = timeout.map(non_zero).unwrap_or(self.timeout);
        let stream = self.stream()?;
        if size == 0 {
            return Ok(Bytes::new());
        }

        stream.set_read_timeout(Some(waited))?;
        let mut buf = vec![0u8; size];
        loop {
            match stream.read(&mut buf) {
                Ok(0) => return Err(TransportError::Closed),
                Ok(n) => {
                    buf.truncate(n);
                    trace!(len = n, data = %HexDump(&buf), "tcp rx");
                    return Ok(Bytes::from(buf));
                }
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if is_timeout_kind(err.kind()) => {
                    return Err(TransportError::Timeout {
                        waited,
                        received: 0,
                    })
                }
                Err(err) => return Err(TransportError::Io(err)),
            }
        }
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    fn transport_name(&self) -> &'static str {
        "tcp"
    }
}

impl Drop for TcpTransport {
    fn drop(&mut self) {
        self.disconnect();
    }
}

fn non_zero(timeout: Duration) -> Duration {
    if timeout.is_zero() {
        TcpTransport::DEFAULT_TIMEOUT
    } else {
        timeout
    }
}

pub(crate) fn is_timeout_kind(kind: ErrorKind) -> bool {
    matches!(kind, ErrorKind::WouldBlock | ErrorKind::TimedOut)
}
