use std::fmt;
use std::io::{ErrorKind, Read, Write};
use std::time::{Duration, Instant};

use bytes::Bytes;
use serialport::ClearBuffer;
use tracing::{debug, trace};

use crate::checksum::{append_crc16, crc16, CRC16_LEN};
use crate::error::{Result, TransportError};
use crate::tcp::is_timeout_kind;
use crate::traits::{HexDump, Transport};

/// Any byte stream that can stand in for a serial line.
pub trait SerialLine: Read + Write + Send {}

impl<T: Read + Write + Send> SerialLine for T {}

/// Predicate over the bytes received so far; returning `true` ends a read early.
pub type EndingCheck = Box<dyn Fn(&[u8]) -> bool + Send>;

/// Serial port name and line speed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerialAddress {
    pub port: String,
    pub baud_rate: u32,
}

impl SerialAddress {
    pub fn new(port: impl Into<String>, baud_rate: u32) -> Self {
        Self {
            port: port.into(),
            baud_rate,
        }
    }
}

impl fmt::Display for SerialAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.port, self.baud_rate)
    }
}

/// Byte-oriented serial line transport.
///
/// Every write gets a CRC-16 trailer appended. Every read collects bytes until
/// the requested payload plus its trailer has arrived, the ending check is
/// satisfied, or the deadline passes; the trailer is then verified and stripped.
pub struct SerialTransport {
    line: Option<Box<dyn SerialLine>>,
    address: Option<SerialAddress>,
    timeout: Duration,
    ending_check: Option<EndingCheck>,
}

impl SerialTransport {
    /// Receive deadline used when `connect` is given a zero timeout.
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(100);
    /// Responses shorter than this (trailer included) count as no response.
    pub const RESPONSE_MIN_LEN: usize = 4;
    /// Driver-level read timeout; bounds how late a deadline is noticed.
    const POLL_INTERVAL: Duration = Duration::from_millis(10);
    const READ_CHUNK_SIZE: usize = 256;

    /// Create a disconnected transport.
    pub fn new() -> Self {
        Self {
            line: None,
            address: None,
            timeout: Self::DEFAULT_TIMEOUT,
            ending_check: None,
        }
    }

    /// End reads as soon as `check` accepts the bytes received so far.
    pub fn with_ending_check(mut self, check: impl Fn(&[u8]) -> bool + Send + 'static) -> Self {
        self.ending_check = Some(Box::new(check));
        self
    }

    /// Use an already open line (pty, bridge, test double) instead of a port.
    ///
    /// The receive deadline is only checked between reads, so `line` must
    /// return from `read` on its own: give it a read timeout (for example
    /// `UnixStream::set_read_timeout`) or put it in nonblocking mode. A line
    /// that blocks until data arrives makes `rx` wait for the peer.
    pub fn attach(&mut self, line: impl SerialLine + 'static, timeout: Duration) {
        self.disconnect();
        self.line = Some(Box::new(line));
        self.timeout = non_zero(timeout);
    }

    /// The address this transport last connected to.
    pub fn address(&self) -> Option<&SerialAddress> {
        self.address.as_ref()
    }
}

impl Default for SerialTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for SerialTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SerialTransport")
            .field("address", &self.address)
            .field("timeout", &self.timeout)
            .field("connected", &self.line.is_some())
            .field("ending_check", &self.ending_check.is_some())
            .finish()
    }
}

impl Transport for SerialTransport {
    type Address = SerialAddress;

    fn connect(&mut self, address: &Self::Address, timeout: Duration) -> Result<()> {
        self.disconnect();
        let connect_err = |err: serialport::Error| TransportError::Connect {
            address: address.to_string(),
            source: err.into(),
        };

        let port = serialport::new(&address.port, address.baud_rate)
            .timeout(Self::POLL_INTERVAL)
            .open()
            .map_err(connect_err)?;
        port.clear(ClearBuffer::All).map_err(connect_err)?;

        debug!(%address, ?timeout, "opened serial transport");
        self.line = Some(Box::new(port));
        self.address = Some(address.clone());
        self.timeout = non_zero(timeout);
        Ok(())
    }

    fn disconnect(&mut self) {
        if let Some(mut line) = self.line.take() {
            let _ = line.flush();
            debug!(address = ?self.address, "closed serial transport");
        }
    }

    fn connected(&self) -> bool {
        self.line.is_some()
    }

    fn tx(&mut self, data: &[u8]) -> Result<()> {
        let timeout = self.timeout;
        let line = self.line.as_mut().ok_or(TransportError::NotConnected)?;

        let mut frame = Vec::with_capacity(data.len() + CRC16_LEN);
        frame.extend_from_slice(data);
        append_crc16(&mut frame);

        let mut offset = 0usize;
        while offset < frame.len() {
            match line.write(&frame[offset..]) {
                Ok(0) => {
                    return Err(TransportError::ShortWrite {
                        written: offset,
                        expected: frame.len(),
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
        line.flush()?;

        trace!(len = frame.len(), data = %HexDump(&frame), "serial tx");
        Ok(())
    }

    fn rx(&mut self, size: usize, timeout: Option<Duration>) -> Result<Bytes> {
        let waited = timeout.map(non_zero).unwrap_or(self.timeout);
        let Self {
            line, ending_check, ..
        } = self;
        let line = line.as_mut().ok_or(TransportError::NotConnected)?;

        let wanted = size + CRC16_LEN;
        let deadline = Instant::now() + waited;
        let mut data = Vec::with_capacity(wanted);
        let mut chunk = [0u8; Self::READ_CHUNK_SIZE];

        while data.len() < wanted {
            let now = Instant::now();
            if now >= deadline {
                break;
            }

            let want = (wanted - data.len()).min(chunk.len());
            match line.read(&mut chunk[..want]) {
                Ok(0) => std::thread::sleep(Self::POLL_INTERVAL.min(deadline - now)),
                Ok(n) => {
                    data.extend_from_slice(&chunk[..n]);
                    if ending_check.as_ref().is_some_and(|check| check(data.as_slice())) {
                        break;
                    }
                }
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if is_timeout_kind(err.kind()) => continue,
                Err(err) => return Err(TransportError::Io(err)),
            }
        }

        trace!(len = data.len(), data = %HexDump(&data), "serial rx");

        if data.len() < Self::RESPONSE_MIN_LEN {
            return Err(TransportError::Timeout {
                waited,
                received: data.len(),
            });
        }
        if crc16(&data) != 0 {
            return Err(TransportError::Integrity { len: data.len() });
        }

        data.truncate(data.len() - CRC16_LEN);
        Ok(Bytes::from(data))
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    fn transport_name(&self) -> &'static str {
        "serial"
    }
}

impl Drop for SerialTransport {
    fn drop(&mut self) {
        self.disconnect();
    }
}

fn non_zero(timeout: Duration) -> Duration {
    if timeout.is_zero() {
        SerialTransport::DEFAULT_TIMEOUT
    } else {
        timeout
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    use super::*;

    /// In-memory line: reads drain `inbound`, writes land in `outbound`.
    #[derive(Clone, Default)]
    struct MemoryLine {
        inbound: Arc<Mutex<VecDeque<u8>>>,
        outbound: Arc<Mutex<Vec<u8>>>,
        byte_by_byte: bool,
    }

    impl MemoryLine {
        fn feed(&self, bytes: &[u8]) {
            self.inbound.lock().unwrap().extend(bytes.iter().copied());
        }

        fn written(&self) -> Vec<u8> {
            self.outbound.lock().unwrap().clone()
        }
    }

    impl Read for MemoryLine {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            let mut inbound = self.inbound.lock().unwrap();
            let limit = if self.byte_by_byte { 1 } else { buf.len() };
            let n = inbound.len().min(limit).min(buf.len());
            for slot in buf.iter_mut().take(n) {
                *slot = inbound.pop_front().unwrap();
            }
            Ok(n)
        }
    }

    impl Write for MemoryLine {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.outbound.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn with_trailer(payload: &[u8]) -> Vec<u8> {
        let mut buf = payload.to_vec();
        append_crc16(&mut buf);
        buf
    }

    fn attached(line: &MemoryLine) -> SerialTransport {
        let mut transport = SerialTransport::new();
        transport.attach(line.clone(), Duration::from_millis(50));
        transport
    }

    #[test]
    fn test_tx_appends_checksum_trailer() {
        let line = MemoryLine::default();
        let mut transport = attached(&line);

        transport.tx(b"\x05\x0a\x00\x00").unwrap();

        let written = line.written();
        assert_eq!(written, with_trailer(b"\x05\x0a\x00\x00"));
        assert_eq!(crc16(&written), 0);
    }

    #[test]
    fn test_rx_strips_verified_trailer() {
        let line = MemoryLine::default();
        line.feed(&with_trailer(b"payload!"));
        let mut transport = attached(&line);

        let data = transport.rx(8, None).unwrap();
        assert_eq!(data.as_ref(), b"payload!");
    }

    #[test]
    fn test_rx_accumulates_partial_reads() {
        let line = MemoryLine {
            byte_by_byte: true,
            ..MemoryLine::default()
        };
        line.feed(&with_trailer(&[0xAB; 32]));
        let mut transport = attached(&line);

        let data = transport.rx(32, Some(Duration::from_secs(1))).unwrap();
        assert_eq!(data.as_ref(), &[0xAB; 32]);
    }

    #[test]
    fn test_rx_too_short_is_timeout() {
        let line = MemoryLine::default();
        line.feed(&[0x01, 0x02, 0x03]);
        let mut transport = attached(&line);

        let err = transport.rx(16, None).unwrap_err();
        assert!(matches!(err, TransportError::Timeout { received: 3, .. }));
    }

    #[test]
    fn test_rx_silent_line_is_timeout() {
        let line = MemoryLine::default();
        let mut transport = attached(&line);

        let started = Instant::now();
        let err = transport.rx(16, Some(Duration::from_millis(30))).unwrap_err();
        assert!(err.is_timeout());
        assert!(started.elapsed() >= Duration::from_millis(30));
    }

    #[cfg(unix)]
    #[test]
    fn test_rx_deadline_on_socket_with_read_timeout() {
        let (line, _peer) = std::os::unix::net::UnixStream::pair().unwrap();
        line.set_read_timeout(Some(Duration::from_millis(5))).unwrap();
        let mut transport = SerialTransport::new();
        transport.attach(line, Duration::from_millis(40));

        let started = Instant::now();
        let err = transport.rx(16, None).unwrap_err();
        assert!(err.is_timeout());
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn test_rx_corrupt_frame_is_integrity_error() {
        let line = MemoryLine::default();
        let mut frame = with_trailer(b"payload!");
        frame[2] ^= 0xFF;
        line.feed(&frame);
        let mut transport = attached(&line);

        let err = transport.rx(8, None).unwrap_err();
        assert!(matches!(err, TransportError::Integrity { len: 10 }));
    }

    #[test]
    fn test_ending_check_stops_read_early() {
        let line = MemoryLine {
            byte_by_byte: true,
            ..MemoryLine::default()
        };
        let frame = with_trailer(b"short");
        line.feed(&frame);
        line.feed(b"trailing garbage");

        let expected_len = frame.len();
        let mut transport = SerialTransport::new()
            .with_ending_check(move |data: &[u8]| data.len() == expected_len && crc16(data) == 0);
        transport.attach(line.clone(), Duration::from_secs(1));

        let data = transport.rx(64, None).unwrap();
        assert_eq!(data.as_ref(), b"short");
        assert_eq!(line.inbound.lock().unwrap().len(), b"trailing garbage".len());
    }

    #[test]
    fn test_io_requires_connection() {
        let mut transport = SerialTransport::new();
        assert!(!transport.connected());
        assert!(matches!(
            transport.tx(b"abcd"),
            Err(TransportError::NotConnected)
        ));
    }

    #[test]
    fn test_connect_missing_port_fails() {
        let mut transport = SerialTransport::new();
        let err = transport
            .connect(
                &SerialAddress::new("/dev/devlink-does-not-exist", 115_200),
                Duration::from_millis(50),
            )
            .unwrap_err();
        assert!(matches!(err, TransportError::Connect { .. }));
    }
}
