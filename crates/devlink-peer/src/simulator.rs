//! Device-side frame handling for tests, demos and bench setups.

use std::io::{self, ErrorKind, Read, Write};
use std::net::TcpListener;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use devlink_frame::{
    is_read, is_write, opcode_name, DeviceError, Frame, FrameError, ReadAck, ReadRequest,
    WriteAck, WriteRequest, ERROR_ACK, PAYLOAD_SIZE, READ_DATA, READ_DONE, READ_INIT, WRITE_INIT,
};
use devlink_transport::{append_crc16, crc16, Transport, TransportError, CRC16_LEN};
use tracing::{debug, info, warn};

use crate::error::{PeerError, Result};

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// In-memory device that answers devlink requests.
///
/// Reads serve the stored metadata and chunks. A write INIT replaces the
/// metadata and resets storage to the announced number of zeroed chunks,
/// which subsequent write DATA frames fill in.
#[derive(Debug, Clone)]
pub struct DeviceSimulator {
    metadata: [u8; PAYLOAD_SIZE],
    chunks: Vec<[u8; PAYLOAD_SIZE]>,
}

impl Default for DeviceSimulator {
    fn default() -> Self {
        Self {
            metadata: [0u8; PAYLOAD_SIZE],
            chunks: Vec::new(),
        }
    }
}

impl DeviceSimulator {
    /// Create a device holding `metadata` and `data`.
    ///
    /// `data` is split into chunks; a short last chunk is zero-padded.
    pub fn new(metadata: &[u8], data: &[u8]) -> Result<Self> {
        if metadata.len() > PAYLOAD_SIZE {
            return Err(FrameError::PayloadTooLarge {
                size: metadata.len(),
                max: PAYLOAD_SIZE,
            }
            .into());
        }
        let count = data.len().div_ceil(PAYLOAD_SIZE);
        if count > usize::from(u16::MAX) {
            return Err(PeerError::ChunkCountOverflow {
                len: data.len(),
                max: usize::from(u16::MAX),
            });
        }

        let mut simulator = Self::default();
        simulator.metadata[..metadata.len()].copy_from_slice(metadata);
        simulator.chunks = data
            .chunks(PAYLOAD_SIZE)
            .map(|chunk| {
                let mut padded = [0u8; PAYLOAD_SIZE];
                padded[..chunk.len()].copy_from_slice(chunk);
                padded
            })
            .collect();
        Ok(simulator)
    }

    /// Stored metadata, always [`PAYLOAD_SIZE`] bytes.
    pub fn metadata(&self) -> &[u8] {
        &self.metadata
    }

    /// Stored chunks, concatenated.
    pub fn data(&self) -> Vec<u8> {
        self.chunks.concat()
    }

    pub fn chunk_count(&self) -> u16 {
        // `new` and write INIT both bound the count by u16.
        self.chunks.len() as u16
    }

    /// Answer one encoded request frame with one encoded ack frame.
    pub fn handle(&mut self, request: &[u8]) -> Bytes {
        match self.dispatch(request) {
            Ok(ack) => ack,
            Err(code) => {
                warn!(
                    opcode = request.get(1).copied().map(opcode_name),
                    len = request.len(),
                    %code,
                    "rejecting request"
                );
                WriteAck {
                    ack: ERROR_ACK,
                    argument: code.code(),
                }
                .to_bytes()
                .freeze()
            }
        }
    }

    fn dispatch(&mut self, request: &[u8]) -> std::result::Result<Bytes, DeviceError> {
        if request.len() < ReadRequest::WIRE_SIZE {
            return Err(DeviceError::Len);
        }
        if crc16(&request[1..]) != 0 {
            return Err(DeviceError::Crc);
        }

        let opcode = request[1];
        let ack = if is_read(opcode) {
            let request = ReadRequest::decode(request).map_err(|_| DeviceError::Len)?;
            self.read(&request)?.to_bytes()
        } else if is_write(opcode) {
            let request = WriteRequest::decode(request).map_err(|_| DeviceError::Len)?;
            self.write(&request)?.to_bytes()
        } else {
            return Err(DeviceError::Func);
        };
        Ok(ack.freeze())
    }

    fn read(&self, request: &ReadRequest) -> std::result::Result<ReadAck, DeviceError> {
        let ack = match request.opcode {
            READ_INIT => ReadAck {
                ack: READ_INIT,
                argument: self.chunk_count(),
                payload: self.metadata,
            },
            READ_DATA => {
                let chunk = self
                    .chunks
                    .get(usize::from(request.argument))
                    .ok_or(DeviceError::Data)?;
                ReadAck {
                    ack: READ_DATA,
                    argument: request.argument,
                    payload: *chunk,
                }
            }
            _ => ReadAck {
                ack: READ_DONE,
                argument: 0,
                payload: [0u8; PAYLOAD_SIZE],
            },
        };
        debug!(opcode = opcode_name(ack.ack), argument = ack.argument, "read served");
        Ok(ack)
    }

    fn write(&mut self, request: &WriteRequest) -> std::result::Result<WriteAck, DeviceError> {
        let argument = match request.opcode {
            WRITE_INIT => {
                self.metadata = request.payload;
                self.chunks = vec![[0u8; PAYLOAD_SIZE]; usize::from(request.argument)];
                info!(chunks = request.argument, "write session started");
                0
            }
            _ => {
                let slot = self
                    .chunks
                    .get_mut(usize::from(request.argument))
                    .ok_or(DeviceError::Data)?;
                *slot = request.payload;
                request.argument
            }
        };
        debug!(
            opcode = opcode_name(request.opcode),
            argument = request.argument,
            "write stored"
        );
        Ok(WriteAck {
            ack: request.opcode,
            argument,
        })
    }
}

/// How frames are delimited on a served link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Framing {
    /// Bare frames, as carried over TCP.
    Plain,
    /// Frames followed by a CRC-16 trailer, as carried over a serial line.
    Trailer,
}

impl Framing {
    fn trailer_len(self) -> usize {
        match self {
            Framing::Plain => 0,
            Framing::Trailer => CRC16_LEN,
        }
    }
}

/// Answer frames arriving on `link` until the peer closes it.
pub fn serve<L: Read + Write>(
    link: &mut L,
    simulator: &mut DeviceSimulator,
    framing: Framing,
) -> io::Result<()> {
    serve_until(link, simulator, framing, &AtomicBool::new(false))
}

/// Accept connections on `listener` one at a time and serve each until it
/// closes, returning once `stop` is raised.
pub fn serve_tcp(
    listener: &TcpListener,
    simulator: &mut DeviceSimulator,
    stop: &AtomicBool,
) -> io::Result<()> {
    listener.set_nonblocking(true)?;
    info!(addr = ?listener.local_addr().ok(), "simulator listening");

    while !stop.load(Ordering::Relaxed) {
        match listener.accept() {
            Ok((mut stream, peer)) => {
                debug!(%peer, "client connected");
                stream.set_nonblocking(false)?;
                stream.set_read_timeout(Some(POLL_INTERVAL))?;
                stream.set_nodelay(true)?;
                if let Err(err) = serve_until(&mut stream, simulator, Framing::Plain, stop) {
                    warn!(%peer, error = %err, "client connection failed");
                }
                debug!(%peer, "client disconnected");
            }
            Err(err) if err.kind() == ErrorKind::WouldBlock => std::thread::sleep(POLL_INTERVAL),
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => return Err(err),
        }
    }

    info!("simulator stopped");
    Ok(())
}

fn serve_until<L: Read + Write>(
    link: &mut L,
    simulator: &mut DeviceSimulator,
    framing: Framing,
    stop: &AtomicBool,
) -> io::Result<()> {
    let mut len = [0u8; 1];
    while !stop.load(Ordering::Relaxed) {
        match link.read(&mut len) {
            Ok(0) => return Ok(()),
            Ok(_) => {}
            Err(err) if is_idle(&err) => continue,
            Err(err) => return Err(err),
        }

        let mut frame = vec![0u8; 1 + usize::from(len[0]) + framing.trailer_len()];
        frame[0] = len[0];
        if !fill(link, &mut frame[1..], stop)? {
            return Ok(());
        }

        let mut reply = match framing {
            Framing::Plain => simulator.handle(&frame).to_vec(),
            Framing::Trailer if crc16(&frame) != 0 => WriteAck {
                ack: ERROR_ACK,
                argument: DeviceError::Crc.code(),
            }
            .to_bytes()
            .to_vec(),
            Framing::Trailer => simulator
                .handle(&frame[..frame.len() - CRC16_LEN])
                .to_vec(),
        };
        if framing == Framing::Trailer {
            append_crc16(&mut reply);
        }
        link.write_all(&reply)?;
        link.flush()?;
    }
    Ok(())
}

/// Read until `buf` is full, waiting out idle polls so a frame split across
/// reads stays intact. Returns `false` on EOF or once `stop` is raised.
fn fill<L: Read>(link: &mut L, buf: &mut [u8], stop: &AtomicBool) -> io::Result<bool> {
    let mut filled = 0;
    while filled < buf.len() {
        if stop.load(Ordering::Relaxed) {
            return Ok(false);
        }
        match link.read(&mut buf[filled..]) {
            Ok(0) => {
                if filled > 0 {
                    warn!(
                        expected = buf.len() + 1,
                        received = filled + 1,
                        "peer closed mid-frame"
                    );
                }
                return Ok(false);
            }
            Ok(n) => filled += n,
            Err(err) if is_idle(&err) => continue,
            Err(err) => return Err(err),
        }
    }
    Ok(true)
}

fn is_idle(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        ErrorKind::WouldBlock | ErrorKind::TimedOut | ErrorKind::Interrupted
    )
}

/// A [`Transport`] wired directly to a [`DeviceSimulator`].
///
/// Every transmitted frame is answered synchronously; the reply is buffered
/// and handed out by subsequent reads.
#[derive(Debug, Default)]
pub struct SimulatedTransport {
    simulator: DeviceSimulator,
    pending: BytesMut,
    sent: Vec<u8>,
    connected: bool,
    fail_after: Option<usize>,
    timeout: Duration,
}

impl SimulatedTransport {
    /// A connected transport in front of `simulator`.
    pub fn new(simulator: DeviceSimulator) -> Self {
        Self {
            simulator,
            connected: true,
            timeout: Duration::from_millis(100),
            ..Self::default()
        }
    }

    /// Stop answering after `exchanges` requests.
    pub fn fail_after(mut self, exchanges: usize) -> Self {
        self.fail_after = Some(exchanges);
        self
    }

    pub fn simulator(&self) -> &DeviceSimulator {
        &self.simulator
    }

    /// Number of frames transmitted so far.
    pub fn exchanges(&self) -> usize {
        self.sent.len()
    }

    /// Opcode of every frame transmitted so far.
    pub fn sent_opcodes(&self) -> Vec<u8> {
        self.sent.clone()
    }
}

impl Transport for SimulatedTransport {
    type Address = ();

    fn connect(&mut self, _address: &(), timeout: Duration) -> devlink_transport::Result<()> {
        self.connected = true;
        self.timeout = timeout;
        Ok(())
    }

    fn disconnect(&mut self) {
        self.connected = false;
        self.pending.clear();
    }

    fn connected(&self) -> bool {
        self.connected
    }

    fn tx(&mut self, data: &[u8]) -> devlink_transport::Result<()> {
        if !self.connected {
            return Err(TransportError::NotConnected);
        }
        self.sent.push(data.get(1).copied().unwrap_or_default());
        if self.fail_after.is_some_and(|limit| self.sent.len() > limit) {
            return Ok(());
        }
        let reply = self.simulator.handle(data);
        self.pending.extend_from_slice(&reply);
        Ok(())
    }

    fn rx(&mut self, size: usize, timeout: Option<Duration>) -> devlink_transport::Result<Bytes> {
        if !self.connected {
            return Err(TransportError::NotConnected);
        }
        if self.pending.is_empty() {
            return Err(TransportError::Timeout {
                waited: timeout.unwrap_or(self.timeout),
                received: 0,
            });
        }
        let n = size.min(self.pending.len());
        Ok(self.pending.split_to(n).freeze())
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    fn transport_name(&self) -> &'static str {
        "simulated"
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::net::TcpStream;
    use std::os::unix::net::UnixStream;
    use std::sync::Arc;

    use devlink_frame::{transact, Ack};
    use devlink_transport::{SerialTransport, TcpTransport};

    use super::*;
    use crate::transfer::ChunkedTransfer;

    /// Line that hands out scripted reads, including idle polls.
    #[derive(Default)]
    struct StutterLine {
        reads: VecDeque<io::Result<Vec<u8>>>,
        written: Vec<u8>,
    }

    impl Read for StutterLine {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            match self.reads.pop_front() {
                None => Ok(0),
                Some(Err(err)) => Err(err),
                Some(Ok(mut chunk)) => {
                    let n = chunk.len().min(buf.len());
                    buf[..n].copy_from_slice(&chunk[..n]);
                    if n < chunk.len() {
                        self.reads.push_front(Ok(chunk.split_off(n)));
                    }
                    Ok(n)
                }
            }
        }
    }

    impl Write for StutterLine {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.written.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn rejection(reply: &[u8]) -> DeviceError {
        let ack = WriteAck::decode(reply).unwrap();
        assert_eq!(ack.ack(), ERROR_ACK);
        DeviceError::from_code(ack.argument())
    }

    #[test]
    fn test_new_pads_last_chunk() {
        let simulator = DeviceSimulator::new(b"m", &[7u8; PAYLOAD_SIZE + 1]).unwrap();
        assert_eq!(simulator.chunk_count(), 2);
        let data = simulator.data();
        assert_eq!(data.len(), 2 * PAYLOAD_SIZE);
        assert_eq!(data[PAYLOAD_SIZE], 7);
        assert!(data[PAYLOAD_SIZE + 1..].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_new_rejects_large_metadata() {
        let err = DeviceSimulator::new(&[0u8; PAYLOAD_SIZE + 1], &[]).unwrap_err();
        assert!(matches!(
            err,
            PeerError::Frame(FrameError::PayloadTooLarge { .. })
        ));
    }

    #[test]
    fn test_read_init_reports_count_and_metadata() {
        let mut simulator = DeviceSimulator::new(b"hello", &[1u8; 3 * PAYLOAD_SIZE]).unwrap();
        let reply = simulator.handle(&ReadRequest::init().to_bytes());
        let ack = ReadAck::decode(&reply).unwrap();
        assert_eq!(ack.ack, READ_INIT);
        assert_eq!(ack.argument, 3);
        assert_eq!(&ack.payload[..5], b"hello");
    }

    #[test]
    fn test_read_done_acks_with_zero() {
        let mut simulator = DeviceSimulator::default();
        let reply = simulator.handle(&ReadRequest::done().to_bytes());
        let ack = ReadAck::decode(&reply).unwrap();
        assert_eq!((ack.ack, ack.argument), (READ_DONE, 0));
    }

    #[test]
    fn test_write_init_resets_storage() {
        let mut simulator = DeviceSimulator::new(b"old", &[9u8; 4 * PAYLOAD_SIZE]).unwrap();
        let reply = simulator.handle(&WriteRequest::init(1, b"new").unwrap().to_bytes());
        let ack = WriteAck::decode(&reply).unwrap();
        assert_eq!((ack.ack, ack.argument), (WRITE_INIT, 0));
        assert_eq!(simulator.chunk_count(), 1);
        assert_eq!(&simulator.metadata()[..3], b"new");
        assert!(simulator.data().iter().all(|&b| b == 0));
    }

    #[test]
    fn test_rejections_carry_device_error_codes() {
        let mut simulator = DeviceSimulator::default();

        let reply = simulator.handle(&ReadRequest::data(0).to_bytes());
        assert_eq!(rejection(&reply), DeviceError::Data);

        let mut unknown = ReadRequest::init().to_bytes().to_vec();
        unknown[1] = 0x42;
        let crc = crc16(&unknown[1..4]).to_le_bytes();
        unknown[4..].copy_from_slice(&crc);
        assert_eq!(rejection(&simulator.handle(&unknown)), DeviceError::Func);

        assert_eq!(rejection(&simulator.handle(&[1, 2, 3])), DeviceError::Len);

        let mut corrupt = ReadRequest::init().to_bytes().to_vec();
        corrupt[2] ^= 0x10;
        assert_eq!(rejection(&simulator.handle(&corrupt)), DeviceError::Crc);

        // A read opcode framed at write size.
        let mut oversized = WriteRequest::init(0, b"").unwrap().to_bytes().to_vec();
        oversized[1] = READ_INIT;
        let end = oversized.len() - CRC16_LEN;
        let crc = crc16(&oversized[1..end]).to_le_bytes();
        oversized[end..].copy_from_slice(&crc);
        assert_eq!(rejection(&simulator.handle(&oversized)), DeviceError::Len);
    }

    #[test]
    fn test_simulated_transport_goes_silent() {
        let mut transport = SimulatedTransport::new(DeviceSimulator::default()).fail_after(1);
        transact(&mut transport, &ReadRequest::init(), None).unwrap();
        let err = transact(&mut transport, &ReadRequest::init(), None).unwrap_err();
        assert!(err.is_timeout());
        assert_eq!(transport.exchanges(), 2);
    }

    #[test]
    fn test_serve_keeps_frame_split_by_idle_poll() {
        let request = ReadRequest::init().to_bytes().to_vec();
        let mut line = StutterLine::default();
        line.reads.push_back(Ok(request[..3].to_vec()));
        line.reads.push_back(Err(io::Error::from(ErrorKind::WouldBlock)));
        line.reads.push_back(Ok(request[3..].to_vec()));

        let mut simulator = DeviceSimulator::new(b"split", &[7u8; PAYLOAD_SIZE]).unwrap();
        serve(&mut line, &mut simulator, Framing::Plain).unwrap();

        let ack = ReadAck::decode(&line.written).unwrap();
        assert_eq!((ack.ack, ack.argument), (READ_INIT, 1));
        assert_eq!(&ack.payload[..5], b"split");
    }

    #[test]
    fn test_serial_link_end_to_end() {
        let (client, mut device) = UnixStream::pair().unwrap();
        let data: Vec<u8> = (0..2 * PAYLOAD_SIZE).map(|i| i as u8).collect();
        let mut simulator = DeviceSimulator::new(b"serial", &data).unwrap();
        let server = std::thread::spawn(move || {
            serve(&mut device, &mut simulator, Framing::Trailer).unwrap();
        });

        let mut transport = SerialTransport::new();
        transport.attach(client, Duration::from_secs(1));
        let received = ChunkedTransfer::new(&mut transport).recv(|_| {}).unwrap();
        assert_eq!(received.chunk_count, 2);
        assert_eq!(received.data.as_ref(), data.as_slice());

        transport.disconnect();
        drop(transport);
        server.join().unwrap();
    }

    #[test]
    fn test_tcp_server_round_trip() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let stop = Arc::new(AtomicBool::new(false));

        let server = {
            let stop = Arc::clone(&stop);
            std::thread::spawn(move || {
                let mut simulator = DeviceSimulator::default();
                serve_tcp(&listener, &mut simulator, &stop).unwrap();
                simulator
            })
        };

        let payload = vec![0x5Au8; 3 * PAYLOAD_SIZE];
        let mut transport = TcpTransport::new();
        transport
            .connect(&("127.0.0.1".to_string(), port), Duration::from_secs(1))
            .unwrap();
        ChunkedTransfer::new(&mut transport)
            .send(b"tcp", &payload, |_| {})
            .unwrap();
        transport.disconnect();

        // The server sees EOF before it is asked to stop.
        std::thread::sleep(Duration::from_millis(200));
        stop.store(true, Ordering::Relaxed);
        let simulator = server.join().unwrap();
        assert_eq!(simulator.data(), payload);
        assert_eq!(&simulator.metadata()[..3], b"tcp");

        assert!(TcpStream::connect(("127.0.0.1", port)).is_err());
    }
}
