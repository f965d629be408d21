use std::time::Duration;

use bytes::{Bytes, BytesMut};
use devlink_frame::{transact, ReadRequest, WriteRequest, PAYLOAD_SIZE};
use devlink_transport::Transport;
use tracing::{debug, info, warn};

use crate::error::{PeerError, Result};

/// Size of one transferred chunk.
pub const CHUNK_SIZE: usize = PAYLOAD_SIZE;

/// Number of whole chunks `send` transmits for a payload of `len` bytes.
///
/// Any `len % CHUNK_SIZE` trailing bytes are not transmitted.
pub fn chunk_count(len: usize) -> usize {
    len / CHUNK_SIZE
}

/// Configuration for chunked transfers.
#[derive(Debug, Clone)]
pub struct TransferConfig {
    /// Deadline for each request/ack round trip.
    pub timeout: Duration,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(1),
        }
    }
}

/// Result of [`ChunkedTransfer::recv`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Received {
    /// Out-of-band metadata from the INIT ack.
    pub metadata: Bytes,
    /// All chunks, concatenated in index order.
    pub data: Bytes,
    /// Chunk count announced by the device.
    pub chunk_count: u16,
}

/// Per-call transfer state; lives for one `send` or `recv`.
struct Session {
    chunk_count: u16,
    index: u16,
}

impl Session {
    fn new(chunk_count: u16) -> Self {
        Self {
            chunk_count,
            index: 0,
        }
    }

    fn indices(&self) -> std::ops::Range<u16> {
        self.index..self.chunk_count
    }

    /// Record chunk `index` as done and report progress as a percentage.
    fn complete(&mut self, index: u16, progress: &mut impl FnMut(f32)) {
        self.index = index + 1;
        progress(100.0 * f32::from(self.index) / f32::from(self.chunk_count));
    }
}

/// Moves buffers to and from a device as fixed-size chunks.
///
/// Each call is one blocking sequence of basic transactions on the caller's
/// thread. The first failing transaction aborts the whole transfer and its
/// error is returned unchanged; retrying the transfer is up to the caller.
/// A transport must not be shared by concurrent transfers.
pub struct ChunkedTransfer<'a, T: Transport + ?Sized> {
    transport: &'a mut T,
    config: TransferConfig,
}

impl<'a, T: Transport + ?Sized> ChunkedTransfer<'a, T> {
    /// Create a transfer with default configuration.
    pub fn new(transport: &'a mut T) -> Self {
        Self::with_config(transport, TransferConfig::default())
    }

    /// Create a transfer with explicit configuration.
    pub fn with_config(transport: &'a mut T, config: TransferConfig) -> Self {
        Self { transport, config }
    }

    /// Current configuration.
    pub fn config(&self) -> &TransferConfig {
        &self.config
    }

    /// Read the device's metadata and chunked data.
    ///
    /// `progress` is called after every chunk with the completed percentage.
    pub fn recv(&mut self, mut progress: impl FnMut(f32)) -> Result<Received> {
        let timeout = Some(self.config.timeout);

        let init = transact(&mut *self.transport, &ReadRequest::init(), timeout)?;
        let mut session = Session::new(init.argument);
        info!(
            transport = self.transport.transport_name(),
            chunks = session.chunk_count,
            "read transfer started"
        );

        let mut data = BytesMut::with_capacity(usize::from(session.chunk_count) * CHUNK_SIZE);
        for index in session.indices() {
            let ack = transact(&mut *self.transport, &ReadRequest::data(index), timeout)?;
            data.extend_from_slice(&ack.payload);
            debug!(index, "chunk received");
            session.complete(index, &mut progress);
        }

        info!(bytes = data.len(), "read transfer finished");
        Ok(Received {
            metadata: Bytes::copy_from_slice(&init.payload),
            data: data.freeze(),
            chunk_count: session.chunk_count,
        })
    }

    /// Write `metadata` (at most 128 bytes) and `payload` to the device.
    ///
    /// Only `chunk_count(payload.len())` whole chunks are sent; a trailing
    /// partial chunk is dropped.
    pub fn send(
        &mut self,
        metadata: &[u8],
        payload: &[u8],
        mut progress: impl FnMut(f32),
    ) -> Result<()> {
        let timeout = Some(self.config.timeout);

        let count = chunk_count(payload.len());
        let count = u16::try_from(count).map_err(|_| PeerError::ChunkCountOverflow {
            len: payload.len(),
            max: usize::from(u16::MAX),
        })?;
        let dropped = payload.len() % CHUNK_SIZE;
        if dropped > 0 {
            warn!(dropped, "payload tail shorter than one chunk is not sent");
        }

        let init = WriteRequest::init(count, metadata)?;
        transact(&mut *self.transport, &init, timeout)?;
        let mut session = Session::new(count);
        info!(
            transport = self.transport.transport_name(),
            chunks = count,
            "write transfer started"
        );

        for (index, chunk) in session.indices().zip(payload.chunks_exact(CHUNK_SIZE)) {
            let request = WriteRequest::data(index, chunk)?;
            transact(&mut *self.transport, &request, timeout)?;
            debug!(index, "chunk sent");
            session.complete(index, &mut progress);
        }

        info!(
            bytes = usize::from(count) * CHUNK_SIZE,
            "write transfer finished"
        );
        Ok(())
    }
}
