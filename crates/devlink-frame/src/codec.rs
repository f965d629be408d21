use bytes::{BufMut, BytesMut};
use devlink_transport::{crc16, CRC16_LEN};

use crate::error::{FrameError, Result};
use crate::opcode::{READ_DATA, READ_DONE, READ_INIT, WRITE_DATA, WRITE_INIT};

/// Frame header: len (1) + code (1) + argument (2) = 4 bytes.
pub const HEADER_SIZE: usize = 4;

/// Fixed payload size of payload-carrying frames (one chunk).
pub const PAYLOAD_SIZE: usize = 128;

/// A fixed-layout frame with an explicit byte encoding.
pub trait Frame: Sized {
    /// Exact encoded size, checksum included.
    const WIRE_SIZE: usize;

    /// Append the encoded frame to `dst`.
    fn encode(&self, dst: &mut BytesMut);

    /// Decode a frame, validating its size and embedded checksum.
    fn decode(src: &[u8]) -> Result<Self>;

    /// Encode into a fresh buffer.
    fn to_bytes(&self) -> BytesMut {
        let mut dst = BytesMut::with_capacity(Self::WIRE_SIZE);
        self.encode(&mut dst);
        dst
    }
}

/// A request frame; answered by exactly one [`Request::Ack`].
pub trait Request: Frame + std::fmt::Debug {
    type Ack: Ack;

    fn opcode(&self) -> u8;
    fn argument(&self) -> u16;
}

/// An acknowledgement frame.
pub trait Ack: Frame + std::fmt::Debug {
    fn ack(&self) -> u8;
    fn argument(&self) -> u16;
}

/// Read request: `len, req, arg, crc16`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadRequest {
    pub opcode: u8,
    pub argument: u16,
}

impl ReadRequest {
    pub fn init() -> Self {
        Self {
            opcode: READ_INIT,
            argument: 0,
        }
    }

    pub fn data(index: u16) -> Self {
        Self {
            opcode: READ_DATA,
            argument: index,
        }
    }

    pub fn done() -> Self {
        Self {
            opcode: READ_DONE,
            argument: 0,
        }
    }
}

/// Read ack: `len, ack, arg, payload[128], crc16`.
///
/// On INIT the argument is the chunk count and the payload the metadata;
/// on DATA the argument echoes the index and the payload is one chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadAck {
    pub ack: u8,
    pub argument: u16,
    pub payload: [u8; PAYLOAD_SIZE],
}

impl ReadAck {
    /// Build an ack; `payload` is zero-padded to [`PAYLOAD_SIZE`].
    pub fn new(ack: u8, argument: u16, payload: &[u8]) -> Result<Self> {
        Ok(Self {
            ack,
            argument,
            payload: pad_payload(payload)?,
        })
    }
}

/// Write request: `len, req, arg, payload[128], crc16`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteRequest {
    pub opcode: u8,
    pub argument: u16,
    pub payload: [u8; PAYLOAD_SIZE],
}

impl WriteRequest {
    /// Start a write of `chunk_count` chunks, carrying `metadata` (at most 128 bytes).
    pub fn init(chunk_count: u16, metadata: &[u8]) -> Result<Self> {
        Ok(Self {
            opcode: WRITE_INIT,
            argument: chunk_count,
            payload: pad_payload(metadata)?,
        })
    }

    /// Carry chunk `index`.
    pub fn data(index: u16, chunk: &[u8]) -> Result<Self> {
        Ok(Self {
            opcode: WRITE_DATA,
            argument: index,
            payload: pad_payload(chunk)?,
        })
    }
}

/// Write ack: `len, ack, arg, crc16`. Also the shape of error acks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteAck {
    pub ack: u8,
    pub argument: u16,
}

impl Frame for ReadRequest {
    const WIRE_SIZE: usize = HEADER_SIZE + CRC16_LEN;

    fn encode(&self, dst: &mut BytesMut) {
        encode_frame(Self::WIRE_SIZE, self.opcode, self.argument, None, dst);
    }

    fn decode(src: &[u8]) -> Result<Self> {
        let (opcode, argument) = decode_header(Self::WIRE_SIZE, src)?;
        Ok(Self { opcode, argument })
    }
}

impl Frame for ReadAck {
    const WIRE_SIZE: usize = HEADER_SIZE + PAYLOAD_SIZE + CRC16_LEN;

    fn encode(&self, dst: &mut BytesMut) {
        encode_frame(
            Self::WIRE_SIZE,
            self.ack,
            self.argument,
            Some(&self.payload),
            dst,
        );
    }

    fn decode(src: &[u8]) -> Result<Self> {
        let (ack, argument) = decode_header(Self::WIRE_SIZE, src)?;
        Ok(Self {
            ack,
            argument,
            payload: read_payload(src),
        })
    }
}

impl Frame for WriteRequest {
    const WIRE_SIZE: usize = HEADER_SIZE + PAYLOAD_SIZE + CRC16_LEN;

    fn encode(&self, dst: &mut BytesMut) {
        encode_frame(
            Self::WIRE_SIZE,
            self.opcode,
            self.argument,
            Some(&self.payload),
            dst,
        );
    }

    fn decode(src: &[u8]) -> Result<Self> {
        let (opcode, argument) = decode_header(Self::WIRE_SIZE, src)?;
        Ok(Self {
            opcode,
            argument,
            payload: read_payload(src),
        })
    }
}

impl Frame for WriteAck {
    const WIRE_SIZE: usize = HEADER_SIZE + CRC16_LEN;

    fn encode(&self, dst: &mut BytesMut) {
        encode_frame(Self::WIRE_SIZE, self.ack, self.argument, None, dst);
    }

    fn decode(src: &[u8]) -> Result<Self> {
        let (ack, argument) = decode_header(Self::WIRE_SIZE, src)?;
        Ok(Self { ack, argument })
    }
}

impl Request for ReadRequest {
    type Ack = ReadAck;

    fn opcode(&self) -> u8 {
        self.opcode
    }

    fn argument(&self) -> u16 {
        self.argument
    }
}

impl Request for WriteRequest {
    type Ack = WriteAck;

    fn opcode(&self) -> u8 {
        self.opcode
    }

    fn argument(&self) -> u16 {
        self.argument
    }
}

impl Ack for ReadAck {
    fn ack(&self) -> u8 {
        self.ack
    }

    fn argument(&self) -> u16 {
        self.argument
    }
}

impl Ack for WriteAck {
    fn ack(&self) -> u8 {
        self.ack
    }

    fn argument(&self) -> u16 {
        self.argument
    }
}

/// Encode `len, code, arg, [payload], crc16` into `dst`.
///
/// `len` is `wire_size - 1`; the checksum covers everything after `len`.
fn encode_frame(
    wire_size: usize,
    code: u8,
    argument: u16,
    payload: Option<&[u8; PAYLOAD_SIZE]>,
    dst: &mut BytesMut,
) {
    dst.reserve(wire_size);
    let start = dst.len();
    // Every frame type is well under 256 bytes.
    dst.put_u8((wire_size - 1) as u8);
    dst.put_u8(code);
    dst.put_u16_le(argument);
    if let Some(payload) = payload {
        dst.put_slice(payload);
    }
    let crc = crc16(&dst[start + 1..]);
    dst.put_u16_le(crc);
}

fn decode_header(wire_size: usize, src: &[u8]) -> Result<(u8, u16)> {
    if src.len() != wire_size {
        return Err(FrameError::Length {
            expected: wire_size,
            actual: src.len(),
        });
    }
    if crc16(&src[1..]) != 0 {
        return Err(FrameError::Integrity);
    }
    Ok((src[1], u16::from_le_bytes([src[2], src[3]])))
}

fn read_payload(src: &[u8]) -> [u8; PAYLOAD_SIZE] {
    let mut payload = [0u8; PAYLOAD_SIZE];
    payload.copy_from_slice(&src[HEADER_SIZE..HEADER_SIZE + PAYLOAD_SIZE]);
    payload
}

fn pad_payload(data: &[u8]) -> Result<[u8; PAYLOAD_SIZE]> {
    if data.len() > PAYLOAD_SIZE {
        return Err(FrameError::PayloadTooLarge {
            size: data.len(),
            max: PAYLOAD_SIZE,
        });
    }
    let mut payload = [0u8; PAYLOAD_SIZE];
    payload[..data.len()].copy_from_slice(data);
    Ok(payload)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::opcode::ERROR_ACK;

    #[test]
    fn test_wire_sizes() {
        assert_eq!(ReadRequest::WIRE_SIZE, 6);
        assert_eq!(ReadAck::WIRE_SIZE, 134);
        assert_eq!(WriteRequest::WIRE_SIZE, 134);
        assert_eq!(WriteAck::WIRE_SIZE, 6);
    }

    #[test]
    fn test_read_request_layout() {
        let bytes = ReadRequest::data(0x0102).to_bytes();
        let crc = crc16(&[READ_DATA, 0x02, 0x01]).to_le_bytes();
        assert_eq!(bytes.as_ref(), &[5, READ_DATA, 0x02, 0x01, crc[0], crc[1]]);
    }

    #[test]
    fn test_write_request_layout_and_residue() {
        let request = WriteRequest::init(3, b"meta").unwrap();
        let bytes = request.to_bytes();

        assert_eq!(bytes.len(), WriteRequest::WIRE_SIZE);
        assert_eq!(bytes[0], 133);
        assert_eq!(bytes[1], WRITE_INIT);
        assert_eq!(&bytes[2..4], &[3, 0]);
        assert_eq!(&bytes[4..8], b"meta");
        assert!(bytes[8..HEADER_SIZE + PAYLOAD_SIZE].iter().all(|&b| b == 0));
        assert_eq!(crc16(&bytes[1..]), 0);
    }

    #[test]
    fn test_read_ack_decodes_fields() {
        let ack = ReadAck::new(READ_INIT, 7, &[0x5A; 16]).unwrap();
        let decoded = ReadAck::decode(&ack.to_bytes()).unwrap();

        assert_eq!(decoded.ack, READ_INIT);
        assert_eq!(decoded.argument, 7);
        assert_eq!(&decoded.payload[..16], &[0x5A; 16]);
        assert_eq!(&decoded.payload[16..], &[0u8; PAYLOAD_SIZE - 16][..]);
    }

    #[test]
    fn test_decode_rejects_wrong_length() {
        let bytes = WriteAck {
            ack: WRITE_DATA,
            argument: 1,
        }
        .to_bytes();
        let err = ReadAck::decode(&bytes).unwrap_err();
        assert!(matches!(
            err,
            FrameError::Length {
                expected: 134,
                actual: 6
            }
        ));
    }

    #[test]
    fn test_decode_rejects_corrupt_checksum() {
        let mut bytes = ReadAck::new(READ_DATA, 0, b"chunk").unwrap().to_bytes();
        bytes[10] ^= 0x01;
        assert!(matches!(
            ReadAck::decode(&bytes),
            Err(FrameError::Integrity)
        ));
    }

    #[test]
    fn test_len_byte_is_not_checksummed() {
        let mut bytes = WriteAck {
            ack: ERROR_ACK,
            argument: 4,
        }
        .to_bytes();
        bytes[0] = 0xEE;
        let ack = WriteAck::decode(&bytes).unwrap();
        assert_eq!(ack.ack, ERROR_ACK);
        assert_eq!(ack.argument, 4);
    }

    #[test]
    fn test_payload_too_large() {
        let err = WriteRequest::data(0, &[0u8; PAYLOAD_SIZE + 1]).unwrap_err();
        assert!(matches!(err, FrameError::PayloadTooLarge { size: 129, max: 128 }));
    }

    #[test]
    fn test_encode_appends_to_existing_buffer() {
        let mut dst = BytesMut::from(&b"xx"[..]);
        ReadRequest::init().encode(&mut dst);
        assert_eq!(dst.len(), 2 + ReadRequest::WIRE_SIZE);
        assert_eq!(
            ReadRequest::decode(&dst[2..]).unwrap(),
            ReadRequest::init()
        );
    }
}
