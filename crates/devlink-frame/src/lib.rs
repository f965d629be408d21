//! Fixed-layout request/acknowledgement frames for devlink.
//!
//! Every frame is little-endian and laid out as:
//!
//! ```text
//! ┌──────────┬───────────┬────────────┬──────────────────┬────────────┐
//! │ len (1B) │ code (1B) │ arg (2B LE)│ payload (0/128B) │ crc16 (2B) │
//! └──────────┴───────────┴────────────┴──────────────────┴────────────┘
//! ```
//!
//! `len` is the frame size minus one, and `crc16` covers every byte after
//! `len` up to the end of the payload. The [`transact`] function performs the
//! single synchronous request/ack round trip all higher layers build on.

pub mod codec;
pub mod error;
pub mod opcode;
pub mod status;
pub mod transaction;

pub use codec::{
    Ack, Frame, ReadAck, ReadRequest, Request, WriteAck, WriteRequest, HEADER_SIZE, PAYLOAD_SIZE,
};
pub use error::{FrameError, Result};
pub use opcode::{
    is_read, is_write, opcode_name, ERROR_ACK, READ_DATA, READ_DONE, READ_INIT, WRITE_DATA,
    WRITE_INIT,
};
pub use status::DeviceError;
pub use transaction::transact;
