use devlink_transport::TransportError;

use crate::status::DeviceError;

/// Errors that can occur while encoding, decoding or exchanging frames.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// A received frame has the wrong size for its type.
    #[error("frame length mismatch (expected {expected} bytes, got {actual})")]
    Length { expected: usize, actual: usize },

    /// A received frame's embedded checksum does not verify.
    #[error("frame checksum verification failed")]
    Integrity,

    /// The ack code does not echo the request opcode.
    #[error("ack 0x{ack:02x} does not match request 0x{request:02x}: {code}")]
    Mismatch {
        request: u8,
        ack: u8,
        code: DeviceError,
    },

    /// Data does not fit in a frame field.
    #[error("payload too large ({size} bytes, max {max})")]
    PayloadTooLarge { size: usize, max: usize },
}

impl FrameError {
    /// True when the underlying failure was a transport timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(self, FrameError::Transport(err) if err.is_timeout())
    }
}

pub type Result<T> = std::result::Result<T, FrameError>;
