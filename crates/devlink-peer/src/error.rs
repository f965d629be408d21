use std::time::Duration;

/// Errors that can occur in transfer and dispatch operations.
#[derive(Debug, thiserror::Error)]
pub enum PeerError {
    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(#[from] devlink_transport::TransportError),

    /// Frame-level error.
    #[error("frame error: {0}")]
    Frame(#[from] devlink_frame::FrameError),

    /// A response could not be decoded at the message layer.
    #[error("decode error: {0}")]
    Decode(String),

    /// A message could not be encoded for transmission.
    #[error("malformed message: {0}")]
    Malformed(String),

    /// The payload needs more chunks than a frame argument can count.
    #[error("payload of {len} bytes needs more than {max} chunks")]
    ChunkCountOverflow { len: usize, max: usize },

    /// The dispatch worker is not running.
    #[error("dispatch worker stopped")]
    WorkerStopped,

    /// The dispatch worker thread could not be started.
    #[error("failed to spawn dispatch worker: {0}")]
    Spawn(std::io::Error),

    /// The dispatch worker did not stop in time.
    #[error("dispatch worker did not stop within {0:?}")]
    ShutdownTimeout(Duration),
}

impl PeerError {
    /// True when the underlying failure was a transport timeout.
    pub fn is_timeout(&self) -> bool {
        match self {
            PeerError::Transport(err) => err.is_timeout(),
            PeerError::Frame(err) => err.is_timeout(),
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, PeerError>;
