use std::time::Duration;

/// Errors that can occur in transport operations.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Failed to open the channel to the given address.
    #[error("failed to connect to {address}: {source}")]
    Connect {
        address: String,
        source: std::io::Error,
    },

    /// Not enough data arrived before the deadline.
    #[error("timed out after {waited:?} ({received} bytes received)")]
    Timeout { waited: Duration, received: usize },

    /// A received frame failed its checksum.
    #[error("checksum verification failed on {len}-byte frame")]
    Integrity { len: usize },

    /// The transport has no open channel.
    #[error("transport not connected")]
    NotConnected,

    /// The channel accepted fewer bytes than were handed to it.
    #[error("short write ({written} of {expected} bytes)")]
    ShortWrite { written: usize, expected: usize },

    /// The remote end closed the channel.
    #[error("connection closed by peer")]
    Closed,

    /// An I/O error occurred on the channel.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The serial port driver reported an error.
    #[error("serial port error: {0}")]
    Serial(#[from] serialport::Error),
}

impl TransportError {
    /// True for the only failure kind worth retrying.
    pub fn is_timeout(&self) -> bool {
        matches!(self, TransportError::Timeout { .. })
    }
}

pub type Result<T> = std::result::Result<T, TransportError>;
