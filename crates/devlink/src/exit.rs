use std::fmt;
use std::io;

use devlink_frame::FrameError;
use devlink_peer::PeerError;
use devlink_transport::TransportError;

pub const SUCCESS: i32 = 0;
pub const FAILURE: i32 = 1;
pub const TRANSPORT_ERROR: i32 = 3;
pub const PERMISSION_DENIED: i32 = 50;
pub const DATA_INVALID: i32 = 60;
pub const USAGE: i32 = 64;
pub const TIMEOUT: i32 = 124;
pub const INTERNAL: i32 = 125;

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug)]
pub struct CliError {
    pub code: i32,
    pub message: String,
}

impl CliError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

pub fn io_error(context: &str, err: io::Error) -> CliError {
    let code = match err.kind() {
        io::ErrorKind::PermissionDenied => PERMISSION_DENIED,
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => TIMEOUT,
        io::ErrorKind::ConnectionRefused | io::ErrorKind::NotFound => FAILURE,
        _ => INTERNAL,
    };
    CliError::new(code, format!("{context}: {err}"))
}

pub fn transport_error(context: &str, err: TransportError) -> CliError {
    match err {
        TransportError::Connect { address, source } => {
            io_error(&format!("{context} ({address})"), source)
        }
        TransportError::Io(source) => io_error(context, source),
        TransportError::Timeout { .. } => CliError::new(TIMEOUT, format!("{context}: {err}")),
        TransportError::Integrity { .. } => {
            CliError::new(DATA_INVALID, format!("{context}: {err}"))
        }
        other => CliError::new(TRANSPORT_ERROR, format!("{context}: {other}")),
    }
}

pub fn frame_error(context: &str, err: FrameError) -> CliError {
    match err {
        FrameError::Transport(err) => transport_error(context, err),
        FrameError::Integrity | FrameError::Length { .. } | FrameError::PayloadTooLarge { .. } => {
            CliError::new(DATA_INVALID, format!("{context}: {err}"))
        }
        FrameError::Mismatch { .. } => CliError::new(FAILURE, format!("{context}: {err}")),
    }
}

pub fn peer_error(context: &str, err: PeerError) -> CliError {
    match err {
        PeerError::Transport(err) => transport_error(context, err),
        PeerError::Frame(err) => frame_error(context, err),
        PeerError::Decode(_) | PeerError::Malformed(_) | PeerError::ChunkCountOverflow { .. } => {
            CliError::new(DATA_INVALID, format!("{context}: {err}"))
        }
        PeerError::ShutdownTimeout(_) => CliError::new(TIMEOUT, format!("{context}: {err}")),
        other => CliError::new(INTERNAL, format!("{context}: {other}")),
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use devlink_frame::DeviceError;

    use super::*;

    #[test]
    fn timeout_maps_to_124_through_every_layer() {
        let err = PeerError::Frame(FrameError::Transport(TransportError::Timeout {
            waited: Duration::from_secs(1),
            received: 0,
        }));
        assert_eq!(peer_error("read failed", err).code, TIMEOUT);
    }

    #[test]
    fn device_rejection_is_failure() {
        let err = FrameError::Mismatch {
            request: 0x0b,
            ack: 0xff,
            code: DeviceError::Data,
        };
        let cli = frame_error("read failed", err);
        assert_eq!(cli.code, FAILURE);
        assert!(cli.message.contains("E_Data"));
    }

    #[test]
    fn refused_connect_is_failure() {
        let err = TransportError::Connect {
            address: "127.0.0.1:1".into(),
            source: io::Error::from(io::ErrorKind::ConnectionRefused),
        };
        let cli = transport_error("connect failed", err);
        assert_eq!(cli.code, FAILURE);
        assert!(cli.message.contains("127.0.0.1:1"));
    }

    #[test]
    fn oversized_metadata_is_data_invalid() {
        let err = PeerError::Frame(FrameError::PayloadTooLarge {
            size: 200,
            max: 128,
        });
        assert_eq!(peer_error("write failed", err).code, DATA_INVALID);
    }
}
