use std::fmt;

/// Error code a device reports in the argument of a rejecting ack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceError {
    Ok,
    /// Frame length error.
    Len,
    /// Frame checksum error.
    Crc,
    /// Unsupported function code.
    Func,
    /// Invalid function data.
    Data,
    /// Peer is in the wrong work mode.
    Mode,
    /// Peer failed while processing.
    Proc,
    Unknown,
}

impl DeviceError {
    /// Decode an ack argument; unrecognised values map to [`DeviceError::Unknown`].
    pub fn from_code(code: u16) -> Self {
        match code {
            0 => DeviceError::Ok,
            1 => DeviceError::Len,
            2 => DeviceError::Crc,
            3 => DeviceError::Func,
            4 => DeviceError::Data,
            5 => DeviceError::Mode,
            6 => DeviceError::Proc,
            _ => DeviceError::Unknown,
        }
    }

    /// Wire value of this code.
    pub fn code(self) -> u16 {
        match self {
            DeviceError::Ok => 0,
            DeviceError::Len => 1,
            DeviceError::Crc => 2,
            DeviceError::Func => 3,
            DeviceError::Data => 4,
            DeviceError::Mode => 5,
            DeviceError::Proc => 6,
            DeviceError::Unknown => 7,
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            DeviceError::Ok => "ok",
            DeviceError::Len => "frame length error",
            DeviceError::Crc => "frame checksum error",
            DeviceError::Func => "function code error",
            DeviceError::Data => "function data error",
            DeviceError::Mode => "peer work mode error",
            DeviceError::Proc => "peer process error",
            DeviceError::Unknown => "unknown error",
        }
    }
}

impl fmt::Display for DeviceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "E_{:?} ({})", self, self.description())
    }
}
