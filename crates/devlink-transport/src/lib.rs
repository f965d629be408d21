//! Checksum and byte transports for talking to a constrained device.
//!
//! This is the lowest layer of devlink. It provides:
//! - [`crc16`], the 16-bit integrity function every frame is guarded with
//! - the [`Transport`] capability, implemented by [`TcpTransport`] (stream
//!   socket) and [`SerialTransport`] (byte-oriented serial line)
//! - [`scan`], a simple TCP connect sweep used to locate devices on a subnet
//!
//! Transports never retry. Every failure is returned to the caller as a
//! [`TransportError`], and only [`TransportError::is_timeout`] failures are
//! worth retrying at a higher layer.

pub mod checksum;
pub mod error;
pub mod scan;
pub mod serial;
pub mod tcp;
pub mod traits;

pub use checksum::{append_crc16, crc16, verify_crc16, CRC16_LEN};
pub use error::{Result, TransportError};
pub use scan::{scan, subnet_hosts, ScanConfig};
pub use serial::{EndingCheck, SerialAddress, SerialLine, SerialTransport};
pub use tcp::TcpTransport;
pub use traits::{HexDump, Transport};
