use std::fmt;
use std::time::Duration;

use bytes::Bytes;

use crate::error::Result;

/// A connection to one physical channel (socket or serial line).
///
/// A transport owns exactly one channel. Its lifecycle is
/// connect → active → disconnect, and it is only ever driven by one thread
/// at a time: the caller of a chunked transfer, or the dispatch worker.
///
/// Implementations never retry; every failure is returned immediately.
pub trait Transport: Send {
    /// Where to connect, e.g. `(host, port)` or `(port name, baud rate)`.
    type Address: fmt::Debug + Clone + Send + 'static;

    /// Open the channel. `timeout` becomes the default deadline for [`rx`].
    ///
    /// [`rx`]: Transport::rx
    fn connect(&mut self, address: &Self::Address, timeout: Duration) -> Result<()>;

    /// Close the channel. Safe to call when already disconnected.
    fn disconnect(&mut self);

    /// Whether a channel is currently open.
    fn connected(&self) -> bool;

    /// Write `data` in full.
    fn tx(&mut self, data: &[u8]) -> Result<()>;

    /// Read up to `size` bytes, waiting at most `timeout`
    /// (or the connect-time default when `None`).
    fn rx(&mut self, size: usize, timeout: Option<Duration>) -> Result<Bytes>;

    /// Default receive deadline set at connect time.
    fn timeout(&self) -> Duration;

    /// Transport name for diagnostics.
    fn transport_name(&self) -> &'static str;
}

impl<T: Transport + ?Sized> Transport for &mut T {
    type Address = T::Address;

    fn connect(&mut self, address: &Self::Address, timeout: Duration) -> Result<()> {
        (**self).connect(address, timeout)
    }

    fn disconnect(&mut self) {
        (**self).disconnect()
    }

    fn connected(&self) -> bool {
        (**self).connected()
    }

    fn tx(&mut self, data: &[u8]) -> Result<()> {
        (**self).tx(data)
    }

    fn rx(&mut self, size: usize, timeout: Option<Duration>) -> Result<Bytes> {
        (**self).rx(size, timeout)
    }

    fn timeout(&self) -> Duration {
        (**self).timeout()
    }

    fn transport_name(&self) -> &'static str {
        (**self).transport_name()
    }
}

/// Formats a byte slice as space-separated hex pairs for log fields.
pub struct HexDump<'a>(pub &'a [u8]);

impl fmt::Display for HexDump<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, byte) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{byte:02X}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_dump_formats_pairs() {
        assert_eq!(HexDump(&[0x0a, 0xff, 0x00]).to_string(), "0A FF 00");
        assert_eq!(HexDump(&[]).to_string(), "");
    }
}
