use std::time::{Duration, Instant};

use bytes::BytesMut;
use devlink_transport::{Transport, TransportError};
use tracing::{debug, warn};

use crate::codec::{Ack, Frame, Request, WriteAck};
use crate::error::{FrameError, Result};
use crate::opcode::opcode_name;
use crate::status::DeviceError;

/// Perform one request/ack round trip.
///
/// Encodes and transmits `request`, then collects exactly
/// `sizeof(R::Ack)` bytes within `timeout` (the transport's default when
/// `None`), verifies the ack's checksum and requires its code to echo the
/// request opcode. A mismatching ack yields [`FrameError::Mismatch`] with the
/// device error code decoded from the ack argument.
///
/// Nothing is retried here; every failure propagates to the caller.
pub fn transact<T, R>(transport: &mut T, request: &R, timeout: Option<Duration>) -> Result<R::Ack>
where
    T: Transport + ?Sized,
    R: Request,
{
    let waited = timeout.unwrap_or_else(|| transport.timeout());
    let opcode = request.opcode();

    transport.tx(&request.to_bytes())?;
    debug!(
        opcode = opcode_name(opcode),
        argument = request.argument(),
        "request sent"
    );

    let expected = R::Ack::WIRE_SIZE;
    let deadline = Instant::now() + waited;
    let mut buf = BytesMut::with_capacity(expected);
    while buf.len() < expected {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Err(TransportError::Timeout {
                waited,
                received: buf.len(),
            }
            .into());
        }

        let data = transport.rx(expected - buf.len(), Some(remaining))?;
        buf.extend_from_slice(&data);

        if buf.len() < expected {
            if let Some(err) = rejection(opcode, &buf) {
                return Err(err);
            }
        }
    }

    let ack = R::Ack::decode(&buf)?;
    if ack.ack() != opcode {
        let code = DeviceError::from_code(ack.argument());
        warn!(
            request = opcode_name(opcode),
            ack = ack.ack(),
            %code,
            "ack does not match request"
        );
        return Err(FrameError::Mismatch {
            request: opcode,
            ack: ack.ack(),
            code,
        });
    }

    debug!(
        opcode = opcode_name(opcode),
        argument = ack.argument(),
        "ack received"
    );
    Ok(ack)
}

/// Recognise a short error ack arriving where a longer ack was expected.
fn rejection(opcode: u8, buf: &[u8]) -> Option<FrameError> {
    if buf.len() != WriteAck::WIRE_SIZE {
        return None;
    }
    let ack = WriteAck::decode(buf).ok()?;
    if ack.ack == opcode {
        return None;
    }
    let code = DeviceError::from_code(ack.argument);
    warn!(
        request = opcode_name(opcode),
        ack = ack.ack,
        %code,
        "peer rejected request"
    );
    Some(FrameError::Mismatch {
        request: opcode,
        ack: ack.ack,
        code,
    })
}
