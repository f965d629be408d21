//! Request opcodes.
//!
//! Acks echo the opcode of the request they answer. A peer that rejects a
//! request answers with [`ERROR_ACK`] and a device error code as argument.

/// Start a read: the ack carries the chunk count and metadata.
pub const READ_INIT: u8 = 0x0a;

/// Read one chunk; argument is the chunk index.
pub const READ_DATA: u8 = 0x0b;

/// Start a write: argument is the chunk count, payload the metadata.
pub const WRITE_INIT: u8 = 0x0c;

/// Write one chunk; argument is the chunk index.
pub const WRITE_DATA: u8 = 0x0d;

/// Finish a read.
pub const READ_DONE: u8 = 0x0e;

/// Ack code a peer uses to reject a request.
pub const ERROR_ACK: u8 = 0xff;

/// Returns a human-readable name for an opcode.
pub fn opcode_name(code: u8) -> &'static str {
    match code {
        READ_INIT => "READ_INIT",
        READ_DATA => "READ_DATA",
        WRITE_INIT => "WRITE_INIT",
        WRITE_DATA => "WRITE_DATA",
        READ_DONE => "READ_DONE",
        ERROR_ACK => "ERROR_ACK",
        _ => "UNKNOWN",
    }
}

/// Returns true for opcodes carried by read requests.
pub fn is_read(code: u8) -> bool {
    matches!(code, READ_INIT | READ_DATA | READ_DONE)
}

/// Returns true for opcodes carried by write requests.
pub fn is_write(code: u8) -> bool {
    matches!(code, WRITE_INIT | WRITE_DATA)
}
