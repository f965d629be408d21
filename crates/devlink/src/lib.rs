//! Talk to embedded devices over TCP or a serial line.
//!
//! devlink frames every exchange as a fixed-layout request answered by one
//! CRC-16 protected acknowledgement, and builds two higher-level services on
//! top: chunked bulk transfers and a priority dispatch engine.
//!
//! # Crate Structure
//!
//! - [`transport`]: CRC-16, the transport capability and its TCP and serial variants
//! - [`frame`]: frame codec and the basic request/ack transaction
//! - [`peer`]: chunked transfers, dispatch engine and device simulator (behind `peer` feature)

/// Re-export transport types.
pub mod transport {
    pub use devlink_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use devlink_frame::*;
}

/// Re-export peer types (requires `peer` feature).
#[cfg(feature = "peer")]
pub mod peer {
    pub use devlink_peer::*;
}
