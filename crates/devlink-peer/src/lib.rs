//! Higher-level device operations built on devlink frames.
//!
//! - [`ChunkedTransfer`] moves an arbitrary buffer to or from the device as
//!   128-byte chunks, bracketed by one INIT exchange carrying metadata. It is
//!   synchronous and runs on the caller's thread.
//! - [`DispatchEngine`] owns a dedicated worker thread that drains a priority
//!   queue of requests, retries timeouts with linear backoff and reports
//!   results through callbacks.
//! - [`DeviceSimulator`] answers frames the way a device does, for tests,
//!   demos and bench setups without hardware.

pub mod dispatch;
pub mod error;
pub mod simulator;
pub mod transfer;

pub use dispatch::{
    DispatchEngine, DispatchHandle, DispatchRequest, EngineBuilder, EngineConfig, Message,
    Priority, PriorityQueue, ResultCallback, TimeoutHandler,
};
pub use error::{PeerError, Result};
pub use simulator::{serve, serve_tcp, DeviceSimulator, Framing, SimulatedTransport};
pub use transfer::{chunk_count, ChunkedTransfer, Received, TransferConfig, CHUNK_SIZE};
