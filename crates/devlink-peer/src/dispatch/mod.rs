//! Priority dispatch engine.
//!
//! Producers on any thread enqueue [`Message`]s; one worker thread owns the
//! transport exclusively, serves the queue in priority order and reports
//! each decoded response through the request's callback.
//!
//! ```text
//!  producers ──enqueue──▶ PriorityQueue ──pop──▶ worker ──tx/rx──▶ Transport
//!                                                  │
//!                              result callback ◀───┴───▶ timeout handler
//! ```

use std::fmt;
use std::sync::Arc;

use bytes::Bytes;

use crate::error::Result;

mod engine;
mod queue;

pub use engine::{DispatchEngine, DispatchHandle, DispatchRequest, EngineBuilder, EngineConfig};
pub use queue::{Priority, PriorityQueue};

/// A request the dispatch engine can send.
pub trait Message: fmt::Debug + Send + 'static {
    /// Serialize for transmission; fails with [`PeerError::Malformed`].
    ///
    /// [`PeerError::Malformed`]: crate::PeerError::Malformed
    fn encode(&self) -> Result<Bytes>;

    /// Validate a raw response; fails with [`PeerError::Decode`].
    ///
    /// [`PeerError::Decode`]: crate::PeerError::Decode
    fn check_response(&self, raw: &[u8]) -> Result<()>;
}

/// Invoked on the worker thread with the request and its raw response.
pub type ResultCallback<M> = Box<dyn FnOnce(&M, Bytes) + Send>;

/// Invoked once per request that exhausted its attempts on timeouts.
pub type TimeoutHandler<M> = Arc<dyn Fn(&M) + Send + Sync>;
