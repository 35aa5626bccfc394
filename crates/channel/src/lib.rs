//! Session controllers for faultline transfers.
//!
//! The [`client`] uploads a file and plays the receiver role of the
//! chunk-streaming protocol; the [`server`] accepts uploads and plays
//! the sender role, fragmenting each file and streaming it back through
//! the fault injector. Both ends drive the same session state machine:
//!
//! ```text
//! INIT -> SENDING_METADATA -> STREAMING_CHUNKS
//!      -> AWAITING_COMPLETION -> VERIFYING
//!      -> SUCCESS | MISMATCH | FAILED
//! ```
//!
//! Terminal states close the connection unconditionally.

pub mod client;
pub mod error;
mod io;
pub mod server;

pub use client::{TransferReport, UploadConfig, upload};
pub use error::ChannelError;
pub use server::{Server, ServerConfig};

use std::time::Duration;

use faultline_transfer::SessionState;

/// Default timeout for a single frame read.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(30);

/// Default timeout for the TCP connection attempt.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Advances the session state machine, tracing the transition.
pub(crate) fn advance(state: &mut SessionState, next: SessionState) {
    tracing::debug!(from = %state, to = %next, "session state");
    *state = next;
}
