//! Chunking, integrity digests, fault injection, and reassembly for
//! faultline transfers.
//!
//! The sender side splits a byte buffer into fixed-size [`Chunk`]s with
//! per-chunk MD5 digests and runs each first transmission through the
//! [`FaultInjector`]. The receiver side accumulates verified payloads in
//! a [`ReassemblyBuffer`] until every declared sequence number is
//! present, then reassembles and checks the whole-file SHA-256 digest.

pub mod chunk;
pub mod fault;
pub mod reassembly;
pub mod session;

pub use chunk::{Chunk, chunk_digest, file_digest, split};
pub use fault::{FaultInjector, FaultPolicy, Outcome};
pub use reassembly::{Action, ReassemblyBuffer};
pub use session::{SessionRecord, SessionRegistry, SessionState, TransferOutcome};

use std::time::Duration;

/// Default chunk size: 1 KiB.
pub const DEFAULT_CHUNK_SIZE: usize = 1024;

/// Default retention window for finished-session diagnostics.
pub const DEFAULT_RETENTION: Duration = Duration::from_secs(60);

/// Errors produced by the transfer crate.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("reassembly incomplete: {missing} of {total} chunks missing")]
    Incomplete { missing: u64, total: u64 },
}
