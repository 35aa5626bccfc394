//! Wire protocol for faultline chunked file transfers.
//!
//! Every logical message travels in one length-prefixed frame: a 4-byte
//! big-endian payload length followed by exactly that many bytes. JSON
//! bodies flow in both directions; per-chunk acknowledgements and the
//! final transfer verdict are bare ASCII tokens inside their own frames.
//!
//! See [`framing`] for the frame format and [`messages`] for the message
//! bodies.

pub mod framing;
pub mod messages;

pub use framing::{FrameError, read_frame, write_frame};
pub use messages::{ChunkAck, Metadata, Request, StreamFrame, TokenError, Verdict};

/// Length of the frame prefix in bytes.
pub const FRAME_PREFIX_LEN: usize = 4;
