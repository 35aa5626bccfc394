//! Error types for the transfer channel.

use faultline_protocol::FrameError;

/// Errors that end a session without a verdict.
///
/// Recoverable integrity failures (a chunk failing its digest, an
/// undecodable chunk frame) are resolved inside the retransmission
/// exchange and never appear here; anything that does escape is fatal
/// to the session and surfaces to the caller as a plain `Err`.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("connection closed by peer")]
    ConnectionClosed,

    #[error("malformed frame: {0}")]
    MalformedFrame(String),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("retry budget exhausted after {0} retransmissions")]
    RetryBudgetExhausted(u64),

    #[error("server rejected upload: {0}")]
    Rejected(String),

    #[error("read timed out")]
    Timeout,

    #[error("cancelled")]
    Cancelled,
}

impl From<FrameError> for ChannelError {
    fn from(e: FrameError) -> Self {
        match e {
            FrameError::ConnectionClosed => ChannelError::ConnectionClosed,
            FrameError::Io(io) => ChannelError::Io(io),
            other => ChannelError::Protocol(other.to_string()),
        }
    }
}
