//! Frame I/O helpers shared by both ends of the channel.

use std::time::Duration;

use serde::Serialize;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::sync::CancellationToken;

use faultline_protocol::{read_frame, write_frame};

use crate::error::ChannelError;

/// Reads one frame, honoring the configured read timeout and the
/// session's cancellation token.
pub(crate) async fn read_frame_timed<R: AsyncRead + Unpin>(
    reader: &mut R,
    timeout: Option<Duration>,
    cancel: &CancellationToken,
) -> Result<Vec<u8>, ChannelError> {
    let read = async {
        match timeout {
            Some(t) => match tokio::time::timeout(t, read_frame(reader)).await {
                Ok(result) => result.map_err(ChannelError::from),
                Err(_) => Err(ChannelError::Timeout),
            },
            None => read_frame(reader).await.map_err(ChannelError::from),
        }
    };

    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(ChannelError::Cancelled),
        result = read => result,
    }
}

/// Serializes `msg` to JSON and writes it as one frame.
pub(crate) async fn send_json<W: AsyncWrite + Unpin, T: Serialize>(
    writer: &mut W,
    msg: &T,
) -> Result<(), ChannelError> {
    let payload = serde_json::to_vec(msg).map_err(|e| ChannelError::Protocol(e.to_string()))?;
    write_frame(writer, &payload).await?;
    Ok(())
}

/// Writes a bare token as one frame.
pub(crate) async fn send_token<W: AsyncWrite + Unpin>(
    writer: &mut W,
    token: &str,
) -> Result<(), ChannelError> {
    write_frame(writer, token.as_bytes()).await?;
    Ok(())
}
