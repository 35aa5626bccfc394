//! Length-prefixed framing on a byte stream.
//!
//! # Wire format
//!
//! ```text
//! FRAME: [4 bytes BE: payload_len]
//!        [payload_len bytes: payload]
//! ```
//!
//! [`read_frame`] loops on partial reads and never returns a partial
//! frame: the stream ending inside the prefix or inside the payload is
//! reported as [`FrameError::ConnectionClosed`]. The layer enforces no
//! maximum frame size beyond what the prefix can express.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Errors produced by the framing layer.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("connection closed mid-frame")]
    ConnectionClosed,

    #[error("frame payload too large: {0} bytes")]
    Oversize(usize),
}

/// Writes one frame: the length prefix followed by `payload`.
pub async fn write_frame<W: AsyncWrite + Unpin>(
    writer: &mut W,
    payload: &[u8],
) -> Result<(), FrameError> {
    if payload.len() > u32::MAX as usize {
        return Err(FrameError::Oversize(payload.len()));
    }

    writer.write_u32(payload.len() as u32).await?;
    writer.write_all(payload).await?;
    writer.flush().await?;
    Ok(())
}

/// Reads one frame, blocking until the declared number of bytes arrived.
pub async fn read_frame<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Vec<u8>, FrameError> {
    let len = match reader.read_u32().await {
        Ok(len) => len as usize,
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
            return Err(FrameError::ConnectionClosed);
        }
        Err(e) => return Err(e.into()),
    };

    let mut payload = vec![0u8; len];
    match reader.read_exact(&mut payload).await {
        Ok(_) => Ok(payload),
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
            Err(FrameError::ConnectionClosed)
        }
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn frame_roundtrip() {
        let payload = b"hello frame";

        let mut buf = Vec::new();
        write_frame(&mut buf, payload).await.unwrap();
        assert_eq!(buf.len(), 4 + payload.len());

        let mut cursor = &buf[..];
        let parsed = read_frame(&mut cursor).await.unwrap();
        assert_eq!(parsed, payload);
    }

    #[tokio::test]
    async fn empty_payload_roundtrip() {
        let mut buf = Vec::new();
        write_frame(&mut buf, b"").await.unwrap();

        let mut cursor = &buf[..];
        let parsed = read_frame(&mut cursor).await.unwrap();
        assert!(parsed.is_empty());
    }

    #[tokio::test]
    async fn multiple_frames_in_sequence() {
        let mut buf = Vec::new();
        write_frame(&mut buf, b"first").await.unwrap();
        write_frame(&mut buf, b"second").await.unwrap();
        write_frame(&mut buf, b"third").await.unwrap();

        let mut cursor = &buf[..];
        assert_eq!(read_frame(&mut cursor).await.unwrap(), b"first");
        assert_eq!(read_frame(&mut cursor).await.unwrap(), b"second");
        assert_eq!(read_frame(&mut cursor).await.unwrap(), b"third");
    }

    #[tokio::test]
    async fn eof_during_prefix_is_connection_closed() {
        // Two bytes of a four-byte prefix.
        let buf = vec![0u8, 0u8];
        let mut cursor = &buf[..];
        let result = read_frame(&mut cursor).await;
        assert!(matches!(result, Err(FrameError::ConnectionClosed)));
    }

    #[tokio::test]
    async fn eof_during_payload_is_connection_closed() {
        let mut buf = Vec::new();
        write_frame(&mut buf, b"full payload").await.unwrap();
        buf.truncate(buf.len() - 3);

        let mut cursor = &buf[..];
        let result = read_frame(&mut cursor).await;
        assert!(matches!(result, Err(FrameError::ConnectionClosed)));
    }

    #[tokio::test]
    async fn empty_stream_is_connection_closed() {
        let buf: Vec<u8> = Vec::new();
        let mut cursor = &buf[..];
        let result = read_frame(&mut cursor).await;
        assert!(matches!(result, Err(FrameError::ConnectionClosed)));
    }

    #[tokio::test]
    async fn prefix_is_big_endian() {
        let mut buf = Vec::new();
        write_frame(&mut buf, &[0xAB; 258]).await.unwrap();
        assert_eq!(&buf[..4], &[0, 0, 1, 2]);
    }
}
