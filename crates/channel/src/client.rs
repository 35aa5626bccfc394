//! Upload client: sends the file up, then verifies and reassembles the
//! chunk stream the server echoes back.
//!
//! The client is the receiver in the reliability protocol: it checks
//! every chunk digest, asks for what it is missing, detects completion
//! from the declared chunk count, and renders the final verdict.

use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::{BufReader, BufWriter};
use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use faultline_protocol::{ChunkAck, Metadata, Request, StreamFrame, Verdict};
use faultline_transfer::{Action, ReassemblyBuffer, SessionState, TransferOutcome, file_digest};

use crate::error::ChannelError;
use crate::io::{read_frame_timed, send_json, send_token};
use crate::{DEFAULT_CONNECT_TIMEOUT, DEFAULT_READ_TIMEOUT, advance};

/// Client-side tuning knobs.
#[derive(Debug, Clone)]
pub struct UploadConfig {
    /// Maximum retransmission requests before giving up; `None` means
    /// twice the declared chunk count.
    pub retry_budget: Option<u64>,
    /// Timeout for a single frame read; `None` disables.
    pub read_timeout: Option<Duration>,
    /// Timeout for the TCP connection attempt.
    pub connect_timeout: Duration,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            retry_budget: None,
            read_timeout: Some(DEFAULT_READ_TIMEOUT),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }
}

/// Everything the caller learns about a finished transfer.
#[derive(Debug, Clone)]
pub struct TransferReport {
    pub outcome: TransferOutcome,
    /// Reassembled file bytes. Returned on a mismatch too, flagged
    /// inconsistent by the outcome.
    pub data: Vec<u8>,
    /// Whole-file digest declared by the server.
    pub declared_checksum: String,
    /// Digest recomputed from the reassembled bytes.
    pub actual_checksum: String,
    pub total_chunks: u64,
    /// Retransmission requests this client issued.
    pub retransmissions: u64,
}

/// Uploads `data` to the server at `addr` and receives it back chunk by
/// chunk, reassembling an exact copy.
///
/// Returns a [`TransferReport`] carrying the terminal outcome (SUCCESS
/// or MISMATCH); anything that kills the session before a verdict comes
/// back as an error instead.
pub async fn upload(
    addr: SocketAddr,
    file_name: &str,
    data: &[u8],
    config: UploadConfig,
    cancel: CancellationToken,
) -> Result<TransferReport, ChannelError> {
    let mut state = SessionState::Init;

    let stream = tokio::select! {
        biased;
        _ = cancel.cancelled() => return Err(ChannelError::Cancelled),
        result = tokio::time::timeout(config.connect_timeout, TcpStream::connect(addr)) => {
            match result {
                Ok(Ok(stream)) => stream,
                Ok(Err(e)) => return Err(e.into()),
                Err(_) => return Err(ChannelError::Timeout),
            }
        }
    };
    info!(%addr, file = %file_name, bytes = data.len(), "connected, uploading");

    let (reader, writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    let mut writer = BufWriter::new(writer);

    // Hand the file to the server.
    let request = Request::Upload {
        file_name: file_name.into(),
        data: hex::encode(data),
    };
    send_json(&mut writer, &request).await?;

    advance(&mut state, SessionState::SendingMetadata);
    let frame = read_frame_timed(&mut reader, config.read_timeout, &cancel).await?;
    let metadata: Metadata =
        serde_json::from_slice(&frame).map_err(|e| ChannelError::MalformedFrame(e.to_string()))?;
    let (declared_checksum, total_chunks, chunk_size) = match metadata {
        Metadata::Ready {
            checksum,
            total_chunks,
            chunk_size,
        } => (checksum, total_chunks, chunk_size),
        Metadata::Error { message } => return Err(ChannelError::Rejected(message)),
    };
    debug!(total_chunks, chunk_size, "metadata received");
    send_token(&mut writer, &ChunkAck::Ok.to_token()).await?;

    // Receive, verify, and ask for what is missing.
    advance(&mut state, SessionState::StreamingChunks);
    let budget = config
        .retry_budget
        .unwrap_or_else(|| total_chunks.saturating_mul(2));
    let mut buffer = ReassemblyBuffer::new(total_chunks);
    let mut retransmissions: u64 = 0;

    while !buffer.is_complete() {
        let frame = read_frame_timed(&mut reader, config.read_timeout, &cancel).await?;
        let ack = match serde_json::from_slice::<StreamFrame>(&frame) {
            Err(e) => {
                // Undecodable frame: handled like a digest mismatch. Its
                // sequence is unknowable, so ask for the lowest gap.
                debug!(error = %e, "malformed chunk frame");
                ChunkAck::Retransmit(buffer.lowest_missing().unwrap_or(0))
            }
            Ok(StreamFrame::End { .. }) => {
                // An end marker with chunks still missing is a protocol
                // fault, never a partial reassembly.
                let _ = send_token(&mut writer, Verdict::Error.as_token()).await;
                warn!(missing = ?buffer.missing(), "end marker before all chunks arrived");
                return Err(ChannelError::Protocol(
                    "end of transmission with chunks missing".into(),
                ));
            }
            Ok(StreamFrame::Chunk {
                sequence,
                data,
                chunk_checksum,
            }) => match hex::decode(&data) {
                Err(_) => ChunkAck::Retransmit(sequence),
                Ok(payload) => match buffer.accept(sequence, payload, &chunk_checksum) {
                    Action::RequestRetransmit(seq) => ChunkAck::Retransmit(seq),
                    Action::Accept => match buffer.lowest_missing() {
                        // An earlier gap means a dropped chunk; ask for
                        // it instead of a plain OK.
                        Some(missing) if missing < sequence => ChunkAck::Retransmit(missing),
                        _ => ChunkAck::Ok,
                    },
                },
            },
        };

        if let ChunkAck::Retransmit(seq) = ack {
            retransmissions += 1;
            if retransmissions > budget {
                let _ = send_token(&mut writer, &ChunkAck::Error.to_token()).await;
                return Err(ChannelError::RetryBudgetExhausted(retransmissions));
            }
            debug!(sequence = seq, "requesting retransmission");
        }
        send_token(&mut writer, &ack.to_token()).await?;
    }

    // Every declared chunk is present; wait out the end marker.
    advance(&mut state, SessionState::AwaitingCompletion);
    loop {
        let frame = read_frame_timed(&mut reader, config.read_timeout, &cancel).await?;
        match serde_json::from_slice::<StreamFrame>(&frame) {
            Ok(StreamFrame::End { .. }) => break,
            Ok(StreamFrame::Chunk { .. }) => {
                // Late duplicate; acknowledge and keep waiting.
                send_token(&mut writer, &ChunkAck::Ok.to_token()).await?;
            }
            Err(e) => return Err(ChannelError::MalformedFrame(e.to_string())),
        }
    }

    // Reassemble and render the verdict.
    advance(&mut state, SessionState::Verifying);
    let assembled = buffer
        .assemble()
        .map_err(|e| ChannelError::Protocol(e.to_string()))?;
    let actual_checksum = file_digest(&assembled);
    let (outcome, verdict) = if actual_checksum == declared_checksum {
        (TransferOutcome::Success, Verdict::Success)
    } else {
        (TransferOutcome::Mismatch, Verdict::ChecksumMismatch)
    };
    send_token(&mut writer, verdict.as_token()).await?;
    advance(&mut state, SessionState::Terminal(outcome));
    info!(%outcome, total_chunks, retransmissions, "transfer finished");

    Ok(TransferReport {
        outcome,
        data: assembled,
        declared_checksum,
        actual_checksum,
        total_chunks,
        retransmissions,
    })
}
