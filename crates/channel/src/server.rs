//! Transfer server: accepts uploads and streams them back through the
//! fault injector.
//!
//! The listener loop spawns one task per accepted connection and never
//! waits on an individual transfer. Each session owns its own state;
//! the only thing sessions share is the diagnostic [`SessionRegistry`].

use std::net::SocketAddr;
use std::time::Duration;

use chrono::Utc;
use tokio::io::{AsyncRead, AsyncWrite, BufReader, BufWriter};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use faultline_protocol::{ChunkAck, Metadata, Request, StreamFrame, Verdict};
use faultline_transfer::{
    Chunk, DEFAULT_CHUNK_SIZE, DEFAULT_RETENTION, FaultInjector, FaultPolicy, Outcome,
    SessionRecord, SessionRegistry, SessionState, TransferOutcome, file_digest, split,
};

use crate::error::ChannelError;
use crate::io::{read_frame_timed, send_json};
use crate::{DEFAULT_READ_TIMEOUT, advance};

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub chunk_size: usize,
    /// Fault policy applied to first transmissions in every session.
    pub fault: FaultPolicy,
    /// Fixed base seed for per-session injectors; `None` draws from the
    /// OS. Sessions offset the base so concurrent transfers still see
    /// distinct fault sequences.
    pub fault_seed: Option<u64>,
    /// Maximum retransmissions per session; `None` means twice the
    /// chunk count.
    pub retry_budget: Option<u64>,
    /// Timeout for a single frame read; `None` disables.
    pub read_timeout: Option<Duration>,
    /// Retention window for finished-session diagnostics.
    pub retention: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            fault: FaultPolicy::default(),
            fault_seed: None,
            retry_budget: None,
            read_timeout: Some(DEFAULT_READ_TIMEOUT),
            retention: DEFAULT_RETENTION,
        }
    }
}

/// The transfer server.
pub struct Server {
    listener: TcpListener,
    config: ServerConfig,
    registry: SessionRegistry,
    cancel: CancellationToken,
}

impl Server {
    /// Binds the listener; [`run`](Self::run) starts accepting.
    pub async fn bind(addr: SocketAddr, config: ServerConfig) -> Result<Self, ChannelError> {
        let listener = TcpListener::bind(addr).await?;
        let registry = SessionRegistry::new(config.retention);
        info!(addr = %listener.local_addr()?, "server listening");
        Ok(Self {
            listener,
            config,
            registry,
            cancel: CancellationToken::new(),
        })
    }

    /// Address the listener actually bound (useful with port 0).
    pub fn local_addr(&self) -> Result<SocketAddr, ChannelError> {
        Ok(self.listener.local_addr()?)
    }

    /// Handle to the diagnostic session registry.
    pub fn registry(&self) -> SessionRegistry {
        self.registry.clone()
    }

    /// Token that stops [`run`](Self::run) and all in-flight sessions
    /// when cancelled.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Accepts connections until cancelled, one spawned task each.
    pub async fn run(&self) -> Result<(), ChannelError> {
        let mut session_index: u64 = 0;
        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    info!("server shutting down");
                    return Ok(());
                }
                result = self.listener.accept() => {
                    let (stream, peer) = result?;
                    info!(%peer, "connection accepted");
                    session_index += 1;
                    let seed = self.config.fault_seed.map(|s| s.wrapping_add(session_index));
                    let config = self.config.clone();
                    let registry = self.registry.clone();
                    let cancel = self.cancel.clone();
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(stream, peer, config, registry, cancel, seed).await {
                            warn!(%peer, error = %e, "session failed");
                        }
                    });
                }
            }
        }
    }
}

/// Runs one connection from upload request to terminal state, recording
/// the session's diagnostic entry on the way out.
async fn handle_connection(
    stream: TcpStream,
    peer: SocketAddr,
    config: ServerConfig,
    registry: SessionRegistry,
    cancel: CancellationToken,
    seed: Option<u64>,
) -> Result<(), ChannelError> {
    let id = Uuid::new_v4();
    let created_at = Utc::now();

    let (reader, writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    let mut writer = BufWriter::new(writer);

    // The upload request opens the session.
    let frame = read_frame_timed(&mut reader, config.read_timeout, &cancel).await?;
    let request: Request = match serde_json::from_slice(&frame) {
        Ok(request) => request,
        Err(e) => {
            let reply = Metadata::Error {
                message: format!("malformed request: {e}"),
            };
            let _ = send_json(&mut writer, &reply).await;
            return Err(ChannelError::MalformedFrame(e.to_string()));
        }
    };
    let Request::Upload { file_name, data } = request;
    let bytes = match hex::decode(&data) {
        Ok(bytes) => bytes,
        Err(e) => {
            let reply = Metadata::Error {
                message: format!("undecodable file data: {e}"),
            };
            let _ = send_json(&mut writer, &reply).await;
            return Err(ChannelError::MalformedFrame(e.to_string()));
        }
    };
    info!(session = %id, %peer, file = %file_name, bytes = bytes.len(), "upload received");

    // Fragment the file and describe it to the receiver.
    let checksum = file_digest(&bytes);
    let chunks = split(&bytes, config.chunk_size);

    let mut record = SessionRecord {
        id,
        peer: peer.to_string(),
        file_name,
        total_bytes: bytes.len() as u64,
        checksum: checksum.clone(),
        chunk_size: config.chunk_size,
        total_chunks: chunks.len() as u64,
        retransmissions: 0,
        outcome: TransferOutcome::Failed,
        created_at,
    };

    let result = run_session(
        &mut reader,
        &mut writer,
        &config,
        &cancel,
        seed,
        checksum,
        &chunks,
        &mut record,
    )
    .await;

    registry.record(record);
    result.map(|_| ())
}

/// Drives the sender side of the state machine over an established
/// connection. `record` collects the outcome and retransmission count.
#[allow(clippy::too_many_arguments)]
async fn run_session<R, W>(
    reader: &mut R,
    writer: &mut W,
    config: &ServerConfig,
    cancel: &CancellationToken,
    seed: Option<u64>,
    checksum: String,
    chunks: &[Chunk],
    record: &mut SessionRecord,
) -> Result<TransferOutcome, ChannelError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let total_chunks = chunks.len() as u64;
    let mut state = SessionState::Init;

    advance(&mut state, SessionState::SendingMetadata);
    let metadata = Metadata::Ready {
        checksum,
        total_chunks,
        chunk_size: config.chunk_size as u64,
    };
    send_json(writer, &metadata).await?;

    // Readiness acknowledgement.
    let token = read_frame_timed(reader, config.read_timeout, cancel).await?;
    match ChunkAck::parse(&token) {
        Ok(ChunkAck::Ok) => {}
        Ok(other) => {
            return Err(ChannelError::Protocol(format!(
                "unexpected readiness ack: {:?}",
                other
            )));
        }
        Err(e) => return Err(ChannelError::MalformedFrame(e.to_string())),
    }

    advance(&mut state, SessionState::StreamingChunks);
    let mut injector = match seed {
        Some(seed) => FaultInjector::with_seed(config.fault, seed),
        None => FaultInjector::new(config.fault),
    };
    let budget = config
        .retry_budget
        .unwrap_or_else(|| total_chunks.saturating_mul(2));
    stream_chunks(
        reader,
        writer,
        chunks,
        &mut injector,
        budget,
        config.read_timeout,
        cancel,
        &mut record.retransmissions,
    )
    .await?;

    advance(&mut state, SessionState::AwaitingCompletion);
    let end = StreamFrame::End {
        message: "file transmission complete".into(),
    };
    send_json(writer, &end).await?;

    // The receiver assembles, verifies, and reports the verdict.
    advance(&mut state, SessionState::Verifying);
    let token = read_frame_timed(reader, config.read_timeout, cancel).await?;
    let verdict = Verdict::parse(&token).map_err(|e| ChannelError::MalformedFrame(e.to_string()))?;
    let outcome = match verdict {
        Verdict::Success => TransferOutcome::Success,
        Verdict::ChecksumMismatch => TransferOutcome::Mismatch,
        Verdict::Error => TransferOutcome::Failed,
    };
    advance(&mut state, SessionState::Terminal(outcome));
    record.outcome = outcome;
    info!(%outcome, retransmissions = record.retransmissions, "session finished");
    Ok(outcome)
}

/// Streams every chunk until the receiver has acknowledged all of them.
///
/// Chunks the injector drops stay unacknowledged and come around again
/// on the next pass; requested retransmissions bypass the injector and
/// are resent verbatim. Everything beyond a chunk's first transmission
/// spends the retry budget, dropped sends included.
#[allow(clippy::too_many_arguments)]
async fn stream_chunks<R, W>(
    reader: &mut R,
    writer: &mut W,
    chunks: &[Chunk],
    injector: &mut FaultInjector,
    budget: u64,
    read_timeout: Option<Duration>,
    cancel: &CancellationToken,
    retransmissions: &mut u64,
) -> Result<(), ChannelError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let total = chunks.len() as u64;
    let mut delivered = vec![false; chunks.len()];
    let mut attempts = vec![0u32; chunks.len()];

    while delivered.iter().any(|&d| !d) {
        let pending: Vec<u64> = (0..total).filter(|&s| !delivered[s as usize]).collect();
        for seq in pending {
            if cancel.is_cancelled() {
                return Err(ChannelError::Cancelled);
            }

            if attempts[seq as usize] > 0 {
                *retransmissions += 1;
                if *retransmissions > budget {
                    warn!(sequence = seq, budget, "retry budget exhausted");
                    return Err(ChannelError::RetryBudgetExhausted(*retransmissions));
                }
            }
            attempts[seq as usize] += 1;

            let outgoing = match injector.perturb(chunks[seq as usize].clone()) {
                Outcome::Drop => continue,
                Outcome::Pass(chunk) | Outcome::Corrupt(chunk) => chunk,
            };
            send_chunk(writer, &outgoing).await?;

            // The ack may open a retransmission exchange: resend the
            // named sequence verbatim until an OK lands.
            let mut current = seq;
            loop {
                let token = read_frame_timed(reader, read_timeout, cancel).await?;
                let ack = ChunkAck::parse(&token)
                    .map_err(|e| ChannelError::MalformedFrame(e.to_string()))?;
                match ack {
                    ChunkAck::Ok => {
                        delivered[current as usize] = true;
                        break;
                    }
                    ChunkAck::Error => {
                        return Err(ChannelError::Protocol(
                            "receiver reported a fatal error".into(),
                        ));
                    }
                    ChunkAck::Retransmit(requested) => {
                        if requested >= total {
                            return Err(ChannelError::Protocol(format!(
                                "retransmit request out of range: {requested}"
                            )));
                        }
                        // Asking for a different sequence implies the one
                        // just sent was stored.
                        if requested != current {
                            delivered[current as usize] = true;
                        }
                        *retransmissions += 1;
                        if *retransmissions > budget {
                            warn!(sequence = requested, budget, "retry budget exhausted");
                            return Err(ChannelError::RetryBudgetExhausted(*retransmissions));
                        }
                        attempts[requested as usize] += 1;
                        debug!(sequence = requested, "retransmitting");
                        send_chunk(writer, &chunks[requested as usize]).await?;
                        current = requested;
                    }
                }
            }
        }
    }
    Ok(())
}

async fn send_chunk<W: AsyncWrite + Unpin>(
    writer: &mut W,
    chunk: &Chunk,
) -> Result<(), ChannelError> {
    let frame = StreamFrame::Chunk {
        sequence: chunk.sequence,
        data: hex::encode(&chunk.data),
        chunk_checksum: chunk.checksum.clone(),
    };
    send_json(writer, &frame).await
}
