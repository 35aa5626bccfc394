//! Messages carried inside frames.
//!
//! JSON bodies keep the field names of the wire protocol verbatim, so no
//! serde renaming is applied. Acknowledgements and verdicts are not JSON:
//! they are bare ASCII tokens (`OK`, `RETRANSMIT:<sequence>`, `SUCCESS`,
//! ...) occupying a whole frame each.

use serde::{Deserialize, Serialize};

/// Error produced when an acknowledgement or verdict token cannot be parsed.
#[derive(Debug, thiserror::Error)]
#[error("unrecognized token: {0:?}")]
pub struct TokenError(pub String);

/// Client request opening a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum Request {
    /// Upload a file; `data` is the hex-encoded file content.
    Upload { file_name: String, data: String },
}

/// Server metadata reply to an upload request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Metadata {
    /// Upload accepted; the server is ready to stream chunks back.
    Ready {
        /// SHA-256 hex digest of the whole file.
        checksum: String,
        total_chunks: u64,
        chunk_size: u64,
    },
    /// Upload rejected.
    Error { message: String },
}

/// One frame of the chunk stream (server to client).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamFrame {
    /// One chunk; `data` is the hex-encoded payload.
    Chunk {
        sequence: u64,
        data: String,
        /// MD5 hex digest of the decoded payload.
        chunk_checksum: String,
    },
    /// End-of-transmission marker.
    End { message: String },
}

/// Per-chunk acknowledgement (client to server).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkAck {
    /// Chunk received and verified (or already present).
    Ok,
    /// Resend the named sequence number.
    Retransmit(u64),
    /// Receiver hit an unrecoverable error.
    Error,
}

impl ChunkAck {
    /// Renders the token for the wire.
    pub fn to_token(self) -> String {
        match self {
            ChunkAck::Ok => "OK".into(),
            ChunkAck::Retransmit(seq) => format!("RETRANSMIT:{seq}"),
            ChunkAck::Error => "ERROR".into(),
        }
    }

    /// Parses a token received from the wire.
    pub fn parse(token: &[u8]) -> Result<Self, TokenError> {
        let text = std::str::from_utf8(token)
            .map_err(|_| TokenError(String::from_utf8_lossy(token).into_owned()))?;
        match text {
            "OK" => Ok(ChunkAck::Ok),
            "ERROR" => Ok(ChunkAck::Error),
            _ => match text.strip_prefix("RETRANSMIT:") {
                Some(seq) => seq
                    .parse()
                    .map(ChunkAck::Retransmit)
                    .map_err(|_| TokenError(text.into())),
                None => Err(TokenError(text.into())),
            },
        }
    }
}

/// Final transfer verdict (client to server).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Reassembled bytes matched the declared whole-file digest.
    Success,
    /// Transfer completed but the digests differed.
    ChecksumMismatch,
    /// Session failed before or during verification.
    Error,
}

impl Verdict {
    /// Renders the token for the wire.
    pub fn as_token(self) -> &'static str {
        match self {
            Verdict::Success => "SUCCESS",
            Verdict::ChecksumMismatch => "CHECKSUM_MISMATCH",
            Verdict::Error => "ERROR",
        }
    }

    /// Parses a token received from the wire.
    pub fn parse(token: &[u8]) -> Result<Self, TokenError> {
        match token {
            b"SUCCESS" => Ok(Verdict::Success),
            b"CHECKSUM_MISMATCH" => Ok(Verdict::ChecksumMismatch),
            b"ERROR" => Ok(Verdict::Error),
            other => Err(TokenError(String::from_utf8_lossy(other).into_owned())),
        }
    }
}
