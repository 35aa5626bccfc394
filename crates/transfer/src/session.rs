//! Session lifecycle states and the diagnostic session registry.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Session controller states, in protocol order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Init,
    SendingMetadata,
    StreamingChunks,
    AwaitingCompletion,
    Verifying,
    Terminal(TransferOutcome),
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Init => write!(f, "INIT"),
            SessionState::SendingMetadata => write!(f, "SENDING_METADATA"),
            SessionState::StreamingChunks => write!(f, "STREAMING_CHUNKS"),
            SessionState::AwaitingCompletion => write!(f, "AWAITING_COMPLETION"),
            SessionState::Verifying => write!(f, "VERIFYING"),
            SessionState::Terminal(outcome) => write!(f, "{outcome}"),
        }
    }
}

/// Terminal result of one transfer session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferOutcome {
    /// Reassembled bytes matched the declared whole-file digest.
    Success,
    /// Transfer completed but the whole-file digests differed.
    Mismatch,
    /// The session died before a verdict: connection loss, exhausted
    /// retry budget, or a protocol fault.
    Failed,
}

impl fmt::Display for TransferOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransferOutcome::Success => write!(f, "SUCCESS"),
            TransferOutcome::Mismatch => write!(f, "MISMATCH"),
            TransferOutcome::Failed => write!(f, "FAILED"),
        }
    }
}

/// Diagnostic record written once when a session reaches a terminal state.
#[derive(Debug, Clone)]
pub struct SessionRecord {
    pub id: Uuid,
    /// Remote peer address, as reported by the listener.
    pub peer: String,
    pub file_name: String,
    pub total_bytes: u64,
    /// Whole-file SHA-256 hex digest declared for the transfer.
    pub checksum: String,
    pub chunk_size: usize,
    pub total_chunks: u64,
    pub retransmissions: u64,
    pub outcome: TransferOutcome,
    pub created_at: DateTime<Utc>,
}

/// Time-bounded map of finished sessions, for diagnostics only.
///
/// Records are write-once at session end and evicted by a delayed sweep
/// after the retention window. Live sessions never read each other's
/// records, so plain mutex-guarded map access is all the coordination
/// required. Lookups exist for post-hoc inspection, never for resuming
/// a transfer.
#[derive(Clone)]
pub struct SessionRegistry {
    retention: Duration,
    records: Arc<Mutex<HashMap<Uuid, SessionRecord>>>,
}

impl SessionRegistry {
    pub fn new(retention: Duration) -> Self {
        Self {
            retention,
            records: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Stores a finished session's record and schedules its eviction.
    ///
    /// Must be called from within a tokio runtime: the sweep is a
    /// spawned task sleeping out the retention window.
    pub fn record(&self, record: SessionRecord) {
        let id = record.id;
        tracing::debug!(%id, outcome = %record.outcome, "session recorded");
        self.records.lock().unwrap().insert(id, record);

        let records = Arc::clone(&self.records);
        let retention = self.retention;
        tokio::spawn(async move {
            tokio::time::sleep(retention).await;
            if records.lock().unwrap().remove(&id).is_some() {
                tracing::debug!(%id, "session record evicted");
            }
        });
    }

    /// Looks up a finished session by id.
    pub fn get(&self, id: &Uuid) -> Option<SessionRecord> {
        self.records.lock().unwrap().get(id).cloned()
    }

    /// Number of records currently retained.
    pub fn len(&self) -> usize {
        self.records.lock().unwrap().len()
    }

    /// Returns `true` if no record is currently retained.
    pub fn is_empty(&self) -> bool {
        self.records.lock().unwrap().is_empty()
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new(crate::DEFAULT_RETENTION)
    }
}
