//! Out-of-order chunk accumulation and reassembly.

use std::collections::HashMap;

use crate::TransferError;
use crate::chunk::chunk_digest;

/// What the receive loop should do after offering a chunk to the buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Chunk verified and stored (or already present).
    Accept,
    /// Chunk failed verification; ask the sender to resend this sequence.
    RequestRetransmit(u64),
}

/// Accumulates verified chunk payloads keyed by sequence number.
///
/// A sequence number is inserted only after its digest verifies, and the
/// first successful verification wins: later duplicates are accepted
/// without changing state. The buffer is complete once every sequence in
/// `0..total_chunks` is present, regardless of arrival order.
#[derive(Debug)]
pub struct ReassemblyBuffer {
    total_chunks: u64,
    chunks: HashMap<u64, Vec<u8>>,
}

impl ReassemblyBuffer {
    /// Creates an empty buffer expecting `total_chunks` sequences.
    pub fn new(total_chunks: u64) -> Self {
        Self {
            total_chunks,
            chunks: HashMap::new(),
        }
    }

    /// Verifies `checksum` against `data` and stores the payload.
    ///
    /// A sequence outside the declared range is not stored; it is
    /// acknowledged so a confused sender does not loop on it.
    pub fn accept(&mut self, sequence: u64, data: Vec<u8>, checksum: &str) -> Action {
        if sequence >= self.total_chunks {
            tracing::warn!(sequence, total = self.total_chunks, "chunk out of range");
            return Action::Accept;
        }

        if chunk_digest(&data) != checksum {
            tracing::debug!(sequence, "chunk checksum mismatch");
            return Action::RequestRetransmit(sequence);
        }

        if self.chunks.contains_key(&sequence) {
            tracing::debug!(sequence, "duplicate chunk ignored");
            return Action::Accept;
        }

        self.chunks.insert(sequence, data);
        Action::Accept
    }

    /// Returns `true` if `sequence` has been stored.
    pub fn contains(&self, sequence: u64) -> bool {
        self.chunks.contains_key(&sequence)
    }

    /// Number of verified chunks stored so far.
    pub fn len(&self) -> u64 {
        self.chunks.len() as u64
    }

    /// Returns `true` if no chunk has been stored yet.
    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Returns `true` once every declared sequence number is present.
    pub fn is_complete(&self) -> bool {
        self.len() == self.total_chunks
    }

    /// Lowest sequence number not yet stored, if any.
    pub fn lowest_missing(&self) -> Option<u64> {
        (0..self.total_chunks).find(|seq| !self.chunks.contains_key(seq))
    }

    /// All sequence numbers not yet stored, ascending.
    pub fn missing(&self) -> Vec<u64> {
        (0..self.total_chunks)
            .filter(|seq| !self.chunks.contains_key(seq))
            .collect()
    }

    /// Concatenates the stored payloads in ascending sequence order.
    pub fn assemble(mut self) -> Result<Vec<u8>, TransferError> {
        if !self.is_complete() {
            return Err(TransferError::Incomplete {
                missing: self.total_chunks - self.len(),
                total: self.total_chunks,
            });
        }

        let mut assembled = Vec::new();
        for seq in 0..self.total_chunks {
            assembled.extend_from_slice(&self.chunks.remove(&seq).unwrap_or_default());
        }
        Ok(assembled)
    }
}
