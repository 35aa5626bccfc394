//! File splitting and integrity digests.

use md5::Md5;
use sha2::{Digest, Sha256};

use crate::DEFAULT_CHUNK_SIZE;

/// One slice of the source file, immutable once produced by [`split`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// 0-based position within the file; contiguous, no gaps.
    pub sequence: u64,
    /// Raw payload bytes. At most the configured chunk size; the last
    /// chunk of a file may be shorter.
    pub data: Vec<u8>,
    /// MD5 hex digest of `data`.
    pub checksum: String,
}

/// Computes the per-chunk MD5 digest as a hex string.
pub fn chunk_digest(data: &[u8]) -> String {
    let mut hasher = Md5::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Computes the whole-file SHA-256 digest as a hex string.
pub fn file_digest(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Splits `data` into consecutive chunks of `chunk_size` bytes.
///
/// The final chunk may be shorter. Empty input yields no chunks. If
/// `chunk_size` is 0, [`DEFAULT_CHUNK_SIZE`] is used.
pub fn split(data: &[u8], chunk_size: usize) -> Vec<Chunk> {
    let chunk_size = if chunk_size == 0 {
        DEFAULT_CHUNK_SIZE
    } else {
        chunk_size
    };

    data.chunks(chunk_size)
        .enumerate()
        .map(|(i, slice)| Chunk {
            sequence: i as u64,
            data: slice.to_vec(),
            checksum: chunk_digest(slice),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_partitions_with_short_tail() {
        let chunks = split(b"AABBCCDDEE", 4);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].sequence, 0);
        assert_eq!(&chunks[0].data, b"AABB");
        assert_eq!(&chunks[1].data, b"CCDD");
        assert_eq!(chunks[2].sequence, 2);
        assert_eq!(&chunks[2].data, b"EE");
    }

    #[test]
    fn split_empty_input_yields_no_chunks() {
        assert!(split(b"", 1024).is_empty());
    }

    #[test]
    fn split_exact_multiple_has_no_remainder_chunk() {
        let chunks = split(&[0xAB; 2048], 1024);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].data.len(), 1024);
        assert_eq!(chunks[1].data.len(), 1024);
    }

    #[test]
    fn split_single_chunk_when_file_fits() {
        let chunks = split(&[1, 2, 3], 1024);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].data, vec![1, 2, 3]);
    }

    #[test]
    fn split_zero_chunk_size_uses_default() {
        let chunks = split(&[0u8; DEFAULT_CHUNK_SIZE + 1], 0);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].data.len(), DEFAULT_CHUNK_SIZE);
    }

    #[test]
    fn split_computes_matching_checksums() {
        for chunk in split(b"some chunked payload", 8) {
            assert_eq!(chunk.checksum, chunk_digest(&chunk.data));
        }
    }

    #[test]
    fn chunk_digest_is_md5_hex() {
        let digest = chunk_digest(b"hello");
        assert_eq!(digest.len(), 32);
        assert_eq!(digest, "5d41402abc4b2a76b9719d911017c592");
    }

    #[test]
    fn file_digest_is_sha256_hex() {
        let digest = file_digest(b"");
        assert_eq!(digest.len(), 64);
        assert_eq!(
            digest,
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn chunk_digest_detects_single_byte_change() {
        let data = vec![0x55u8; 512];
        let original = chunk_digest(&data);
        for pos in [0, 100, 511] {
            let mut flipped = data.clone();
            flipped[pos] ^= 0x01;
            assert_ne!(chunk_digest(&flipped), original, "flip at {pos} undetected");
        }
    }
}
