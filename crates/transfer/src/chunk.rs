use sha2::{Digest, Sha256};

/// Computes SHA-256 of `data` and returns the hex-encoded digest.
pub fn checksum_bytes(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// A slice of the source read and sent in one iteration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// Position of the first byte within the source.
    pub offset: u64,
    /// Raw chunk data.
    pub data: Vec<u8>,
    /// SHA-256 hex checksum of `data`.
    pub checksum: String,
}

impl Chunk {
    /// Builds a chunk and computes its checksum.
    pub fn new(offset: u64, data: Vec<u8>) -> Self {
        let checksum = checksum_bytes(&data);
        Self {
            offset,
            data,
            checksum,
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Offset one past the last byte of the chunk.
    pub fn end(&self) -> u64 {
        self.offset + self.data.len() as u64
    }

    /// Returns `true` if `checksum` matches `data`.
    pub fn verify(&self) -> bool {
        checksum_bytes(&self.data) == self.checksum
    }
}
