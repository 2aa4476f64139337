//! Keyed-MAC and content digests per upload unit

use super::TransportError;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use bytes::Bytes;
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};

type HmacSha256 = Hmac<Sha256>;

/// One signed unit: a whole media file or one chunk of it.
/// Digests are base64 (standard alphabet, padded).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkRecord {
    pub index: usize,
    pub payload: Bytes,
    pub hmac: String,
    pub sha256: String,
}

/// Result of re-deriving both digests from a chunk's payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkVerification {
    pub hmac_valid: bool,
    pub sha256_valid: bool,
}

impl ChunkVerification {
    pub fn passed(&self) -> bool {
        self.hmac_valid && self.sha256_valid
    }
}

/// Computes and verifies unit digests with a shared secret
#[derive(Clone)]
pub struct IntegritySigner {
    mac: HmacSha256,
}

impl IntegritySigner {
    pub fn new(secret: &[u8]) -> Result<Self, TransportError> {
        let mac = HmacSha256::new_from_slice(secret).map_err(|_| TransportError::InvalidKey)?;
        Ok(Self { mac })
    }

    pub fn compute_hmac(&self, data: &[u8]) -> String {
        let mut mac = self.mac.clone();
        mac.update(data);
        STANDARD.encode(mac.finalize().into_bytes())
    }

    pub fn compute_sha256(data: &[u8]) -> String {
        STANDARD.encode(Sha256::digest(data))
    }

    pub fn process_chunk(&self, index: usize, payload: Bytes) -> ChunkRecord {
        let hmac = self.compute_hmac(&payload);
        let sha256 = Self::compute_sha256(&payload);
        ChunkRecord {
            index,
            payload,
            hmac,
            sha256,
        }
    }

    /// Re-derive both digests. The MAC comparison is constant-time.
    pub fn verify_chunk(&self, chunk: &ChunkRecord) -> ChunkVerification {
        let hmac_valid = match STANDARD.decode(&chunk.hmac) {
            Ok(tag) => {
                let mut mac = self.mac.clone();
                mac.update(&chunk.payload);
                mac.verify_slice(&tag).is_ok()
            }
            Err(_) => false,
        };
        let sha256_valid = Self::compute_sha256(&chunk.payload) == chunk.sha256;
        ChunkVerification {
            hmac_valid,
            sha256_valid,
        }
    }

    /// All-or-nothing: the first failing unit rejects the whole set
    pub fn verify_all(&self, chunks: &[ChunkRecord]) -> Result<(), TransportError> {
        for chunk in chunks {
            let verification = self.verify_chunk(chunk);
            if !verification.passed() {
                log::error!(
                    "Integrity mismatch on chunk {} (hmac {}, sha256 {})",
                    chunk.index,
                    verification.hmac_valid,
                    verification.sha256_valid
                );
                return Err(TransportError::IntegrityMismatch {
                    unit: format!("chunk {}", chunk.index),
                });
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for IntegritySigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("IntegritySigner { .. }")
    }
}

/// Split a payload into chunks of at most `chunk_size` bytes without
/// copying. A zero size yields the payload as a single chunk.
pub fn chunk_payload(data: Bytes, chunk_size: usize) -> Vec<Bytes> {
    if data.is_empty() {
        return Vec::new();
    }
    if chunk_size == 0 || data.len() <= chunk_size {
        return vec![data];
    }
    (0..data.len())
        .step_by(chunk_size)
        .map(|start| data.slice(start..(start + chunk_size).min(data.len())))
        .collect()
}
