use serde::{Deserialize, Serialize};

use crate::signature::DigestBlock;

/// Per-chunk digest algorithm.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DigestKind {
    /// First four bytes of the chunk's BLAKE3 hash, big-endian.
    #[default]
    Blake3,
    /// `h = h * 31 + byte` with 32-bit wraparound, as produced by older
    /// signature databases.
    Poly31,
}

/// Reduces one chunk to a 32-bit [`DigestBlock`].
///
/// Stateless and seed-free, so chunks can be digested on any thread in any
/// order and the result is stable across runs.
#[derive(Debug, Clone, Copy, Default)]
pub struct ChunkDigester {
    kind: DigestKind,
}

impl ChunkDigester {
    pub fn new(kind: DigestKind) -> Self {
        Self { kind }
    }

    pub fn digest(&self, chunk: &[u8]) -> DigestBlock {
        match self.kind {
            DigestKind::Blake3 => {
                let hash = blake3::hash(chunk);
                let bytes = hash.as_bytes();
                DigestBlock::new(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
            }
            DigestKind::Poly31 => DigestBlock::new(
                chunk
                    .iter()
                    .fold(0u32, |h, &b| h.wrapping_mul(31).wrapping_add(b as u32)),
            ),
        }
    }
}
