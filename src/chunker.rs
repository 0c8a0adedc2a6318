//! Content-defined chunking driven by [`RollingHash`].
//!
//! After a chunk reaches `min_chunk` bytes, a boundary is cut at the first
//! byte where the low `trigger_bits` bits of the rolling hash are zero, so
//! boundaries follow local content and an edit only disturbs the chunks
//! around it. A chunk that reaches `max_chunk` without a trigger is cut there.

use std::ops::Range;

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::error::{GlacierError, Result};
use crate::rolling_hash::{RollingHash, DEFAULT_BASE, MODULUS};

pub const DEFAULT_MIN_CHUNK: usize = 2048;
pub const DEFAULT_MAX_CHUNK: usize = 65536;
pub const DEFAULT_WINDOW_SIZE: usize = 64;
pub const DEFAULT_TRIGGER_BITS: u32 = 13;

/// Hash values are below 2^61, so more bits could never all be zero by chance.
const MAX_TRIGGER_BITS: u32 = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkerConfig {
    pub min_chunk: usize,
    pub max_chunk: usize,
    pub window_size: usize,
    pub trigger_bits: u32,
    pub base: u64,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            min_chunk: DEFAULT_MIN_CHUNK,
            max_chunk: DEFAULT_MAX_CHUNK,
            window_size: DEFAULT_WINDOW_SIZE,
            trigger_bits: DEFAULT_TRIGGER_BITS,
            base: DEFAULT_BASE,
        }
    }
}

impl ChunkerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.min_chunk == 0 {
            return Err(GlacierError::config("min_chunk must be at least 1"));
        }
        if self.min_chunk > self.max_chunk {
            return Err(GlacierError::config(format!(
                "min_chunk ({}) exceeds max_chunk ({})",
                self.min_chunk, self.max_chunk
            )));
        }
        if self.window_size == 0 {
            return Err(GlacierError::config("window_size must be at least 1"));
        }
        if self.trigger_bits == 0 || self.trigger_bits > MAX_TRIGGER_BITS {
            return Err(GlacierError::config(format!(
                "trigger_bits must be in 1..={MAX_TRIGGER_BITS}, got {}",
                self.trigger_bits
            )));
        }
        if self.base % MODULUS < 2 {
            return Err(GlacierError::config(format!(
                "rolling hash base {} degenerates modulo 2^61-1",
                self.base
            )));
        }
        Ok(())
    }
}

/// A `[offset, offset + len)` range of the chunked input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunk {
    pub offset: usize,
    pub len: usize,
}

impl Chunk {
    pub fn end(&self) -> usize {
        self.offset + self.len
    }

    pub fn range(&self) -> Range<usize> {
        self.offset..self.end()
    }
}

#[derive(Debug, Clone)]
pub struct AdaptiveChunker {
    config: ChunkerConfig,
    mask: u64,
}

impl AdaptiveChunker {
    /// Fails with [`GlacierError::Config`] on invalid bounds; `chunk` itself
    /// never fails.
    pub fn new(config: ChunkerConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            mask: (1u64 << config.trigger_bits) - 1,
        })
    }

    pub fn config(&self) -> &ChunkerConfig {
        &self.config
    }

    /// Partition `data` into chunks. Empty input yields no chunks; input
    /// shorter than `min_chunk` yields one chunk covering all of it.
    pub fn chunk(&self, data: &[u8]) -> Vec<Chunk> {
        let ChunkerConfig {
            min_chunk,
            max_chunk,
            window_size,
            base,
            ..
        } = self.config;

        let mut chunks = Vec::with_capacity(data.len() / min_chunk + 1);
        let mut rolling = RollingHash::new(window_size, base);
        let mut start = 0usize;
        let mut forced = 0usize;

        for (i, &byte) in data.iter().enumerate() {
            let fingerprint = rolling.update(byte);
            let len = i + 1 - start;
            if len < min_chunk {
                continue;
            }
            let triggered = (fingerprint & self.mask) == 0;
            if triggered || len >= max_chunk {
                if !triggered {
                    forced += 1;
                }
                chunks.push(Chunk { offset: start, len });
                start = i + 1;
            }
        }

        if start < data.len() {
            chunks.push(Chunk {
                offset: start,
                len: data.len() - start,
            });
        }

        trace!(
            bytes = data.len(),
            chunks = chunks.len(),
            forced,
            "chunked input"
        );
        chunks
    }
}
