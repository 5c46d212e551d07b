//! Fixed-size overlapping windows over a unit's payload.

use serde::{Deserialize, Serialize};

use super::hash::content_hash;
use crate::Error;

/// One window of a unit's payload, keyed by the hash of its text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub unit_id: String,
    pub sequence: usize,
    pub text: String,
    pub chunk_hash: String,
}

/// Window parameters, measured in characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkConfig {
    pub max_size: usize,
    pub overlap: usize,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self { max_size: 1000, overlap: 100 }
    }
}

impl ChunkConfig {
    /// Rejects parameters for which the window would never advance.
    pub fn new(max_size: usize, overlap: usize) -> Result<Self, Error> {
        if max_size == 0 {
            return Err(Error::InvalidInput("chunk size must be greater than 0".into()));
        }
        if overlap >= max_size {
            return Err(Error::InvalidInput(format!("chunk overlap {overlap} must be smaller than size {max_size}")));
        }
        Ok(Self { max_size, overlap })
    }

    fn step(&self) -> usize {
        self.max_size - self.overlap
    }
}

/// Split `text` into windows of `max_size` characters advancing by
/// `max_size - overlap`. Text that fits in one window comes back whole; the
/// last window may be shorter.
pub fn chunk_text(text: &str, config: ChunkConfig) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    if chars.len() <= config.max_size {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::with_capacity(chars.len().div_ceil(config.step()));
    let mut start = 0;
    while start < chars.len() {
        let end = (start + config.max_size).min(chars.len());
        chunks.push(chars[start..end].iter().collect());
        start += config.step();
    }
    chunks
}

/// Chunk a unit's payload and attach identity to every window.
pub fn chunk_unit(unit_id: &str, payload: &str, config: ChunkConfig) -> Vec<Chunk> {
    chunk_text(payload, config)
        .into_iter()
        .enumerate()
        .map(|(sequence, text)| Chunk { unit_id: unit_id.to_string(), sequence, chunk_hash: content_hash(&text), text })
        .collect()
}
