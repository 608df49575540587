//! Chunk addressing and block extraction: byte offset -> chunk index, chunk payload -> block.

use std::fmt;
use std::num::NonZeroU64;

/// Chunk size assumed before the first response is seen.
pub const DEFAULT_CHUNK_SIZE: u64 = 1200;

const DEFAULT_NON_ZERO: NonZeroU64 = match NonZeroU64::new(DEFAULT_CHUNK_SIZE) {
    Some(n) => n,
    None => panic!("DEFAULT_CHUNK_SIZE must be non-zero"),
};

/// Learned chunk size. Never zero, so addressing never divides by zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChunkSize(NonZeroU64);

impl ChunkSize {
    /// None for zero.
    pub fn new(bytes: u64) -> Option<Self> {
        NonZeroU64::new(bytes).map(ChunkSize)
    }

    pub fn get(self) -> u64 {
        self.0.get()
    }
}

impl Default for ChunkSize {
    fn default() -> Self {
        ChunkSize(DEFAULT_NON_ZERO)
    }
}

impl fmt::Display for ChunkSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Index of the chunk holding byte `position`.
pub fn chunk_index_for(position: u64, chunk_size: ChunkSize) -> u64 {
    position / chunk_size.get()
}

/// Offset of `position` inside its chunk.
pub fn offset_in_chunk(position: u64, chunk_size: ChunkSize) -> u64 {
    position % chunk_size.get()
}

/// Result of slicing one chunk payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extracted {
    /// Bytes from `position` to the end of the payload; None when the position lies past it.
    pub block: Option<Vec<u8>>,
    /// Size of the payload that was examined.
    pub payload_size: usize,
}

/// Copy `payload[position % chunk_size ..]` into a fresh block.
///
/// A payload shorter than the offset (typically a short final chunk) yields no block.
pub fn extract_block(payload: &[u8], chunk_size: ChunkSize, position: u64) -> Extracted {
    let payload_size = payload.len();
    let start = offset_in_chunk(position, chunk_size);
    let block = usize::try_from(start)
        .ok()
        .filter(|&start| start < payload_size)
        .map(|start| payload[start..].to_vec());
    Extracted {
        block,
        payload_size,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn size(n: u64) -> ChunkSize {
        ChunkSize::new(n).unwrap()
    }

    #[test]
    fn zero_chunk_size_rejected() {
        assert!(ChunkSize::new(0).is_none());
        assert_eq!(ChunkSize::default().get(), DEFAULT_CHUNK_SIZE);
    }

    #[test]
    fn index_is_floor_division() {
        assert_eq!(chunk_index_for(2500, size(1200)), 2);
        assert_eq!(chunk_index_for(0, size(1200)), 0);
        assert_eq!(chunk_index_for(1199, size(1200)), 0);
        assert_eq!(chunk_index_for(1200, size(1200)), 1);
        assert_eq!(chunk_index_for(u64::MAX, size(1)), u64::MAX);
    }

    #[test]
    fn index_matches_floor_for_sampled_inputs() {
        use rand::Rng;
        let mut rng = rand::thread_rng();
        for _ in 0..1000 {
            let p: u64 = rng.gen();
            let s: u64 = rng.gen_range(1..1 << 20);
            assert_eq!(chunk_index_for(p, size(s)), p / s);
        }
    }

    #[test]
    fn extract_mid_chunk() {
        let payload: Vec<u8> = (0..1200).map(|i| i as u8).collect();
        let out = extract_block(&payload, size(1200), 2500);
        assert_eq!(out.payload_size, 1200);
        let block = out.block.unwrap();
        assert_eq!(block.len(), 1100);
        assert_eq!(block[0], 100u8);
        assert_eq!(block[..], payload[100..]);
    }

    #[test]
    fn extract_chunk_start_returns_whole_payload() {
        let payload = vec![7u8; 1200];
        let out = extract_block(&payload, size(1200), 1200);
        assert_eq!(out.block.unwrap().len(), 1200);
    }

    #[test]
    fn extract_past_short_final_chunk() {
        let payload = vec![1u8; 50];
        let out = extract_block(&payload, size(1200), 2400 + 50);
        assert_eq!(out.block, None);
        assert_eq!(out.payload_size, 50);

        let out = extract_block(&payload, size(1200), 2400 + 700);
        assert_eq!(out.block, None);
    }

    #[test]
    fn extract_empty_payload() {
        let out = extract_block(&[], size(1200), 0);
        assert_eq!(out.block, None);
        assert_eq!(out.payload_size, 0);
    }

    #[test]
    fn extract_larger_payload_than_learned_size() {
        // Stale learned size: offset comes from the old size, copy runs to payload end.
        let payload = vec![3u8; 4000];
        let out = extract_block(&payload, size(1200), 1300);
        assert_eq!(out.block.unwrap().len(), 3900);
        assert_eq!(out.payload_size, 4000);
    }
}
