use std::collections::{BTreeSet, HashMap};

use parking_lot::Mutex;
use thiserror::Error;

pub type SequenceId = String;
pub type BlockId = usize;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CacheError {
    #[error("cache exhausted: need {required} blocks, {available} free")]
    CacheExhausted { required: usize, available: usize },
}

struct Inner {
    /// Free physical block indices. A `BTreeSet` gives O(log n)
    /// lowest-index-first allocation, matching the spec's determinism
    /// requirement directly via `pop_first`.
    free: BTreeSet<BlockId>,
    /// sequenceId -> ordered logical-to-physical block list.
    sequences: HashMap<SequenceId, Vec<BlockId>>,
    total_blocks: usize,
}

/// Off-heap block pool. One physical slab of `total_blocks * block_size *
/// hidden_dim * 2 * element_bytes` bytes backs the whole pool; this type
/// only tracks which indices are allocated, the byte arena itself is
/// irrelevant to the allocation algorithm and is omitted here the way the
/// spec's contract (§4.1) is stated purely in terms of block indices.
pub struct BlockPool {
    inner: Mutex<Inner>,
    block_size: usize,
}

impl BlockPool {
    pub fn new(total_blocks: usize, block_size: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                free: (0..total_blocks).collect(),
                sequences: HashMap::new(),
                total_blocks,
            }),
            block_size,
        }
    }

    /// Reserve ⌈prompt_tokens / block_size⌉ physical blocks for `sequence_id`.
    /// Fails with [`CacheError::CacheExhausted`] and allocates nothing if
    /// free blocks are insufficient — no partial allocation persists.
    pub fn allocate_prefill(
        &self,
        sequence_id: impl Into<SequenceId>,
        prompt_tokens: usize,
    ) -> Result<Vec<BlockId>, CacheError> {
        let required = prompt_tokens.div_ceil(self.block_size).max(1);
        let mut inner = self.inner.lock();
        if inner.free.len() < required {
            return Err(CacheError::CacheExhausted {
                required,
                available: inner.free.len(),
            });
        }
        let mut blocks = Vec::with_capacity(required);
        for _ in 0..required {
            let id = inner.free.pop_first().expect("checked len above");
            blocks.push(id);
        }
        inner.sequences.insert(sequence_id.into(), blocks.clone());
        Ok(blocks)
    }

    /// Append one block to `sequence_id` only when its last logical block
    /// is full (i.e. the sequence has generated `n * block_size` tokens for
    /// some n). Returns `None` ("no new block") when the caller should
    /// continue writing into the existing last block, or when the
    /// sequence is unknown.
    pub fn append_decode(
        &self,
        sequence_id: &str,
        last_block_full: bool,
    ) -> Result<Option<BlockId>, CacheError> {
        if !last_block_full {
            return Ok(None);
        }
        let mut inner = self.inner.lock();
        let Some(id) = inner.free.pop_first() else {
            return Err(CacheError::CacheExhausted {
                required: 1,
                available: 0,
            });
        };
        inner
            .sequences
            .entry(sequence_id.to_string())
            .or_default()
            .push(id);
        Ok(Some(id))
    }

    /// Return all blocks owned by `sequence_id` to the free pool.
    /// Idempotent: freeing an unknown or already-freed sequence is a no-op.
    pub fn free(&self, sequence_id: &str) {
        let mut inner = self.inner.lock();
        if let Some(blocks) = inner.sequences.remove(sequence_id) {
            inner.free.extend(blocks);
        }
    }

    pub fn get_blocks(&self, sequence_id: &str) -> Vec<BlockId> {
        self.inner
            .lock()
            .sequences
            .get(sequence_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Observability hook: confirms the conservation invariant (spec §8)
    /// holds at the moment of the call.
    pub fn free_count(&self) -> usize {
        self.inner.lock().free.len()
    }

    pub fn total_blocks(&self) -> usize {
        self.inner.lock().total_blocks
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conserves(pool: &BlockPool) {
        let inner = pool.inner.lock();
        let allocated: usize = inner.sequences.values().map(|v| v.len()).sum();
        assert_eq!(inner.free.len() + allocated, inner.total_blocks);
    }

    #[test]
    fn allocate_prefill_reserves_ceil_blocks() {
        let pool = BlockPool::new(16, 4);
        let blocks = pool.allocate_prefill("seq-1", 10).unwrap();
        assert_eq!(blocks.len(), 3); // ceil(10/4) = 3
        assert_eq!(blocks, vec![0, 1, 2]); // lowest-index-first, deterministic
        conserves(&pool);
    }

    #[test]
    fn exhaustion_leaves_free_pool_unchanged() {
        // spec §8 scenario 6: totalBlocks=4, blockSize=16, prompt needs 5.
        let pool = BlockPool::new(4, 16);
        let before = pool.free_count();
        let err = pool.allocate_prefill("seq-1", 80).unwrap_err();
        assert_eq!(
            err,
            CacheError::CacheExhausted {
                required: 5,
                available: 4
            }
        );
        assert_eq!(pool.free_count(), before);
        assert!(pool.get_blocks("seq-1").is_empty());
    }

    #[test]
    fn free_returns_blocks_and_is_idempotent() {
        let pool = BlockPool::new(8, 4);
        pool.allocate_prefill("seq-1", 10).unwrap();
        assert_eq!(pool.free_count(), 5);
        pool.free("seq-1");
        assert_eq!(pool.free_count(), 8);
        pool.free("seq-1"); // idempotent
        assert_eq!(pool.free_count(), 8);
        conserves(&pool);
    }

    #[test]
    fn append_decode_only_allocates_when_last_block_full() {
        let pool = BlockPool::new(8, 4);
        pool.allocate_prefill("seq-1", 4).unwrap(); // exactly 1 block, full
        assert!(pool.append_decode("seq-1", false).unwrap().is_none());
        let appended = pool.append_decode("seq-1", true).unwrap();
        assert!(appended.is_some());
        assert_eq!(pool.get_blocks("seq-1").len(), 2);
        conserves(&pool);
    }

    #[test]
    fn no_block_is_ever_shared_between_sequences() {
        let pool = BlockPool::new(8, 2);
        let a = pool.allocate_prefill("a", 4).unwrap();
        let b = pool.allocate_prefill("b", 4).unwrap();
        for id in &a {
            assert!(!b.contains(id));
        }
        conserves(&pool);
    }
}
