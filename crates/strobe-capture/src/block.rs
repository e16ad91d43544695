//! Fixed-capacity capture blocks and the pooling allocator.
//!
//! Blocks are created on demand, owned by exactly one thread while open,
//! handed to the worker once sealed, and recycled through the free pool
//! rather than freed in steady state.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use strobe_events::{RESERVED_TAIL_WORDS, WORD_BYTES};
use thiserror::Error;

/// Words per block: 64 KiB of record space.
pub const BLOCK_CAPACITY_WORDS: usize = 8192;

/// Logical write limit. The words between the limit and the true capacity are
/// the reserved tail: room for a bounded string-copy overrun plus the
/// end-of-block sentinel.
pub const BLOCK_LIMIT_WORDS: usize = BLOCK_CAPACITY_WORDS - RESERVED_TAIL_WORDS;

/// Backing storage for one block. Contents are only meaningful up to the
/// cursor its owner maintains; recycled storage is not re-zeroed because the
/// sentinel and record length fields bound every read.
#[derive(Debug)]
pub struct BlockStorage {
    words: Box<[u64]>,
}

impl BlockStorage {
    fn new() -> Self {
        Self {
            words: vec![0u64; BLOCK_CAPACITY_WORDS].into_boxed_slice(),
        }
    }

    pub fn words(&self) -> &[u64] {
        &self.words
    }

    pub fn words_mut(&mut self) -> &mut [u64] {
        &mut self.words
    }
}

/// A sealed block in flight to the worker: storage plus the exact number of
/// bytes in use (sentinel included).
#[derive(Debug)]
pub struct SealedBlock {
    storage: BlockStorage,
    used_words: usize,
}

impl SealedBlock {
    pub(crate) fn new(storage: BlockStorage, used_words: usize) -> Self {
        debug_assert!(used_words <= BLOCK_CAPACITY_WORDS);
        Self {
            storage,
            used_words,
        }
    }

    pub fn used_bytes(&self) -> usize {
        self.used_words * WORD_BYTES
    }

    /// The block's used bytes, verbatim and little-endian, ready for the
    /// durable sink or the offline decoder.
    pub fn to_bytes(&self) -> Vec<u8> {
        self.storage.words[..self.used_words]
            .iter()
            .flat_map(|w| w.to_le_bytes())
            .collect()
    }

    /// Recover the storage for recycling once the durable write is done.
    pub fn into_storage(self) -> BlockStorage {
        self.storage
    }
}

#[derive(Debug, Error)]
pub enum AcquireError {
    #[error("block pool exhausted: {limit} blocks already allocated")]
    Exhausted { limit: usize },
}

/// Pool of block storage. `acquire` hands out exclusively-owned storage;
/// `release` is called by the worker once a block's bytes are durable.
#[derive(Debug)]
pub struct BlockAllocator {
    free: Mutex<Vec<BlockStorage>>,
    allocated: AtomicUsize,
    max_blocks: Option<usize>,
}

impl BlockAllocator {
    pub fn new() -> Self {
        Self::with_max_blocks(None)
    }

    /// A capped pool; used to bound capture memory and by tests that force
    /// exhaustion.
    pub fn with_max_blocks(max_blocks: Option<usize>) -> Self {
        Self {
            free: Mutex::new(Vec::new()),
            allocated: AtomicUsize::new(0),
            max_blocks,
        }
    }

    pub fn acquire(&self) -> Result<BlockStorage, AcquireError> {
        if let Some(storage) = self.lock_free().pop() {
            return Ok(storage);
        }

        if let Some(limit) = self.max_blocks {
            // The count only grows, so a stale read here can at worst refuse
            // an allocation that a concurrent release would have satisfied.
            if self.allocated.load(Ordering::Acquire) >= limit {
                return Err(AcquireError::Exhausted { limit });
            }
        }
        self.allocated.fetch_add(1, Ordering::AcqRel);
        Ok(BlockStorage::new())
    }

    pub fn release(&self, storage: BlockStorage) {
        self.lock_free().push(storage);
    }

    /// Total blocks ever created (free and outstanding).
    pub fn allocated_blocks(&self) -> usize {
        self.allocated.load(Ordering::Acquire)
    }

    fn lock_free(&self) -> std::sync::MutexGuard<'_, Vec<BlockStorage>> {
        match self.free.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl Default for BlockAllocator {
    fn default() -> Self {
        Self::new()
    }
}
