//! Per-thread capture state.
//!
//! Each producing thread owns at most one open block at a time. The state
//! machine is `NoBlock -> Open -> (sealed, transient)`: the block is acquired
//! lazily on the first append, sealed and submitted when headroom runs out,
//! and a fresh one is acquired before the append proceeds, so a record is
//! never split across blocks.
//!
//! A buffer lives behind a per-thread mutex so that `flush`/`shutdown` can
//! seal another thread's open block. The lock is uncontended in steady state
//! (only its owner touches it) and contended only at those lifecycle points.

use crate::block::{BlockAllocator, BlockStorage, SealedBlock, BLOCK_LIMIT_WORDS};
use crate::worker::Worker;
use strobe_events::{encode_timing_event, write_block_end, EventKind, RECORD_SPACE_WORDS};

pub(crate) struct ThreadBuffer {
    storage: Option<BlockStorage>,
    cursor: usize,
    /// Set when block acquisition failed; this thread's capture path stays
    /// dead so the failure cannot spread to other threads.
    dead: bool,
}

impl ThreadBuffer {
    pub(crate) fn new() -> Self {
        Self {
            storage: None,
            cursor: 0,
            dead: false,
        }
    }

    /// Append one event, sealing and swapping the block first if the
    /// worst-case record would not fit below the limit.
    pub(crate) fn append(
        &mut self,
        allocator: &BlockAllocator,
        worker: &dyn Worker,
        timestamp: u64,
        kind: EventKind,
        color: u64,
        name: &str,
        context: Option<u64>,
    ) {
        if self.dead {
            return;
        }

        if self.storage.is_some() && self.cursor + RECORD_SPACE_WORDS > BLOCK_LIMIT_WORDS {
            self.seal_and_submit(worker);
        }

        if self.storage.is_none() {
            match allocator.acquire() {
                Ok(storage) => {
                    self.cursor = 0;
                    self.storage = Some(storage);
                }
                Err(err) => {
                    tracing::error!("event capture disabled on this thread: {err}");
                    self.dead = true;
                    return;
                }
            }
        }
        let Some(storage) = self.storage.as_mut() else {
            return;
        };
        encode_timing_event(
            storage.words_mut(),
            &mut self.cursor,
            BLOCK_LIMIT_WORDS,
            timestamp,
            kind,
            color,
            name,
            context,
        );
    }

    /// Seal the open block (write the sentinel) and hand it to the worker.
    /// No-op without an open block.
    pub(crate) fn seal_and_submit(&mut self, worker: &dyn Worker) {
        let Some(mut storage) = self.storage.take() else {
            return;
        };
        let used = write_block_end(storage.words_mut(), self.cursor);
        self.cursor = 0;
        worker.add(SealedBlock::new(storage, used));
    }

    /// Flush variant: an untouched block goes straight back to the pool.
    pub(crate) fn flush(&mut self, allocator: &BlockAllocator, worker: &dyn Worker) {
        if self.cursor == 0 {
            if let Some(storage) = self.storage.take() {
                allocator.release(storage);
            }
            return;
        }
        self.seal_and_submit(worker);
    }

    #[cfg(test)]
    pub(crate) fn is_open(&self) -> bool {
        self.storage.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::BLOCK_CAPACITY_WORDS;
    use std::sync::Arc;
    use crate::worker::MemoryWorker;
    use strobe_events::decode_timing_block;

    #[test]
    fn first_append_acquires_lazily() {
        let allocator = Arc::new(BlockAllocator::new());
        let worker = MemoryWorker::with_allocator(Arc::clone(&allocator));
        let mut buffer = ThreadBuffer::new();
        assert!(!buffer.is_open());

        buffer.append(
            &allocator,
            &worker,
            1,
            EventKind::Marker,
            2,
            "lazy",
            None,
        );
        assert!(buffer.is_open());
        assert_eq!(allocator.allocated_blocks(), 1);
    }

    #[test]
    fn overflow_seals_before_the_append() {
        let allocator = Arc::new(BlockAllocator::new());
        let worker = MemoryWorker::with_allocator(Arc::clone(&allocator));
        let mut buffer = ThreadBuffer::new();

        let name = "x".repeat(400); // close to a full record each time
        let mut appended = 0u64;
        while worker.block_count() < 2 {
            buffer.append(
                &allocator,
                &worker,
                appended,
                EventKind::Marker,
                appended,
                &name,
                None,
            );
            appended += 1;
        }

        // Every block is shorter than the raw capacity and decodes fully;
        // concatenating recovers every appended event in order.
        let mut seen = 0u64;
        for block in worker.blocks() {
            assert!(block.len() <= BLOCK_CAPACITY_WORDS * 8);
            for event in decode_timing_block(&block) {
                assert_eq!(event.color, seen);
                seen += 1;
            }
        }
        assert!(seen > 0);
    }

    #[test]
    fn dead_buffer_swallows_appends() {
        let allocator = Arc::new(BlockAllocator::with_max_blocks(Some(0)));
        let worker = MemoryWorker::new();
        let mut buffer = ThreadBuffer::new();

        buffer.append(&allocator, &worker, 1, EventKind::Begin, 0, "no room", None);
        buffer.append(&allocator, &worker, 2, EventKind::End, 0, "", None);
        assert!(!buffer.is_open());
        assert_eq!(worker.block_count(), 0);
    }

    #[test]
    fn flush_submits_only_when_events_were_recorded() {
        let allocator = Arc::new(BlockAllocator::new());
        let worker = MemoryWorker::with_allocator(Arc::clone(&allocator));
        let mut buffer = ThreadBuffer::new();

        buffer.flush(&allocator, &worker);
        assert_eq!(worker.block_count(), 0);

        buffer.append(&allocator, &worker, 1, EventKind::End, 0, "", None);
        buffer.flush(&allocator, &worker);
        assert_eq!(worker.block_count(), 1);
        assert!(!buffer.is_open());
    }
}
