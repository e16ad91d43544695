//! Asynchronous consumers for sealed blocks.
//!
//! `add` runs on the sealing thread and must stay off its critical path: the
//! writer worker only enqueues onto a channel there. A block's bytes reach
//! the sink exactly once and verbatim; blocks from different threads may be
//! interleaved in any order. After the durable write the storage goes back to
//! the allocator.

use std::io::Write;
use std::sync::mpsc::{self, Sender};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::JoinHandle;

use crate::block::{BlockAllocator, SealedBlock};
use strobe_events::stream::write_frame;

/// Consumer of sealed blocks. `start`/`stop` bracket the consumer's own
/// lifecycle, not the capture session's.
pub trait Worker: Send + Sync {
    fn start(&self) {}
    fn stop(&self) {}
    fn add(&self, block: SealedBlock);
}

/// Writes each sealed block as one stream frame on a background thread.
///
/// `stop` closes the channel and joins the thread, which drains every block
/// already submitted before exiting; that is the clean-shutdown guarantee.
pub struct WriterWorker {
    sender: Mutex<Option<Sender<SealedBlock>>>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl WriterWorker {
    pub fn spawn<W: Write + Send + 'static>(mut sink: W, allocator: Arc<BlockAllocator>) -> Self {
        let (sender, receiver) = mpsc::channel::<SealedBlock>();
        let handle = std::thread::Builder::new()
            .name("strobe-writer".to_owned())
            .spawn(move || {
                // Iteration ends when every sender is dropped and the queue
                // is empty, so pending blocks are always drained.
                for block in receiver {
                    if let Err(err) = write_frame(&mut sink, &block.to_bytes()) {
                        tracing::error!("failed to write sealed block: {err}");
                    }
                    allocator.release(block.into_storage());
                }
                if let Err(err) = sink.flush() {
                    tracing::error!("failed to flush capture sink: {err}");
                }
            })
            .expect("spawn strobe writer thread");

        Self {
            sender: Mutex::new(Some(sender)),
            handle: Mutex::new(Some(handle)),
        }
    }
}

impl Worker for WriterWorker {
    fn stop(&self) {
        // Dropping the sender disconnects the channel; the thread drains the
        // queue and exits.
        drop(lock_recovering(&self.sender).take());
        if let Some(handle) = lock_recovering(&self.handle).take() {
            if handle.join().is_err() {
                tracing::error!("strobe writer thread panicked");
            }
        }
    }

    fn add(&self, block: SealedBlock) {
        let guard = lock_recovering(&self.sender);
        match guard.as_ref() {
            Some(sender) => {
                if sender.send(block).is_err() {
                    tracing::warn!("sealed block dropped: writer already stopped");
                }
            }
            None => tracing::warn!("sealed block dropped: writer already stopped"),
        }
    }
}

/// Synchronous in-memory worker: captures each sealed block's byte image and
/// recycles the storage immediately. Clones share the collected blocks, so a
/// test can keep a handle while the session owns the worker.
#[derive(Clone, Default)]
pub struct MemoryWorker {
    inner: Arc<MemoryWorkerInner>,
}

#[derive(Default)]
struct MemoryWorkerInner {
    blocks: Mutex<Vec<Vec<u8>>>,
    allocator: Mutex<Option<Arc<BlockAllocator>>>,
}

impl MemoryWorker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Recycle storage through `allocator` instead of dropping it.
    pub fn with_allocator(allocator: Arc<BlockAllocator>) -> Self {
        let worker = Self::default();
        *lock_recovering(&worker.inner.allocator) = Some(allocator);
        worker
    }

    /// Byte images of every block received so far, in arrival order.
    pub fn blocks(&self) -> Vec<Vec<u8>> {
        lock_recovering(&self.inner.blocks).clone()
    }

    pub fn block_count(&self) -> usize {
        lock_recovering(&self.inner.blocks).len()
    }
}

impl Worker for MemoryWorker {
    fn add(&self, block: SealedBlock) {
        lock_recovering(&self.inner.blocks).push(block.to_bytes());
        if let Some(allocator) = lock_recovering(&self.inner.allocator).as_ref() {
            allocator.release(block.into_storage());
        }
    }
}

/// A worker that retains every block it receives, starving the allocator.
/// Only useful for exercising pool exhaustion.
#[derive(Clone, Default)]
pub struct HoardingWorker {
    held: Arc<Mutex<Vec<SealedBlock>>>,
}

impl HoardingWorker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn held_count(&self) -> usize {
        lock_recovering(&self.held).len()
    }
}

impl Worker for HoardingWorker {
    fn add(&self, block: SealedBlock) {
        lock_recovering(&self.held).push(block);
    }
}

fn lock_recovering<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::BlockAllocator;

    fn sealed_with_bytes(allocator: &BlockAllocator, words: &[u64]) -> SealedBlock {
        let mut storage = allocator.acquire().expect("block");
        storage.words_mut()[..words.len()].copy_from_slice(words);
        SealedBlock::new(storage, words.len())
    }

    #[test]
    fn writer_worker_frames_blocks_and_recycles() {
        let allocator = Arc::new(BlockAllocator::new());
        let sink: Vec<u8> = Vec::new();
        let shared = Arc::new(Mutex::new(sink));

        struct SharedSink(Arc<Mutex<Vec<u8>>>);
        impl Write for SharedSink {
            fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
                self.0.lock().expect("sink lock").extend_from_slice(buf);
                Ok(buf.len())
            }
            fn flush(&mut self) -> std::io::Result<()> {
                Ok(())
            }
        }

        let worker = WriterWorker::spawn(SharedSink(Arc::clone(&shared)), Arc::clone(&allocator));
        worker.add(sealed_with_bytes(&allocator, &[1, 2, 3]));
        worker.add(sealed_with_bytes(&allocator, &[4]));
        worker.stop();

        let bytes = shared.lock().expect("sink lock").clone();
        let frames = strobe_events::stream::read_all_frames(&mut bytes.as_slice()).expect("frames");
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].len(), 24);
        assert_eq!(frames[1].len(), 8);

        // Both blocks were recycled.
        allocator.acquire().expect("recycled");
        allocator.acquire().expect("recycled");
        assert_eq!(allocator.allocated_blocks(), 2);
    }

    #[test]
    fn memory_worker_clones_share_blocks() {
        let allocator = Arc::new(BlockAllocator::new());
        let worker = MemoryWorker::with_allocator(Arc::clone(&allocator));
        let handle = worker.clone();

        worker.add(sealed_with_bytes(&allocator, &[7, 8]));
        assert_eq!(handle.block_count(), 1);
        assert_eq!(handle.blocks()[0].len(), 16);
    }

    #[test]
    fn add_after_stop_does_not_panic() {
        let allocator = Arc::new(BlockAllocator::new());
        let worker = WriterWorker::spawn(Vec::new(), Arc::clone(&allocator));
        worker.stop();
        worker.add(sealed_with_bytes(&allocator, &[1]));
    }
}
