//! In-process event capture runtime.
//!
//! Producing threads append encoded records into thread-owned fixed-size
//! blocks drawn from a recycling pool; full blocks are handed to a
//! [`worker::Worker`] that drains them off the hot path. See
//! `strobe-events` for the record layout and `strobe-gfx` for the graphics
//! context forwarding boundary.

pub mod block;
pub mod session;
pub mod worker;

mod thread_data;

pub use block::{
    AcquireError, BlockAllocator, BlockStorage, SealedBlock, BLOCK_CAPACITY_WORDS,
    BLOCK_LIMIT_WORDS,
};
pub use session::CaptureSession;
pub use worker::{HoardingWorker, MemoryWorker, Worker, WriterWorker};
