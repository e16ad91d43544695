//! Capture session lifecycle and instrumentation entry points.
//!
//! A [`CaptureSession`] owns the block pool, the flush worker and a registry
//! of per-thread buffers. Instrumentation calls route to a thread-local
//! buffer slot so the hot path is one atomic load (the enabled flag), one
//! uncontended mutex lock and an in-place encode; cross-thread coordination
//! happens only at flush and shutdown.

use std::cell::RefCell;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

use strobe_events::format::TIMESTAMP_MASK;
use strobe_events::{format_name, Arg, EventKind};
use strobe_gfx::{context_id, forward_event, GraphicsContext};

use crate::block::BlockAllocator;
use crate::thread_data::ThreadBuffer;
use crate::worker::Worker;

/// Session ids are process-global and never reused, so a stale thread-local
/// slot from a finished session can never be mistaken for a live one.
static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

thread_local! {
    static BUFFER_SLOTS: RefCell<HashMap<u64, Arc<Mutex<ThreadBuffer>>>> =
        RefCell::new(HashMap::new());
}

struct SessionShared {
    id: u64,
    enabled: AtomicBool,
    shut_down: AtomicBool,
    allocator: Arc<BlockAllocator>,
    worker: Box<dyn Worker>,
    /// Every thread buffer ever handed out, so flush/shutdown can reach
    /// blocks still open on other threads.
    registry: Mutex<Vec<Arc<Mutex<ThreadBuffer>>>>,
    epoch: Instant,
}

/// Handle to a running capture session. Cheap to clone; all clones share
/// state.
#[derive(Clone)]
pub struct CaptureSession {
    shared: Arc<SessionShared>,
}

impl CaptureSession {
    /// Create a session draining into `worker`, with an unbounded block pool.
    pub fn new(worker: Box<dyn Worker>) -> Self {
        Self::with_allocator(worker, Arc::new(BlockAllocator::new()))
    }

    /// Create a session with a caller-configured allocator (e.g. a capped
    /// pool).
    pub fn with_allocator(worker: Box<dyn Worker>, allocator: Arc<BlockAllocator>) -> Self {
        worker.start();
        Self {
            shared: Arc::new(SessionShared {
                id: NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed),
                enabled: AtomicBool::new(false),
                shut_down: AtomicBool::new(false),
                allocator,
                worker,
                registry: Mutex::new(Vec::new()),
                epoch: Instant::now(),
            }),
        }
    }

    pub fn allocator(&self) -> &Arc<BlockAllocator> {
        &self.shared.allocator
    }

    /// Start recording events. Idempotent.
    pub fn enable_capture(&self) {
        self.shared.enabled.store(true, Ordering::Release);
    }

    /// Stop recording events. Already-captured blocks stay queued; call
    /// [`CaptureSession::flush`] to push out partial blocks. Idempotent.
    pub fn disable_capture(&self) {
        self.shared.enabled.store(false, Ordering::Release);
    }

    pub fn is_enabled(&self) -> bool {
        self.shared.enabled.load(Ordering::Acquire)
    }

    /// Seal and submit every thread's open block so the worker sees all
    /// events recorded so far. Untouched blocks go back to the pool.
    pub fn flush(&self) {
        let registry = lock_recovering(&self.shared.registry);
        for slot in registry.iter() {
            lock_recovering(slot).flush(&self.shared.allocator, self.shared.worker.as_ref());
        }
    }

    /// Disable capture, flush outstanding blocks and stop the worker. The
    /// worker drains its queue before returning, so no event recorded before
    /// this call is lost. Idempotent.
    pub fn shutdown(&self) {
        if self.shared.shut_down.swap(true, Ordering::AcqRel) {
            return;
        }
        self.disable_capture();
        self.flush();
        self.shared.worker.stop();
        lock_recovering(&self.shared.registry).clear();
    }

    /// Open a span on the calling thread's timeline.
    pub fn begin_event(&self, color: u64, fmt: &str, args: &[Arg<'_>]) {
        self.record(EventKind::Begin, color, fmt, args, None);
    }

    /// Close the most recently opened span.
    pub fn end_event(&self) {
        self.record(EventKind::End, 0, "", &[], None);
    }

    /// Drop an instantaneous marker on the calling thread's timeline.
    pub fn set_marker(&self, color: u64, fmt: &str, args: &[Arg<'_>]) {
        self.record(EventKind::Marker, color, fmt, args, None);
    }

    /// Open a span and forward it to `context`. Forwarding happens whether
    /// or not capture is enabled; the captured record carries the context
    /// handle.
    pub fn begin_event_on(
        &self,
        context: &mut dyn GraphicsContext,
        color: u64,
        fmt: &str,
        args: &[Arg<'_>],
    ) {
        let handle = context_id(context);
        let name = render_name(fmt, args);
        forward_event(context, EventKind::Begin, color, &name);
        self.record_rendered(EventKind::Begin, color, &name, Some(handle));
    }

    /// Close a span on `context`.
    pub fn end_event_on(&self, context: &mut dyn GraphicsContext) {
        let handle = context_id(context);
        forward_event(context, EventKind::End, 0, "");
        self.record_rendered(EventKind::End, 0, "", Some(handle));
    }

    /// Drop a marker and forward it to `context`.
    pub fn set_marker_on(
        &self,
        context: &mut dyn GraphicsContext,
        color: u64,
        fmt: &str,
        args: &[Arg<'_>],
    ) {
        let handle = context_id(context);
        let name = render_name(fmt, args);
        forward_event(context, EventKind::Marker, color, &name);
        self.record_rendered(EventKind::Marker, color, &name, Some(handle));
    }

    fn record(&self, kind: EventKind, color: u64, fmt: &str, args: &[Arg<'_>], context: Option<u64>) {
        if !self.is_enabled() {
            return;
        }
        let name = render_name(fmt, args);
        self.append(kind, color, &name, context);
    }

    fn record_rendered(&self, kind: EventKind, color: u64, name: &str, context: Option<u64>) {
        if !self.is_enabled() {
            return;
        }
        self.append(kind, color, name, context);
    }

    fn append(&self, kind: EventKind, color: u64, name: &str, context: Option<u64>) {
        let timestamp = self.now_ticks();
        let slot = self.thread_slot();
        lock_recovering(&slot).append(
            &self.shared.allocator,
            self.shared.worker.as_ref(),
            timestamp,
            kind,
            color,
            name,
            context,
        );
    }

    /// Monotonic session clock in 100ns ticks, masked to the header's
    /// timestamp width.
    fn now_ticks(&self) -> u64 {
        (self.shared.epoch.elapsed().as_nanos() / 100) as u64 & TIMESTAMP_MASK
    }

    /// The calling thread's buffer for this session, creating and
    /// registering it on first use.
    fn thread_slot(&self) -> Arc<Mutex<ThreadBuffer>> {
        BUFFER_SLOTS.with(|slots| {
            let mut slots = slots.borrow_mut();
            if let Some(slot) = slots.get(&self.shared.id) {
                return Arc::clone(slot);
            }
            let slot = Arc::new(Mutex::new(ThreadBuffer::new()));
            lock_recovering(&self.shared.registry).push(Arc::clone(&slot));
            slots.insert(self.shared.id, Arc::clone(&slot));
            slot
        })
    }
}

impl Drop for SessionShared {
    fn drop(&mut self) {
        if !self.shut_down.load(Ordering::Acquire) {
            tracing::warn!("capture session dropped without shutdown; stopping worker");
            self.worker.stop();
        }
    }
}

fn render_name<'a>(fmt: &'a str, args: &[Arg<'_>]) -> std::borrow::Cow<'a, str> {
    if args.is_empty() {
        std::borrow::Cow::Borrowed(fmt)
    } else {
        std::borrow::Cow::Owned(format_name(fmt, args))
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
    use crate::worker::MemoryWorker;
    use strobe_events::decode_timing_block;
    use strobe_gfx::{RecordedCall, RecordingContext};

    fn decode_all(worker: &MemoryWorker) -> Vec<strobe_events::Event> {
        worker
            .blocks()
            .iter()
            .flat_map(|block| decode_timing_block(block))
            .collect()
    }

    #[test]
    fn begin_end_marker_in_order() {
        let worker = MemoryWorker::new();
        let session = CaptureSession::new(Box::new(worker.clone()));
        session.enable_capture();

        session.begin_event(1, "frame", &[]);
        session.end_event();
        session.set_marker(4, "msg", &[]);
        session.shutdown();

        let events = decode_all(&worker);
        assert_eq!(events.len(), 3);
        assert_eq!(events[0].kind, EventKind::Begin);
        assert_eq!(events[0].name, "frame");
        assert_eq!(events[1].kind, EventKind::End);
        assert_eq!(events[2].kind, EventKind::Marker);
        assert_eq!(events[2].color, 4);
        assert_eq!(events[2].name, "msg");
    }

    #[test]
    fn formatted_names_render_at_record_time() {
        let worker = MemoryWorker::new();
        let session = CaptureSession::new(Box::new(worker.clone()));
        session.enable_capture();

        session.begin_event(
            7,
            "hello %s %d %f",
            &[Arg::Str("world"), Arg::Int(3), Arg::Float(3.0)],
        );
        session.shutdown();

        let events = decode_all(&worker);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].name, "hello world 3 3.000000");
        assert_eq!(events[0].color, 7);
    }

    #[test]
    fn disabled_session_records_nothing() {
        let worker = MemoryWorker::new();
        let session = CaptureSession::new(Box::new(worker.clone()));

        session.begin_event(1, "ignored", &[]);
        session.end_event();
        session.shutdown();

        assert_eq!(worker.block_count(), 0);
        assert_eq!(session.allocator().allocated_blocks(), 0);
    }

    #[test]
    fn timestamps_are_monotonic_within_a_thread() {
        let worker = MemoryWorker::new();
        let session = CaptureSession::new(Box::new(worker.clone()));
        session.enable_capture();

        for i in 0..50 {
            session.set_marker(i, "tick", &[]);
        }
        session.shutdown();

        let events = decode_all(&worker);
        assert_eq!(events.len(), 50);
        for pair in events.windows(2) {
            assert!(pair[0].timestamp <= pair[1].timestamp);
        }
    }

    #[test]
    fn context_variants_forward_even_when_disabled() {
        let worker = MemoryWorker::new();
        let session = CaptureSession::new(Box::new(worker.clone()));
        let mut context = RecordingContext::new();

        session.begin_event_on(&mut context, 2, "pass %d", &[Arg::Int(1)]);
        session.end_event_on(&mut context);
        session.shutdown();

        assert_eq!(context.calls.len(), 2);
        assert!(matches!(context.calls[0], RecordedCall::BeginEvent { .. }));
        assert_eq!(context.calls[1], RecordedCall::EndEvent);
        assert_eq!(worker.block_count(), 0);
    }

    #[test]
    fn context_variants_capture_the_handle() {
        let worker = MemoryWorker::new();
        let session = CaptureSession::new(Box::new(worker.clone()));
        session.enable_capture();
        let mut context = RecordingContext::new();
        let handle = context_id(&context);

        session.set_marker_on(&mut context, 9, "upload", &[]);
        session.shutdown();

        let events = decode_all(&worker);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].context, Some(handle));
        assert_eq!(events[0].name, "upload");
        assert_eq!(events[0].color, 9);
    }

    #[test]
    fn shutdown_is_idempotent() {
        let worker = MemoryWorker::new();
        let session = CaptureSession::new(Box::new(worker.clone()));
        session.enable_capture();
        session.set_marker(0, "once", &[]);
        session.shutdown();
        session.shutdown();
        assert_eq!(decode_all(&worker).len(), 1);
    }

    #[test]
    fn flush_makes_partial_blocks_visible_midstream() {
        let worker = MemoryWorker::new();
        let session = CaptureSession::new(Box::new(worker.clone()));
        session.enable_capture();

        session.set_marker(1, "early", &[]);
        session.flush();
        assert_eq!(decode_all(&worker).len(), 1);

        session.set_marker(2, "late", &[]);
        session.shutdown();
        assert_eq!(decode_all(&worker).len(), 2);
    }

    #[test]
    fn sessions_do_not_share_thread_buffers() {
        let worker_a = MemoryWorker::new();
        let worker_b = MemoryWorker::new();
        let a = CaptureSession::new(Box::new(worker_a.clone()));
        let b = CaptureSession::new(Box::new(worker_b.clone()));
        a.enable_capture();
        b.enable_capture();

        a.set_marker(1, "for a", &[]);
        b.set_marker(2, "for b", &[]);
        a.shutdown();
        b.shutdown();

        let events_a = decode_all(&worker_a);
        let events_b = decode_all(&worker_b);
        assert_eq!(events_a.len(), 1);
        assert_eq!(events_a[0].name, "for a");
        assert_eq!(events_b.len(), 1);
        assert_eq!(events_b[0].name, "for b");
    }
}
