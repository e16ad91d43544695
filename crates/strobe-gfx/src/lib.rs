//! Graphics command-context boundary.
//!
//! A [`GraphicsContext`] is an external timeline (typically a GPU command
//! list) that accepts pre-serialized event blobs. The capture runtime
//! forwards each `*_on` instrumentation call here so the context's own
//! tooling sees the event too, independent of whether CPU-side capture is
//! running.

#![forbid(unsafe_code)]

use strobe_events::{encode_event_blob, EventKind, RECORD_SPACE_WORDS, WORD_BYTES};

pub use strobe_events::BLOB_METADATA_VERSION;

/// The three-operation surface a command context exposes for event
/// annotation. `blob` is the minimal serialized event (header, color, name);
/// End carries no payload so it has no blob parameter.
pub trait GraphicsContext {
    fn begin_event(&mut self, metadata: u32, blob: &[u8]);
    fn set_marker(&mut self, metadata: u32, blob: &[u8]);
    fn end_event(&mut self);
}

/// Stable handle for a context within a capture: derived from the object's
/// address, which is unique while the context is alive.
pub fn context_id(context: &dyn GraphicsContext) -> u64 {
    context as *const dyn GraphicsContext as *const () as u64
}

/// Serialize `{kind, color, name}` and forward it to `context`. Dispatches
/// to the matching trait operation; for [`EventKind::End`] no blob is built.
pub fn forward_event(context: &mut dyn GraphicsContext, kind: EventKind, color: u64, name: &str) {
    if kind == EventKind::End {
        context.end_event();
        return;
    }

    let mut words = [0u64; RECORD_SPACE_WORDS];
    let size = encode_event_blob(&mut words, kind, color, name);
    let mut bytes = [0u8; RECORD_SPACE_WORDS * WORD_BYTES];
    for (chunk, word) in bytes.chunks_exact_mut(WORD_BYTES).zip(words.iter()) {
        chunk.copy_from_slice(&word.to_le_bytes());
    }
    match kind {
        EventKind::Begin => context.begin_event(BLOB_METADATA_VERSION, &bytes[..size]),
        EventKind::Marker => context.set_marker(BLOB_METADATA_VERSION, &bytes[..size]),
        EventKind::End => unreachable!("handled above"),
    }
}

/// One recorded call on a [`RecordingContext`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordedCall {
    BeginEvent { metadata: u32, blob: Vec<u8> },
    SetMarker { metadata: u32, blob: Vec<u8> },
    EndEvent,
}

/// Test double that records every call verbatim.
#[derive(Debug, Default)]
pub struct RecordingContext {
    pub calls: Vec<RecordedCall>,
}

impl RecordingContext {
    pub fn new() -> Self {
        Self::default()
    }
}

impl GraphicsContext for RecordingContext {
    fn begin_event(&mut self, metadata: u32, blob: &[u8]) {
        self.calls.push(RecordedCall::BeginEvent {
            metadata,
            blob: blob.to_vec(),
        });
    }

    fn set_marker(&mut self, metadata: u32, blob: &[u8]) {
        self.calls.push(RecordedCall::SetMarker {
            metadata,
            blob: blob.to_vec(),
        });
    }

    fn end_event(&mut self) {
        self.calls.push(RecordedCall::EndEvent);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strobe_events::try_decode_event_blob;

    fn blob_words(blob: &[u8]) -> Vec<u64> {
        blob.chunks_exact(WORD_BYTES)
            .map(|c| {
                let mut buf = [0u8; WORD_BYTES];
                buf.copy_from_slice(c);
                u64::from_le_bytes(buf)
            })
            .collect()
    }

    #[test]
    fn begin_forwards_a_decodable_blob() {
        let mut context = RecordingContext::new();
        forward_event(&mut context, EventKind::Begin, 0xFF00_FF00, "draw pass");

        assert_eq!(context.calls.len(), 1);
        let RecordedCall::BeginEvent { metadata, blob } = &context.calls[0] else {
            panic!("expected BeginEvent, got {:?}", context.calls[0]);
        };
        assert_eq!(*metadata, BLOB_METADATA_VERSION);

        let decoded = try_decode_event_blob(&blob_words(blob)).expect("valid blob");
        assert_eq!(decoded.color, 0xFF00_FF00);
        assert_eq!(decoded.name, "draw pass");
    }

    #[test]
    fn marker_uses_set_marker() {
        let mut context = RecordingContext::new();
        forward_event(&mut context, EventKind::Marker, 1, "checkpoint");
        assert!(matches!(
            context.calls[0],
            RecordedCall::SetMarker { metadata: BLOB_METADATA_VERSION, .. }
        ));
    }

    #[test]
    fn end_forwards_without_a_blob() {
        let mut context = RecordingContext::new();
        forward_event(&mut context, EventKind::End, 0, "");
        assert_eq!(context.calls, vec![RecordedCall::EndEvent]);
    }

    #[test]
    fn ids_differ_per_object() {
        let a = RecordingContext::new();
        let b = RecordingContext::new();
        assert_ne!(
            context_id(&a as &dyn GraphicsContext),
            context_id(&b as &dyn GraphicsContext)
        );
    }
}
