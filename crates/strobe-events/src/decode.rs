//! Offline decoding of captured block bytes.
//!
//! The scan is purely bounds-respecting: corrupt or unknown input degrades to
//! fewer decoded events, never to a panic or an out-of-bounds read. Unknown
//! record types are skipped via the header's length field; a length that is
//! zero or reaches past the end of the block stops the scan for that block
//! only.

use crate::format::{
    decode_event_info, EventKind, EventTag, BLOCK_END_SENTINEL, INVALID_UTF8_PLACEHOLDER,
    WORD_BYTES,
};

/// One decoded timeline event. Output is flat: Begin/Marker/End are siblings
/// in capture order; nesting is the caller's concern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub kind: EventKind,
    pub timestamp: u64,
    pub color: u64,
    pub name: String,
    /// External graphics-context handle, for events recorded through the
    /// forwarding path.
    pub context: Option<u64>,
}

/// Name and color recovered from a minimal context blob.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NameAndColor {
    pub name: String,
    pub color: u64,
}

/// Decode the raw bytes of one sealed block (or any prefix of one) into an
/// ordered event list. Trailing partial words are ignored.
pub fn decode_timing_block(bytes: &[u8]) -> Vec<Event> {
    let words: Vec<u64> = bytes
        .chunks_exact(WORD_BYTES)
        .map(|chunk| {
            let mut word = [0u8; WORD_BYTES];
            word.copy_from_slice(chunk);
            u64::from_le_bytes(word)
        })
        .collect();

    let mut events = Vec::new();
    let mut cursor = 0;
    while cursor < words.len() {
        let header = words[cursor];
        if header == BLOCK_END_SENTINEL {
            break;
        }

        let info = decode_event_info(header);
        let record_end = match cursor.checked_add(info.len_words) {
            Some(end) if info.len_words > 0 && end <= words.len() => end,
            // A zero or out-of-bounds length leaves no way to find the next
            // record; stop scanning this block.
            _ => break,
        };

        if let Some(tag) = EventTag::from_raw(info.raw_tag) {
            if let Some(event) = decode_record(tag, info.timestamp, &words[cursor..record_end]) {
                events.push(event);
            }
        }
        // Unknown tags are skipped by length: the format is self-describing.

        cursor = record_end;
    }
    events
}

fn decode_record(tag: EventTag, timestamp: u64, record: &[u64]) -> Option<Event> {
    let mut cursor = 1;
    let context = if tag.has_context() {
        let handle = *record.get(cursor)?;
        cursor += 1;
        Some(handle)
    } else {
        None
    };

    let (color, name) = match tag.kind() {
        EventKind::End => (crate::format::COLOR_DEFAULT, String::new()),
        EventKind::Begin | EventKind::Marker => {
            let color = *record.get(cursor)?;
            cursor += 1;
            (color, read_name(&record[cursor.min(record.len())..]))
        }
    };

    Some(Event {
        kind: tag.kind(),
        timestamp,
        color,
        name,
        context,
    })
}

/// Gather name bytes up to the NUL terminator (or the record's end, for a
/// truncated name) and validate them as UTF-8.
fn read_name(words: &[u64]) -> String {
    let mut bytes = Vec::with_capacity(words.len() * WORD_BYTES);
    'outer: for word in words {
        for b in word.to_le_bytes() {
            if b == 0 {
                break 'outer;
            }
            bytes.push(b);
        }
    }
    match String::from_utf8(bytes) {
        Ok(name) => name,
        Err(_) => INVALID_UTF8_PLACEHOLDER.to_owned(),
    }
}

/// Decode a minimal Begin/Marker blob produced by the forwarding path.
///
/// Returns `None` for unknown or non-Begin/Marker tags and for blobs too
/// short to carry a color word; never reads past the supplied slice.
pub fn try_decode_event_blob(words: &[u64]) -> Option<NameAndColor> {
    let header = *words.first()?;
    if header == BLOCK_END_SENTINEL {
        return None;
    }
    let info = decode_event_info(header);
    let tag = EventTag::from_raw(info.raw_tag)?;
    if tag.kind() == EventKind::End {
        return None;
    }

    let color = *words.get(1)?;
    Some(NameAndColor {
        name: read_name(&words[2..]),
        color,
    })
}
