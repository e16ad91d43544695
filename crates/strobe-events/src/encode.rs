//! Record encoding.
//!
//! Pure functions over caller-supplied word buffers; the caller owns the
//! memory and the cursor/limit bounds. Two variants exist:
//!
//! - the timing variant appended to capture blocks, which carries the length
//!   and metadata fields so a decoder can skip records it does not recognize;
//! - the minimal blob variant handed to a graphics context, which carries
//!   only {type, color, name} because its consumer reads the blob
//!   sequentially and start to end.

use crate::copy::copy_string_bulk;
use crate::format::{
    encode_event_info, EventKind, META_NONE, META_V2, RECORD_SPACE_WORDS, WORD_BYTES,
};

/// Append one timing record at `*cursor`.
///
/// `limit` is the block's logical limit in words; a single record is
/// additionally capped at [`RECORD_SPACE_WORDS`], which truncates oversized
/// names. The header's length field is patched from the final cursor
/// position. The caller must have verified that at least one record of
/// headroom remains (`*cursor < limit`).
pub fn encode_timing_event(
    dest: &mut [u64],
    cursor: &mut usize,
    limit: usize,
    timestamp: u64,
    kind: EventKind,
    color: u64,
    name: &str,
    context: Option<u64>,
) {
    debug_assert!(*cursor < limit);

    let start = *cursor;
    let record_limit = limit.min(start + RECORD_SPACE_WORDS);
    let tag = kind.tag(context.is_some());

    // Header placeholder; length patched below.
    dest[*cursor] = 0;
    *cursor += 1;

    if let Some(handle) = context {
        dest[*cursor] = handle;
        *cursor += 1;
    }

    if kind != EventKind::End {
        dest[*cursor] = color;
        *cursor += 1;
        copy_string_bulk(dest, cursor, record_limit, name.as_bytes());
    }

    dest[start] = encode_event_info(timestamp, tag, *cursor - start, META_V2);
}

/// Serialize the minimal blob for the context-forwarding path into `dest`
/// (typically a `[u64; RECORD_SPACE_WORDS]` on the caller's stack). Returns
/// the blob size in bytes. End events forward no blob.
pub fn encode_event_blob(dest: &mut [u64], kind: EventKind, color: u64, name: &str) -> usize {
    debug_assert!(dest.len() >= 4);
    debug_assert!(!matches!(kind, EventKind::End));

    let limit = dest.len().min(RECORD_SPACE_WORDS) - crate::format::RESERVED_TAIL_WORDS;
    let mut cursor = 0;
    dest[cursor] = encode_event_info(0, kind.tag(false), 0, META_NONE);
    cursor += 1;
    dest[cursor] = color;
    cursor += 1;
    copy_string_bulk(dest, &mut cursor, limit, name.as_bytes());
    cursor * WORD_BYTES
}

/// Write the end-of-block sentinel at `*cursor`. The reserved tail guarantees
/// this slot exists after any bounded string-copy overrun.
pub fn write_block_end(dest: &mut [u64], cursor: usize) -> usize {
    dest[cursor] = crate::format::BLOCK_END_SENTINEL;
    cursor + 1
}
