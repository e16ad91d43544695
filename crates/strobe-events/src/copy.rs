//! Bounded, word-granular string copy.
//!
//! The capture buffer reserves [`crate::format::RESERVED_TAIL_WORDS`] words past its logical
//! limit precisely so this primitive may finish the chunk it is in the middle
//! of when it hits the limit, and a sentinel can still be appended afterwards.
//! The cursor is a word index, so it is 8-byte aligned by construction after
//! every copy.
//!
//! Contract, for both variants:
//! - bytes are copied up to and including the NUL terminator, or until the
//!   cursor reaches `limit`, whichever comes first;
//! - the final cursor never exceeds `limit`; stray writes may land at most
//!   `RESERVED_TAIL_WORDS` words past it, never further;
//! - the logical content (words below the final cursor) is identical between
//!   the scalar and bulk variants for every length/limit combination;
//! - a truncated result is a byte-prefix of the source, never garbage.

use crate::format::WORD_BYTES;

/// Copy `text` plus a NUL terminator into `dest` starting at `*cursor`,
/// packing 8 bytes per word, little-endian. One word per step.
pub fn copy_string(dest: &mut [u64], cursor: &mut usize, limit: usize, text: &[u8]) {
    debug_assert!(dest.len() >= limit);

    let mut offset = 0;
    while *cursor < limit {
        let mut word = 0u64;
        let mut terminated = false;
        for i in 0..WORD_BYTES {
            match text.get(offset + i) {
                Some(&b) => word |= (b as u64) << (i * 8),
                None => {
                    // NUL terminator; the rest of the word stays zero.
                    terminated = true;
                    break;
                }
            }
        }
        dest[*cursor] = word;
        *cursor += 1;
        if terminated {
            return;
        }
        offset += WORD_BYTES;
    }
}

/// Two-words-per-step variant of [`copy_string`], the analog of a vectorized
/// copy. Both words of a chunk are stored before the terminator check, so the
/// word at index `limit` may be written even though the cursor stops at
/// `limit`; the reserved tail accommodates this.
pub fn copy_string_bulk(dest: &mut [u64], cursor: &mut usize, limit: usize, text: &[u8]) {
    debug_assert!(dest.len() >= limit);

    let mut offset = 0;
    while *cursor < limit {
        let mut words = [0u64; 2];
        let mut len = 0usize;
        let mut terminated = false;
        for i in 0..(2 * WORD_BYTES) {
            match text.get(offset + i) {
                Some(&b) => {
                    words[i / WORD_BYTES] |= (b as u64) << ((i % WORD_BYTES) * 8);
                    len = i + 1;
                }
                None => {
                    len = i + 1;
                    terminated = true;
                    break;
                }
            }
        }

        dest[*cursor] = words[0];
        if *cursor + 1 < dest.len() {
            dest[*cursor + 1] = words[1];
        }
        *cursor = (*cursor + len.div_ceil(WORD_BYTES)).min(limit);
        if terminated && *cursor < limit {
            return;
        }
        offset += 2 * WORD_BYTES;
    }
}
