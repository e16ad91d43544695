//! On-wire layout of one event record.
//!
//! Every record is a sequence of little-endian 64-bit words and starts with a
//! single header word:
//!
//! ```text
//! bits 20..63  timestamp (44-bit monotonic counter value)
//! bits 10..19  event type tag
//! bits  2..9   record length in words, header included
//! bits  0..1   metadata/version tag
//! ```
//!
//! The length field is what makes a block self-describing: a decoder that does
//! not recognize a tag can still skip over the record. The minimal blob
//! variant handed to a graphics context leaves length/metadata zero because
//! its consumer reads the whole blob sequentially.

/// Bytes per encoded word.
pub const WORD_BYTES: usize = 8;

pub const TIMESTAMP_BITS: u32 = 44;
pub const TIMESTAMP_MASK: u64 = (1 << TIMESTAMP_BITS) - 1;
pub const TIMESTAMP_SHIFT: u32 = 20;

pub const TAG_MASK: u64 = 0x3FF;
pub const TAG_SHIFT: u32 = 10;

pub const LEN_MASK: u64 = 0xFF;
pub const LEN_SHIFT: u32 = 2;

pub const META_MASK: u64 = 0x3;
pub const META_NONE: u64 = 0;
/// Current serialization version of Begin/Marker payloads.
pub const META_V2: u64 = 2;

/// Metadata parameter passed alongside a context blob (see `strobe-gfx`).
pub const BLOB_METADATA_VERSION: u32 = 2;

/// Upper bound on a single record, in words. Longer names truncate.
pub const RECORD_SPACE_WORDS: usize = 64;

/// Words reserved past a capture buffer's logical limit so that a bounded
/// overrun during string copy still leaves room for the end-of-block sentinel.
pub const RESERVED_TAIL_WORDS: usize = 3;

/// Header word that terminates the valid data of a block. Type bits and the
/// low ten bits are all set; no real record encodes to this value.
pub const BLOCK_END_SENTINEL: u64 = 0x0000_0000_000F_FFFF;

/// Substituted for a name payload that is not valid UTF-8.
pub const INVALID_UTF8_PLACEHOLDER: &str = "<invalid UTF8 string>";

/// Event type tags. Plain tags live below 0x010; context-annotated tags sit
/// at 0x010 and above, mirroring their plain counterparts in the low bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum EventTag {
    End = 0x000,
    Begin = 0x001,
    Marker = 0x007,
    EndOnContext = 0x010,
    BeginOnContext = 0x011,
    MarkerOnContext = 0x017,
}

impl EventTag {
    pub fn from_raw(raw: u64) -> Option<Self> {
        match raw {
            0x000 => Some(Self::End),
            0x001 => Some(Self::Begin),
            0x007 => Some(Self::Marker),
            0x010 => Some(Self::EndOnContext),
            0x011 => Some(Self::BeginOnContext),
            0x017 => Some(Self::MarkerOnContext),
            _ => None,
        }
    }

    pub fn kind(self) -> EventKind {
        match self {
            Self::End | Self::EndOnContext => EventKind::End,
            Self::Begin | Self::BeginOnContext => EventKind::Begin,
            Self::Marker | Self::MarkerOnContext => EventKind::Marker,
        }
    }

    pub fn has_context(self) -> bool {
        matches!(
            self,
            Self::EndOnContext | Self::BeginOnContext | Self::MarkerOnContext
        )
    }
}

/// Logical event kind, independent of the context annotation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Begin,
    Marker,
    End,
}

impl EventKind {
    pub fn tag(self, on_context: bool) -> EventTag {
        match (self, on_context) {
            (EventKind::End, false) => EventTag::End,
            (EventKind::Begin, false) => EventTag::Begin,
            (EventKind::Marker, false) => EventTag::Marker,
            (EventKind::End, true) => EventTag::EndOnContext,
            (EventKind::Begin, true) => EventTag::BeginOnContext,
            (EventKind::Marker, true) => EventTag::MarkerOnContext,
        }
    }
}

/// Pack a header word. `len_words` includes the header itself and is patched
/// in after payload serialization by the encoder.
pub fn encode_event_info(timestamp: u64, tag: EventTag, len_words: usize, metadata: u64) -> u64 {
    ((timestamp & TIMESTAMP_MASK) << TIMESTAMP_SHIFT)
        | ((tag as u64 & TAG_MASK) << TAG_SHIFT)
        | ((len_words as u64 & LEN_MASK) << LEN_SHIFT)
        | (metadata & META_MASK)
}

/// Unpacked header fields. The tag is kept raw so callers can decide how to
/// treat unknown values.
#[derive(Debug, Clone, Copy)]
pub struct EventInfo {
    pub timestamp: u64,
    pub raw_tag: u64,
    pub len_words: usize,
    pub metadata: u64,
}

pub fn decode_event_info(word: u64) -> EventInfo {
    EventInfo {
        timestamp: (word >> TIMESTAMP_SHIFT) & TIMESTAMP_MASK,
        raw_tag: (word >> TAG_SHIFT) & TAG_MASK,
        len_words: ((word >> LEN_SHIFT) & LEN_MASK) as usize,
        metadata: word & META_MASK,
    }
}

/// Default (uncolored) event color.
pub const COLOR_DEFAULT: u64 = 0;

/// Opaque 32-bit ARGB color with full alpha.
pub fn color_rgb(r: u8, g: u8, b: u8) -> u64 {
    0xFF00_0000 | ((r as u64) << 16) | ((g as u64) << 8) | (b as u64)
}

/// Palette color. The palette has eight entries; out-of-range indices reduce
/// modulo 8 here, at encode time.
pub fn color_index(n: u32) -> u64 {
    (n % 8) as u64
}
