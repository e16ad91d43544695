#![forbid(unsafe_code)]

//! Event record codec for the strobe tracing runtime.
//!
//! This crate is the pure, allocation-light core: it encodes Begin/Marker/End
//! records into caller-supplied word buffers, decodes raw block bytes back
//! into structured events, and defines the on-wire layout both sides agree
//! on. It owns no buffers and spawns nothing; the capture runtime lives in
//! `strobe-capture`.

pub mod args;
pub mod copy;
pub mod decode;
pub mod encode;
pub mod format;
pub mod stream;

pub use args::{format_name, Arg, MAX_FORMAT_ARGS};
pub use decode::{decode_timing_block, try_decode_event_blob, Event, NameAndColor};
pub use encode::{encode_event_blob, encode_timing_event, write_block_end};
pub use format::{
    color_index, color_rgb, EventKind, EventTag, BLOB_METADATA_VERSION, BLOCK_END_SENTINEL,
    COLOR_DEFAULT, RECORD_SPACE_WORDS, RESERVED_TAIL_WORDS, WORD_BYTES,
};
