//! Durable stream container: length-prefixed sealed blocks.
//!
//! A capture file is a sequence of frames, one per sealed block:
//!
//! ```text
//! [magic u32][payload_len u32][payload bytes...]
//! ```
//!
//! The 8-byte frame header keeps payloads 8-byte aligned when frames are
//! read back into memory. Payload bytes are the block's used bytes verbatim,
//! sentinel included.

use std::io::{self, Read, Write};
use thiserror::Error;

pub const FRAME_MAGIC: u32 = 0x4B42_5453; // "STBK" little-endian

/// Largest payload a reader will accept; a sealed block is far smaller, so
/// anything beyond this is corruption rather than data.
pub const MAX_FRAME_PAYLOAD: u32 = 16 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum StreamReadError {
    #[error("i/o error reading capture stream: {0}")]
    Io(#[from] io::Error),
    #[error("bad frame magic {0:#010x}")]
    BadMagic(u32),
    #[error("frame payload length {0} exceeds the maximum {MAX_FRAME_PAYLOAD}")]
    OversizedFrame(u32),
}

/// Write one sealed block's bytes as a frame.
pub fn write_frame<W: Write>(writer: &mut W, payload: &[u8]) -> io::Result<()> {
    let len = u32::try_from(payload.len()).map_err(|_| {
        io::Error::new(io::ErrorKind::InvalidInput, "sealed block too large to frame")
    })?;
    writer.write_all(&FRAME_MAGIC.to_le_bytes())?;
    writer.write_all(&len.to_le_bytes())?;
    writer.write_all(payload)?;
    Ok(())
}

/// Read the next frame's payload, or `None` at a clean end of stream.
pub fn read_frame<R: Read>(reader: &mut R) -> Result<Option<Vec<u8>>, StreamReadError> {
    let mut magic = [0u8; 4];
    match reader.read_exact(&mut magic) {
        Ok(()) => {}
        Err(err) if err.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(err) => return Err(err.into()),
    }
    let magic = u32::from_le_bytes(magic);
    if magic != FRAME_MAGIC {
        return Err(StreamReadError::BadMagic(magic));
    }

    let mut len = [0u8; 4];
    reader.read_exact(&mut len)?;
    let len = u32::from_le_bytes(len);
    if len > MAX_FRAME_PAYLOAD {
        return Err(StreamReadError::OversizedFrame(len));
    }

    let mut payload = vec![0u8; len as usize];
    reader.read_exact(&mut payload)?;
    Ok(Some(payload))
}

/// Read every frame of a capture stream.
pub fn read_all_frames<R: Read>(reader: &mut R) -> Result<Vec<Vec<u8>>, StreamReadError> {
    let mut frames = Vec::new();
    while let Some(payload) = read_frame(reader)? {
        frames.push(payload);
    }
    Ok(frames)
}
