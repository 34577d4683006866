//! Length-prefixed framing.
//!
//! ```text
//! | length (4, big-endian) | CBOR body (length bytes) |
//! ```

use crate::error::{ProtocolError, ProtocolResult};
use std::io::{self, Read, Write};

/// Size of the length prefix.
pub const FRAME_HEADER_LEN: usize = 4;

/// Default upper bound for a frame body (64 MiB).
pub const DEFAULT_MAX_FRAME_LEN: usize = 64 * 1024 * 1024;

/// Builds the length prefix for a body of `len` bytes.
pub fn encode_frame_header(len: usize, max_len: usize) -> ProtocolResult<[u8; FRAME_HEADER_LEN]> {
    if len > max_len {
        return Err(ProtocolError::FrameTooLarge { len, max: max_len });
    }
    let len = u32::try_from(len).map_err(|_| ProtocolError::FrameTooLarge {
        len,
        max: u32::MAX as usize,
    })?;
    Ok(len.to_be_bytes())
}

/// Parses a length prefix, rejecting frames above `max_len`.
pub fn decode_frame_header(header: [u8; FRAME_HEADER_LEN], max_len: usize) -> ProtocolResult<usize> {
    let len = u32::from_be_bytes(header) as usize;
    if len > max_len {
        return Err(ProtocolError::FrameTooLarge { len, max: max_len });
    }
    Ok(len)
}

/// Writes one frame and flushes.
pub fn write_frame<W: Write>(writer: &mut W, body: &[u8], max_len: usize) -> ProtocolResult<()> {
    let header = encode_frame_header(body.len(), max_len)?;
    writer.write_all(&header)?;
    writer.write_all(body)?;
    writer.flush()?;
    Ok(())
}

/// Reads one frame.
///
/// Returns `Ok(None)` if the stream ended cleanly before a new frame.
pub fn read_frame<R: Read>(reader: &mut R, max_len: usize) -> ProtocolResult<Option<Vec<u8>>> {
    let mut header = [0u8; FRAME_HEADER_LEN];
    let mut filled = 0;
    while filled < FRAME_HEADER_LEN {
        match reader.read(&mut header[filled..]) {
            Ok(0) if filled == 0 => return Ok(None),
            Ok(0) => {
                return Err(ProtocolError::Io(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "stream ended inside frame header",
                )))
            }
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e.into()),
        }
    }

    let len = decode_frame_header(header, max_len)?;
    let mut body = vec![0u8; len];
    reader.read_exact(&mut body)?;
    Ok(Some(body))
}
