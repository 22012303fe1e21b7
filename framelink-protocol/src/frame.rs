//! Length-prefixed frame encoding.
//!
//! Every message on the wire is a 4-byte little-endian `u32` payload
//! length followed by exactly that many payload bytes. A zero-length
//! payload is a valid message and occupies only its header.

use crate::error::FrameError;
use bytes::{Buf, BufMut, Bytes, BytesMut};

/// Size of the length prefix in bytes.
pub const HEADER_SIZE: usize = 4;

/// Encodes a payload length as the 4-byte little-endian header.
pub fn encode_header(len: u32) -> [u8; HEADER_SIZE] {
    len.to_le_bytes()
}

/// Decodes a complete 4-byte header into the declared payload length.
pub fn decode_header(header: [u8; HEADER_SIZE]) -> u32 {
    u32::from_le_bytes(header)
}

/// Encodes a payload as a single contiguous wire frame.
///
/// The result is `header ++ payload`, suitable for one write call.
/// Fails only when the payload length cannot be represented in the
/// 4-byte prefix.
pub fn encode_frame(payload: &[u8]) -> Result<BytesMut, FrameError> {
    let len = u32::try_from(payload.len()).map_err(|_| FrameError::PayloadTooLarge {
        size: payload.len(),
    })?;

    let mut buf = BytesMut::with_capacity(HEADER_SIZE + payload.len());
    buf.put_slice(&encode_header(len));
    buf.put_slice(payload);
    Ok(buf)
}

/// Splits one complete frame off the front of `buf`.
///
/// Returns the payload of the first frame if `buf` holds at least one
/// whole frame, or `None` if more data is needed. Consumed bytes are
/// removed from `buf`; a partial frame is left untouched.
pub fn split_frame(buf: &mut BytesMut) -> Option<Bytes> {
    if buf.len() < HEADER_SIZE {
        return None;
    }

    let header: [u8; HEADER_SIZE] = buf[..HEADER_SIZE].try_into().unwrap();
    let payload_len = decode_header(header) as usize;

    if buf.len() < HEADER_SIZE + payload_len {
        return None;
    }

    buf.advance(HEADER_SIZE);
    Some(buf.split_to(payload_len).freeze())
}
