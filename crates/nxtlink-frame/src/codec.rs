use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{FrameError, Result};

/// Frame header: little-endian payload length (2).
pub const HEADER_SIZE: usize = 2;

/// Largest payload the 2-byte prefix can describe.
pub const MAX_PAYLOAD: usize = u16::MAX as usize;

/// One length-prefixed unit of data on the link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// The frame payload (one telegram).
    pub payload: Bytes,
}

impl Frame {
    /// Create a new frame.
    pub fn new(payload: impl Into<Bytes>) -> Self {
        Self {
            payload: payload.into(),
        }
    }

    /// The total wire size of this frame (header + payload).
    pub fn wire_size(&self) -> usize {
        HEADER_SIZE + self.payload.len()
    }
}

/// Encode a payload into the wire format.
///
/// ```text
/// ┌────────────────┬──────────────────┐
/// │ Length (2B LE) │ Payload          │
/// │                │ (Length bytes)   │
/// └────────────────┴──────────────────┘
/// ```
pub fn encode_frame(payload: &[u8], dst: &mut BytesMut) -> Result<()> {
    let len = u16::try_from(payload.len()).map_err(|_| FrameError::PayloadTooLarge {
        size: payload.len(),
        max: MAX_PAYLOAD,
    })?;
    dst.reserve(HEADER_SIZE + payload.len());
    dst.put_u16_le(len);
    dst.put_slice(payload);
    Ok(())
}

/// Decode a frame from a buffer.
///
/// Returns `Ok(None)` if the buffer doesn't contain a complete frame yet.
/// On success, consumes the frame bytes from the buffer.
pub fn decode_frame(src: &mut BytesMut, max_payload: usize) -> Result<Option<Frame>> {
    let Some(payload_len) = peek_length(src) else {
        return Ok(None);
    };

    if payload_len > max_payload {
        return Err(FrameError::PayloadTooLarge {
            size: payload_len,
            max: max_payload,
        });
    }

    if src.len() < HEADER_SIZE + payload_len {
        return Ok(None);
    }

    src.advance(HEADER_SIZE);
    let payload = src.split_to(payload_len).freeze();
    Ok(Some(Frame { payload }))
}

/// Payload length announced by the header at the front of `src`, if the
/// header has fully arrived.
pub(crate) fn peek_length(src: &[u8]) -> Option<usize> {
    match src {
        [lo, hi, ..] => Some(usize::from(u16::from_le_bytes([*lo, *hi]))),
        _ => None,
    }
}

/// Configuration for the frame codec.
#[derive(Debug, Clone)]
pub struct FrameConfig {
    /// Maximum payload size in bytes. Default: 65535.
    pub max_payload_size: usize,
    /// Read timeout for blocking operations. Default: none (block indefinitely).
    pub read_timeout: Option<std::time::Duration>,
    /// Write timeout for blocking operations.
    pub write_timeout: Option<std::time::Duration>,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            max_payload_size: MAX_PAYLOAD,
            read_timeout: None,
            write_timeout: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn encodes_length_little_endian() {
        let mut buf = BytesMut::new();
        encode_frame(&[0x00, 0x10, 0x01], &mut buf).unwrap();
        assert_eq!(buf.as_ref(), &[0x03, 0x00, 0x00, 0x10, 0x01]);

        let mut buf = BytesMut::new();
        encode_frame(&vec![0u8; 0x0102], &mut buf).unwrap();
        assert_eq!(&buf[..2], &[0x02, 0x01]);
    }

    #[test]
    fn decode_incomplete_header() {
        let mut buf = BytesMut::from(&[0x05][..]);
        assert!(decode_frame(&mut buf, MAX_PAYLOAD).unwrap().is_none());
        assert_eq!(buf.len(), 1, "partial header must not be consumed");
    }

    #[test]
    fn decode_incomplete_payload() {
        let mut buf = BytesMut::new();
        encode_frame(b"hello", &mut buf).unwrap();
        buf.truncate(HEADER_SIZE + 2);

        assert!(decode_frame(&mut buf, MAX_PAYLOAD).unwrap().is_none());
        assert_eq!(buf.len(), HEADER_SIZE + 2);
    }

    #[test]
    fn decode_respects_configured_max() {
        let mut buf = BytesMut::new();
        buf.put_u16_le(1024);

        let result = decode_frame(&mut buf, 64);
        assert!(matches!(
            result,
            Err(FrameError::PayloadTooLarge { size: 1024, max: 64 })
        ));
    }

    #[test]
    fn encode_rejects_payload_over_prefix_range() {
        let mut buf = BytesMut::new();
        let err = encode_frame(&vec![0u8; MAX_PAYLOAD + 1], &mut buf).unwrap_err();
        assert!(matches!(err, FrameError::PayloadTooLarge { .. }));
        assert!(buf.is_empty());
    }

    #[test]
    fn multiple_frames_in_one_buffer() {
        let mut buf = BytesMut::new();
        encode_frame(&[0x80, 0x0D], &mut buf).unwrap();
        encode_frame(&[0x00, 0x10, 0x02], &mut buf).unwrap();

        let f1 = decode_frame(&mut buf, MAX_PAYLOAD).unwrap().unwrap();
        let f2 = decode_frame(&mut buf, MAX_PAYLOAD).unwrap().unwrap();
        assert_eq!(f1.payload.as_ref(), &[0x80, 0x0D]);
        assert_eq!(f2.payload.as_ref(), &[0x00, 0x10, 0x02]);
        assert!(buf.is_empty());
    }

    #[test]
    fn empty_payload() {
        let mut buf = BytesMut::new();
        encode_frame(b"", &mut buf).unwrap();
        assert_eq!(buf.as_ref(), &[0x00, 0x00]);

        let frame = decode_frame(&mut buf, MAX_PAYLOAD).unwrap().unwrap();
        assert!(frame.payload.is_empty());
    }

    #[test]
    fn frame_wire_size() {
        let frame = Frame::new(Bytes::from_static(&[0x80, 0x0D]));
        assert_eq!(frame.wire_size(), 4);
    }

    proptest! {
        #[test]
        fn roundtrip_any_payload(payload in proptest::collection::vec(any::<u8>(), 0..=MAX_PAYLOAD)) {
            let mut buf = BytesMut::new();
            encode_frame(&payload, &mut buf).unwrap();
            prop_assert_eq!(buf.len(), HEADER_SIZE + payload.len());

            let frame = decode_frame(&mut buf, MAX_PAYLOAD).unwrap().unwrap();
            prop_assert_eq!(frame.payload.as_ref(), payload.as_slice());
            prop_assert!(buf.is_empty());
        }
    }
}
