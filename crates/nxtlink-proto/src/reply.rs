use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{ProtoError, Result};
use crate::{opcode, CLASS_REPLY_TELEGRAM};

/// LS read reply: type, opcode, status, bytes read, 16 data bytes.
pub const LS_READ_REPLY_LEN: usize = 20;

/// Offset of the first data byte (the distance) in an LS read reply.
/// On the wire, counting the 2-byte length prefix, this is offset 6.
pub const MEASUREMENT_OFFSET: usize = 4;

const LS_READ_DATA_LEN: usize = 16;

/// Outcome of one command exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Response {
    /// Status code of a command that gets no reply from the brick.
    /// Always [`Response::OK`] once the telegrams were written.
    Status(i32),
    /// Distance in centimetres; 255 means nothing in range.
    Reading(u8),
}

impl Response {
    pub const OK: Response = Response::Status(0);

    pub fn reading(self) -> Option<u8> {
        match self {
            Response::Reading(value) => Some(value),
            Response::Status(_) => None,
        }
    }
}

/// Extract the measured byte from an LS read reply payload.
///
/// The byte is stored signed by the firmware but is an unsigned distance;
/// `0xFF` decodes to 255, never -1.
pub fn decode_ls_read_reply(payload: &[u8]) -> Result<u8> {
    if payload.len() <= MEASUREMENT_OFFSET {
        return Err(ProtoError::TooShort {
            opcode: opcode::LS_READ,
            len: payload.len(),
            need: MEASUREMENT_OFFSET + 1,
        });
    }
    let (telegram_type, op, status) = (payload[0], payload[1], payload[2]);
    if telegram_type != CLASS_REPLY_TELEGRAM || op != opcode::LS_READ {
        return Err(ProtoError::UnexpectedReply {
            telegram_type,
            opcode: op,
        });
    }
    if status != 0 {
        return Err(ProtoError::Status { opcode: op, status });
    }
    // Past the bytes-read count the data field is only padding.
    if payload[3] == 0 {
        return Err(ProtoError::NoData { opcode: op });
    }
    Ok(payload[MEASUREMENT_OFFSET])
}

/// Build an LS read reply payload, as the brick would send it.
///
/// `data` is truncated or zero-padded to the fixed 16-byte field.
pub fn encode_ls_read_reply(status: u8, data: &[u8]) -> Bytes {
    let n = data.len().min(LS_READ_DATA_LEN);
    let mut buf = BytesMut::with_capacity(LS_READ_REPLY_LEN);
    buf.put_u8(CLASS_REPLY_TELEGRAM);
    buf.put_u8(opcode::LS_READ);
    buf.put_u8(status);
    buf.put_u8(n as u8);
    buf.put_slice(&data[..n]);
    buf.put_bytes(0, LS_READ_DATA_LEN - n);
    buf.freeze()
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn decodes_distance() {
        let reply = encode_ls_read_reply(0, &[42]);
        assert_eq!(reply.len(), LS_READ_REPLY_LEN);
        assert_eq!(decode_ls_read_reply(&reply).unwrap(), 42);
    }

    #[test]
    fn high_bit_is_not_sign_extended() {
        let reply = encode_ls_read_reply(0, &[0xFF]);
        assert_eq!(decode_ls_read_reply(&reply).unwrap(), 255);
    }

    #[test]
    fn measurement_sits_at_wire_offset_six() {
        let reply = encode_ls_read_reply(0, &[0x2A]);
        let mut wire = (reply.len() as u16).to_le_bytes().to_vec();
        wire.extend_from_slice(&reply);
        assert_eq!(wire[6], 0x2A);
    }

    #[test]
    fn nonzero_status_is_error() {
        let reply = encode_ls_read_reply(0x20, &[12]);
        assert_eq!(
            decode_ls_read_reply(&reply),
            Err(ProtoError::Status {
                opcode: opcode::LS_READ,
                status: 0x20
            })
        );
    }

    #[test]
    fn empty_read_is_error_not_padding() {
        let reply = encode_ls_read_reply(0, &[]);
        assert_eq!(reply[MEASUREMENT_OFFSET], 0);
        assert_eq!(
            decode_ls_read_reply(&reply),
            Err(ProtoError::NoData {
                opcode: opcode::LS_READ
            })
        );
    }

    #[test]
    fn wrong_opcode_is_error() {
        let mut reply = encode_ls_read_reply(0, &[12]).to_vec();
        reply[1] = opcode::SET_INPUT_MODE;
        assert!(matches!(
            decode_ls_read_reply(&reply),
            Err(ProtoError::UnexpectedReply { .. })
        ));
    }

    #[test]
    fn short_reply_is_error() {
        assert!(matches!(
            decode_ls_read_reply(&[0x02, 0x10, 0x00, 0x01]),
            Err(ProtoError::TooShort { need: 5, .. })
        ));
    }

    #[test]
    fn response_accessors() {
        assert_eq!(Response::Reading(7).reading(), Some(7));
        assert_eq!(Response::OK.reading(), None);
    }

    proptest! {
        #[test]
        fn any_stored_byte_decodes_unsigned(raw in any::<i8>()) {
            let [stored] = raw.to_le_bytes();
            let reply = encode_ls_read_reply(0, &[stored]);
            let value = decode_ls_read_reply(&reply).unwrap();
            prop_assert_eq!(value, stored);
            prop_assert_eq!(i32::from(value), i32::from(raw) & 0xFF);
        }
    }
}
