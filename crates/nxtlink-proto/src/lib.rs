//! NXT direct-command telegrams.
//!
//! A telegram is the payload of one frame. Its first byte is the command
//! class ([`CLASS_REPLY`] or [`CLASS_NO_REPLY`]), the second the opcode,
//! the rest fixed-position parameters. This crate builds the telegrams for
//! the supported [`Command`] set, parses them back (for simulators and
//! diagnostics), and decodes the replies.

pub mod command;
pub mod error;
pub mod reply;

pub use command::{Command, Motor, Power, Request, SensorPort, Telegram};
pub use error::{ProtoError, Result};
pub use reply::{decode_ls_read_reply, encode_ls_read_reply, Response};

/// Direct command, reply required.
pub const CLASS_REPLY: u8 = 0x00;
/// Direct command, no reply.
pub const CLASS_NO_REPLY: u8 = 0x80;
/// Reply telegram sent by the brick.
pub const CLASS_REPLY_TELEGRAM: u8 = 0x02;

/// Direct-command opcodes used by nxtlink.
pub mod opcode {
    pub const SET_OUTPUT_STATE: u8 = 0x04;
    pub const SET_INPUT_MODE: u8 = 0x05;
    pub const KEEP_ALIVE: u8 = 0x0D;
    pub const LS_WRITE: u8 = 0x0F;
    pub const LS_READ: u8 = 0x10;
}
