//! Length-prefixed framing for the NXT Bluetooth link.
//!
//! Every telegram on the wire is preceded by its payload length as a
//! 2-byte little-endian integer. There is no magic, checksum or channel.
//!
//! No partial reads, no buffer management in user code: a reader either
//! yields one complete payload or an error.

pub mod codec;
pub mod error;
pub mod reader;
pub mod writer;

pub use codec::{decode_frame, encode_frame, Frame, FrameConfig, HEADER_SIZE, MAX_PAYLOAD};
pub use error::{FrameError, Result};
pub use reader::FrameReader;
pub use writer::FrameWriter;
