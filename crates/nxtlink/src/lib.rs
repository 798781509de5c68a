//! Drive a LEGO Mindstorms NXT brick over a Bluetooth serial link.
//!
//! # Crate Structure
//!
//! - [`transport`] - Paired-device lookup and the raw byte link (serial node, Unix socket)
//! - [`frame`] - 2-byte little-endian length-prefixed framing
//! - [`proto`] - Direct-command telegrams for motors and the ultrasonic sensor
//! - [`service`] - Session, connection service and client facade (behind `service` feature)

/// Re-export transport types.
pub mod transport {
    pub use nxtlink_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use nxtlink_frame::*;
}

/// Re-export telegram types.
pub mod proto {
    pub use nxtlink_proto::*;
}

/// Re-export service types (requires `service` feature).
#[cfg(feature = "service")]
pub mod service {
    pub use nxtlink_service::*;
}
