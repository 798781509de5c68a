//! Byte-stream links between a controller host and a paired NXT brick.
//!
//! This is the lowest layer of nxtlink. It knows nothing about framing or
//! command semantics:
//! - [`PeerDirectory`] enumerates paired devices and opens a stream to one
//! - [`LinkStream`] is the reliable byte stream every upper layer reads and writes
//! - [`UnixDomainSocket`] provides local endpoints for the service host and the simulator

#[cfg(not(unix))]
compile_error!("nxtlink-transport needs a Unix host: links are serial device nodes or Unix domain sockets");

pub mod discovery;
pub mod error;
pub mod serial;
pub mod traits;
pub mod uds;

pub use discovery::{
    DeviceHandle, PairedDevice, PeerDirectory, ServiceId, StaticDirectory, SERIAL_PORT_PROFILE,
};
pub use error::{Result, TransportError};
pub use traits::LinkStream;
pub use uds::UnixDomainSocket;
