//! Peer discovery boundary.
//!
//! The host Bluetooth stack owns pairing and enumeration. nxtlink consumes it
//! through [`PeerDirectory`]: list the currently paired devices, then open a
//! reliable byte stream to one of them for a given service record.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use tracing::debug;
use uuid::Uuid;

use crate::error::{Result, TransportError};
use crate::traits::LinkStream;

/// 128-bit service record identifier a stream is opened against.
pub type ServiceId = Uuid;

/// Serial Port Profile service class. The brick firmware only answers on
/// this record, so it must be passed through unchanged.
pub const SERIAL_PORT_PROFILE: ServiceId = Uuid::from_u128(0x0000_1101_0000_1000_8000_0080_5F9B_34FB);

/// Where a paired device's byte stream can be opened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceHandle {
    /// Serial device node bound to the device by the host stack.
    SerialNode(PathBuf),
    /// Unix domain socket standing in for the device (simulators, tests).
    Socket(PathBuf),
}

impl fmt::Display for DeviceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceHandle::SerialNode(path) => write!(f, "{}", path.display()),
            DeviceHandle::Socket(path) => write!(f, "unix:{}", path.display()),
        }
    }
}

impl FromStr for DeviceHandle {
    type Err = TransportError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.is_empty() {
            return Err(TransportError::InvalidHandle(s.to_string()));
        }
        match s.strip_prefix("unix:") {
            Some("") => Err(TransportError::InvalidHandle(s.to_string())),
            Some(path) => Ok(DeviceHandle::Socket(PathBuf::from(path))),
            None => Ok(DeviceHandle::SerialNode(PathBuf::from(s))),
        }
    }
}

/// A device the host has already paired with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PairedDevice {
    /// Advertised (friendly) name.
    pub name: String,
    /// Handle used to open a stream to the device.
    pub handle: DeviceHandle,
}

impl PairedDevice {
    pub fn new(name: impl Into<String>, handle: DeviceHandle) -> Self {
        Self {
            name: name.into(),
            handle,
        }
    }
}

impl FromStr for PairedDevice {
    type Err = TransportError;

    /// Parse `NAME=HANDLE`, e.g. `NXT=/dev/rfcomm0` or `NXT=unix:/tmp/brick.sock`.
    fn from_str(s: &str) -> Result<Self> {
        let (name, handle) = s
            .split_once('=')
            .ok_or_else(|| TransportError::InvalidHandle(s.to_string()))?;
        let name = name.trim();
        if name.is_empty() {
            return Err(TransportError::InvalidHandle(s.to_string()));
        }
        Ok(Self::new(name, handle.parse()?))
    }
}

/// Enumerates paired devices and opens streams to them.
pub trait PeerDirectory: Send {
    /// Devices currently paired with this host, in enumeration order.
    fn paired_devices(&self) -> Result<Vec<PairedDevice>>;

    /// Open a reliable byte stream to `device` for the given service record.
    fn open_stream(&self, device: &PairedDevice, service: ServiceId) -> Result<LinkStream>;
}

/// A directory over an explicit list of paired devices.
///
/// Serial nodes are expected to be bound to the Serial Port Profile record
/// already (e.g. by `rfcomm bind`); the service id is recorded for
/// diagnostics only on both handle kinds.
#[derive(Debug, Clone, Default)]
pub struct StaticDirectory {
    devices: Vec<PairedDevice>,
}

impl StaticDirectory {
    pub fn new(devices: Vec<PairedDevice>) -> Self {
        Self { devices }
    }

    /// Add a device to the end of the enumeration order.
    pub fn with_device(mut self, device: PairedDevice) -> Self {
        self.devices.push(device);
        self
    }

    pub fn devices(&self) -> &[PairedDevice] {
        &self.devices
    }
}

impl PeerDirectory for StaticDirectory {
    fn paired_devices(&self) -> Result<Vec<PairedDevice>> {
        Ok(self.devices.clone())
    }

    fn open_stream(&self, device: &PairedDevice, service: ServiceId) -> Result<LinkStream> {
        debug!(name = %device.name, handle = %device.handle, %service, "opening link");
        let open_err = |source| TransportError::Open {
            device: device.name.clone(),
            source,
        };
        match &device.handle {
            DeviceHandle::SerialNode(path) => crate::serial::SerialNode::open(path)
                .map(LinkStream::from_serial)
                .map_err(open_err),
            DeviceHandle::Socket(path) => std::os::unix::net::UnixStream::connect(path)
                .map(LinkStream::from_unix)
                .map_err(open_err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serial_port_profile_is_bit_exact() {
        assert_eq!(
            SERIAL_PORT_PROFILE.to_string(),
            "00001101-0000-1000-8000-00805f9b34fb"
        );
    }

    #[test]
    fn parses_serial_and_socket_handles() {
        let serial: PairedDevice = "NXT=/dev/rfcomm0".parse().unwrap();
        assert_eq!(serial.name, "NXT");
        assert_eq!(
            serial.handle,
            DeviceHandle::SerialNode(PathBuf::from("/dev/rfcomm0"))
        );

        let socket: PairedDevice = "NXT=unix:/tmp/brick.sock".parse().unwrap();
        assert_eq!(
            socket.handle,
            DeviceHandle::Socket(PathBuf::from("/tmp/brick.sock"))
        );
        assert_eq!(socket.handle.to_string(), "unix:/tmp/brick.sock");
    }

    #[test]
    fn rejects_malformed_handles() {
        assert!("NXT".parse::<PairedDevice>().is_err());
        assert!("=/dev/rfcomm0".parse::<PairedDevice>().is_err());
        assert!("NXT=".parse::<PairedDevice>().is_err());
        assert!("NXT=unix:".parse::<PairedDevice>().is_err());
    }

    #[test]
    fn static_directory_preserves_order() {
        let dir = StaticDirectory::default()
            .with_device("Phone=/dev/rfcomm1".parse().unwrap())
            .with_device("NXT=/dev/rfcomm0".parse().unwrap());
        let names: Vec<_> = dir
            .paired_devices()
            .unwrap()
            .into_iter()
            .map(|d| d.name)
            .collect();
        assert_eq!(names, vec!["Phone", "NXT"]);
    }

    #[test]
    #[cfg(unix)]
    fn open_missing_socket_is_open_error() {
        let dir = StaticDirectory::default();
        let device: PairedDevice = "NXT=unix:/tmp/nxtlink-definitely-missing.sock"
            .parse()
            .unwrap();
        let err = dir
            .open_stream(&device, SERIAL_PORT_PROFILE)
            .unwrap_err();
        assert!(matches!(err, TransportError::Open { ref device, .. } if device == "NXT"));
    }
}
