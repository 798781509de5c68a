use std::time::Duration;

use nxtlink_frame::{FrameConfig, FrameReader, FrameWriter};
use nxtlink_proto::{decode_ls_read_reply, opcode, Command, Response};
use nxtlink_transport::{LinkStream, PairedDevice, PeerDirectory, ServiceId, SERIAL_PORT_PROFILE};
use tracing::{debug, info, trace, warn};

use crate::error::{ExchangeError, Result, ServiceError};

/// Lifecycle of a [`Session`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Discovering,
    Connected,
    Closing,
}

/// Configuration for a [`Session`].
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Name of the paired device to open. Default: `"NXT"`.
    pub device_name: String,
    /// Service record the link is opened against. Default: Serial Port Profile.
    pub service_id: ServiceId,
    /// How long to wait for a reply telegram. Default: none (block).
    pub read_timeout: Option<Duration>,
    pub write_timeout: Option<Duration>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            device_name: "NXT".to_string(),
            service_id: SERIAL_PORT_PROFILE,
            read_timeout: None,
            write_timeout: None,
        }
    }
}

struct Link {
    device: PairedDevice,
    reader: FrameReader<LinkStream>,
    writer: FrameWriter<LinkStream>,
}

/// The single link to the brick.
///
/// At most one link is open at a time and every command exchange runs to
/// completion before the next starts; callers that share a session must
/// serialize access to it (see [`crate::ConnectionService`]).
pub struct Session {
    directory: Box<dyn PeerDirectory>,
    config: SessionConfig,
    state: SessionState,
    link: Option<Link>,
}

impl Session {
    pub fn new(directory: impl PeerDirectory + 'static, config: SessionConfig) -> Self {
        Self {
            directory: Box::new(directory),
            config,
            state: SessionState::Disconnected,
            link: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == SessionState::Connected
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Device the open link belongs to.
    pub fn connected_device(&self) -> Option<&PairedDevice> {
        self.link.as_ref().map(|link| &link.device)
    }

    /// Find the configured device, open the link and probe it.
    ///
    /// A session that is already connected is left as is.
    pub fn connect(&mut self) -> Result<()> {
        if self.is_connected() {
            debug!("session already connected");
            return Ok(());
        }

        self.state = SessionState::Discovering;
        let link = match self.open_link() {
            Ok(link) => link,
            Err(err) => {
                warn!(device = %self.config.device_name, error = %err, "connect failed");
                self.state = SessionState::Disconnected;
                return Err(err);
            }
        };

        info!(name = %link.device.name, handle = %link.device.handle, "link open");
        self.link = Some(link);
        self.state = SessionState::Connected;

        if let Err(err) = self.send(&Command::Connect) {
            self.close();
            return Err(err);
        }
        Ok(())
    }

    fn open_link(&self) -> Result<Link> {
        let name = &self.config.device_name;
        let device = self
            .directory
            .paired_devices()?
            .into_iter()
            .find(|device| &device.name == name)
            .ok_or_else(|| ServiceError::PeerNotFound(name.clone()))?;

        let stream = self.directory.open_stream(&device, self.config.service_id)?;
        let reader_stream = stream.try_clone()?;

        let frame_config = FrameConfig {
            read_timeout: self.config.read_timeout,
            write_timeout: self.config.write_timeout,
            ..FrameConfig::default()
        };
        let reader = FrameReader::with_config_link(reader_stream, frame_config.clone())
            .map_err(|err| ServiceError::exchange("connect", err.into()))?;
        let writer = FrameWriter::with_config_link(stream, frame_config)
            .map_err(|err| ServiceError::exchange("connect", err.into()))?;

        Ok(Link {
            device,
            reader,
            writer,
        })
    }

    /// Send one command and wait for its reply if it has one.
    ///
    /// A failure that leaves the link unusable closes it; the session is
    /// then `Disconnected` and the next call fails with `NotConnected`.
    pub fn send(&mut self, command: &Command) -> Result<Response> {
        let result = match self.link.as_mut() {
            Some(link) => exchange(link, command),
            None => return Err(ServiceError::NotConnected),
        };

        match result {
            Ok(response) => Ok(response),
            Err(err) => {
                if err.is_link_fatal() {
                    warn!(command = command.name(), error = %err, "link lost");
                    self.close();
                }
                Err(ServiceError::exchange(command.name(), err))
            }
        }
    }

    /// Release the link. Always ends `Disconnected`.
    pub fn close(&mut self) {
        let Some(link) = self.link.take() else {
            self.state = SessionState::Disconnected;
            return;
        };

        self.state = SessionState::Closing;
        if let Err(err) = link.writer.get_ref().shutdown() {
            debug!(error = %err, "link shutdown failed");
        }
        drop(link);
        self.state = SessionState::Disconnected;
        info!("link closed");
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.close();
    }
}

fn exchange(link: &mut Link, command: &Command) -> std::result::Result<Response, ExchangeError> {
    let mut response = Response::OK;
    for telegram in command.telegrams() {
        trace!(command = command.name(), ?telegram, "send");
        link.writer.send(telegram.as_bytes())?;

        if telegram.expects_reply() {
            let frame = link.reader.read_frame()?;
            trace!(command = command.name(), len = frame.payload.len(), "reply");
            if telegram.opcode() == Some(opcode::LS_READ) {
                response = Response::Reading(decode_ls_read_reply(&frame.payload)?);
            }
        }
    }
    Ok(response)
}

#[cfg(test)]
mod tests {
    use std::io::Write;
    use std::os::unix::net::UnixStream;
    use std::sync::{Arc, Mutex};
    use std::thread;

    use nxtlink_frame::FrameReader;
    use nxtlink_proto::{encode_ls_read_reply, Request};
    use nxtlink_transport::{DeviceHandle, TransportError};

    use super::*;

    /// Hands out one end of a socket pair; the brick side is returned to the test.
    struct PairDirectory {
        devices: Vec<PairedDevice>,
        stream: Mutex<Option<UnixStream>>,
    }

    impl PairDirectory {
        fn new(name: &str) -> (Self, UnixStream) {
            let (host, brick) = UnixStream::pair().unwrap();
            let directory = Self {
                devices: vec![PairedDevice::new(
                    name,
                    DeviceHandle::Socket("/dev/null".into()),
                )],
                stream: Mutex::new(Some(host)),
            };
            (directory, brick)
        }
    }

    impl PeerDirectory for PairDirectory {
        fn paired_devices(&self) -> nxtlink_transport::Result<Vec<PairedDevice>> {
            Ok(self.devices.clone())
        }

        fn open_stream(
            &self,
            device: &PairedDevice,
            _service: ServiceId,
        ) -> nxtlink_transport::Result<LinkStream> {
            self.stream
                .lock()
                .unwrap()
                .take()
                .map(LinkStream::from)
                .ok_or_else(|| TransportError::Open {
                    device: device.handle.to_string(),
                    source: std::io::Error::from(std::io::ErrorKind::NotFound),
                })
        }
    }

    #[test]
    fn connect_sends_keepalive_probe() {
        let (directory, brick) = PairDirectory::new("NXT");
        let mut session = Session::new(directory, SessionConfig::default());

        session.connect().unwrap();
        assert_eq!(session.state(), SessionState::Connected);
        assert_eq!(session.connected_device().unwrap().name, "NXT");

        let mut reader = FrameReader::new(brick);
        let probe = reader.read_frame().unwrap();
        assert_eq!(Request::parse(&probe.payload).unwrap(), Request::KeepAlive);
    }

    #[test]
    fn unknown_device_is_peer_not_found() {
        let (directory, _brick) = PairDirectory::new("NXT-2");
        let mut session = Session::new(directory, SessionConfig::default());

        let err = session.connect().unwrap_err();
        assert!(matches!(err, ServiceError::PeerNotFound(ref name) if name == "NXT"));
        assert_eq!(session.state(), SessionState::Disconnected);
        assert!(matches!(
            session.send(&Command::Shutdown),
            Err(ServiceError::NotConnected)
        ));
    }

    #[test]
    fn read_decodes_measurement_byte() {
        let (directory, brick) = PairDirectory::new("NXT");
        let mut session = Session::new(directory, SessionConfig::default());
        session.connect().unwrap();

        let requests = Arc::new(Mutex::new(Vec::new()));
        let seen = Arc::clone(&requests);
        let fake = thread::spawn(move || {
            let mut writer = FrameWriter::new(brick.try_clone().unwrap());
            let mut reader = FrameReader::new(brick);
            loop {
                let Ok(frame) = reader.read_frame() else { break };
                let request = Request::parse(&frame.payload).unwrap();
                if matches!(request, Request::LsRead { .. }) {
                    writer.send(&encode_ls_read_reply(0, &[0x2A])).unwrap();
                }
                seen.lock().unwrap().push(request);
            }
        });

        let port = nxtlink_proto::SensorPort::try_from(1).unwrap();
        let response = session
            .send(&Command::ReadUltrasonicSensor { port })
            .unwrap();
        assert_eq!(response, Response::Reading(42));

        session.close();
        fake.join().unwrap();
        let requests = requests.lock().unwrap();
        assert_eq!(requests.len(), 3);
        assert_eq!(requests[2], Request::LsRead { port: 1 });
    }

    #[test]
    fn peer_hangup_mid_reply_disconnects() {
        let (directory, brick) = PairDirectory::new("NXT");
        let mut session = Session::new(directory, SessionConfig::default());
        session.connect().unwrap();

        let fake = thread::spawn(move || {
            let mut reader = FrameReader::new(brick.try_clone().unwrap());
            // probe, LS write, LS read
            for _ in 0..3 {
                reader.read_frame().unwrap();
            }
            let mut brick = brick;
            brick.write_all(&[0x14, 0x00, 0x02, 0x10]).unwrap();
        });

        let port = nxtlink_proto::SensorPort::try_from(0).unwrap();
        let err = session
            .send(&Command::ReadUltrasonicSensor { port })
            .unwrap_err();
        fake.join().unwrap();

        assert!(matches!(
            err,
            ServiceError::TruncatedFrame {
                expected: 22,
                received: 4,
                ..
            }
        ));
        assert_eq!(session.state(), SessionState::Disconnected);
    }
}
