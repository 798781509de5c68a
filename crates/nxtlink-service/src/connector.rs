use std::path::{Path, PathBuf};
use std::sync::mpsc::Sender;
use std::sync::{Mutex, MutexGuard};

use nxtlink_frame::{FrameReader, FrameWriter};
use nxtlink_transport::{LinkStream, UnixDomainSocket};
use tracing::{debug, warn};

use crate::client::BindingEvent;
use crate::error::{Result, ServiceError};
use crate::remote::{socket_path_for, RemoteCall, RemoteReply, RemoteService};

struct Channel {
    reader: FrameReader<LinkStream>,
    writer: FrameWriter<LinkStream>,
}

#[derive(Default)]
struct State {
    channel: Option<Channel>,
    on_loss: Option<Sender<BindingEvent>>,
}

/// Client side of a connection service published on a Unix socket.
///
/// One call is in flight at a time. Once the connection fails every later
/// call returns `RemoteUnavailable`, and the registered binding (if any) is
/// told the service was lost.
pub struct ServiceConnector {
    path: PathBuf,
    state: Mutex<State>,
}

impl ServiceConnector {
    pub fn connect(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let stream = UnixDomainSocket::connect(&path)
            .map_err(|err| ServiceError::RemoteUnavailable(err.to_string()))?;
        let reader_stream = stream
            .try_clone()
            .map_err(|err| ServiceError::RemoteUnavailable(err.to_string()))?;

        Ok(Self {
            path,
            state: Mutex::new(State {
                channel: Some(Channel {
                    reader: FrameReader::new(reader_stream),
                    writer: FrameWriter::new(stream),
                }),
                on_loss: None,
            }),
        })
    }

    /// Connect to the service published under `address`.
    pub fn connect_address(address: &str) -> Result<Self> {
        Self::connect(socket_path_for(address))
    }

    /// Deliver [`BindingEvent::Lost`] on `events` the first time a call fails.
    pub fn notify_loss(&self, events: Sender<BindingEvent>) {
        self.lock().on_loss = Some(events);
    }

    /// Close the connection without reporting a loss.
    pub fn disconnect(&self) {
        let mut state = self.lock();
        state.on_loss = None;
        if let Some(channel) = state.channel.take() {
            let _ = channel.writer.get_ref().shutdown();
            debug!(path = ?self.path, "disconnected from service");
        }
    }

    pub fn is_connected(&self) -> bool {
        self.lock().channel.is_some()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl RemoteService for ServiceConnector {
    fn call(&self, call: RemoteCall) -> Result<RemoteReply> {
        let mut state = self.lock();
        let Some(channel) = state.channel.as_mut() else {
            return Err(ServiceError::RemoteUnavailable(
                "connection to service closed".into(),
            ));
        };

        match round_trip(channel, &call) {
            Ok(reply) => Ok(reply),
            Err(err) => {
                warn!(path = ?self.path, method = call.method(), error = %err, "service lost");
                state.channel = None;
                if let Some(events) = state.on_loss.take() {
                    let _ = events.send(BindingEvent::Lost {
                        reason: err.to_string(),
                    });
                }
                Err(ServiceError::RemoteUnavailable(err.to_string()))
            }
        }
    }
}

impl Drop for ServiceConnector {
    fn drop(&mut self) {
        self.disconnect();
    }
}

fn round_trip(channel: &mut Channel, call: &RemoteCall) -> Result<RemoteReply> {
    let payload = serde_json::to_vec(call)?;
    channel
        .writer
        .send(&payload)
        .map_err(|err| ServiceError::exchange(call.method(), err.into()))?;
    let frame = channel
        .reader
        .read_frame()
        .map_err(|err| ServiceError::exchange(call.method(), err.into()))?;
    Ok(serde_json::from_slice(&frame.payload)?)
}
