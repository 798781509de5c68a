use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use nxtlink_frame::{FrameError, FrameReader, FrameWriter};
use nxtlink_transport::{LinkStream, UnixDomainSocket};
use tracing::{debug, info, warn};

use crate::error::{Result, ServiceError};
use crate::remote::{socket_path_for, RemoteCall, RemoteReply};
use crate::service::ConnectionService;

/// Publishes a [`ConnectionService`] on a Unix domain socket.
///
/// Each accepted client gets its own thread and counts as one attached
/// client of the service; when the last one disconnects the session is
/// shut down.
pub struct ServiceListener {
    socket: UnixDomainSocket,
    service: Arc<ConnectionService>,
    next_client_id: AtomicU64,
}

impl ServiceListener {
    /// Bind to a Unix domain socket path.
    pub fn bind(path: impl AsRef<Path>, service: Arc<ConnectionService>) -> Result<Self> {
        let socket = UnixDomainSocket::bind(path)?;
        info!(path = ?socket.path(), "connection service listening");
        Ok(Self {
            socket,
            service,
            next_client_id: AtomicU64::new(1),
        })
    }

    /// Bind to the socket for a service address.
    pub fn bind_address(address: &str, service: Arc<ConnectionService>) -> Result<Self> {
        Self::bind(socket_path_for(address), service)
    }

    /// Accept the next client and serve it on a new thread.
    pub fn accept(&self) -> Result<JoinHandle<()>> {
        let stream = self.socket.accept()?;
        self.spawn_client(stream)
    }

    /// Accept clients until `running` is cleared.
    ///
    /// The flag is checked after every accept; whoever clears it should
    /// connect once to the socket to wake a blocked accept.
    pub fn serve(&self, running: &AtomicBool) -> Result<()> {
        while running.load(Ordering::SeqCst) {
            match self.socket.accept() {
                Ok(_) if !running.load(Ordering::SeqCst) => break,
                Ok(stream) => {
                    self.spawn_client(stream)?;
                }
                Err(_) if !running.load(Ordering::SeqCst) => break,
                Err(err) => return Err(err.into()),
            }
        }
        info!(path = ?self.path(), "connection service stopped accepting");
        Ok(())
    }

    /// Bound socket path.
    pub fn path(&self) -> &Path {
        self.socket.path()
    }

    pub fn service(&self) -> &Arc<ConnectionService> {
        &self.service
    }

    fn spawn_client(&self, stream: LinkStream) -> Result<JoinHandle<()>> {
        let id = self.next_client_id.fetch_add(1, Ordering::Relaxed);
        let label = format!("client-{id}");
        let service = Arc::clone(&self.service);
        thread::Builder::new()
            .name(format!("nxtlink-{label}"))
            .spawn(move || serve_client(stream, &service, &label))
            .map_err(|err| ServiceError::RemoteUnavailable(format!("client spawn failed: {err}")))
    }
}

struct Attached<'a>(&'a ConnectionService);

impl Drop for Attached<'_> {
    fn drop(&mut self) {
        self.0.detach();
    }
}

fn serve_client(stream: LinkStream, service: &ConnectionService, label: &str) {
    service.attach();
    let _attached = Attached(service);

    let reader_stream = match stream.try_clone() {
        Ok(stream) => stream,
        Err(err) => {
            warn!(client = label, error = %err, "cannot clone client stream");
            return;
        }
    };
    let mut reader = FrameReader::new(reader_stream);
    let mut writer = FrameWriter::new(stream);
    debug!(client = label, "client connected");

    loop {
        let frame = match reader.read_frame() {
            Ok(frame) => frame,
            Err(FrameError::ConnectionClosed) => {
                debug!(client = label, "client disconnected");
                break;
            }
            Err(err) => {
                warn!(client = label, error = %err, "client read failed");
                break;
            }
        };

        let reply = match serde_json::from_slice::<RemoteCall>(&frame.payload) {
            Ok(call) => service.handle(call),
            Err(err) => RemoteReply::failed(&ServiceError::Json(err)),
        };
        let payload = match serde_json::to_vec(&reply) {
            Ok(payload) => payload,
            Err(err) => {
                warn!(client = label, error = %err, "cannot encode reply");
                break;
            }
        };
        if let Err(err) = writer.send(&payload) {
            warn!(client = label, error = %err, "client write failed");
            break;
        }
    }
}
