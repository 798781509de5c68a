//! Synchronous facade over a connection service.
//!
//! [`NxtClient::bind`] asks a [`Binder`] for a handle to the service. Binding
//! completes asynchronously: the binder reports [`BindingEvent`]s on a channel
//! drained by one event thread, which calls `connect` once the service is
//! bound and then announces readiness. Until then every operation fails with
//! [`ClientError::Unavailable`].

use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, Weak};
use std::thread;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::connector::ServiceConnector;
use crate::error::{status, ServiceError};
use crate::remote::{socket_path_for, FailureKind, RemoteCall, RemoteReply, RemoteService};
use crate::service::ConnectionService;

/// Errors surfaced to facade callers.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClientError {
    /// No session, or the service is not reachable.
    #[error("connection service unavailable")]
    Unavailable,

    #[error("{message} (code {code})")]
    Failed {
        code: i32,
        kind: FailureKind,
        message: String,
    },
}

impl ClientError {
    pub fn code(&self) -> i32 {
        match self {
            ClientError::Unavailable => status::FAILURE,
            ClientError::Failed { code, .. } => *code,
        }
    }

    fn unexpected(reply: &RemoteReply) -> Self {
        ClientError::Failed {
            code: status::PROTOCOL,
            kind: FailureKind::Protocol,
            message: format!("unexpected reply {reply:?}"),
        }
    }
}

impl From<ServiceError> for ClientError {
    fn from(err: ServiceError) -> Self {
        let kind = err.kind();
        if kind.is_unavailable() {
            return ClientError::Unavailable;
        }
        ClientError::Failed {
            code: err.code(),
            kind,
            message: err.to_string(),
        }
    }
}

/// Lifecycle notifications for a binding.
pub enum BindingEvent {
    Bound(Arc<dyn RemoteService>),
    /// The binding was released by its owner.
    Unbound,
    /// The service went away without being released.
    Lost { reason: String },
}

impl std::fmt::Debug for BindingEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BindingEvent::Bound(_) => f.write_str("Bound"),
            BindingEvent::Unbound => f.write_str("Unbound"),
            BindingEvent::Lost { reason } => f.debug_struct("Lost").field("reason", reason).finish(),
        }
    }
}

/// Guard for an established binding. Releasing happens exactly once,
/// either through [`Binding::release`] or on drop.
pub struct Binding {
    release: Option<Box<dyn FnOnce() + Send>>,
}

impl Binding {
    pub fn new(release: impl FnOnce() + Send + 'static) -> Self {
        Self {
            release: Some(Box::new(release)),
        }
    }

    pub fn release(mut self) {
        self.run_release();
    }

    fn run_release(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl Drop for Binding {
    fn drop(&mut self) {
        self.run_release();
    }
}

/// Something that can hand out a connection service.
pub trait Binder {
    /// Start binding. `Bound` (and later `Unbound` or `Lost`) are reported on
    /// `events`; the returned guard ends the binding.
    fn bind(&self, events: Sender<BindingEvent>) -> Result<Binding, ServiceError>;
}

/// Binds to a service running in this process.
pub struct LocalBinder {
    service: Arc<ConnectionService>,
}

impl LocalBinder {
    pub fn new(service: Arc<ConnectionService>) -> Self {
        Self { service }
    }
}

impl Binder for LocalBinder {
    fn bind(&self, events: Sender<BindingEvent>) -> Result<Binding, ServiceError> {
        let service = Arc::clone(&self.service);
        service.attach();
        let handle: Arc<dyn RemoteService> = service.clone();
        let _ = events.send(BindingEvent::Bound(handle));

        Ok(Binding::new(move || {
            let _ = events.send(BindingEvent::Unbound);
            service.detach();
        }))
    }
}

/// Binds to a service published on a Unix socket.
pub struct SocketBinder {
    path: PathBuf,
}

impl SocketBinder {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn for_address(address: &str) -> Self {
        Self::new(socket_path_for(address))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Binder for SocketBinder {
    fn bind(&self, events: Sender<BindingEvent>) -> Result<Binding, ServiceError> {
        let connector = Arc::new(ServiceConnector::connect(&self.path)?);
        connector.notify_loss(events.clone());
        let handle: Arc<dyn RemoteService> = connector.clone();
        let _ = events.send(BindingEvent::Bound(handle));

        Ok(Binding::new(move || {
            connector.disconnect();
            let _ = events.send(BindingEvent::Unbound);
        }))
    }
}

/// Called once the service is bound, with the outcome of the automatic connect.
pub type ReadyCallback = Box<dyn FnMut(Result<(), ClientError>) + Send>;

struct ClientInner {
    client_id: String,
    remote: Mutex<Option<Arc<dyn RemoteService>>>,
    ready: Condvar,
    binding: Mutex<Option<Binding>>,
}

impl ClientInner {
    fn remote(&self) -> MutexGuard<'_, Option<Arc<dyn RemoteService>>> {
        self.remote.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Handle application code uses to drive the brick.
///
/// Cheap to clone; all clones share one binding, released when the last
/// clone is dropped or [`release`](Self::release) is called.
#[derive(Clone)]
pub struct NxtClient {
    inner: Arc<ClientInner>,
}

impl NxtClient {
    pub fn bind<B: Binder + ?Sized>(
        binder: &B,
        client_id: impl Into<String>,
        on_ready: Option<ReadyCallback>,
    ) -> Result<Self, ClientError> {
        let inner = Arc::new(ClientInner {
            client_id: client_id.into(),
            remote: Mutex::new(None),
            ready: Condvar::new(),
            binding: Mutex::new(None),
        });

        let (events, queue) = mpsc::channel();
        let weak = Arc::downgrade(&inner);
        thread::Builder::new()
            .name(format!("nxtlink-{}-events", inner.client_id))
            .spawn(move || run_events(weak, queue, on_ready))
            .map_err(|err| ClientError::Failed {
                code: status::FAILURE,
                kind: FailureKind::RemoteUnavailable,
                message: format!("event thread spawn failed: {err}"),
            })?;

        let binding = binder.bind(events)?;
        *inner
            .binding
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(binding);
        Ok(Self { inner })
    }

    pub fn client_id(&self) -> &str {
        &self.inner.client_id
    }

    pub fn is_ready(&self) -> bool {
        self.inner.remote().is_some()
    }

    /// Block until the service is bound and connected, or `timeout` passes.
    pub fn wait_ready(&self, timeout: Duration) -> bool {
        let remote = self.inner.remote();
        let (remote, _) = self
            .inner
            .ready
            .wait_timeout_while(remote, timeout, |remote| remote.is_none())
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        remote.is_some()
    }

    pub fn connect(&self) -> Result<(), ClientError> {
        match self.call(RemoteCall::Connect {
            client: self.inner.client_id.clone(),
        })? {
            RemoteReply::Done => Ok(()),
            other => Err(ClientError::unexpected(&other)),
        }
    }

    pub fn set_motor(&self, motor: i32, power: i32) -> Result<(), ClientError> {
        match self.call(RemoteCall::SetMotor {
            client: self.inner.client_id.clone(),
            motor,
            power,
        })? {
            RemoteReply::Done => Ok(()),
            other => Err(ClientError::unexpected(&other)),
        }
    }

    pub fn configure_ultrasonic_sensor(&self, port: i32) -> Result<(), ClientError> {
        match self.call(RemoteCall::ConfigureUltrasonicSensor {
            client: self.inner.client_id.clone(),
            port,
        })? {
            RemoteReply::Done => Ok(()),
            other => Err(ClientError::unexpected(&other)),
        }
    }

    /// Distance in centimetres; 255 means nothing in range.
    pub fn read_ultrasonic_sensor(&self, port: i32) -> Result<u8, ClientError> {
        match self.call(RemoteCall::ReadUltrasonicSensor {
            client: self.inner.client_id.clone(),
            port,
        })? {
            RemoteReply::Reading { value } => Ok(value),
            other => Err(ClientError::unexpected(&other)),
        }
    }

    pub fn get_version(&self) -> Result<i32, ClientError> {
        match self.call(RemoteCall::GetVersion {
            client: self.inner.client_id.clone(),
        })? {
            RemoteReply::Version { code } => Ok(code),
            other => Err(ClientError::unexpected(&other)),
        }
    }

    /// Stop the motors and close the session. Best effort.
    pub fn shutdown(&self) {
        let client = self.inner.client_id.clone();
        if let Err(err) = self.call(RemoteCall::Shutdown { client }) {
            debug!(error = %err, "shutdown failed");
        }
    }

    /// End the binding now instead of when the last clone drops.
    pub fn release(&self) {
        let binding = self
            .inner
            .binding
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        self.inner.remote().take();
        if let Some(binding) = binding {
            binding.release();
        }
    }

    fn call(&self, call: RemoteCall) -> Result<RemoteReply, ClientError> {
        let remote = self.inner.remote().clone().ok_or(ClientError::Unavailable)?;
        Ok(remote.call(call)?.into_result()?)
    }
}

fn run_events(
    inner: Weak<ClientInner>,
    queue: Receiver<BindingEvent>,
    mut on_ready: Option<ReadyCallback>,
) {
    for event in queue {
        let Some(inner) = inner.upgrade() else { break };
        match event {
            BindingEvent::Bound(remote) => {
                let client = inner.client_id.clone();
                let outcome = remote
                    .call(RemoteCall::Connect {
                        client: client.clone(),
                    })
                    .and_then(RemoteReply::into_result)
                    .map(|_| ())
                    .map_err(ClientError::from);
                match &outcome {
                    Ok(()) => info!(client = %client, "bound and connected"),
                    Err(err) => warn!(client = %client, error = %err, "bound but connect failed"),
                }

                *inner.remote() = Some(remote);
                inner.ready.notify_all();
                if let Some(on_ready) = on_ready.as_mut() {
                    on_ready(outcome);
                }
            }
            BindingEvent::Unbound => {
                debug!(client = %inner.client_id, "unbound");
                inner.remote().take();
            }
            BindingEvent::Lost { reason } => {
                warn!(client = %inner.client_id, %reason, "connection service lost");
                let remote = inner.remote().take();
                if let Some(remote) = remote {
                    let _ = remote.call(RemoteCall::Shutdown {
                        client: inner.client_id.clone(),
                    });
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use nxtlink_transport::StaticDirectory;

    use super::*;
    use crate::service::ServiceConfig;

    fn empty_service() -> Arc<ConnectionService> {
        Arc::new(
            ConnectionService::start(StaticDirectory::new(Vec::new()), ServiceConfig::default())
                .unwrap(),
        )
    }

    /// Never reports `Bound`.
    struct PendingBinder;

    impl Binder for PendingBinder {
        fn bind(&self, events: Sender<BindingEvent>) -> Result<Binding, ServiceError> {
            Ok(Binding::new(move || drop(events)))
        }
    }

    #[test]
    fn operations_before_bound_are_unavailable() {
        let client = NxtClient::bind(&PendingBinder, "early", None).unwrap();
        assert!(!client.is_ready());
        assert_eq!(client.set_motor(0, 100), Err(ClientError::Unavailable));
        assert_eq!(client.read_ultrasonic_sensor(1), Err(ClientError::Unavailable));
        assert_eq!(ClientError::Unavailable.code(), status::FAILURE);
        assert!(!client.wait_ready(Duration::from_millis(20)));
    }

    #[test]
    fn ready_callback_receives_connect_outcome() {
        let service = empty_service();
        let (tx, rx) = mpsc::channel();
        let client = NxtClient::bind(
            &LocalBinder::new(Arc::clone(&service)),
            "rc",
            Some(Box::new(move |outcome: Result<(), ClientError>| {
                let _ = tx.send(outcome);
            })),
        )
        .unwrap();

        let outcome = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert!(matches!(
            outcome,
            Err(ClientError::Failed {
                kind: FailureKind::PeerNotFound,
                ..
            })
        ));
        assert!(client.wait_ready(Duration::from_secs(5)));
        assert_eq!(service.clients(), 1);

        // Bound but no session: same answer as not bound.
        assert_eq!(client.set_motor(0, 100), Err(ClientError::Unavailable));
        assert_eq!(client.get_version(), Ok(crate::version_code()));

        client.release();
        assert_eq!(service.clients(), 0);
        assert_eq!(client.get_version(), Err(ClientError::Unavailable));
    }

    #[test]
    fn binding_releases_exactly_once() {
        let (tx, rx) = mpsc::channel();
        let binding = Binding::new(move || {
            let _ = tx.send(());
        });
        binding.release();
        assert!(rx.recv().is_ok());
        assert!(rx.recv().is_err());
    }
}
