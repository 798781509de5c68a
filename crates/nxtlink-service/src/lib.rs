//! Session, connection service and client facade for an NXT brick.
//!
//! This is the "just works" layer:
//! - [`Session`] owns the physical link and runs one command exchange at a time
//! - [`ConnectionService`] owns the session on a worker thread, queues calls in
//!   arrival order and tracks readiness
//! - [`ServiceListener`] / [`ServiceConnector`] carry [`RemoteCall`]s across a
//!   process boundary
//! - [`NxtClient`] is the synchronous facade application code talks to

pub mod client;
pub mod connector;
pub mod error;
pub mod listener;
pub mod poller;
pub mod remote;
pub mod service;
pub mod session;

pub use client::{
    Binder, Binding, BindingEvent, ClientError, LocalBinder, NxtClient, ReadyCallback, SocketBinder,
};
pub use connector::ServiceConnector;
pub use error::{status, ExchangeError, Result, ServiceError};
pub use listener::ServiceListener;
pub use poller::{PollerHandle, SensorPoller, SensorSample};
pub use remote::{
    socket_path_for, FailureKind, RemoteCall, RemoteReply, RemoteService, SERVICE_ADDRESS,
};
pub use service::{version_code, ConnectionService, ServiceConfig};
pub use session::{Session, SessionConfig, SessionState};
