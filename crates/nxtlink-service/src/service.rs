use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use nxtlink_proto::{Command, Motor, Power, Response, SensorPort};
use nxtlink_transport::PeerDirectory;
use tracing::{debug, info, info_span, warn};

use crate::error::{Result, ServiceError};
use crate::remote::{RemoteCall, RemoteReply, RemoteService};
use crate::session::{Session, SessionConfig};

/// Version code of this build: `major * 10000 + minor * 100 + patch`.
pub fn version_code() -> i32 {
    let mut parts = env!("CARGO_PKG_VERSION")
        .split(['.', '-'])
        .map(|part| part.parse::<i32>().unwrap_or(0));
    let major = parts.next().unwrap_or(0);
    let minor = parts.next().unwrap_or(0);
    let patch = parts.next().unwrap_or(0);
    major * 10_000 + minor * 100 + patch
}

/// Configuration for a [`ConnectionService`].
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub session: SessionConfig,
    /// Reported by `get_version`. Default: [`version_code()`].
    pub version_code: i32,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            session: SessionConfig::default(),
            version_code: version_code(),
        }
    }
}

enum Job {
    Connect,
    Send(Command),
    Shutdown,
}

struct Request {
    job: Job,
    reply: Sender<Result<Response>>,
}

#[derive(Default)]
struct Readiness {
    connected: Mutex<bool>,
    changed: Condvar,
    watchers: Mutex<Vec<Sender<bool>>>,
}

impl Readiness {
    fn lock(&self) -> MutexGuard<'_, bool> {
        self.connected.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn set(&self, ready: bool) {
        let mut connected = self.lock();
        if *connected == ready {
            return;
        }
        *connected = ready;
        self.changed.notify_all();

        // Announced while the flag is still held so watchers see changes in order.
        let mut watchers = self
            .watchers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        watchers.retain(|watcher| watcher.send(ready).is_ok());
    }
}

/// Owns the session and runs every call against it on one worker thread.
///
/// Calls from any number of threads are queued and executed one at a time in
/// arrival order, so telegrams from different callers never interleave on
/// the wire. Whether a session is open is tracked separately, which lets
/// callers be refused with `NotConnected` without waiting behind the queue.
pub struct ConnectionService {
    jobs: Option<Sender<Request>>,
    worker: Option<JoinHandle<()>>,
    readiness: Arc<Readiness>,
    version_code: i32,
    clients: AtomicUsize,
}

impl ConnectionService {
    /// Start the worker thread. No link is opened until [`connect`](Self::connect).
    pub fn start(directory: impl PeerDirectory + 'static, config: ServiceConfig) -> Result<Self> {
        let session = Session::new(directory, config.session);
        let readiness = Arc::new(Readiness::default());
        let (jobs, queue) = mpsc::channel();

        let worker_readiness = Arc::clone(&readiness);
        let worker = thread::Builder::new()
            .name("nxtlink-session".into())
            .spawn(move || run_worker(session, queue, &worker_readiness))
            .map_err(|err| ServiceError::RemoteUnavailable(format!("worker spawn failed: {err}")))?;

        Ok(Self {
            jobs: Some(jobs),
            worker: Some(worker),
            readiness,
            version_code: config.version_code,
            clients: AtomicUsize::new(0),
        })
    }

    /// Open the link to the configured device. A no-op when already open.
    pub fn connect(&self) -> Result<()> {
        self.dispatch(Job::Connect).map(|_| ())
    }

    pub fn set_motor(&self, motor: i32, power: i32) -> Result<()> {
        self.require_connected()?;
        let command = Command::SetMotor {
            motor: Motor::try_from(motor)?,
            power: Power::try_from(power)?,
        };
        self.dispatch(Job::Send(command)).map(|_| ())
    }

    pub fn configure_ultrasonic_sensor(&self, port: i32) -> Result<()> {
        self.require_connected()?;
        let port = SensorPort::try_from(port)?;
        self.dispatch(Job::Send(Command::ConfigureUltrasonicSensor { port }))
            .map(|_| ())
    }

    /// Distance in centimetres; 255 means nothing in range.
    pub fn read_ultrasonic_sensor(&self, port: i32) -> Result<u8> {
        self.require_connected()?;
        let port = SensorPort::try_from(port)?;
        let response = self.dispatch(Job::Send(Command::ReadUltrasonicSensor { port }))?;
        response.reading().ok_or_else(|| ServiceError::Protocol {
            command: "read_ultrasonic_sensor",
            source: nxtlink_proto::ProtoError::UnexpectedReply {
                telegram_type: 0,
                opcode: nxtlink_proto::opcode::LS_READ,
            }
            .into(),
        })
    }

    /// Needs no link.
    pub fn get_version(&self) -> i32 {
        self.version_code
    }

    /// Stop all motors if a link is open, then close it.
    pub fn shutdown(&self) -> Result<()> {
        self.dispatch(Job::Shutdown).map(|_| ())
    }

    pub fn is_ready(&self) -> bool {
        *self.readiness.lock()
    }

    /// Block until the session is open or `timeout` passes.
    pub fn wait_ready(&self, timeout: Duration) -> bool {
        let connected = self.readiness.lock();
        let (connected, _) = self
            .readiness
            .changed
            .wait_timeout_while(connected, timeout, |connected| !*connected)
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *connected
    }

    /// Receive every readiness change from now on.
    pub fn subscribe_readiness(&self) -> Receiver<bool> {
        let (tx, rx) = mpsc::channel();
        let _connected = self.readiness.lock();
        self.readiness
            .watchers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(tx);
        rx
    }

    /// Register a client. Returns the number of attached clients.
    pub fn attach(&self) -> usize {
        let count = self.clients.fetch_add(1, Ordering::SeqCst) + 1;
        debug!(clients = count, "client attached");
        count
    }

    /// Unregister a client; the last one out shuts the session down.
    pub fn detach(&self) -> usize {
        let previous = self
            .clients
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .unwrap_or(0);
        let remaining = previous.saturating_sub(1);
        debug!(clients = remaining, "client detached");
        if previous == 1 {
            info!("last client detached, shutting down session");
            if let Err(err) = self.shutdown() {
                warn!(error = %err, "shutdown after last detach failed");
            }
        }
        remaining
    }

    pub fn clients(&self) -> usize {
        self.clients.load(Ordering::SeqCst)
    }

    /// Answer one boundary call. Failures are folded into the reply.
    pub fn handle(&self, call: RemoteCall) -> RemoteReply {
        let span = info_span!("call", client = %call.client(), method = call.method());
        let _entered = span.enter();

        let result = match call {
            RemoteCall::Connect { .. } => self.connect().map(|()| RemoteReply::Done),
            RemoteCall::SetMotor { motor, power, .. } => {
                self.set_motor(motor, power).map(|()| RemoteReply::Done)
            }
            RemoteCall::ConfigureUltrasonicSensor { port, .. } => self
                .configure_ultrasonic_sensor(port)
                .map(|()| RemoteReply::Done),
            RemoteCall::ReadUltrasonicSensor { port, .. } => self
                .read_ultrasonic_sensor(port)
                .map(|value| RemoteReply::Reading { value }),
            RemoteCall::GetVersion { .. } => Ok(RemoteReply::Version {
                code: self.get_version(),
            }),
            RemoteCall::Shutdown { .. } => self.shutdown().map(|()| RemoteReply::Done),
        };

        result.unwrap_or_else(|err| {
            debug!(error = %err, "call failed");
            RemoteReply::failed(&err)
        })
    }

    fn require_connected(&self) -> Result<()> {
        if self.is_ready() {
            Ok(())
        } else {
            Err(ServiceError::NotConnected)
        }
    }

    fn dispatch(&self, job: Job) -> Result<Response> {
        let stopped = || ServiceError::RemoteUnavailable("connection service stopped".into());
        let jobs = self.jobs.as_ref().ok_or_else(stopped)?;
        let (reply, response) = mpsc::channel();
        jobs.send(Request { job, reply }).map_err(|_| stopped())?;
        response.recv().map_err(|_| stopped())?
    }
}

impl RemoteService for ConnectionService {
    fn call(&self, call: RemoteCall) -> Result<RemoteReply> {
        Ok(self.handle(call))
    }
}

impl Drop for ConnectionService {
    fn drop(&mut self) {
        // Closing the queue lets the worker stop the motors and exit.
        self.jobs.take();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                warn!("session worker panicked");
            }
        }
    }
}

fn run_worker(mut session: Session, queue: Receiver<Request>, readiness: &Readiness) {
    for Request { job, reply } in queue {
        let result = match job {
            Job::Connect => session.connect().map(|()| Response::OK),
            Job::Send(command) => session.send(&command),
            Job::Shutdown => {
                shutdown_session(&mut session);
                Ok(Response::OK)
            }
        };
        // Published before the caller is released so its next call sees it.
        readiness.set(session.is_connected());
        let _ = reply.send(result);
    }

    shutdown_session(&mut session);
    readiness.set(false);
    debug!("session worker stopped");
}

fn shutdown_session(session: &mut Session) {
    if session.is_connected() {
        if let Err(err) = session.send(&Command::Shutdown) {
            warn!(error = %err, "stop-all-motors failed");
        }
    }
    session.close();
}
