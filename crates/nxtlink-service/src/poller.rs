use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use nxtlink_proto::SensorPort;
use tracing::debug;

use crate::client::{ClientError, NxtClient};

/// One reading taken by a [`SensorPoller`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SensorSample {
    pub port: SensorPort,
    pub reading: Result<u8, ClientError>,
    pub taken_at: Instant,
}

/// Reads a set of ultrasonic sensors on a fixed interval.
///
/// Samples are handed to the owner over a channel; the poller and its
/// consumer share nothing else.
pub struct SensorPoller {
    client: NxtClient,
    ports: Vec<SensorPort>,
    interval: Duration,
    stop: Arc<AtomicBool>,
}

/// Stops the poller when told to or when dropped.
pub struct PollerHandle {
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl SensorPoller {
    /// Start polling `ports` in order, once per `interval`.
    pub fn spawn(
        client: NxtClient,
        ports: Vec<SensorPort>,
        interval: Duration,
    ) -> std::io::Result<(PollerHandle, Receiver<SensorSample>)> {
        let stop = Arc::new(AtomicBool::new(false));
        let (tx, rx) = mpsc::channel();
        let poller = SensorPoller {
            client,
            ports,
            interval,
            stop: Arc::clone(&stop),
        };
        let thread = thread::Builder::new()
            .name("nxtlink-poller".into())
            .spawn(move || poller.run(&tx))?;

        Ok((
            PollerHandle {
                stop,
                thread: Some(thread),
            },
            rx,
        ))
    }

    fn run(self, samples: &Sender<SensorSample>) {
        debug!(ports = ?self.ports, interval = ?self.interval, "poller started");
        while !self.stopped() {
            for &port in &self.ports {
                if self.stopped() {
                    break;
                }
                let sample = SensorSample {
                    port,
                    reading: self.client.read_ultrasonic_sensor(i32::from(port.index())),
                    taken_at: Instant::now(),
                };
                if samples.send(sample).is_err() {
                    debug!("sample receiver dropped");
                    return;
                }
            }
            thread::park_timeout(self.interval);
        }
        debug!("poller stopped");
    }

    fn stopped(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }
}

impl PollerHandle {
    /// Ask the poller to stop and wait for it.
    pub fn stop(mut self) {
        self.halt();
    }

    fn halt(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(thread) = self.thread.take() {
            thread.thread().unpark();
            let _ = thread.join();
        }
    }
}

impl Drop for PollerHandle {
    fn drop(&mut self) {
        self.halt();
    }
}
