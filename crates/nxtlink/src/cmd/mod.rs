use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::time::{Duration, Instant};

use clap::{Args, Subcommand};
use nxtlink_service::{ClientError, NxtClient, ReadyCallback, SocketBinder};
use nxtlink_transport::PairedDevice;

use crate::exit::{client_error, CliError, CliResult, INTERNAL, TIMEOUT, USAGE};
use crate::output::OutputFormat;

pub mod drive;
pub mod motor;
pub mod sensor;
pub mod serve;
pub mod simulate;
pub mod version;
pub mod watch;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Host the connection service until interrupted.
    Serve(ServeArgs),
    /// Set one motor's power.
    Motor(MotorArgs),
    /// Drive a two-wheel base (motors A and C) from stdin commands.
    Drive(DriveArgs),
    /// Configure an ultrasonic sensor and print one reading.
    Sensor(SensorArgs),
    /// Stream ultrasonic readings from several ports.
    Watch(WatchArgs),
    /// Run a simulated brick on a Unix socket.
    Simulate(SimulateArgs),
    /// Show version information.
    Version(VersionArgs),
}

/// Settings shared by every subcommand.
pub struct Context {
    pub format: OutputFormat,
    /// Socket the connection service listens on.
    pub socket: PathBuf,
}

pub fn run(command: Command, ctx: &Context) -> CliResult<i32> {
    match command {
        Command::Serve(args) => serve::run(args, ctx),
        Command::Motor(args) => motor::run(args, ctx),
        Command::Drive(args) => drive::run(args, ctx),
        Command::Sensor(args) => sensor::run(args, ctx),
        Command::Watch(args) => watch::run(args, ctx),
        Command::Simulate(args) => simulate::run(args, ctx),
        Command::Version(args) => version::run(args, ctx),
    }
}

#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Name of the paired brick to open.
    #[arg(long, env = "NXTLINK_DEVICE_NAME", default_value = "NXT")]
    pub device_name: String,
    /// Paired devices as NAME=HANDLE (serial node path, or unix:PATH).
    #[arg(
        long = "paired",
        env = "NXTLINK_PAIRED",
        value_name = "NAME=HANDLE",
        value_delimiter = ','
    )]
    pub paired: Vec<PairedDevice>,
    /// Give up waiting for a reply telegram after this long (e.g. 2s, 500ms).
    #[arg(long, env = "NXTLINK_READ_TIMEOUT")]
    pub read_timeout: Option<String>,
}

#[derive(Args, Debug)]
pub struct MotorArgs {
    /// Motor index: 0 (A), 1 (B) or 2 (C).
    pub motor: i32,
    /// Power, -100..=100.
    #[arg(allow_negative_numbers = true)]
    pub power: i32,
    /// Keep the motor running this long, then stop it (e.g. 1s, 250ms).
    #[arg(long)]
    pub hold: Option<String>,
    /// How long to wait for the service to become ready.
    #[arg(long, default_value = "5s")]
    pub timeout: String,
}

#[derive(Args, Debug)]
pub struct DriveArgs {
    /// Power used for every move.
    #[arg(long, default_value = "100")]
    pub power: i32,
    /// How long to wait for the service to become ready.
    #[arg(long, default_value = "5s")]
    pub timeout: String,
}

#[derive(Args, Debug)]
pub struct SensorArgs {
    /// Sensor port, 0..=3.
    pub port: i32,
    /// How long to wait for the service to become ready.
    #[arg(long, default_value = "5s")]
    pub timeout: String,
}

#[derive(Args, Debug)]
pub struct WatchArgs {
    /// Ports to poll (comma-separated).
    #[arg(long, value_delimiter = ',', default_values_t = [0, 2, 3])]
    pub ports: Vec<i32>,
    /// Time between sweeps (e.g. 100ms, 1s).
    #[arg(long, default_value = "100ms")]
    pub interval: String,
    /// Exit after N sweeps.
    #[arg(long)]
    pub count: Option<usize>,
    /// How long to wait for the service to become ready.
    #[arg(long, default_value = "5s")]
    pub timeout: String,
}

#[derive(Args, Debug)]
pub struct SimulateArgs {
    /// Socket path to bind.
    pub path: PathBuf,
    /// Distance answered to every ultrasonic read (255 = nothing in range).
    #[arg(long, default_value_t = 255)]
    pub distance: u8,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

/// Bind to the service at `socket` and wait for its connect outcome.
///
/// A socket that does not exist yet is retried until `timeout`.
pub fn connect_client(socket: &Path, client_id: &str, timeout: Duration) -> CliResult<NxtClient> {
    let start = Instant::now();
    let binder = SocketBinder::new(socket);
    let (ready_tx, ready_rx) = mpsc::channel();

    let client = loop {
        let ready_tx = ready_tx.clone();
        let on_ready: ReadyCallback = Box::new(move |outcome| {
            let _ = ready_tx.send(outcome);
        });
        match NxtClient::bind(&binder, client_id, Some(on_ready)) {
            Ok(client) => break client,
            Err(ClientError::Unavailable) if start.elapsed() < timeout => {
                std::thread::sleep(Duration::from_millis(50));
            }
            Err(ClientError::Unavailable) => {
                return Err(CliError::new(
                    TIMEOUT,
                    format!(
                        "connection service at {} unavailable after {timeout:?}",
                        socket.display()
                    ),
                ));
            }
            Err(err) => return Err(client_error("bind failed", err)),
        }
    };

    let remaining = timeout.saturating_sub(start.elapsed());
    match ready_rx.recv_timeout(remaining.max(Duration::from_millis(100))) {
        Ok(Ok(())) => Ok(client),
        Ok(Err(err)) => Err(client_error("connect failed", err)),
        Err(_) => Err(CliError::new(
            TIMEOUT,
            format!("connection service not ready after {timeout:?}"),
        )),
    }
}

pub fn install_ctrlc_handler(running: Arc<AtomicBool>, wake: Option<PathBuf>) -> CliResult<()> {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
        // Unblock a listener parked in accept().
        if let Some(path) = &wake {
            let _ = nxtlink_transport::UnixDomainSocket::connect(path);
        }
    })
    .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))
}

pub fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, unit) = if let Some(num) = input.strip_suffix("ms") {
        (num, "ms")
    } else if let Some(num) = input.strip_suffix('s') {
        (num, "s")
    } else {
        (input, "s")
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;

    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    match unit {
        "ms" => Ok(Duration::from_millis(value)),
        _ => Ok(Duration::from_secs(value)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_duration_seconds() {
        assert_eq!(parse_duration("5s").unwrap(), Duration::from_secs(5));
        assert_eq!(parse_duration("2").unwrap(), Duration::from_secs(2));
    }

    #[test]
    fn parse_duration_millis() {
        assert_eq!(parse_duration("150ms").unwrap(), Duration::from_millis(150));
    }

    #[test]
    fn parse_duration_invalid() {
        assert_eq!(parse_duration("0s").unwrap_err().code, USAGE);
        assert_eq!(parse_duration("bad").unwrap_err().code, USAGE);
        assert_eq!(parse_duration("").unwrap_err().code, USAGE);
    }
}
