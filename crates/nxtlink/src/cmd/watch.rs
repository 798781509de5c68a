use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::RecvTimeoutError;
use std::sync::Arc;
use std::time::Duration;

use nxtlink_proto::SensorPort;
use nxtlink_service::SensorPoller;

use crate::cmd::{connect_client, install_ctrlc_handler, parse_duration, Context, WatchArgs};
use crate::exit::{client_error, io_error, CliError, CliResult, SUCCESS, USAGE};
use crate::output::{print_readings, ReadingOutput};

pub fn run(args: WatchArgs, ctx: &Context) -> CliResult<i32> {
    let mut ports = args
        .ports
        .iter()
        .map(|&port| SensorPort::try_from(port))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|err| CliError::new(USAGE, err.to_string()))?;
    ports.sort();
    ports.dedup();
    if ports.is_empty() {
        return Err(CliError::new(USAGE, "at least one port is required"));
    }
    let interval = parse_duration(&args.interval)?;
    let timeout = parse_duration(&args.timeout)?;

    let client = connect_client(&ctx.socket, "nxtlink-watch", timeout)?;
    for port in &ports {
        client
            .configure_ultrasonic_sensor(i32::from(port.index()))
            .map_err(|err| client_error("configure sensor failed", err))?;
    }

    let running = Arc::new(AtomicBool::new(true));
    install_ctrlc_handler(running.clone(), None)?;

    let (poller, samples) = SensorPoller::spawn(client.clone(), ports.clone(), interval)
        .map_err(|err| io_error("poller start failed", err))?;

    let mut sweep = Vec::with_capacity(ports.len());
    let mut sweeps = 0usize;
    while running.load(Ordering::SeqCst) {
        let sample = match samples.recv_timeout(Duration::from_millis(200)) {
            Ok(sample) => sample,
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        };
        sweep.push(ReadingOutput::new(sample.port.index(), &sample.reading));
        if sweep.len() < ports.len() {
            continue;
        }

        print_readings(&sweep, ctx.format);
        sweep.clear();
        sweeps += 1;
        if args.count.is_some_and(|count| sweeps >= count) {
            break;
        }
    }

    poller.stop();
    client.release();
    Ok(SUCCESS)
}
