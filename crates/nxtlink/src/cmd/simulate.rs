use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use nxtlink_frame::{FrameReader, FrameWriter};
use nxtlink_proto::{encode_ls_read_reply, Request};
use nxtlink_transport::{LinkStream, UnixDomainSocket};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::cmd::{install_ctrlc_handler, Context, SimulateArgs};
use crate::exit::{frame_error, transport_error, CliResult, SUCCESS};
use crate::output::{print_json, OutputFormat};

/// Input type a port must be set to before it answers LS reads.
const SENSOR_TYPE_LOWSPEED_9V: u8 = 0x0B;
/// "Specified channel/connection not configured or busy".
const STATUS_NOT_CONFIGURED: u8 = 0xE0;

#[derive(Serialize)]
struct SimulateOutput {
    socket: String,
    distance: u8,
}

/// What the simulated brick remembers between telegrams on one link.
#[derive(Debug, Default)]
struct Brick {
    distance: u8,
    lowspeed_ports: BTreeSet<u8>,
    outputs: [i8; 3],
}

impl Brick {
    fn new(distance: u8) -> Self {
        Self {
            distance,
            ..Self::default()
        }
    }

    /// Apply one request; returns the reply payload if the request wants one.
    fn apply(&mut self, request: &Request) -> Option<Vec<u8>> {
        match request {
            Request::KeepAlive => debug!("keepalive"),
            Request::SetOutputState { port, power, .. } => {
                if *port == 0xFF {
                    self.outputs = [*power; 3];
                } else if let Some(slot) = self.outputs.get_mut(usize::from(*port)) {
                    *slot = *power;
                }
                info!(port = *port, power = *power, outputs = ?self.outputs, "set output state");
            }
            Request::SetInputMode {
                port, sensor_type, ..
            } => {
                if *sensor_type == SENSOR_TYPE_LOWSPEED_9V {
                    self.lowspeed_ports.insert(*port);
                } else {
                    self.lowspeed_ports.remove(port);
                }
                info!(port = *port, sensor_type = *sensor_type, "set input mode");
            }
            Request::LsWrite { port, data, .. } => {
                debug!(port = *port, ?data, "ls write");
            }
            Request::LsRead { port } => {
                let status = if self.lowspeed_ports.contains(port) {
                    0
                } else {
                    STATUS_NOT_CONFIGURED
                };
                info!(port = *port, status, distance = self.distance, "ls read");
                return Some(encode_ls_read_reply(status, &[self.distance]).to_vec());
            }
        }
        None
    }
}

pub fn run(args: SimulateArgs, ctx: &Context) -> CliResult<i32> {
    let socket =
        UnixDomainSocket::bind(&args.path).map_err(|err| transport_error("bind failed", err))?;

    let running = Arc::new(AtomicBool::new(true));
    install_ctrlc_handler(running.clone(), Some(socket.path().to_path_buf()))?;

    let out = SimulateOutput {
        socket: socket.path().display().to_string(),
        distance: args.distance,
    };
    match ctx.format {
        OutputFormat::Json => print_json(&out),
        OutputFormat::Table | OutputFormat::Pretty => {
            println!("Simulated brick on {} (distance {})", out.socket, out.distance);
        }
    }

    // One link at a time, like the real radio.
    while running.load(Ordering::SeqCst) {
        let stream = socket
            .accept()
            .map_err(|err| transport_error("accept failed", err))?;
        if !running.load(Ordering::SeqCst) {
            break;
        }
        info!("link opened");
        if let Err(err) = serve_link(stream, &mut Brick::new(args.distance)) {
            warn!(error = %err, "link failed");
        }
        info!("link closed");
    }

    Ok(SUCCESS)
}

fn serve_link(stream: LinkStream, brick: &mut Brick) -> CliResult<()> {
    let reader_stream = stream
        .try_clone()
        .map_err(|err| transport_error("clone failed", err))?;
    let mut reader = FrameReader::new(reader_stream);
    let mut writer = FrameWriter::new(stream);

    loop {
        let frame = match reader.read_frame() {
            Ok(frame) => frame,
            Err(err) if err.is_disconnect() => return Ok(()),
            Err(err) => return Err(frame_error("read failed", err)),
        };
        let request = match Request::parse(&frame.payload) {
            Ok(request) => request,
            Err(err) => {
                warn!(error = %err, "ignoring telegram");
                continue;
            }
        };
        if let Some(reply) = brick.apply(&request) {
            writer
                .send(&reply)
                .map_err(|err| frame_error("reply failed", err))?;
        }
    }
}
