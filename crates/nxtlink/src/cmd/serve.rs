use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use nxtlink_service::{version_code, ConnectionService, ServiceConfig, ServiceListener, SessionConfig};
use nxtlink_transport::StaticDirectory;
use serde::Serialize;
use tracing::{info, warn};

use crate::cmd::{install_ctrlc_handler, parse_duration, Context, ServeArgs};
use crate::exit::{service_error, CliResult, SUCCESS};
use crate::output::{print_json, OutputFormat};

#[derive(Serialize)]
struct ServeOutput<'a> {
    socket: String,
    device_name: &'a str,
    paired: Vec<String>,
    version_code: i32,
}

pub fn run(args: ServeArgs, ctx: &Context) -> CliResult<i32> {
    let read_timeout = args.read_timeout.as_deref().map(parse_duration).transpose()?;
    if !args.paired.iter().any(|device| device.name == args.device_name) {
        warn!(device = %args.device_name, "device is not in the paired list; connect will fail");
    }

    let paired: Vec<String> = args
        .paired
        .iter()
        .map(|device| format!("{}={}", device.name, device.handle))
        .collect();
    let config = ServiceConfig {
        session: SessionConfig {
            device_name: args.device_name.clone(),
            read_timeout,
            ..SessionConfig::default()
        },
        ..ServiceConfig::default()
    };

    let service = ConnectionService::start(StaticDirectory::new(args.paired), config)
        .map_err(|err| service_error("service start failed", err))?;
    let listener = ServiceListener::bind(&ctx.socket, Arc::new(service))
        .map_err(|err| service_error("bind failed", err))?;

    let running = Arc::new(AtomicBool::new(true));
    install_ctrlc_handler(running.clone(), Some(listener.path().to_path_buf()))?;

    let out = ServeOutput {
        socket: listener.path().display().to_string(),
        device_name: &args.device_name,
        paired,
        version_code: version_code(),
    };
    match ctx.format {
        OutputFormat::Json => print_json(&out),
        OutputFormat::Table | OutputFormat::Pretty => {
            println!("Connection service:");
            println!("  Socket:  {}", out.socket);
            println!("  Device:  {}", out.device_name);
            println!("  Paired:  {}", out.paired.join(", "));
            println!("  Version: {}", out.version_code);
        }
    }

    listener
        .serve(&running)
        .map_err(|err| service_error("accept failed", err))?;

    // Clients still attached keep the service alive; stop the motors anyway.
    if let Err(err) = listener.service().shutdown() {
        warn!(error = %err, "shutdown on exit failed");
    }
    info!("connection service exiting");
    Ok(SUCCESS)
}
