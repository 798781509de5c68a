use nxtlink_service::{status, version_code, RemoteCall, RemoteReply, RemoteService, ServiceConnector};
use serde::Serialize;
use tracing::debug;

use crate::cmd::{Context, VersionArgs};
use crate::exit::{CliResult, SUCCESS};
use crate::output::{print_json, OutputFormat};

#[derive(Serialize)]
struct VersionOutput {
    name: &'static str,
    version: &'static str,
    version_code: i32,
    /// `-1` when no service answers on the configured address.
    service_version_code: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    build: Option<BuildInfo>,
}

#[derive(Serialize)]
struct BuildInfo {
    target: &'static str,
    target_os: &'static str,
    target_arch: &'static str,
    rustc: &'static str,
    git_hash: &'static str,
}

pub fn run(args: VersionArgs, ctx: &Context) -> CliResult<i32> {
    let out = VersionOutput {
        name: "nxtlink",
        version: env!("CARGO_PKG_VERSION"),
        version_code: version_code(),
        service_version_code: service_version(ctx),
        build: args.extended.then(|| BuildInfo {
            target: option_env!("NXTLINK_BUILD_TARGET").unwrap_or("unknown"),
            target_os: std::env::consts::OS,
            target_arch: std::env::consts::ARCH,
            rustc: option_env!("RUSTC_VERSION").unwrap_or("unknown"),
            git_hash: option_env!("GIT_HASH").unwrap_or("unknown"),
        }),
    };

    match ctx.format {
        OutputFormat::Json => print_json(&out),
        OutputFormat::Table | OutputFormat::Pretty => {
            println!("{} {} (code {})", out.name, out.version, out.version_code);
            match out.service_version_code {
                status::UNKNOWN_VERSION => println!("service: unreachable"),
                code => println!("service: code {code}"),
            }
            if let Some(build) = &out.build {
                println!("target: {}", build.target);
                println!("target_os: {}", build.target_os);
                println!("target_arch: {}", build.target_arch);
                println!("rustc: {}", build.rustc);
                println!("git_hash: {}", build.git_hash);
            }
        }
    }
    Ok(SUCCESS)
}

/// Ask the service directly rather than binding, so no link to the brick is opened.
fn service_version(ctx: &Context) -> i32 {
    let reply = ServiceConnector::connect(&ctx.socket).and_then(|connector| {
        connector.call(RemoteCall::GetVersion {
            client: "nxtlink-version".into(),
        })
    });
    match reply {
        Ok(RemoteReply::Version { code }) => code,
        Ok(other) => {
            debug!(reply = ?other, "unexpected version reply");
            status::UNKNOWN_VERSION
        }
        Err(err) => {
            debug!(error = %err, "service unreachable");
            status::UNKNOWN_VERSION
        }
    }
}
