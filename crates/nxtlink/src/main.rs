mod cmd;
mod exit;
mod logging;
mod output;

use std::path::PathBuf;

use clap::Parser;
use nxtlink_service::{socket_path_for, SERVICE_ADDRESS};

use crate::cmd::{Command, Context};
use crate::logging::{init_logging, LogFormat, LogLevel};
use crate::output::OutputFormat;

#[derive(Parser, Debug)]
#[command(name = "nxtlink", version, about = "LEGO NXT brick control over Bluetooth")]
struct Cli {
    /// Output format.
    #[arg(long, value_name = "FORMAT", global = true)]
    format: Option<OutputFormat>,

    /// Log output format (stderr).
    #[arg(long, value_name = "FORMAT", default_value = "text", global = true)]
    log_format: LogFormat,

    /// Minimum log level for nxtlink's own events (stderr).
    #[arg(
        long,
        value_name = "LEVEL",
        env = "NXTLINK_LOG",
        default_value = "info",
        global = true
    )]
    log_level: LogLevel,

    /// Connection service address, or a socket path when it contains '/'.
    #[arg(
        long,
        value_name = "ADDRESS",
        env = "NXTLINK_ADDRESS",
        default_value = SERVICE_ADDRESS,
        global = true
    )]
    address: String,

    #[command(subcommand)]
    command: Command,
}

fn socket_for(address: &str) -> PathBuf {
    if address.contains('/') {
        PathBuf::from(address)
    } else {
        socket_path_for(address)
    }
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.log_format, cli.log_level);

    let ctx = Context {
        format: cli.format.unwrap_or_else(OutputFormat::default_for_stdout),
        socket: socket_for(&cli.address),
    };
    let result = cmd::run(cli.command, &ctx);

    match result {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(err.code);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_motor_with_negative_power() {
        let cli = Cli::try_parse_from(["nxtlink", "motor", "2", "-75", "--hold", "1s"])
            .expect("motor args should parse");
        match cli.command {
            Command::Motor(args) => {
                assert_eq!(args.motor, 2);
                assert_eq!(args.power, -75);
                assert_eq!(args.hold.as_deref(), Some("1s"));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn parses_watch_port_list() {
        let cli = Cli::try_parse_from(["nxtlink", "watch", "--ports", "3,0", "--count", "2"])
            .expect("watch args should parse");
        match cli.command {
            Command::Watch(args) => {
                assert_eq!(args.ports, vec![3, 0]);
                assert_eq!(args.count, Some(2));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn address_with_slash_is_a_path() {
        assert_eq!(socket_for("/tmp/nxt.sock"), PathBuf::from("/tmp/nxt.sock"));
        assert!(socket_for(SERVICE_ADDRESS).ends_with(format!("{SERVICE_ADDRESS}.sock")));
    }

    #[test]
    fn rejects_missing_subcommand() {
        let err = Cli::try_parse_from(["nxtlink"]).expect_err("subcommand is required");
        assert_eq!(
            err.kind(),
            clap::error::ErrorKind::DisplayHelpOnMissingArgumentOrSubcommand
        );
    }
}
