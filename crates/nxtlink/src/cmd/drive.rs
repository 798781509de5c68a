use std::io::BufRead;

use tracing::warn;

use crate::cmd::{connect_client, parse_duration, Context, DriveArgs};
use crate::exit::{client_error, io_error, CliError, CliResult, SUCCESS, USAGE};
use crate::output::print_motor;

const MOTOR_A: i32 = 0;
const MOTOR_C: i32 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Action {
    Drive { a: i32, c: i32 },
    Quit,
}

fn parse_action(line: &str, power: i32) -> Option<Action> {
    let action = match line.trim().to_ascii_lowercase().as_str() {
        "forward" | "f" | "w" => Action::Drive { a: power, c: power },
        "backward" | "b" | "s" => Action::Drive {
            a: -power,
            c: -power,
        },
        "left" | "l" | "a" => Action::Drive {
            a: power,
            c: -power,
        },
        "right" | "r" | "d" => Action::Drive {
            a: -power,
            c: power,
        },
        "stop" | "x" | "" => Action::Drive { a: 0, c: 0 },
        "quit" | "q" | "exit" => Action::Quit,
        _ => return None,
    };
    Some(action)
}

pub fn run(args: DriveArgs, ctx: &Context) -> CliResult<i32> {
    if !(0..=100).contains(&args.power) {
        return Err(CliError::new(USAGE, "power must be within 0..=100"));
    }
    let timeout = parse_duration(&args.timeout)?;
    let client = connect_client(&ctx.socket, "nxtlink-drive", timeout)?;

    let stdin = std::io::stdin();
    for line in stdin.lock().lines() {
        let line = line.map_err(|err| io_error("stdin read failed", err))?;
        match parse_action(&line, args.power) {
            Some(Action::Drive { a, c }) => {
                client
                    .set_motor(MOTOR_A, a)
                    .map_err(|err| client_error("set motor failed", err))?;
                client
                    .set_motor(MOTOR_C, c)
                    .map_err(|err| client_error("set motor failed", err))?;
                print_motor(MOTOR_A, a, ctx.format);
                print_motor(MOTOR_C, c, ctx.format);
            }
            Some(Action::Quit) => break,
            None => warn!(command = %line.trim(), "unknown drive command"),
        }
    }

    // Best effort: the service stops everything anyway when we detach last.
    let _ = client.set_motor(MOTOR_A, 0);
    let _ = client.set_motor(MOTOR_C, 0);
    client.release();
    Ok(SUCCESS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn turns_spin_wheels_in_opposite_directions() {
        assert_eq!(
            parse_action("left", 100),
            Some(Action::Drive { a: 100, c: -100 })
        );
        assert_eq!(
            parse_action(" RIGHT ", 60),
            Some(Action::Drive { a: -60, c: 60 })
        );
    }

    #[test]
    fn blank_line_stops() {
        assert_eq!(parse_action("", 100), Some(Action::Drive { a: 0, c: 0 }));
        assert_eq!(parse_action("q", 100), Some(Action::Quit));
        assert_eq!(parse_action("jump", 100), None);
    }
}
