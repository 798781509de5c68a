use std::thread;

use crate::cmd::{connect_client, parse_duration, Context, MotorArgs};
use crate::exit::{client_error, CliResult, SUCCESS};
use crate::output::print_motor;

/// The service stops every motor when its last client detaches, so without
/// `--hold` the motor only keeps turning while another client is attached.
pub fn run(args: MotorArgs, ctx: &Context) -> CliResult<i32> {
    let timeout = parse_duration(&args.timeout)?;
    let hold = args.hold.as_deref().map(parse_duration).transpose()?;

    let client = connect_client(&ctx.socket, "nxtlink-motor", timeout)?;
    client
        .set_motor(args.motor, args.power)
        .map_err(|err| client_error("set motor failed", err))?;
    print_motor(args.motor, args.power, ctx.format);

    if let Some(hold) = hold {
        thread::sleep(hold);
        client
            .set_motor(args.motor, 0)
            .map_err(|err| client_error("stop motor failed", err))?;
        print_motor(args.motor, 0, ctx.format);
    }

    client.release();
    Ok(SUCCESS)
}
