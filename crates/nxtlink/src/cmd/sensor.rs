use nxtlink_proto::SensorPort;

use crate::cmd::{connect_client, parse_duration, Context, SensorArgs};
use crate::exit::{client_error, CliError, CliResult, SUCCESS, USAGE};
use crate::output::{print_readings, ReadingOutput};

pub fn run(args: SensorArgs, ctx: &Context) -> CliResult<i32> {
    let port = SensorPort::try_from(args.port).map_err(|err| CliError::new(USAGE, err.to_string()))?;
    let timeout = parse_duration(&args.timeout)?;

    let client = connect_client(&ctx.socket, "nxtlink-sensor", timeout)?;
    let port_index = i32::from(port.index());
    client
        .configure_ultrasonic_sensor(port_index)
        .map_err(|err| client_error("configure sensor failed", err))?;
    let distance = client
        .read_ultrasonic_sensor(port_index)
        .map_err(|err| client_error("read sensor failed", err))?;

    print_readings(&[ReadingOutput::new(port.index(), &Ok(distance))], ctx.format);
    client.release();
    Ok(SUCCESS)
}
