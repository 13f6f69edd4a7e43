use crate::cmd::{axis_mask, connect, SpeedArgs};
use crate::exit::{link_error, CliError, CliResult, FAILURE, SUCCESS};

pub fn run(args: SpeedArgs) -> CliResult<i32> {
    let mask = axis_mask(&args.axes)?;
    let link = connect(&args.connect)?;

    let receipt = link
        .set_speed(mask, args.deg_per_s)
        .map_err(|err| link_error("set speed failed", err))?;

    if !receipt.delivered() {
        return Err(CliError::new(
            FAILURE,
            "speed command was not acknowledged".to_string(),
        ));
    }
    Ok(SUCCESS)
}
