use steplink_link::AxisMask;

use crate::cmd::{axis_mask, connect, StopArgs};
use crate::exit::{link_error, CliError, CliResult, FAILURE, SUCCESS};

pub fn run(args: StopArgs) -> CliResult<i32> {
    let mask = match &args.axes {
        Some(axes) => axis_mask(axes)?,
        None => AxisMask::ALL,
    };
    let link = connect(&args.connect)?;

    let receipt = link
        .stop(mask)
        .map_err(|err| link_error("stop failed", err))?;

    if !receipt.delivered() {
        return Err(CliError::new(
            FAILURE,
            "stop command was not acknowledged".to_string(),
        ));
    }
    Ok(SUCCESS)
}
