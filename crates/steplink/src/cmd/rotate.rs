use std::time::Duration;

use crate::cmd::{axis_mask, connect, RotateArgs};
use crate::exit::{link_error, CliError, CliResult, SUCCESS, TIMEOUT};

const IDLE_WAIT_BUDGET: Duration = Duration::from_secs(30);

pub fn run(args: RotateArgs) -> CliResult<i32> {
    let mask = axis_mask(&args.axes)?;
    let link = connect(&args.connect)?;

    let receipt = if args.relative {
        link.rotate_by(mask, args.angle)
    } else {
        link.rotate_to(mask, args.angle)
    }
    .map_err(|err| link_error("rotate failed", err))?;

    if !receipt.delivered() {
        return Err(CliError::new(
            crate::exit::FAILURE,
            "rotate command was not acknowledged".to_string(),
        ));
    }

    if args.wait_idle {
        for axis in &args.axes {
            let index = (*axis - 1) as usize;
            if !link.wait_axis_idle(index, Some(IDLE_WAIT_BUDGET)) {
                return Err(CliError::new(
                    TIMEOUT,
                    format!("axis {axis} still rotating after {IDLE_WAIT_BUDGET:?}"),
                ));
            }
        }
    }

    Ok(SUCCESS)
}
