use std::time::Duration;

use clap::{Args, Subcommand};
use serialport::SerialPort;
use steplink_link::{AxisMask, LinkConfig, MotorLink};
use steplink_transport::{open_port, DEFAULT_BAUD};

use crate::exit::{transport_error, CliError, CliResult, USAGE};
use crate::output::OutputFormat;

pub mod monitor;
pub mod rotate;
pub mod speed;
pub mod stop;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Connect and render the live motor status.
    Monitor(MonitorArgs),
    /// Rotate axes to an absolute angle, or by a relative one.
    Rotate(RotateArgs),
    /// Set the rotation speed of axes.
    Speed(SpeedArgs),
    /// Stop rotation of axes.
    Stop(StopArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Monitor(args) => monitor::run(args, format),
        Command::Rotate(args) => rotate::run(args),
        Command::Speed(args) => speed::run(args),
        Command::Stop(args) => stop::run(args),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug)]
pub struct ConnectArgs {
    /// Serial port path (e.g. /dev/ttyUSB0).
    pub port: String,
    /// Bit rate of the controller UART.
    #[arg(long, default_value_t = DEFAULT_BAUD)]
    pub baud: u32,
    /// Connection wait budget in seconds.
    #[arg(long, default_value_t = 3.0)]
    pub connect_timeout: f64,
}

#[derive(Args, Debug)]
pub struct MonitorArgs {
    #[command(flatten)]
    pub connect: ConnectArgs,
    /// Refresh interval in milliseconds.
    #[arg(long, default_value_t = 250)]
    pub interval_ms: u64,
}

#[derive(Args, Debug)]
pub struct RotateArgs {
    #[command(flatten)]
    pub connect: ConnectArgs,
    /// Axes to drive (1-3, comma-separated).
    #[arg(long, value_delimiter = ',', required = true)]
    pub axes: Vec<u8>,
    /// Target angle in degrees.
    #[arg(long)]
    pub angle: f64,
    /// Interpret the angle as relative to the current position.
    #[arg(long)]
    pub relative: bool,
    /// Block until the driven axes report idle.
    #[arg(long)]
    pub wait_idle: bool,
}

#[derive(Args, Debug)]
pub struct SpeedArgs {
    #[command(flatten)]
    pub connect: ConnectArgs,
    /// Axes to drive (1-3, comma-separated).
    #[arg(long, value_delimiter = ',', required = true)]
    pub axes: Vec<u8>,
    /// Speed in deg/s.
    #[arg(long)]
    pub deg_per_s: f64,
}

#[derive(Args, Debug)]
pub struct StopArgs {
    #[command(flatten)]
    pub connect: ConnectArgs,
    /// Axes to stop (1-3, comma-separated). Default: all.
    #[arg(long, value_delimiter = ',')]
    pub axes: Option<Vec<u8>>,
}

#[derive(Args, Debug, Default)]
pub struct VersionArgs {
    /// Show extended build information.
    #[arg(long)]
    pub extended: bool,
}

/// Open the port, start the engine, and wait for the first telemetry.
pub fn connect(args: &ConnectArgs) -> CliResult<MotorLink<Box<dyn SerialPort>>> {
    let (reader, writer) = open_port(&args.port, args.baud)
        .map_err(|err| transport_error("open failed", err))?;
    let link = MotorLink::start(reader, writer, LinkConfig::default());

    let timeout = Duration::from_secs_f64(args.connect_timeout);
    if !link.wait_for_connection(Some(timeout)) {
        return Err(CliError::new(
            crate::exit::TIMEOUT,
            format!("no telemetry from {} within {timeout:?}", args.port),
        ));
    }
    Ok(link)
}

/// Convert 1-based axis numbers into the wire mask.
pub fn axis_mask(axes: &[u8]) -> CliResult<AxisMask> {
    let mut mask: Option<AxisMask> = None;
    for &axis in axes {
        let bit = match axis {
            1 => AxisMask::AXIS1,
            2 => AxisMask::AXIS2,
            3 => AxisMask::AXIS3,
            other => {
                return Err(CliError::new(USAGE, format!("axis {other} out of range (1-3)")))
            }
        };
        mask = Some(match mask {
            Some(mask) => mask | bit,
            None => bit,
        });
    }
    mask.ok_or_else(|| CliError::new(USAGE, "no axes selected".to_string()))
}
