//! Host-side driver for a three-axis serial stepper-motor controller.
//!
//! The crates compose bottom-up:
//! - [`steplink_transport`]: wire framing and serial-port access
//! - [`steplink_codec`]: typed wire values and the telemetry layout
//! - [`steplink_link`]: the communication & reliability engine
//!
//! This umbrella re-exports the pieces most callers need:
//!
//! ```no_run
//! use steplink::{open_port, AxisMask, LinkConfig, MotorLink, DEFAULT_BAUD};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let (reader, writer) = open_port("/dev/ttyUSB0", DEFAULT_BAUD)?;
//! let link = MotorLink::start(reader, writer, LinkConfig::default());
//!
//! link.wait_for_connection(Some(std::time::Duration::from_secs(2)));
//! link.rotate_to(AxisMask::AXIS1, 90.0)?;
//! link.wait_axis_idle(0, Some(std::time::Duration::from_secs(30)));
//! # Ok(())
//! # }
//! ```

pub use steplink_codec::{AxisStatus, CodecError, Kind, MotorStatus, TelemetryFrame, Value,
    WireValue};
pub use steplink_link::{
    checksum_key, AckOutcome, AxisMask, Event, EventOp, EventRegistry, LinkConfig, LinkError,
    MotorLink, SendReceipt, EVENT_KEY_DOUBLE, EVENT_KEY_LONG, EVENT_KEY_SHORT,
};
pub use steplink_transport::{open_port, FrameReader, FrameWriter, TransportError, DEFAULT_BAUD};
