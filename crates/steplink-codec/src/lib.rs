//! Typed wire-value codec and telemetry frame layout.
//!
//! The device speaks fixed-width little-endian integers, often carrying
//! fixed-point fractions (a 32-bit angle scaled by 0.001). [`WireValue`]
//! converts between those wire integers and application-level numbers or
//! booleans; [`TelemetryFrame`] stacks an ordered list of them into the
//! periodic status frame's exact byte layout.

pub mod error;
pub mod telemetry;
pub mod value;

pub use error::{CodecError, Result};
pub use telemetry::{AxisStatus, Field, MotorStatus, TelemetryFrame, AXES, FIELDS_PER_AXIS};
pub use value::{Kind, Value, WireValue};
