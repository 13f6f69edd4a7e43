//! Communication and reliability engine for the steplink motor controller.
//!
//! This is the "just works" layer. [`MotorLink`] owns the framed transport
//! halves and a single background receive thread that dispatches inbound
//! telemetry, acknowledgement and event frames, emits heartbeats, and
//! tracks connection liveness. Outbound commands go through a serialized
//! send path with optional acknowledgement and bounded retransmission.

pub mod command;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;

pub use command::{AxisMask, OPT_HEARTBEAT, OPT_ROTATE_BY, OPT_ROTATE_TO, OPT_SET_SPEED,
    OPT_SET_TARGET_ANGLE, OPT_STOP};
pub use config::LinkConfig;
pub use engine::{checksum_key, AckOutcome, MotorLink, SendReceipt, FRAME_ACK, FRAME_EVENT,
    FRAME_TELEMETRY};
pub use error::{LinkError, Result};
pub use events::{Event, EventOp, EventRegistry, EVENT_KEY_DOUBLE, EVENT_KEY_LONG,
    EVENT_KEY_SHORT};
