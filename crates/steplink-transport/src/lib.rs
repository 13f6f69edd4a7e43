//! Serial wire framing and port access for the steplink motor controller.
//!
//! Every unit exchanged with the device is a delimited frame:
//! - Outbound (host → device): `[0xAA 0x22][option][len][payload][checksum]`
//! - Inbound (device → host): `[0xAA 0x55][len][type][payload][checksum]`
//!
//! The checksum is the wrapping byte sum of everything before it. Inbound
//! delimiting is a per-byte state machine that resynchronizes on garbage;
//! a corrupt frame is dropped, never fatal to the stream.
//!
//! This is the lowest layer of steplink. Everything else consumes the
//! validated `(type, payload)` pairs produced here.

pub mod error;
pub mod framing;
pub mod port;
pub mod reader;
pub mod writer;

pub use error::{Result, TransportError};
pub use framing::{
    encode_command, encode_inbound, Delimiter, InboundFrame, MAX_PAYLOAD, RX_START, TX_START,
};
pub use port::{open_port, DEFAULT_BAUD};
pub use reader::FrameReader;
pub use writer::FrameWriter;
