use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{Result, TransportError};

/// Start bytes for outbound (host → device) frames.
pub const TX_START: [u8; 2] = [0xAA, 0x22];

/// Start bytes for inbound (device → host) frames.
pub const RX_START: [u8; 2] = [0xAA, 0x55];

/// Maximum payload size. The length byte counts the type byte plus the
/// payload, so a payload can occupy at most 254 of its 255 values.
pub const MAX_PAYLOAD: usize = 254;

/// A validated inbound frame: the type discriminator and its payload,
/// with start bytes, length and checksum already stripped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundFrame {
    /// Frame type: 0x01 telemetry, 0x02 acknowledgement, 0x03 event.
    pub kind: u8,
    /// The frame payload.
    pub payload: Bytes,
}

/// Encode an outbound command frame into the wire format.
///
/// Wire format:
/// ```text
/// ┌────────────┬────────┬───────┬──────────────┬──────────┐
/// │ Start (2B) │ Option │ Len   │ Payload      │ Checksum │
/// │ 0xAA 0x22  │ (1B)   │ (1B)  │ (Len bytes)  │ (1B)     │
/// └────────────┴────────┴───────┴──────────────┴──────────┘
/// ```
/// The checksum is the wrapping byte sum of every preceding byte.
pub fn encode_command(option: u8, payload: &[u8], dst: &mut BytesMut) -> Result<()> {
    if payload.len() > MAX_PAYLOAD {
        return Err(TransportError::PayloadTooLarge {
            size: payload.len(),
            max: MAX_PAYLOAD,
        });
    }
    let start = dst.len();
    dst.reserve(5 + payload.len());
    dst.put_slice(&TX_START);
    dst.put_u8(option);
    dst.put_u8(payload.len() as u8);
    dst.put_slice(payload);

    let sum = wrapping_sum(&dst[start..]);
    dst.put_u8(sum);
    Ok(())
}

fn wrapping_sum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0u8, |acc, &b| acc.wrapping_add(b))
}

/// Per-byte delimiter for the inbound wire format.
///
/// Feed bytes with [`Delimiter::push`]; a complete, checksum-valid frame is
/// returned as `Ok(Some(frame))`. Bytes that do not fit the format reset the
/// machine back to start-byte hunting, so the delimiter self-synchronizes
/// after line noise or a partial frame.
#[derive(Debug, Default)]
pub struct Delimiter {
    state: ParseState,
    kind: u8,
    remaining: u8,
    sum: u8,
    payload: BytesMut,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
enum ParseState {
    #[default]
    Start1,
    Start2,
    Length,
    Kind,
    Payload,
    Checksum,
}

impl Delimiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Advance the machine by one byte.
    ///
    /// Returns `Ok(Some(_))` when the byte completes a valid frame,
    /// `Ok(None)` while a frame is still in progress, and
    /// `Err(ChecksumMismatch)` when a structurally complete frame fails
    /// validation (the frame is discarded and the machine reset).
    pub fn push(&mut self, byte: u8) -> Result<Option<InboundFrame>> {
        match self.state {
            ParseState::Start1 => {
                if byte == RX_START[0] {
                    self.state = ParseState::Start2;
                }
            }
            ParseState::Start2 => {
                if byte == RX_START[1] {
                    self.state = ParseState::Length;
                    self.sum = RX_START[0].wrapping_add(RX_START[1]);
                } else if byte != RX_START[0] {
                    // 0xAA 0xAA 0x55 is a valid prefix; anything else resets.
                    self.state = ParseState::Start1;
                }
            }
            ParseState::Length => {
                if byte == 0 {
                    // Length counts the type byte, so zero is never valid.
                    self.reset();
                    return Ok(None);
                }
                self.sum = self.sum.wrapping_add(byte);
                self.remaining = byte - 1;
                self.state = ParseState::Kind;
            }
            ParseState::Kind => {
                self.kind = byte;
                self.sum = self.sum.wrapping_add(byte);
                self.payload.clear();
                self.state = if self.remaining == 0 {
                    ParseState::Checksum
                } else {
                    ParseState::Payload
                };
            }
            ParseState::Payload => {
                self.payload.put_u8(byte);
                self.sum = self.sum.wrapping_add(byte);
                self.remaining -= 1;
                if self.remaining == 0 {
                    self.state = ParseState::Checksum;
                }
            }
            ParseState::Checksum => {
                let expected = self.sum;
                let kind = self.kind;
                let payload = self.payload.split().freeze();
                self.reset();
                if byte != expected {
                    return Err(TransportError::ChecksumMismatch {
                        expected,
                        actual: byte,
                    });
                }
                return Ok(Some(InboundFrame { kind, payload }));
            }
        }
        Ok(None)
    }

    fn reset(&mut self) {
        self.state = ParseState::Start1;
        self.kind = 0;
        self.remaining = 0;
        self.sum = 0;
        self.payload.clear();
    }
}

/// Build the wire bytes of an inbound frame. Test helper for fake devices.
pub fn encode_inbound(kind: u8, payload: &[u8], dst: &mut BytesMut) -> Result<()> {
    if payload.len() > MAX_PAYLOAD {
        return Err(TransportError::PayloadTooLarge {
            size: payload.len(),
            max: MAX_PAYLOAD,
        });
    }
    let start = dst.len();
    dst.reserve(5 + payload.len());
    dst.put_slice(&RX_START);
    dst.put_u8(payload.len() as u8 + 1);
    dst.put_u8(kind);
    dst.put_slice(payload);

    let sum = wrapping_sum(&dst[start..]);
    dst.put_u8(sum);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed(delim: &mut Delimiter, bytes: &[u8]) -> Vec<Result<Option<InboundFrame>>> {
        bytes.iter().map(|&b| delim.push(b)).collect()
    }

    fn collect_frames(bytes: &[u8]) -> Vec<InboundFrame> {
        let mut delim = Delimiter::new();
        feed(&mut delim, bytes)
            .into_iter()
            .filter_map(|r| r.ok().flatten())
            .collect()
    }

    #[test]
    fn encode_command_layout() {
        let mut buf = BytesMut::new();
        encode_command(0x03, &[0x01, 0x10, 0x27, 0x00, 0x00], &mut buf).unwrap();

        assert_eq!(buf[0], 0xAA);
        assert_eq!(buf[1], 0x22);
        assert_eq!(buf[2], 0x03);
        assert_eq!(buf[3], 5);
        assert_eq!(&buf[4..9], &[0x01, 0x10, 0x27, 0x00, 0x00]);

        let sum: u8 = buf[..9].iter().fold(0u8, |acc, &b| acc.wrapping_add(b));
        assert_eq!(buf[9], sum);
    }

    #[test]
    fn encode_command_rejects_oversized_payload() {
        let mut buf = BytesMut::new();
        let payload = vec![0u8; MAX_PAYLOAD + 1];
        let err = encode_command(0x01, &payload, &mut buf).unwrap_err();
        assert!(matches!(err, TransportError::PayloadTooLarge { .. }));
    }

    #[test]
    fn delimits_single_frame() {
        let mut wire = BytesMut::new();
        encode_inbound(0x02, &[0x42], &mut wire).unwrap();

        let frames = collect_frames(&wire);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].kind, 0x02);
        assert_eq!(frames[0].payload.as_ref(), &[0x42]);
    }

    #[test]
    fn delimits_back_to_back_frames() {
        let mut wire = BytesMut::new();
        encode_inbound(0x03, &[0x02, 0x01], &mut wire).unwrap();
        encode_inbound(0x02, &[0x07], &mut wire).unwrap();

        let frames = collect_frames(&wire);
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].kind, 0x03);
        assert_eq!(frames[0].payload.as_ref(), &[0x02, 0x01]);
        assert_eq!(frames[1].kind, 0x02);
        assert_eq!(frames[1].payload.as_ref(), &[0x07]);
    }

    #[test]
    fn empty_payload_frame() {
        let mut wire = BytesMut::new();
        encode_inbound(0x01, &[], &mut wire).unwrap();
        // len byte counts only the type
        assert_eq!(wire[2], 1);

        let frames = collect_frames(&wire);
        assert_eq!(frames.len(), 1);
        assert!(frames[0].payload.is_empty());
    }

    #[test]
    fn resyncs_after_leading_garbage() {
        let mut wire = BytesMut::from(&[0x00, 0x13, 0xAA, 0x17][..]);
        encode_inbound(0x02, &[0x99], &mut wire).unwrap();

        let frames = collect_frames(&wire);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].payload.as_ref(), &[0x99]);
    }

    #[test]
    fn handles_repeated_start_byte() {
        // 0xAA 0xAA 0x55 must still lock onto the frame.
        let mut wire = BytesMut::new();
        wire.put_u8(0xAA);
        encode_inbound(0x02, &[0x05], &mut wire).unwrap();

        let frames = collect_frames(&wire);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].payload.as_ref(), &[0x05]);
    }

    #[test]
    fn checksum_mismatch_drops_frame_and_resyncs() {
        let mut wire = BytesMut::new();
        encode_inbound(0x02, &[0x42], &mut wire).unwrap();
        let last = wire.len() - 1;
        wire[last] = wire[last].wrapping_add(1);
        encode_inbound(0x02, &[0x43], &mut wire).unwrap();

        let mut delim = Delimiter::new();
        let results = feed(&mut delim, &wire);

        let errors: Vec<_> = results.iter().filter(|r| r.is_err()).collect();
        assert_eq!(errors.len(), 1);

        let frames: Vec<_> = results
            .into_iter()
            .filter_map(|r| r.ok().flatten())
            .collect();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].payload.as_ref(), &[0x43]);
    }

    #[test]
    fn zero_length_resets_machine() {
        let mut wire = BytesMut::from(&[0xAA, 0x55, 0x00][..]);
        encode_inbound(0x02, &[0x01], &mut wire).unwrap();

        let frames = collect_frames(&wire);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].payload.as_ref(), &[0x01]);
    }

    #[test]
    fn inbound_roundtrip_max_payload() {
        let payload = vec![0x5A; MAX_PAYLOAD];
        let mut wire = BytesMut::new();
        encode_inbound(0x01, &payload, &mut wire).unwrap();

        let frames = collect_frames(&wire);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].payload.as_ref(), payload.as_slice());
    }
}
