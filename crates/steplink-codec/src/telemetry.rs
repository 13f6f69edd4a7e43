use serde::Serialize;

use crate::error::{CodecError, Result};
use crate::value::{Kind, WireValue};

/// Number of rotating axes in the reference controller.
pub const AXES: usize = 3;

/// Wire fields per axis: speed, angle, target angle, rotating flag,
/// direction flag.
pub const FIELDS_PER_AXIS: usize = 5;

/// One named field of a telemetry layout.
#[derive(Debug, Clone)]
pub struct Field {
    pub name: &'static str,
    pub value: WireValue,
}

impl Field {
    pub fn new(name: &'static str, value: WireValue) -> Self {
        Self { name, value }
    }
}

/// The periodic status frame: an explicit ordered list of field
/// descriptors whose declaration order *is* the byte layout.
///
/// Decoding walks the list in order, each field consuming exactly its wire
/// width with no padding in between. There is no per-frame checksum here;
/// that belongs to the transport frame. The input length is validated
/// before any field is touched, so a failed decode never leaves the frame
/// partially updated.
#[derive(Debug, Clone)]
pub struct TelemetryFrame {
    fields: Vec<Field>,
    wire_len: usize,
}

impl TelemetryFrame {
    /// Build a layout from an ordered field list.
    pub fn new(fields: Vec<Field>) -> Self {
        let wire_len = fields.iter().map(|f| f.value.byte_len()).sum();
        Self { fields, wire_len }
    }

    /// The three-axis stepper layout: per axis, a speed in deg/s (s32,
    /// ×0.01), current and target angles in deg (s32, ×0.001), and the
    /// rotating/direction flag bytes. 42 bytes total.
    pub fn motor_layout() -> Self {
        // Constructions cannot fail: every token below is a supported width.
        let axis = |names: [&'static str; FIELDS_PER_AXIS]| {
            [
                Field::new(
                    names[0],
                    WireValue::scaled("s32", Kind::Float, 0.01).expect("valid wire type"),
                ),
                Field::new(
                    names[1],
                    WireValue::scaled("s32", Kind::Float, 0.001).expect("valid wire type"),
                ),
                Field::new(
                    names[2],
                    WireValue::scaled("s32", Kind::Float, 0.001).expect("valid wire type"),
                ),
                Field::new(
                    names[3],
                    WireValue::new("u8", Kind::Bool).expect("valid wire type"),
                ),
                Field::new(
                    names[4],
                    WireValue::new("u8", Kind::Int).expect("valid wire type"),
                ),
            ]
        };

        let mut fields = Vec::with_capacity(AXES * FIELDS_PER_AXIS);
        fields.extend(axis([
            "axis1_speed",
            "axis1_angle",
            "axis1_target_angle",
            "axis1_rotating",
            "axis1_dir",
        ]));
        fields.extend(axis([
            "axis2_speed",
            "axis2_angle",
            "axis2_target_angle",
            "axis2_rotating",
            "axis2_dir",
        ]));
        fields.extend(axis([
            "axis3_speed",
            "axis3_angle",
            "axis3_target_angle",
            "axis3_rotating",
            "axis3_dir",
        ]));
        Self::new(fields)
    }

    /// Total byte length of the layout on the wire.
    pub fn wire_len(&self) -> usize {
        self.wire_len
    }

    /// The ordered field list.
    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    /// Decode one frame payload in place, mutating every field in
    /// declaration order.
    ///
    /// Fails with [`CodecError::LengthMismatch`], before touching any
    /// field, if the buffer is not exactly [`Self::wire_len`] bytes.
    pub fn decode(&mut self, buf: &[u8]) -> Result<()> {
        if buf.len() != self.wire_len {
            return Err(CodecError::LengthMismatch {
                expected: self.wire_len,
                actual: buf.len(),
            });
        }

        let mut offset = 0usize;
        for field in &mut self.fields {
            let width = field.value.byte_len();
            field.value.decode(&buf[offset..offset + width])?;
            offset += width;
        }
        Ok(())
    }

    /// Plain-data snapshot of the three-axis state.
    pub fn snapshot(&self) -> MotorStatus {
        let mut axes = [AxisStatus::default(); AXES];
        for (i, chunk) in self.fields.chunks(FIELDS_PER_AXIS).enumerate().take(AXES) {
            axes[i] = AxisStatus {
                speed: chunk[0].value.as_f64(),
                angle: chunk[1].value.as_f64(),
                target_angle: chunk[2].value.as_f64(),
                rotating: chunk[3].value.as_bool(),
                dir: chunk[4].value.as_i64() as u8,
            };
        }
        MotorStatus { axes }
    }
}

/// Decoded state of one axis.
#[derive(Debug, Default, Clone, Copy, PartialEq, Serialize)]
pub struct AxisStatus {
    /// Speed in deg/s.
    pub speed: f64,
    /// Current angle in deg.
    pub angle: f64,
    /// Target angle in deg.
    pub target_angle: f64,
    /// Whether the axis is currently rotating.
    pub rotating: bool,
    /// Rotation direction: 0 counter-clockwise, 1 clockwise.
    pub dir: u8,
}

/// Decoded state of all axes, as of the last telemetry frame.
#[derive(Debug, Default, Clone, Copy, PartialEq, Serialize)]
pub struct MotorStatus {
    pub axes: [AxisStatus; AXES],
}

impl AxisStatus {
    /// An axis is idle when it reports no rotation.
    pub fn idle(&self) -> bool {
        !self.rotating
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scaled_i32(v: f64, scale: f64) -> [u8; 4] {
        (((v / scale).round()) as i32).to_le_bytes()
    }

    #[test]
    fn motor_layout_is_42_bytes_of_15_fields() {
        let frame = TelemetryFrame::motor_layout();
        assert_eq!(frame.wire_len(), 42);
        assert_eq!(frame.fields().len(), AXES * FIELDS_PER_AXIS);
    }

    #[test]
    fn rejects_short_and_long_buffers_untouched() {
        let mut frame = TelemetryFrame::motor_layout();
        // Seed a recognizable value, then feed bad lengths.
        frame.decode(&make_payload(7.5, 0)).unwrap();

        for len in [41usize, 43] {
            let buf = vec![0u8; len];
            let err = frame.decode(&buf).unwrap_err();
            assert!(matches!(err, CodecError::LengthMismatch { .. }), "{len}");
        }

        // The failed decodes must not have zeroed anything.
        let snap = frame.snapshot();
        assert!((snap.axes[0].speed - 7.5).abs() < 0.005);
    }

    #[test]
    fn decodes_axis1_flags_scenario() {
        // All zeros except axis-1 rotating and direction flags.
        let mut buf = vec![0u8; 42];
        buf[12] = 1; // axis1 rotating
        buf[13] = 1; // axis1 dir

        let mut frame = TelemetryFrame::motor_layout();
        frame.decode(&buf).unwrap();

        let snap = frame.snapshot();
        assert!(snap.axes[0].rotating);
        assert_eq!(snap.axes[0].dir, 1);
        assert_eq!(snap.axes[0].speed, 0.0);
        assert_eq!(snap.axes[0].angle, 0.0);
        assert_eq!(snap.axes[0].target_angle, 0.0);
        assert!(!snap.axes[1].rotating);
        assert!(!snap.axes[2].rotating);
    }

    #[test]
    fn decodes_scaled_values_per_axis() {
        let buf = make_payload(123.45, 2);
        let mut frame = TelemetryFrame::motor_layout();
        frame.decode(&buf).unwrap();

        let snap = frame.snapshot();
        assert!((snap.axes[2].speed - 123.45).abs() < 0.005);
        assert!((snap.axes[2].angle - 90.125).abs() < 0.0005);
        assert!((snap.axes[2].target_angle - 180.0).abs() < 0.0005);
        assert_eq!(snap.axes[0].speed, 0.0);
    }

    #[test]
    fn field_order_matches_declared_layout() {
        let frame = TelemetryFrame::motor_layout();
        let names: Vec<_> = frame.fields().iter().map(|f| f.name).collect();
        assert_eq!(names[0], "axis1_speed");
        assert_eq!(names[4], "axis1_dir");
        assert_eq!(names[5], "axis2_speed");
        assert_eq!(names[14], "axis3_dir");
    }

    // Payload with speed/angle/target on one axis, zeros elsewhere.
    fn make_payload(speed: f64, axis: usize) -> Vec<u8> {
        let mut buf = vec![0u8; 42];
        let base = axis * 14;
        buf[base..base + 4].copy_from_slice(&scaled_i32(speed, 0.01));
        buf[base + 4..base + 8].copy_from_slice(&scaled_i32(90.125, 0.001));
        buf[base + 8..base + 12].copy_from_slice(&scaled_i32(180.0, 0.001));
        buf
    }
}
