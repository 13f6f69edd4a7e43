use std::fmt;
use std::io::Write;
use std::ops::BitOr;
use std::thread;
use std::time::{Duration, Instant};

use steplink_codec::{Kind, WireValue, AXES};
use tracing::{info, warn};

use crate::engine::{MotorLink, SendReceipt};
use crate::error::Result;

/// Option byte: heartbeat. Payload `[0x01]`, never acknowledged.
pub const OPT_HEARTBEAT: u8 = 0x00;
/// Option byte: set rotation speed (deg/s, ×0.01).
pub const OPT_SET_SPEED: u8 = 0x01;
/// Option byte: set target angle (deg, ×0.001).
pub const OPT_SET_TARGET_ANGLE: u8 = 0x02;
/// Option byte: rotate by a relative angle (deg, ×0.001).
pub const OPT_ROTATE_BY: u8 = 0x03;
/// Option byte: rotate to an absolute angle (deg, ×0.001).
pub const OPT_ROTATE_TO: u8 = 0x04;
/// Option byte: stop rotation.
pub const OPT_STOP: u8 = 0x05;

const WAIT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Bitmask selecting which axes a command applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AxisMask(u8);

impl AxisMask {
    pub const AXIS1: AxisMask = AxisMask(0x01);
    pub const AXIS2: AxisMask = AxisMask(0x02);
    pub const AXIS3: AxisMask = AxisMask(0x04);
    pub const ALL: AxisMask = AxisMask(0x07);

    /// Mask for a zero-based axis index.
    pub fn axis(index: usize) -> Option<AxisMask> {
        (index < AXES).then(|| AxisMask(1 << index))
    }

    pub fn bits(self) -> u8 {
        self.0
    }

    pub fn contains(self, other: AxisMask) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for AxisMask {
    type Output = AxisMask;

    fn bitor(self, rhs: AxisMask) -> AxisMask {
        AxisMask(self.0 | rhs.0)
    }
}

impl fmt::Display for AxisMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#04x}", self.0)
    }
}

/// The device command set: thin opcode builders over the send path. Each
/// payload is the axis mask byte followed by codec-encoded fields, exactly
/// as the firmware unpacks them.
impl<W: Write + Send + 'static> MotorLink<W> {
    /// Set the rotation speed of the selected axes, in deg/s.
    pub fn set_speed(&self, axes: AxisMask, deg_per_s: f64) -> Result<SendReceipt> {
        let payload = masked_scaled(axes, deg_per_s, 0.01)?;
        let receipt = self.send_frame(OPT_SET_SPEED, &payload, true)?;
        self.action_log("set speed", format!("{axes} {deg_per_s:.2} deg/s"));
        Ok(receipt)
    }

    /// Set the target angle of the selected axes, in deg.
    pub fn set_target_angle(&self, axes: AxisMask, deg: f64) -> Result<SendReceipt> {
        let payload = masked_scaled(axes, deg, 0.001)?;
        let receipt = self.send_frame(OPT_SET_TARGET_ANGLE, &payload, true)?;
        self.action_log("set target angle", format!("{axes} {deg:.3} deg"));
        Ok(receipt)
    }

    /// Rotate the selected axes by a relative angle, in deg.
    pub fn rotate_by(&self, axes: AxisMask, deg: f64) -> Result<SendReceipt> {
        let payload = masked_scaled(axes, deg, 0.001)?;
        let receipt = self.send_frame(OPT_ROTATE_BY, &payload, true)?;
        self.action_log("rotate by", format!("{axes} {deg:.3} deg"));
        Ok(receipt)
    }

    /// Rotate the selected axes to an absolute angle, in deg.
    pub fn rotate_to(&self, axes: AxisMask, deg: f64) -> Result<SendReceipt> {
        let payload = masked_scaled(axes, deg, 0.001)?;
        let receipt = self.send_frame(OPT_ROTATE_TO, &payload, true)?;
        self.action_log("rotate to", format!("{axes} {deg:.3} deg"));
        Ok(receipt)
    }

    /// Stop rotation of the selected axes.
    pub fn stop(&self, axes: AxisMask) -> Result<SendReceipt> {
        let receipt = self.send_frame(OPT_STOP, &[axes.bits()], true)?;
        self.action_log("stop", format!("{axes}"));
        Ok(receipt)
    }

    /// Block until the given zero-based axis reports no rotation, or
    /// `timeout` elapses. Sleep-based polling glue over the telemetry
    /// snapshot.
    pub fn wait_axis_idle(&self, axis: usize, timeout: Option<Duration>) -> bool {
        if axis >= AXES {
            warn!(axis, "axis index out of range");
            return false;
        }
        // Let at least one fresh telemetry frame land first.
        thread::sleep(Duration::from_millis(100));

        let deadline = timeout.map(|t| Instant::now() + t);
        while self.status().axes[axis].rotating {
            if let Some(deadline) = deadline {
                if Instant::now() >= deadline {
                    warn!(axis, "wait for axis idle timed out");
                    return false;
                }
            }
            thread::sleep(WAIT_POLL_INTERVAL);
        }
        self.action_log("wait ok", format!("axis {axis} idle"));
        true
    }

    fn action_log(&self, action: &str, detail: String) {
        if self.config().action_log {
            info!("action: {} -> {}", action.to_uppercase(), detail);
        }
    }
}

fn masked_scaled(axes: AxisMask, value: f64, scale: f64) -> Result<Vec<u8>> {
    let mut field = WireValue::scaled("s32", Kind::Float, scale)?;
    field.assign(value);
    let mut payload = Vec::with_capacity(5);
    payload.push(axes.bits());
    payload.extend_from_slice(&field.encode());
    Ok(payload)
}
