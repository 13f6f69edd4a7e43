use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::{Duration, Instant};

use tracing::warn;

use crate::error::{LinkError, Result};

/// Event code: short key press.
pub const EVENT_KEY_SHORT: u8 = 0x01;
/// Event code: long key press.
pub const EVENT_KEY_LONG: u8 = 0x02;
/// Event code: double key press.
pub const EVENT_KEY_DOUBLE: u8 = 0x03;

/// Poll interval for [`Event::wait`].
const WAIT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Operation carried by an inbound event frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventOp {
    Set,
    Clear,
}

impl EventOp {
    /// Parse an operation from its wire byte.
    pub fn from_wire(byte: u8) -> Option<Self> {
        match byte {
            0x01 => Some(EventOp::Set),
            0x02 => Some(EventOp::Clear),
            _ => None,
        }
    }

    /// Convert to the wire byte.
    pub fn to_wire(self) -> u8 {
        match self {
            EventOp::Set => 0x01,
            EventOp::Clear => 0x02,
        }
    }
}

type Callback = Arc<dyn Fn() + Send + Sync>;

struct EventInner {
    state: bool,
    callback: Option<Callback>,
    /// Which state the callback observes: `true` fires on set edges,
    /// `false` on clear edges.
    trigger: bool,
    /// Whether the callback already ran for the current state. Reset on
    /// every transition, which is what bounds firing to once per edge.
    notified: bool,
}

/// An edge-triggered boolean latch with an optional callback.
///
/// The callback fires at most once per state transition that matches the
/// configured trigger edge. Re-applying the same state is not a transition
/// and does not re-fire.
pub struct Event {
    inner: Mutex<EventInner>,
}

impl Default for Event {
    fn default() -> Self {
        Self::new()
    }
}

impl Event {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(EventInner {
                state: false,
                callback: None,
                trigger: true,
                notified: false,
            }),
        }
    }

    /// Latch the event.
    pub fn set(&self) {
        self.transition(true);
    }

    /// Release the latch.
    pub fn clear(&self) {
        self.transition(false);
    }

    /// Current state.
    pub fn is_set(&self) -> bool {
        self.lock().state
    }

    /// Bind a callback. `trigger` selects the observed edge: `true` fires
    /// when the event becomes set, `false` when it becomes clear.
    pub fn set_callback(&self, callback: impl Fn() + Send + Sync + 'static, trigger: bool) {
        let mut inner = self.lock();
        inner.callback = Some(Arc::new(callback));
        inner.trigger = trigger;
    }

    /// Block the calling thread until the event is set or `timeout`
    /// elapses, polling at a fixed short interval. `None` waits without
    /// bound, an explicit opt-in.
    ///
    /// Returns the state on exit; the edge check runs once more before
    /// returning, so a callback bound after the latching edge still gets
    /// its single invocation.
    pub fn wait(&self, timeout: Option<Duration>) -> bool {
        let deadline = timeout.map(|t| Instant::now() + t);
        while !self.is_set() {
            if let Some(deadline) = deadline {
                if Instant::now() >= deadline {
                    warn!("event wait timed out");
                    break;
                }
            }
            thread::sleep(WAIT_POLL_INTERVAL);
        }

        let (state, pending) = {
            let mut inner = self.lock();
            (inner.state, take_pending_callback(&mut inner))
        };
        if let Some(callback) = pending {
            callback();
        }
        state
    }

    /// [`Event::wait`], then unconditionally clear the latch when it was
    /// observed set.
    pub fn wait_clear(&self, timeout: Option<Duration>) -> bool {
        let set = self.wait(timeout);
        if set {
            self.clear();
        }
        set
    }

    fn transition(&self, new_state: bool) {
        let pending = {
            let mut inner = self.lock();
            if inner.state == new_state {
                None
            } else {
                inner.state = new_state;
                inner.notified = false;
                take_pending_callback(&mut inner)
            }
        };
        // Invoked outside the lock so a callback may touch the event.
        if let Some(callback) = pending {
            callback();
        }
    }

    fn lock(&self) -> MutexGuard<'_, EventInner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// If the current state matches the trigger edge and the callback has not
/// yet run for it, mark it notified and hand it back for invocation.
fn take_pending_callback(inner: &mut EventInner) -> Option<Callback> {
    if inner.notified || inner.state != inner.trigger {
        return None;
    }
    inner.callback.as_ref().map(|cb| {
        inner.notified = true;
        Arc::clone(cb)
    })
}

/// The fixed table of device events, keyed by wire code.
#[derive(Default)]
pub struct EventRegistry {
    key_short: Event,
    key_long: Event,
    key_double: Event,
}

impl EventRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up an event by wire code.
    pub fn get(&self, code: u8) -> Option<&Event> {
        match code {
            EVENT_KEY_SHORT => Some(&self.key_short),
            EVENT_KEY_LONG => Some(&self.key_long),
            EVENT_KEY_DOUBLE => Some(&self.key_double),
            _ => None,
        }
    }

    /// Apply an inbound event operation.
    pub fn apply(&self, code: u8, op: EventOp) -> Result<()> {
        let event = self
            .get(code)
            .ok_or(LinkError::UnknownEventCode(code))?;
        match op {
            EventOp::Set => event.set(),
            EventOp::Clear => event.clear(),
        }
        Ok(())
    }

    /// Short key press.
    pub fn key_short(&self) -> &Event {
        &self.key_short
    }

    /// Long key press.
    pub fn key_long(&self) -> &Event {
        &self.key_long
    }

    /// Double key press.
    pub fn key_double(&self) -> &Event {
        &self.key_double
    }
}
