use std::time::Duration;

/// Behavior configuration for [`crate::MotorLink`].
#[derive(Debug, Clone)]
pub struct LinkConfig {
    /// How long one transmission attempt waits for its acknowledgement.
    pub ack_timeout: Duration,
    /// How long a sender waits to acquire the exclusive send lock.
    pub send_timeout: Duration,
    /// Retransmissions after the initial attempt. `3` means up to four
    /// transmissions total.
    pub max_retry: u32,
    /// When true, exhausted retries surface as a hard error; otherwise the
    /// send returns a not-delivered receipt and the command is best-effort.
    pub strict_ack: bool,
    /// Emit an info-level action line for each issued command.
    pub action_log: bool,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            ack_timeout: Duration::from_millis(100),
            send_timeout: Duration::from_millis(200),
            max_retry: 3,
            strict_ack: true,
            action_log: true,
        }
    }
}

impl LinkConfig {
    /// Override the per-attempt acknowledgement timeout.
    pub fn with_ack_timeout(mut self, timeout: Duration) -> Self {
        self.ack_timeout = timeout;
        self
    }

    /// Override the send-lock acquisition timeout.
    pub fn with_send_timeout(mut self, timeout: Duration) -> Self {
        self.send_timeout = timeout;
        self
    }

    /// Override the retransmission budget.
    pub fn with_max_retry(mut self, retries: u32) -> Self {
        self.max_retry = retries;
        self
    }

    /// Toggle strict acknowledgement failure.
    pub fn with_strict_ack(mut self, strict: bool) -> Self {
        self.strict_ack = strict;
        self
    }

    /// Toggle action logging.
    pub fn with_action_log(mut self, enabled: bool) -> Self {
        self.action_log = enabled;
        self
    }
}
