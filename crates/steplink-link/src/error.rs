use std::time::Duration;

/// Errors that can occur in link operations.
#[derive(Debug, thiserror::Error)]
pub enum LinkError {
    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(#[from] steplink_transport::TransportError),

    /// Codec-level error.
    #[error("codec error: {0}")]
    Codec(#[from] steplink_codec::CodecError),

    /// The send lock could not be acquired in time. Nothing was written.
    #[error("send lock not acquired within {0:?}")]
    SendTimeout(Duration),

    /// Every transmission attempt went unacknowledged.
    #[error("acknowledgement retries exhausted after {attempts} attempts")]
    AckExhausted { attempts: u32 },

    /// An inbound event frame referenced a code outside the registry.
    #[error("unknown event code {0:#04x}")]
    UnknownEventCode(u8),
}

pub type Result<T> = std::result::Result<T, LinkError>;
