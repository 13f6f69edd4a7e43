/// Errors that can occur constructing or applying wire codecs.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// Bad codec construction parameters (unsupported width or an
    /// unrecognized signedness token). Caller error, raised immediately.
    #[error("invalid wire format: {0}")]
    InvalidFormat(String),

    /// Input length does not match the layout's wire length. The decode is
    /// aborted without mutating any field.
    #[error("frame length mismatch (expected {expected} bytes, got {actual})")]
    LengthMismatch { expected: usize, actual: usize },
}

pub type Result<T> = std::result::Result<T, CodecError>;
