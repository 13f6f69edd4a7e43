use std::io::{ErrorKind, Read};

use bytes::{Buf, BytesMut};
use tracing::trace;

use crate::error::{Result, TransportError};
use crate::framing::{Delimiter, InboundFrame};

const READ_CHUNK_SIZE: usize = 512;
const INITIAL_BUFFER_CAPACITY: usize = 512;

/// Reads delimited inbound frames from any `Read` stream.
///
/// Handles partial reads and line noise internally — callers only ever see
/// complete, checksum-valid frames. `poll_frame` is cooperative: a stream
/// that reports `WouldBlock` or `TimedOut` yields `Ok(None)` instead of
/// blocking, which is what the engine's receive loop relies on.
pub struct FrameReader<T> {
    inner: T,
    buf: BytesMut,
    delimiter: Delimiter,
}

impl<T: Read> FrameReader<T> {
    pub fn new(inner: T) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            delimiter: Delimiter::new(),
        }
    }

    /// Try to produce the next complete frame.
    ///
    /// Returns `Ok(None)` when the stream has no data ready. A checksum
    /// failure surfaces as an error but leaves the reader usable; buffered
    /// bytes after the bad frame are preserved for the next poll.
    pub fn poll_frame(&mut self) -> Result<Option<InboundFrame>> {
        loop {
            while self.buf.has_remaining() {
                let byte = self.buf.get_u8();
                if let Some(frame) = self.delimiter.push(byte)? {
                    trace!(kind = frame.kind, len = frame.payload.len(), "frame in");
                    return Ok(Some(frame));
                }
            }

            let mut chunk = [0u8; READ_CHUNK_SIZE];
            let read = match self.inner.read(&mut chunk) {
                Ok(0) => return Err(TransportError::Closed),
                Ok(n) => n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err)
                    if err.kind() == ErrorKind::WouldBlock
                        || err.kind() == ErrorKind::TimedOut =>
                {
                    return Ok(None);
                }
                Err(err) => return Err(TransportError::Io(err)),
            };
            self.buf.extend_from_slice(&chunk[..read]);
        }
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Mutably borrow the underlying stream.
    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    /// Consume the reader and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }
}
