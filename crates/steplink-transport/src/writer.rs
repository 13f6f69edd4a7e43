use std::io::{ErrorKind, Write};

use bytes::BytesMut;
use tracing::trace;

use crate::error::{Result, TransportError};
use crate::framing::encode_command;

const INITIAL_BUFFER_CAPACITY: usize = 512;

/// Writes outbound command frames to any `Write` stream.
///
/// One call to [`FrameWriter::write_frame`] emits one complete framed unit.
/// Interleaving protection between concurrent senders is the engine's job;
/// this type only guarantees that a single frame reaches the stream intact.
pub struct FrameWriter<T> {
    inner: T,
    buf: BytesMut,
}

impl<T: Write> FrameWriter<T> {
    pub fn new(inner: T) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
        }
    }

    /// Frame and write `(option, payload)`, returning the number of wire
    /// bytes written (start bytes, option, length and checksum included).
    pub fn write_frame(&mut self, option: u8, payload: &[u8]) -> Result<usize> {
        self.buf.clear();
        encode_command(option, payload, &mut self.buf)?;

        let mut offset = 0usize;
        while offset < self.buf.len() {
            match self.inner.write(&self.buf[offset..]) {
                Ok(0) => return Err(TransportError::Closed),
                Ok(n) => offset += n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if err.kind() == ErrorKind::WouldBlock => continue,
                Err(err) => return Err(TransportError::Io(err)),
            }
        }

        self.flush()?;
        trace!(option, len = payload.len(), wire = self.buf.len(), "frame out");
        Ok(self.buf.len())
    }

    /// Flush the underlying stream.
    pub fn flush(&mut self) -> Result<()> {
        loop {
            match self.inner.flush() {
                Ok(()) => return Ok(()),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if err.kind() == ErrorKind::WouldBlock => continue,
                Err(err) => return Err(TransportError::Io(err)),
            }
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

    /// Consume the writer and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }
}
