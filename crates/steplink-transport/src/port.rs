use std::time::Duration;

use serialport::SerialPort;
use tracing::info;

use crate::error::{Result, TransportError};
use crate::reader::FrameReader;
use crate::writer::FrameWriter;

/// Default bit rate of the motor-controller UART.
pub const DEFAULT_BAUD: u32 = 500_000;

/// Read timeout on the port. Short enough that the engine's receive loop
/// stays responsive to heartbeat and disconnect deadlines.
const READ_TIMEOUT: Duration = Duration::from_millis(2);

/// Open a serial port and split it into framed reader/writer halves.
///
/// The reader half carries the short read timeout that makes
/// [`FrameReader::poll_frame`] cooperative; the writer half is a clone of
/// the same port handle.
pub fn open_port(
    path: &str,
    baud: u32,
) -> Result<(
    FrameReader<Box<dyn SerialPort>>,
    FrameWriter<Box<dyn SerialPort>>,
)> {
    let reader_half = serialport::new(path, baud)
        .timeout(READ_TIMEOUT)
        .open()
        .map_err(|source| TransportError::Open {
            port: path.to_string(),
            source,
        })?;

    let writer_half = reader_half
        .try_clone()
        .map_err(|source| TransportError::Open {
            port: path.to_string(),
            source,
        })?;

    info!(port = path, baud, "serial port opened");

    Ok((FrameReader::new(reader_half), FrameWriter::new(writer_half)))
}
