//! Transport abstraction: any byte-oriented channel.
//!
//! Concrete implementations:
//! - USB CDC serial (ESP32-S3 USB-Serial-JTAG, espidf builds)
//! - in-memory loopback pipes (host tests)
//!
//! The server is generic over `ByteStream`, so adding a new transport
//! requires zero changes to the parser or dispatch logic.
//!
//! The contract is deliberately byte-counted rather than fallible: the
//! parser plans its work off `available()` and never asks for more than
//! the stream last reported, and `write` is a blocking (or buffered)
//! push of the whole slice.  Transports that can drop their peer simply
//! report 0 available and swallow writes, which parks the server in a
//! harmless idle loop.

/// Byte-oriented stream channel.
pub trait ByteStream {
    /// Number of bytes readable right now without blocking.
    fn available(&self) -> usize;

    /// Read up to `buf.len()` bytes into `buf`.
    /// Returns the number of bytes actually read.
    fn read(&mut self, buf: &mut [u8]) -> usize;

    /// Read exactly one byte.  Only called for bytes already covered by
    /// a preceding `available()` report.
    fn read_byte(&mut self) -> u8;

    /// Write the whole of `data`, blocking or buffering as needed.
    fn write(&mut self, data: &[u8]);
}

/// A null stream that discards all writes and never has data.
/// Useful as a default when no host is connected.
pub struct NullStream;

impl ByteStream for NullStream {
    fn available(&self) -> usize {
        0
    }

    fn read(&mut self, _buf: &mut [u8]) -> usize {
        0
    }

    fn read_byte(&mut self) -> u8 {
        0
    }

    fn write(&mut self, _data: &[u8]) {}
}
