//! Transport layer for controller I/O abstraction

use crate::error::Result;

pub mod mock;
mod serial;
pub use serial::SerialTransport;

/// Maximum bytes buffered while waiting for a line terminator. A controller
/// line is a few dozen bytes; anything larger is garbage from a bad baud
/// rate or a wedged device.
const MAX_LINE_BYTES: usize = 4096;

/// Transport trait for controller communication
pub trait Transport: Send {
    /// Read data into buffer, returns number of bytes read
    fn read(&mut self, buffer: &mut [u8]) -> Result<usize>;

    /// Write data from buffer, returns number of bytes written
    fn write(&mut self, data: &[u8]) -> Result<usize>;

    /// Flush any pending writes (blocking until complete)
    fn flush(&mut self) -> Result<()>;

    /// Check if data is available to read
    fn available(&mut self) -> Result<usize>;

    /// Discard any unread input (used to drop stale boot-sequence bytes)
    fn clear_input(&mut self) -> Result<()>;
}

/// Accumulates raw bytes and yields complete newline-terminated lines
///
/// Lines that are not valid UTF-8 are discarded silently; a malformed line
/// from the device must never fault the link.
#[derive(Debug, Default)]
pub struct LineBuffer {
    buf: Vec<u8>,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append raw bytes read from the transport
    pub fn extend(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
        if self.buf.len() > MAX_LINE_BYTES && !self.buf.contains(&b'\n') {
            log::warn!(
                "Discarding {} buffered bytes with no line terminator",
                self.buf.len()
            );
            self.buf.clear();
        }
    }

    /// Pop the next complete decoded line, without its terminator
    ///
    /// Returns `None` when no complete line is buffered. Undecodable lines
    /// are skipped.
    pub fn next_line(&mut self) -> Option<String> {
        while let Some(pos) = self.buf.iter().position(|&b| b == b'\n') {
            let raw: Vec<u8> = self.buf.drain(..=pos).collect();
            match std::str::from_utf8(&raw[..pos]) {
                Ok(text) => return Some(text.trim_end_matches('\r').to_string()),
                Err(_) => {
                    log::debug!("Discarding undecodable line ({} bytes)", pos);
                    continue;
                }
            }
        }
        None
    }

    /// Drop all buffered bytes
    pub fn clear(&mut self) {
        self.buf.clear();
    }
}
