// SPDX-License-Identifier: MIT
//
// Output buffering.
//
// Every byte of a frame (cursor moves, erase sequences, line text) goes
// into an `OutputBuffer` first, and the whole frame reaches the terminal in
// one `write()` call. A single write keeps the terminal from showing a
// half-drawn frame and keeps syscall count at one per render.

use std::io::{self, Write};

/// Default capacity: enough for a full screen of styled text without
/// reallocating.
const DEFAULT_CAPACITY: usize = 16_384;

/// A byte buffer that accumulates terminal output for a single `write()`.
///
/// Implements [`Write`] so the `ansi` encoders can target it directly.
/// `Write::flush` on the buffer itself is a no-op; use [`flush_stdout`]
/// or [`flush_to`] to hand the bytes to a real sink.
///
/// [`flush_stdout`]: OutputBuffer::flush_stdout
/// [`flush_to`]: OutputBuffer::flush_to
#[derive(Debug, Clone)]
pub struct OutputBuffer {
    buf: Vec<u8>,
}

impl OutputBuffer {
    /// Create an empty buffer with default capacity.
    #[must_use]
    pub fn new() -> Self {
        Self {
            buf: Vec::with_capacity(DEFAULT_CAPACITY),
        }
    }

    /// Number of bytes accumulated.
    #[inline]
    #[must_use]
    pub const fn len(&self) -> usize {
        self.buf.len()
    }

    /// Whether the buffer is empty.
    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// The accumulated bytes.
    #[inline]
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    /// Append a string verbatim. Escape sequences inside it pass through.
    #[inline]
    pub fn push_str(&mut self, s: &str) {
        self.buf.extend_from_slice(s.as_bytes());
    }

    /// Append a single byte.
    #[inline]
    pub fn push_byte(&mut self, b: u8) {
        self.buf.push(b);
    }

    /// Clear the buffer for reuse (keeps allocated capacity).
    #[inline]
    pub fn clear(&mut self) {
        self.buf.clear();
    }

    /// Write accumulated output to stdout and clear the buffer.
    ///
    /// # Errors
    ///
    /// Returns an error if writing to stdout fails. The bytes stay in the
    /// buffer so a retry sends the same frame.
    pub fn flush_stdout(&mut self) -> io::Result<()> {
        let mut stdout = io::stdout().lock();
        self.flush_to(&mut stdout)
    }

    /// Write accumulated output to an arbitrary writer and clear the buffer.
    ///
    /// # Errors
    ///
    /// Returns an error if writing to `w` fails.
    pub fn flush_to(&mut self, w: &mut impl Write) -> io::Result<()> {
        if !self.buf.is_empty() {
            w.write_all(&self.buf)?;
            w.flush()?;
            self.buf.clear();
        }
        Ok(())
    }
}

impl Write for OutputBuffer {
    #[inline]
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buf.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Default for OutputBuffer {
    fn default() -> Self {
        Self::new()
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
