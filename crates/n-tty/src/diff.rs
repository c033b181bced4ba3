// SPDX-License-Identifier: MIT
//
// Differential line renderer.
//
// The application hands over a complete frame as text every time its view
// changes. The renderer turns that snapshot into the bytes that repaint the
// terminal region it owns, and remembers what it drew so the next frame can
// overwrite it in place.
//
// Repaint is line-based: every visible line is rewritten and then erased to
// end-of-line, so leftovers of a longer previous line disappear without a
// full clear. Rows the new frame no longer uses are blanked. Two placement
// strategies:
//
//   Alt screen: the frame owns the whole screen. Start at the home position
//   and paint downward.
//
//   Inline: the frame sits below the shell prompt and scrolls with it. Move
//   the cursor back up to the first row of the previous frame, paint
//   downward, and leave the cursor at column 1 of the last content row.
//
// Re-rendering the exact same text is free: no bytes, no state change. The
// comparison is on the raw frame text, before clipping and truncation.
//
// All output goes into an `OutputBuffer` and reaches the terminal in one
// write via `flush()` / `flush_to()`.

use std::borrow::Cow;
use std::io::{self, Write};

use crate::ansi;
use crate::output::OutputBuffer;
use crate::width;

// ─── Configuration ───────────────────────────────────────────────────────────

/// Size limits and placement strategy. Zero means unconstrained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RenderConfig {
    /// Maximum display columns per line. Longer lines are truncated.
    pub width: u16,
    /// Maximum lines per frame. Taller frames keep their trailing lines.
    pub height: u16,
    /// Paint from the home position instead of relative to the cursor.
    pub alt_screen: bool,
}

// ─── RenderStats ─────────────────────────────────────────────────────────────

/// What a render pass did, for tests and debugging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RenderStats {
    /// The frame matched the previous one; nothing was emitted.
    pub skipped: bool,
    /// Lines painted.
    pub lines: usize,
    /// Lines dropped from the top to fit `height`.
    pub lines_clipped: usize,
    /// Lines cut short to fit `width`.
    pub lines_truncated: usize,
    /// Previously painted rows blanked because the frame shrank.
    pub rows_erased: usize,
    /// Bytes of output generated.
    pub bytes_written: usize,
}

// ─── DiffRenderer ────────────────────────────────────────────────────────────

/// Line renderer that repaints only the region it owns.
///
/// # Usage
///
/// ```
/// use n_tty::diff::{DiffRenderer, RenderConfig};
///
/// let mut renderer = DiffRenderer::with_config(RenderConfig {
///     width: 80,
///     height: 24,
///     alt_screen: true,
/// });
///
/// let stats = renderer.render("hello\nworld");
/// assert_eq!(stats.lines, 2);
/// assert_eq!(renderer.output_bytes(), b"\x1b[Hhello\x1b[K\r\nworld\x1b[K");
///
/// // Same frame again: nothing to do.
/// assert!(renderer.render("hello\nworld").skipped);
/// ```
#[derive(Debug, Default)]
pub struct DiffRenderer {
    output: OutputBuffer,
    config: RenderConfig,
    /// Text of the last rendered frame. `None` after creation, `clear()`,
    /// or a configuration change, so the next render always paints.
    last_frame: Option<String>,
    /// Lines as painted (clipped and truncated).
    lines: Vec<String>,
    /// Rows the last paint occupied.
    lines_rendered: usize,
}

impl DiffRenderer {
    /// Create an unconstrained inline renderer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a renderer with the given limits and placement.
    #[must_use]
    pub fn with_config(config: RenderConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    #[must_use]
    pub const fn config(&self) -> RenderConfig {
        self.config
    }

    /// Change the size limits. The next render repaints even if the frame
    /// text is unchanged.
    pub fn set_size(&mut self, width: u16, height: u16) {
        self.config.width = width;
        self.config.height = height;
        self.last_frame = None;
    }

    /// Switch placement strategy. The next render repaints.
    pub fn set_alt_screen(&mut self, enabled: bool) {
        self.config.alt_screen = enabled;
        self.last_frame = None;
    }

    /// Lines of the last painted frame, after clipping and truncation.
    #[must_use]
    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    /// Rows occupied by the last painted frame.
    #[must_use]
    pub const fn lines_rendered(&self) -> usize {
        self.lines_rendered
    }

    /// Build the output for `frame`.
    ///
    /// The output buffer is reset first, so after this call it holds
    /// exactly this frame's bytes (none when `stats.skipped`). Use
    /// [`flush`](Self::flush) or [`flush_to`](Self::flush_to) to send it,
    /// or [`output_bytes`](Self::output_bytes) to inspect it.
    pub fn render(&mut self, frame: &str) -> RenderStats {
        self.output.clear();

        if self.last_frame.as_deref() == Some(frame) {
            return RenderStats {
                skipped: true,
                ..RenderStats::default()
            };
        }

        let mut stats = RenderStats::default();

        // ── Clip to height (keep the bottom) ──
        let mut rows: Vec<&str> = frame.split('\n').collect();
        let height = usize::from(self.config.height);
        if height > 0 && rows.len() > height {
            stats.lines_clipped = rows.len() - height;
            rows.drain(..stats.lines_clipped);
        }

        // ── Truncate to width ──
        let width = usize::from(self.config.width);
        let lines: Vec<String> = rows
            .into_iter()
            .map(|line| {
                if width == 0 {
                    return line.to_owned();
                }
                match width::truncate(line, width) {
                    Cow::Borrowed(s) => s.to_owned(),
                    Cow::Owned(s) => {
                        stats.lines_truncated += 1;
                        s
                    }
                }
            })
            .collect();

        let prev = self.lines_rendered;
        let new = lines.len();

        // Writes into a Vec-backed buffer cannot fail.
        self.paint(&lines, prev).ok();

        stats.lines = new;
        stats.rows_erased = prev.saturating_sub(new);
        stats.bytes_written = self.output.len();

        self.lines = lines;
        self.lines_rendered = new;
        self.last_frame = Some(frame.to_owned());
        stats
    }

    fn paint(&mut self, lines: &[String], prev: usize) -> io::Result<()> {
        let out = &mut self.output;
        let vacated = prev.saturating_sub(lines.len());

        if self.config.alt_screen {
            ansi::cursor_home(out)?;
        } else {
            if prev > 1 {
                ansi::cursor_up(out, prev - 1)?;
            }
            out.push_byte(b'\r');
        }

        for (i, line) in lines.iter().enumerate() {
            if i > 0 {
                out.push_str("\r\n");
            }
            out.push_str(line);
            ansi::erase_line_right(out)?;
        }

        for _ in 0..vacated {
            out.push_str("\r\n");
            ansi::erase_line(out)?;
        }

        if !self.config.alt_screen {
            ansi::cursor_up(out, vacated)?;
            out.push_byte(b'\r');
        }
        Ok(())
    }

    /// Erase the screen, home the cursor, and forget the previous frame.
    ///
    /// The next render paints from scratch.
    pub fn clear(&mut self) {
        self.output.clear();
        ansi::clear_screen(&mut self.output).ok();
        ansi::cursor_home(&mut self.output).ok();
        self.last_frame = None;
        self.lines.clear();
        self.lines_rendered = 0;
        log::debug!("renderer cleared");
    }

    /// The output generated by the last `render` or `clear`.
    #[must_use]
    pub fn output_bytes(&self) -> &[u8] {
        self.output.as_bytes()
    }

    /// Write pending output to stdout.
    ///
    /// # Errors
    ///
    /// Returns an error if writing to stdout fails.
    pub fn flush(&mut self) -> io::Result<()> {
        self.output.flush_stdout()
    }

    /// Write pending output to an arbitrary writer.
    ///
    /// # Errors
    ///
    /// Returns an error if writing to `w` fails.
    pub fn flush_to(&mut self, w: &mut impl Write) -> io::Result<()> {
        self.output.flush_to(w)
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
