// SPDX-License-Identifier: MIT
//
// Display width of styled text.
//
// Frames handed to the renderer are plain strings that may carry SGR
// color codes, hyperlinks (OSC 8), or any other escape sequence. Those
// bytes occupy no columns, so width measurement and truncation skip over
// them. Text is measured per grapheme cluster: a wide CJK ideograph is
// two columns, a combining accent adds nothing to its base, an emoji ZWJ
// sequence is one two-column glyph.
//
// Truncation never splits a grapheme and never drops an escape sequence:
// styles opened before the cut point and resets after it both survive,
// so a truncated colored line cannot bleed its color into the next row.

use std::borrow::Cow;

use unicode_segmentation::UnicodeSegmentation;
use unicode_width::UnicodeWidthChar;

const ESC: u8 = 0x1B;

// ─── Escape sequences ───────────────────────────────────────────────────────

/// Byte length of the escape sequence starting at `bytes[pos]` (an ESC).
///
/// Recognizes CSI (`ESC [` … final byte), string sequences terminated by
/// BEL or ST (`ESC ]` OSC, `ESC P` DCS, `ESC ^` PM, `ESC _` APC), and
/// two-byte escapes. Unterminated sequences run to the end of the input.
fn escape_len(bytes: &[u8], pos: usize) -> usize {
    debug_assert_eq!(bytes[pos], ESC);
    let next = pos + 1;
    if next >= bytes.len() {
        return 1;
    }

    let end = match bytes[next] {
        b'[' => skip_csi(bytes, next + 1),
        b']' | b'P' | b'^' | b'_' => skip_string_terminated(bytes, next + 1),
        // A multi-byte character after ESC is text, not an escape.
        0x80..=0xFF => return 1,
        _ => next + 1,
    };
    end - pos
}

/// End index of a CSI sequence whose parameters start at `pos`.
fn skip_csi(bytes: &[u8], pos: usize) -> usize {
    let mut i = pos;
    while i < bytes.len() {
        let b = bytes[i];
        if (0x40..=0x7E).contains(&b) {
            return i + 1;
        }
        if !(0x20..=0x3F).contains(&b) {
            // Malformed: stop before the offending byte so it is measured
            // as text.
            return i;
        }
        i += 1;
    }
    bytes.len()
}

/// End index of a BEL- or ST-terminated string sequence.
fn skip_string_terminated(bytes: &[u8], pos: usize) -> usize {
    let mut i = pos;
    while i < bytes.len() {
        match bytes[i] {
            0x07 => return i + 1,
            ESC if bytes.get(i + 1) == Some(&b'\\') => return i + 2,
            _ => i += 1,
        }
    }
    bytes.len()
}

/// A run of printable text or one complete escape sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Segment<'a> {
    Text(&'a str),
    Escape(&'a str),
}

/// Splits a string into alternating text runs and escape sequences.
struct Segments<'a> {
    s: &'a str,
    pos: usize,
}

impl<'a> Segments<'a> {
    const fn new(s: &'a str) -> Self {
        Self { s, pos: 0 }
    }
}

impl<'a> Iterator for Segments<'a> {
    type Item = Segment<'a>;

    fn next(&mut self) -> Option<Segment<'a>> {
        let bytes = self.s.as_bytes();
        let start = self.pos;
        if start >= bytes.len() {
            return None;
        }
        if bytes[start] == ESC {
            self.pos += escape_len(bytes, start);
            return Some(Segment::Escape(&self.s[start..self.pos]));
        }
        // ESC is ASCII, so every split point is a char boundary.
        self.pos = bytes[start..]
            .iter()
            .position(|&b| b == ESC)
            .map_or(bytes.len(), |i| start + i);
        Some(Segment::Text(&self.s[start..self.pos]))
    }
}

/// Remove every escape sequence from `s`.
///
/// Borrows when there is nothing to strip.
#[must_use]
pub fn strip_ansi(s: &str) -> Cow<'_, str> {
    if !s.as_bytes().contains(&ESC) {
        return Cow::Borrowed(s);
    }
    let mut out = String::with_capacity(s.len());
    for segment in Segments::new(s) {
        if let Segment::Text(text) = segment {
            out.push_str(text);
        }
    }
    Cow::Owned(out)
}

// ─── Width ──────────────────────────────────────────────────────────────────

/// Columns occupied by one grapheme cluster.
///
/// Single code points use their East Asian Width (control characters and
/// combining marks are 0). Multi-code-point clusters that form emoji
/// (ZWJ sequences, VS16 presentation, skin tones, keycaps, flags) are 2;
/// anything else takes the width of its base character.
#[must_use]
pub fn grapheme_width(grapheme: &str) -> usize {
    let mut chars = grapheme.chars();
    let Some(first) = chars.next() else {
        return 0;
    };
    if grapheme.len() == first.len_utf8() {
        return first.width().unwrap_or(0);
    }

    // Regional indicator pair.
    if ('\u{1F1E6}'..='\u{1F1FF}').contains(&first) {
        return 2;
    }
    let emoji = chars.any(|c| {
        matches!(c, '\u{200D}' | '\u{FE0F}' | '\u{20E3}' | '\u{1F3FB}'..='\u{1F3FF}')
    });
    if emoji {
        2
    } else {
        first.width().unwrap_or(0)
    }
}

/// Display width of `s` in terminal columns, ignoring escape sequences.
///
/// # Examples
///
/// ```
/// use n_tty::width::display_width;
///
/// assert_eq!(display_width("hello"), 5);
/// assert_eq!(display_width("中文"), 4);
/// assert_eq!(display_width("\x1b[31mred\x1b[0m"), 3);
/// ```
#[must_use]
pub fn display_width(s: &str) -> usize {
    if s.is_ascii() && !s.as_bytes().contains(&ESC) {
        return s.bytes().filter(|b| (0x20..0x7F).contains(b)).count();
    }
    Segments::new(s)
        .map(|segment| match segment {
            Segment::Text(text) => text.graphemes(true).map(grapheme_width).sum(),
            Segment::Escape(_) => 0,
        })
        .sum()
}

/// Truncate `s` to at most `max_width` display columns.
///
/// Escape sequences are kept wherever they occur, including after the cut
/// point. A wide grapheme that would straddle the limit is dropped, so the
/// result can be one column narrower than `max_width`.
///
/// # Examples
///
/// ```
/// use n_tty::width::truncate;
///
/// assert_eq!(truncate("hello world", 5), "hello");
/// assert_eq!(truncate("中文字", 5), "中文");
/// assert_eq!(truncate("\x1b[1mbold\x1b[0m", 2), "\x1b[1mbo\x1b[0m");
/// ```
#[must_use]
pub fn truncate(s: &str, max_width: usize) -> Cow<'_, str> {
    if display_width(s) <= max_width {
        return Cow::Borrowed(s);
    }

    let mut out = String::with_capacity(s.len());
    let mut used = 0;
    let mut cut = false;
    for segment in Segments::new(s) {
        match segment {
            Segment::Escape(escape) => out.push_str(escape),
            Segment::Text(_) if cut => {}
            Segment::Text(text) => {
                for grapheme in text.graphemes(true) {
                    let w = grapheme_width(grapheme);
                    if used + w > max_width {
                        cut = true;
                        break;
                    }
                    out.push_str(grapheme);
                    used += w;
                }
            }
        }
    }
    Cow::Owned(out)
}

// ─── Tests ──────────────────────────────────────────────────────────────────
