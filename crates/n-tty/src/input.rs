// SPDX-License-Identifier: MIT
//
// Terminal input decoding.
//
// Turns raw stdin bytes into structured events: keys, mouse actions, focus
// changes. Two layers:
//
// - `decode` is a pure function. It looks at the front of a buffer and
//   returns how many bytes the next event occupies plus the event itself
//   (or nothing, for bytes that are dropped). It is total: every non-empty
//   input consumes at least one byte and nothing ever errors.
//
// - `Parser` keeps the bytes that did not form a complete sequence yet.
//   Escape sequences can span multiple `read()` calls, so the parser stops
//   decoding when `needs_more` says the buffer ends mid-sequence, and picks
//   up again on the next `advance`. After a timeout with no new bytes,
//   `flush` decodes whatever is left (a lone ESC becomes the Escape key).
//
// Protocols handled: legacy CSI / SS3 keys from the escape table, SGR mouse
// (DEC 1006), focus reporting (DEC 1004), Alt+key as ESC-prefixed ASCII,
// and UTF-8 characters.
//
// Events serialize to the compact JSON records host bindings expect
// (`Event::to_json`).

use bitflags::bitflags;
use serde::{Serialize, Serializer};

use crate::keys::{self, KeyCode};

const ESC: u8 = 0x1B;

/// The SGR mouse terminator must appear before this index.
const MOUSE_SCAN_LIMIT: usize = 32;

// ─── Event Types ────────────────────────────────────────────────────────────

/// A decoded terminal input event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// A key press.
    Key(KeyEvent),
    /// A mouse button, wheel, or motion report.
    Mouse(MouseEvent),
    /// The terminal changed size. Both dimensions are positive.
    Resize { width: u16, height: u16 },
    /// The terminal window gained or lost focus.
    Focus { focused: bool },
}

/// A key press with its display name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyEvent {
    pub code: KeyCode,
    /// The typed characters. Non-empty only for `Runes` and `Space`.
    pub runes: Vec<char>,
    /// Typed with Alt held (sent as an ESC prefix).
    pub alt: bool,
    /// Canonical lowercase name: `"ctrl+c"`, `"f12"`, `"alt+x"`, `"é"`.
    pub name: String,
}

impl KeyEvent {
    /// A key with no characters attached, named after its code.
    #[must_use]
    pub fn named(code: KeyCode) -> Self {
        Self {
            code,
            runes: Vec::new(),
            alt: false,
            name: code.name().to_owned(),
        }
    }

    /// A typed character, optionally with Alt held.
    #[must_use]
    pub fn rune(c: char, alt: bool) -> Self {
        let name = if alt { format!("alt+{c}") } else { c.to_string() };
        Self {
            code: KeyCode::Runes,
            runes: vec![c],
            alt,
            name,
        }
    }

    /// The space bar.
    #[must_use]
    pub fn space() -> Self {
        Self {
            code: KeyCode::Space,
            runes: vec![' '],
            alt: false,
            name: KeyCode::Space.name().to_owned(),
        }
    }
}

bitflags! {
    /// Modifier keys held during a mouse event.
    ///
    /// Bit values match the SGR button code, so the flags come straight
    /// out of the report with `from_bits_truncate`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
    pub struct Modifiers: u8 {
        const SHIFT = 0b0000_0100;
        const ALT   = 0b0000_1000;
        const CTRL  = 0b0001_0000;
    }
}

/// What a mouse report describes. Discriminants are the wire values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MouseAction {
    Press = 0,
    Release = 1,
    Motion = 2,
}

/// A mouse report with 0-indexed coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MouseEvent {
    /// 0-indexed column.
    pub x: u16,
    /// 0-indexed row.
    pub y: u16,
    /// 0 left, 1 middle, 2 right, 3 none (motion without a button),
    /// 4 wheel up, 5 wheel down.
    pub button: u8,
    pub action: MouseAction,
    pub modifiers: Modifiers,
}

impl MouseEvent {
    #[must_use]
    pub const fn shift(&self) -> bool {
        self.modifiers.contains(Modifiers::SHIFT)
    }

    #[must_use]
    pub const fn alt(&self) -> bool {
        self.modifiers.contains(Modifiers::ALT)
    }

    #[must_use]
    pub const fn ctrl(&self) -> bool {
        self.modifiers.contains(Modifiers::CTRL)
    }
}

// ─── Decoder ────────────────────────────────────────────────────────────────

/// Decode the event at the front of `buf`.
///
/// Returns the number of bytes consumed and the event, if any. Empty input
/// returns `(0, None)`; any other input consumes at least one byte. Bytes
/// that are not valid UTF-8 consume one byte and produce no event.
///
/// A buffer that ends inside an escape sequence still decodes (a lone ESC
/// is the Escape key). Callers that read in chunks should check
/// [`needs_more`] first, or use [`Parser`].
///
/// # Examples
///
/// ```
/// use n_tty::input::{decode, Event};
/// use n_tty::keys::KeyCode;
///
/// let (n, event) = decode(b"\x1b[Ahello");
/// assert_eq!(n, 3);
/// assert!(matches!(event, Some(Event::Key(k)) if k.code == KeyCode::Up));
/// ```
#[must_use]
pub fn decode(buf: &[u8]) -> (usize, Option<Event>) {
    let Some(&first) = buf.first() else {
        return (0, None);
    };

    // ── Focus ───────────────────────────────────────────────────
    if buf.len() >= 3 && first == ESC && buf[1] == b'[' {
        match buf[2] {
            b'I' => return (3, Some(Event::Focus { focused: true })),
            b'O' => return (3, Some(Event::Focus { focused: false })),
            _ => {}
        }
    }

    // ── SGR mouse (falls through when incomplete) ───────────────
    if buf.len() >= 6 && buf.starts_with(b"\x1b[<") {
        if let Some((consumed, mouse)) = parse_sgr_mouse(buf) {
            return (consumed, Some(Event::Mouse(mouse)));
        }
    }

    // ── Escape sequences and Alt+key ────────────────────────────
    if first == ESC && buf.len() > 1 {
        if let Some((code, len)) = keys::match_escape(buf) {
            return (len, Some(Event::Key(KeyEvent::named(code))));
        }
        let second = buf[1];
        if (0x20..=0x7E).contains(&second) {
            return (2, Some(Event::Key(KeyEvent::rune(char::from(second), true))));
        }
        return (1, Some(Event::Key(KeyEvent::named(KeyCode::Esc))));
    }

    // ── Control bytes ───────────────────────────────────────────
    if let Some(code) = KeyCode::from_control_byte(first) {
        return (1, Some(Event::Key(KeyEvent::named(code))));
    }

    if first == b' ' {
        return (1, Some(Event::Key(KeyEvent::space())));
    }

    // ── UTF-8 ───────────────────────────────────────────────────
    match decode_utf8(buf) {
        Some((c, len)) => (len, Some(Event::Key(KeyEvent::rune(c, false)))),
        None => (1, None),
    }
}

/// Parse an SGR mouse report (`ESC [ < Cb ; Cx ; Cy M|m`).
///
/// Returns the consumed length and the event, or `None` when `buf` does
/// not hold a complete, well-formed report. The terminator must appear
/// within the first 32 bytes.
///
/// # Examples
///
/// ```
/// use n_tty::input::{parse_sgr_mouse, MouseAction};
///
/// let (n, m) = parse_sgr_mouse(b"\x1b[<0;5;3M").unwrap();
/// assert_eq!((n, m.x, m.y, m.button), (9, 4, 2, 0));
/// assert_eq!(m.action, MouseAction::Press);
/// ```
#[must_use]
#[allow(clippy::cast_possible_truncation)] // Both casts are masked to fit.
pub fn parse_sgr_mouse(buf: &[u8]) -> Option<(usize, MouseEvent)> {
    if !buf.starts_with(b"\x1b[<") {
        return None;
    }
    let window = &buf[..buf.len().min(MOUSE_SCAN_LIMIT)];
    let end = 3 + window[3..].iter().position(|&b| b == b'M' || b == b'm')?;
    let [cb, raw_x, raw_y] = parse_mouse_params(&buf[3..end])?;

    let modifiers = Modifiers::from_bits_truncate((cb & 0x1C) as u8);
    let motion = cb & 32 != 0;
    let wheel = cb & 64 != 0;

    let mut button = (cb & 3) as u8;
    if wheel {
        button = match button {
            0 => 4,
            1 => 5,
            other => other,
        };
    }

    let action = if buf[end] == b'm' {
        MouseAction::Release
    } else if motion {
        MouseAction::Motion
    } else {
        MouseAction::Press
    };

    let event = MouseEvent {
        x: to_coord(raw_x),
        y: to_coord(raw_y),
        button,
        action,
        modifiers,
    };
    Some((end + 1, event))
}

/// Whether `buf` begins with a sequence that more bytes could complete.
///
/// True for a strict prefix of a known escape sequence or of the focus
/// reports (this covers a lone ESC and `ESC [`), for an unterminated SGR
/// mouse report still inside the 32-byte window, and for a UTF-8 lead
/// byte missing its continuation bytes.
#[must_use]
pub fn needs_more(buf: &[u8]) -> bool {
    let Some(&first) = buf.first() else {
        return false;
    };

    if first == ESC {
        if buf.starts_with(b"\x1b[<") {
            return buf.len() < MOUSE_SCAN_LIMIT
                && buf[3..].iter().all(|&b| b.is_ascii_digit() || b == b';');
        }
        return (buf.len() < 3 && b"\x1b[I".starts_with(buf)) || keys::is_escape_prefix(buf);
    }

    let expected = utf8_len(first);
    expected > buf.len() && buf[1..].iter().all(|&b| b & 0xC0 == 0x80)
}

// ── Helpers ─────────────────────────────────────────────────────────────────

/// Parse the first three `;`-separated fields as decimal numbers.
///
/// Every field must be present and all digits; fields past the third are
/// ignored.
fn parse_mouse_params(raw: &[u8]) -> Option<[u32; 3]> {
    let mut out = [0u32; 3];
    let mut fields = raw.split(|&b| b == b';');
    for slot in &mut out {
        let field = fields.next()?;
        if field.is_empty() {
            return None;
        }
        let mut n: u32 = 0;
        for &b in field {
            if !b.is_ascii_digit() {
                return None;
            }
            n = n.checked_mul(10)?.checked_add(u32::from(b - b'0'))?;
        }
        *slot = n;
    }
    Some(out)
}

/// SGR coordinates are 1-indexed; ours are 0-indexed.
fn to_coord(raw: u32) -> u16 {
    u16::try_from(raw.saturating_sub(1)).unwrap_or(u16::MAX)
}

/// Expected UTF-8 sequence length from the lead byte (0 if invalid).
const fn utf8_len(lead: u8) -> usize {
    match lead {
        0x00..=0x7F => 1,
        0xC2..=0xDF => 2,
        0xE0..=0xEF => 3,
        0xF0..=0xF4 => 4,
        _ => 0,
    }
}

/// Decode one scalar value from the front of `buf`.
fn decode_utf8(buf: &[u8]) -> Option<(char, usize)> {
    let len = utf8_len(*buf.first()?);
    if len == 0 || buf.len() < len {
        return None;
    }
    let c = std::str::from_utf8(&buf[..len]).ok()?.chars().next()?;
    Some((c, len))
}

// ─── Parser ─────────────────────────────────────────────────────────────────

/// Buffering decoder for a chunked byte stream.
///
/// # ESC ambiguity
///
/// A bare ESC byte is either the Escape key or the start of a sequence.
/// The parser holds it back until more bytes arrive. The caller waits a
/// short timeout and then calls [`flush`](Parser::flush), which emits the
/// pending ESC as a real Escape key.
#[derive(Debug, Default)]
pub struct Parser {
    buf: Vec<u8>,
}

impl Parser {
    /// Create a parser with an empty buffer.
    #[must_use]
    pub fn new() -> Self {
        Self {
            buf: Vec::with_capacity(64),
        }
    }

    /// Append `data` and return every event that is complete.
    ///
    /// Bytes forming an incomplete sequence stay buffered for the next
    /// call.
    pub fn advance(&mut self, data: &[u8]) -> Vec<Event> {
        self.buf.extend_from_slice(data);
        self.drain(false)
    }

    /// Decode everything left, complete or not.
    pub fn flush(&mut self) -> Vec<Event> {
        self.drain(true)
    }

    /// Are there buffered bytes waiting for more input?
    #[must_use]
    pub fn has_pending(&self) -> bool {
        !self.buf.is_empty()
    }

    fn drain(&mut self, force: bool) -> Vec<Event> {
        let mut events = Vec::new();
        let mut pos = 0;

        while pos < self.buf.len() {
            let rest = &self.buf[pos..];
            if !force && needs_more(rest) {
                break;
            }
            let (consumed, event) = decode(rest);
            events.extend(event);
            pos += consumed.max(1);
        }

        self.buf.drain(..pos);
        events
    }
}

// ─── Wire Format ────────────────────────────────────────────────────────────

/// Serialized shape of an event, tagged by `"type"`.
#[derive(Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum Wire<'a> {
    Key {
        key_type: i32,
        #[serde(skip_serializing_if = "Option::is_none")]
        runes: Option<Vec<u32>>,
        alt: bool,
        name: &'a str,
    },
    Mouse {
        x: u16,
        y: u16,
        button: u8,
        action: u8,
        shift: bool,
        alt: bool,
        ctrl: bool,
    },
    Resize {
        width: u16,
        height: u16,
    },
    Focus {
        focus: bool,
    },
}

impl<'a> From<&'a Event> for Wire<'a> {
    fn from(event: &'a Event) -> Self {
        match event {
            Event::Key(k) => Wire::Key {
                key_type: k.code.value(),
                runes: matches!(k.code, KeyCode::Runes | KeyCode::Space)
                    .then(|| k.runes.iter().map(|&c| u32::from(c)).collect()),
                alt: k.alt,
                name: &k.name,
            },
            Event::Mouse(m) => Wire::Mouse {
                x: m.x,
                y: m.y,
                button: m.button,
                action: m.action as u8,
                shift: m.shift(),
                alt: m.alt(),
                ctrl: m.ctrl(),
            },
            &Event::Resize { width, height } => Wire::Resize { width, height },
            &Event::Focus { focused } => Wire::Focus { focus: focused },
        }
    }
}

impl Serialize for Event {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        Wire::from(self).serialize(serializer)
    }
}

impl Event {
    /// Compact JSON record for host bindings.
    ///
    /// ```
    /// use n_tty::input::Event;
    ///
    /// let json = Event::Resize { width: 80, height: 24 }.to_json().unwrap();
    /// assert_eq!(json, r#"{"type":"resize","width":80,"height":24}"#);
    /// ```
    ///
    /// # Errors
    ///
    /// Propagates `serde_json` errors. Every event shape serializes, so in
    /// practice this does not fail.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────
