// SPDX-License-Identifier: MIT
//
// Key codes, display names, and the escape-sequence table.
//
// Every key the decoder can emit has a stable numeric value. Control
// characters keep their raw byte value (Ctrl+C is 3, Backspace is 127)
// so a host language can compare against the bytes it already knows.
// Everything without a byte of its own lives in the negative range.
//
// The escape table is a sorted static slice. No entry is a prefix of
// another, so a binary search that compares each entry against the same
// number of leading input bytes finds the one possible match in
// O(log n) without ever being ambiguous. Adding an entry that breaks
// either property fails `table_is_sorted_and_prefix_free` below.

// ─── KeyCode ────────────────────────────────────────────────────────────────

/// Identity of a decoded key.
///
/// Control codes map 1:1 to their raw byte. `Tab` and `Enter` are the
/// byte-9 and byte-13 control codes under their common names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyCode {
    // ── Control codes (value = raw byte) ────────────────────────
    Null,
    CtrlA,
    CtrlB,
    CtrlC,
    CtrlD,
    CtrlE,
    CtrlF,
    CtrlG,
    CtrlH,
    Tab,
    CtrlJ,
    CtrlK,
    CtrlL,
    Enter,
    CtrlN,
    CtrlO,
    CtrlP,
    CtrlQ,
    CtrlR,
    CtrlS,
    CtrlT,
    CtrlU,
    CtrlV,
    CtrlW,
    CtrlX,
    CtrlY,
    CtrlZ,
    Esc,
    Backspace,
    /// A control byte in `0x1C..=0x1F` with no dedicated name.
    UnknownControl(u8),
    // ── Named keys ──────────────────────────────────────────────
    /// One or more printable characters, carried in `KeyEvent::runes`.
    Runes,
    Up,
    Down,
    Right,
    Left,
    Home,
    End,
    PgUp,
    PgDown,
    Delete,
    Insert,
    F1,
    F2,
    F3,
    F4,
    F5,
    F6,
    F7,
    F8,
    F9,
    F10,
    F11,
    F12,
    ShiftTab,
    Space,
    // ── Modified arrows ─────────────────────────────────────────
    ShiftUp,
    ShiftDown,
    ShiftRight,
    ShiftLeft,
    CtrlUp,
    CtrlDown,
    CtrlRight,
    CtrlLeft,
}

/// Control codes indexed by raw byte (`0x00..=0x1F`).
const CONTROL_CODES: [KeyCode; 32] = [
    KeyCode::Null,
    KeyCode::CtrlA,
    KeyCode::CtrlB,
    KeyCode::CtrlC,
    KeyCode::CtrlD,
    KeyCode::CtrlE,
    KeyCode::CtrlF,
    KeyCode::CtrlG,
    KeyCode::CtrlH,
    KeyCode::Tab,
    KeyCode::CtrlJ,
    KeyCode::CtrlK,
    KeyCode::CtrlL,
    KeyCode::Enter,
    KeyCode::CtrlN,
    KeyCode::CtrlO,
    KeyCode::CtrlP,
    KeyCode::CtrlQ,
    KeyCode::CtrlR,
    KeyCode::CtrlS,
    KeyCode::CtrlT,
    KeyCode::CtrlU,
    KeyCode::CtrlV,
    KeyCode::CtrlW,
    KeyCode::CtrlX,
    KeyCode::CtrlY,
    KeyCode::CtrlZ,
    KeyCode::Esc,
    KeyCode::UnknownControl(0x1C),
    KeyCode::UnknownControl(0x1D),
    KeyCode::UnknownControl(0x1E),
    KeyCode::UnknownControl(0x1F),
];

/// Named (non-control) codes in value order: `Runes` is -1, `Space` is -25.
const NAMED_CODES: [KeyCode; 25] = [
    KeyCode::Runes,
    KeyCode::Up,
    KeyCode::Down,
    KeyCode::Right,
    KeyCode::Left,
    KeyCode::Home,
    KeyCode::End,
    KeyCode::PgUp,
    KeyCode::PgDown,
    KeyCode::Delete,
    KeyCode::Insert,
    KeyCode::F1,
    KeyCode::F2,
    KeyCode::F3,
    KeyCode::F4,
    KeyCode::F5,
    KeyCode::F6,
    KeyCode::F7,
    KeyCode::F8,
    KeyCode::F9,
    KeyCode::F10,
    KeyCode::F11,
    KeyCode::F12,
    KeyCode::ShiftTab,
    KeyCode::Space,
];

/// Modified arrows in value order: `ShiftUp` is -100, `CtrlLeft` is -107.
const MODIFIED_ARROWS: [KeyCode; 8] = [
    KeyCode::ShiftUp,
    KeyCode::ShiftDown,
    KeyCode::ShiftRight,
    KeyCode::ShiftLeft,
    KeyCode::CtrlUp,
    KeyCode::CtrlDown,
    KeyCode::CtrlRight,
    KeyCode::CtrlLeft,
];

impl KeyCode {
    /// The key for a raw control byte (`0x00..=0x1F` or `0x7F`).
    ///
    /// Returns `None` for every other byte.
    #[must_use]
    pub const fn from_control_byte(byte: u8) -> Option<Self> {
        match byte {
            0x00..=0x1F => Some(CONTROL_CODES[byte as usize]),
            0x7F => Some(Self::Backspace),
            _ => None,
        }
    }

    /// Stable numeric value of this code.
    #[must_use]
    pub const fn value(self) -> i32 {
        match self {
            Self::Null => 0,
            Self::CtrlA => 1,
            Self::CtrlB => 2,
            Self::CtrlC => 3,
            Self::CtrlD => 4,
            Self::CtrlE => 5,
            Self::CtrlF => 6,
            Self::CtrlG => 7,
            Self::CtrlH => 8,
            Self::Tab => 9,
            Self::CtrlJ => 10,
            Self::CtrlK => 11,
            Self::CtrlL => 12,
            Self::Enter => 13,
            Self::CtrlN => 14,
            Self::CtrlO => 15,
            Self::CtrlP => 16,
            Self::CtrlQ => 17,
            Self::CtrlR => 18,
            Self::CtrlS => 19,
            Self::CtrlT => 20,
            Self::CtrlU => 21,
            Self::CtrlV => 22,
            Self::CtrlW => 23,
            Self::CtrlX => 24,
            Self::CtrlY => 25,
            Self::CtrlZ => 26,
            Self::Esc => 27,
            Self::Backspace => 127,
            Self::UnknownControl(b) => b as i32,
            Self::Runes => -1,
            Self::Up => -2,
            Self::Down => -3,
            Self::Right => -4,
            Self::Left => -5,
            Self::Home => -6,
            Self::End => -7,
            Self::PgUp => -8,
            Self::PgDown => -9,
            Self::Delete => -10,
            Self::Insert => -11,
            Self::F1 => -12,
            Self::F2 => -13,
            Self::F3 => -14,
            Self::F4 => -15,
            Self::F5 => -16,
            Self::F6 => -17,
            Self::F7 => -18,
            Self::F8 => -19,
            Self::F9 => -20,
            Self::F10 => -21,
            Self::F11 => -22,
            Self::F12 => -23,
            Self::ShiftTab => -24,
            Self::Space => -25,
            Self::ShiftUp => -100,
            Self::ShiftDown => -101,
            Self::ShiftRight => -102,
            Self::ShiftLeft => -103,
            Self::CtrlUp => -104,
            Self::CtrlDown => -105,
            Self::CtrlRight => -106,
            Self::CtrlLeft => -107,
        }
    }

    /// Inverse of [`value`](Self::value).
    #[must_use]
    pub const fn from_value(value: i32) -> Option<Self> {
        match value {
            0..=31 => Some(CONTROL_CODES[value as usize]),
            127 => Some(Self::Backspace),
            -25..=-1 => Some(NAMED_CODES[(-value - 1) as usize]),
            -107..=-100 => Some(MODIFIED_ARROWS[(-value - 100) as usize]),
            _ => None,
        }
    }

    /// Canonical display name: lowercase, `+`-joined, no hyphens.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Null => "ctrl+@",
            Self::CtrlA => "ctrl+a",
            Self::CtrlB => "ctrl+b",
            Self::CtrlC => "ctrl+c",
            Self::CtrlD => "ctrl+d",
            Self::CtrlE => "ctrl+e",
            Self::CtrlF => "ctrl+f",
            Self::CtrlG => "ctrl+g",
            Self::CtrlH => "ctrl+h",
            Self::Tab => "tab",
            Self::CtrlJ => "ctrl+j",
            Self::CtrlK => "ctrl+k",
            Self::CtrlL => "ctrl+l",
            Self::Enter => "enter",
            Self::CtrlN => "ctrl+n",
            Self::CtrlO => "ctrl+o",
            Self::CtrlP => "ctrl+p",
            Self::CtrlQ => "ctrl+q",
            Self::CtrlR => "ctrl+r",
            Self::CtrlS => "ctrl+s",
            Self::CtrlT => "ctrl+t",
            Self::CtrlU => "ctrl+u",
            Self::CtrlV => "ctrl+v",
            Self::CtrlW => "ctrl+w",
            Self::CtrlX => "ctrl+x",
            Self::CtrlY => "ctrl+y",
            Self::CtrlZ => "ctrl+z",
            Self::Esc => "esc",
            Self::Backspace => "backspace",
            Self::UnknownControl(_) => "ctrl+?",
            Self::Runes => "runes",
            Self::Up => "up",
            Self::Down => "down",
            Self::Right => "right",
            Self::Left => "left",
            Self::Home => "home",
            Self::End => "end",
            Self::PgUp => "pgup",
            Self::PgDown => "pgdown",
            Self::Delete => "delete",
            Self::Insert => "insert",
            Self::F1 => "f1",
            Self::F2 => "f2",
            Self::F3 => "f3",
            Self::F4 => "f4",
            Self::F5 => "f5",
            Self::F6 => "f6",
            Self::F7 => "f7",
            Self::F8 => "f8",
            Self::F9 => "f9",
            Self::F10 => "f10",
            Self::F11 => "f11",
            Self::F12 => "f12",
            Self::ShiftTab => "shift+tab",
            Self::Space => "space",
            Self::ShiftUp => "shift+up",
            Self::ShiftDown => "shift+down",
            Self::ShiftRight => "shift+right",
            Self::ShiftLeft => "shift+left",
            Self::CtrlUp => "ctrl+up",
            Self::CtrlDown => "ctrl+down",
            Self::CtrlRight => "ctrl+right",
            Self::CtrlLeft => "ctrl+left",
        }
    }
}

/// Display name for a numeric key code.
///
/// Returns `None` for values that are not key codes and for control bytes
/// without a dedicated name.
#[must_use]
pub fn key_name(value: i32) -> Option<&'static str> {
    match KeyCode::from_value(value)? {
        KeyCode::UnknownControl(_) => None,
        code => Some(code.name()),
    }
}

// ─── Escape-sequence table ──────────────────────────────────────────────────

/// Recognized escape sequences, sorted by bytes.
#[rustfmt::skip]
pub(crate) const ESCAPE_TABLE: [(&[u8], KeyCode); 33] = [
    (b"\x1bOP",     KeyCode::F1),
    (b"\x1bOQ",     KeyCode::F2),
    (b"\x1bOR",     KeyCode::F3),
    (b"\x1bOS",     KeyCode::F4),
    (b"\x1b[15~",   KeyCode::F5),
    (b"\x1b[17~",   KeyCode::F6),
    (b"\x1b[18~",   KeyCode::F7),
    (b"\x1b[19~",   KeyCode::F8),
    (b"\x1b[1;2A",  KeyCode::ShiftUp),
    (b"\x1b[1;2B",  KeyCode::ShiftDown),
    (b"\x1b[1;2C",  KeyCode::ShiftRight),
    (b"\x1b[1;2D",  KeyCode::ShiftLeft),
    (b"\x1b[1;5A",  KeyCode::CtrlUp),
    (b"\x1b[1;5B",  KeyCode::CtrlDown),
    (b"\x1b[1;5C",  KeyCode::CtrlRight),
    (b"\x1b[1;5D",  KeyCode::CtrlLeft),
    (b"\x1b[1~",    KeyCode::Home),
    (b"\x1b[20~",   KeyCode::F9),
    (b"\x1b[21~",   KeyCode::F10),
    (b"\x1b[23~",   KeyCode::F11),
    (b"\x1b[24~",   KeyCode::F12),
    (b"\x1b[2~",    KeyCode::Insert),
    (b"\x1b[3~",    KeyCode::Delete),
    (b"\x1b[4~",    KeyCode::End),
    (b"\x1b[5~",    KeyCode::PgUp),
    (b"\x1b[6~",    KeyCode::PgDown),
    (b"\x1b[A",     KeyCode::Up),
    (b"\x1b[B",     KeyCode::Down),
    (b"\x1b[C",     KeyCode::Right),
    (b"\x1b[D",     KeyCode::Left),
    (b"\x1b[F",     KeyCode::End),
    (b"\x1b[H",     KeyCode::Home),
    (b"\x1b[Z",     KeyCode::ShiftTab),
];

/// Find the table entry that is a prefix of `buf`.
///
/// Returns the mapped key and the entry length.
#[must_use]
pub fn match_escape(buf: &[u8]) -> Option<(KeyCode, usize)> {
    ESCAPE_TABLE
        .binary_search_by(|(seq, _)| {
            let n = seq.len().min(buf.len());
            (*seq).cmp(&buf[..n])
        })
        .ok()
        .map(|i| (ESCAPE_TABLE[i].1, ESCAPE_TABLE[i].0.len()))
}

/// Whether `buf` is a strict prefix of some table entry.
///
/// True means more bytes could still turn `buf` into a recognized key.
#[must_use]
pub fn is_escape_prefix(buf: &[u8]) -> bool {
    ESCAPE_TABLE
        .iter()
        .any(|(seq, _)| seq.len() > buf.len() && seq.starts_with(buf))
}

// ─── Tests ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashSet;

    /// Every code the decoder can produce, in value order per group.
    fn all_codes() -> Vec<KeyCode> {
        let mut codes: Vec<KeyCode> = CONTROL_CODES.to_vec();
        codes.push(KeyCode::Backspace);
        codes.extend_from_slice(&NAMED_CODES);
        codes.extend_from_slice(&MODIFIED_ARROWS);
        codes
    }

    // ── Values ──────────────────────────────────────────────────────────

    #[test]
    fn control_codes_match_raw_bytes() {
        assert_eq!(KeyCode::Null.value(), 0);
        assert_eq!(KeyCode::CtrlA.value(), 1);
        assert_eq!(KeyCode::CtrlC.value(), 3);
        assert_eq!(KeyCode::Tab.value(), 9);
        assert_eq!(KeyCode::Enter.value(), 13);
        assert_eq!(KeyCode::CtrlZ.value(), 26);
        assert_eq!(KeyCode::Esc.value(), 27);
        assert_eq!(KeyCode::Backspace.value(), 127);
        assert_eq!(KeyCode::UnknownControl(0x1C).value(), 28);
    }

    #[test]
    fn named_codes_are_negative() {
        assert_eq!(KeyCode::Runes.value(), -1);
        assert_eq!(KeyCode::Up.value(), -2);
        assert_eq!(KeyCode::Insert.value(), -11);
        assert_eq!(KeyCode::F1.value(), -12);
        assert_eq!(KeyCode::F12.value(), -23);
        assert_eq!(KeyCode::ShiftTab.value(), -24);
        assert_eq!(KeyCode::Space.value(), -25);
    }

    #[test]
    fn modified_arrow_values() {
        assert_eq!(KeyCode::ShiftUp.value(), -100);
        assert_eq!(KeyCode::ShiftLeft.value(), -103);
        assert_eq!(KeyCode::CtrlUp.value(), -104);
        assert_eq!(KeyCode::CtrlLeft.value(), -107);
    }

    #[test]
    fn value_round_trips_for_every_code() {
        for code in all_codes() {
            assert_eq!(KeyCode::from_value(code.value()), Some(code), "{code:?}");
        }
    }

    #[test]
    fn values_are_unique() {
        let values: HashSet<i32> = all_codes().iter().map(|c| c.value()).collect();
        assert_eq!(values.len(), all_codes().len());
    }

    #[test]
    fn from_value_rejects_gaps() {
        assert_eq!(KeyCode::from_value(32), None);
        assert_eq!(KeyCode::from_value(126), None);
        assert_eq!(KeyCode::from_value(-26), None);
        assert_eq!(KeyCode::from_value(-99), None);
        assert_eq!(KeyCode::from_value(-108), None);
    }

    // ── Control bytes ───────────────────────────────────────────────────

    #[test]
    fn from_control_byte_covers_c0_and_del() {
        assert_eq!(KeyCode::from_control_byte(0x03), Some(KeyCode::CtrlC));
        assert_eq!(KeyCode::from_control_byte(0x1B), Some(KeyCode::Esc));
        assert_eq!(KeyCode::from_control_byte(0x7F), Some(KeyCode::Backspace));
        assert_eq!(
            KeyCode::from_control_byte(0x1F),
            Some(KeyCode::UnknownControl(0x1F))
        );
        assert_eq!(KeyCode::from_control_byte(b'a'), None);
        assert_eq!(KeyCode::from_control_byte(0x20), None);
    }

    // ── Names ───────────────────────────────────────────────────────────

    #[test]
    fn names_follow_convention() {
        assert_eq!(KeyCode::CtrlC.name(), "ctrl+c");
        assert_eq!(KeyCode::ShiftTab.name(), "shift+tab");
        assert_eq!(KeyCode::F12.name(), "f12");
        assert_eq!(KeyCode::PgDown.name(), "pgdown");
        assert_eq!(KeyCode::CtrlRight.name(), "ctrl+right");
    }

    #[test]
    fn names_are_lowercase_without_hyphens() {
        for code in all_codes() {
            let name = code.name();
            assert_eq!(name, name.to_lowercase());
            assert!(!name.contains('-'), "{name}");
        }
    }

    #[test]
    fn named_codes_have_unique_names() {
        let named: Vec<KeyCode> = all_codes()
            .into_iter()
            .filter(|c| !matches!(c, KeyCode::UnknownControl(_)))
            .collect();
        let names: HashSet<&str> = named.iter().map(|c| c.name()).collect();
        assert_eq!(names.len(), named.len());
    }

    #[test]
    fn key_name_lookup() {
        assert_eq!(key_name(3), Some("ctrl+c"));
        assert_eq!(key_name(-2), Some("up"));
        assert_eq!(key_name(-104), Some("ctrl+up"));
        assert_eq!(key_name(28), None);
        assert_eq!(key_name(500), None);
    }

    // ── Escape table ────────────────────────────────────────────────────

    #[test]
    fn table_is_sorted_and_prefix_free() {
        for pair in ESCAPE_TABLE.windows(2) {
            assert!(pair[0].0 < pair[1].0, "{:?} !< {:?}", pair[0].0, pair[1].0);
        }
        for (a, _) in &ESCAPE_TABLE {
            for (b, _) in &ESCAPE_TABLE {
                if a != b {
                    assert!(!b.starts_with(a), "{a:?} prefixes {b:?}");
                }
            }
        }
    }

    #[test]
    fn every_entry_matches_itself() {
        for (seq, code) in &ESCAPE_TABLE {
            assert_eq!(match_escape(seq), Some((*code, seq.len())));
        }
    }

    #[test]
    fn match_ignores_trailing_bytes() {
        assert_eq!(match_escape(b"\x1b[Axyz"), Some((KeyCode::Up, 3)));
        assert_eq!(match_escape(b"\x1b[24~\x1b[A"), Some((KeyCode::F12, 5)));
    }

    #[test]
    fn match_rejects_unknown_and_partial() {
        assert_eq!(match_escape(b"\x1b[1;3A"), None);
        assert_eq!(match_escape(b"\x1b[1"), None);
        assert_eq!(match_escape(b"\x1bx"), None);
        assert_eq!(match_escape(b"\x1b"), None);
    }

    #[test]
    fn escape_prefix_detection() {
        assert!(is_escape_prefix(b"\x1b"));
        assert!(is_escape_prefix(b"\x1b["));
        assert!(is_escape_prefix(b"\x1b[1;"));
        assert!(is_escape_prefix(b"\x1bO"));
        assert!(!is_escape_prefix(b"\x1b[A"));
        assert!(!is_escape_prefix(b"\x1b[9"));
        assert!(!is_escape_prefix(b"\x1ba"));
    }
}
