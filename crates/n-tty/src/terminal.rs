// SPDX-License-Identifier: MIT
//
// Terminal modes: raw input, alternate screen, cursor, mouse, paste, focus.
//
// Safety: termios (tcgetattr, tcsetattr), ioctl (TIOCGWINSZ), isatty, and
// the raw fd write in the panic hook are POSIX calls with no safe wrapper
// in std. Each unsafe block is minimal.
#![allow(unsafe_code)]
//
// Two layers:
//
//   Free functions (`enable_raw_mode`, `restore`, `get_size`, `is_tty`) talk
//   to the OS directly. Raw mode hands back a `SavedMode` that puts the
//   line discipline back the way it was.
//
//   `Terminal<W>` tracks which modes it turned on and writes the escape
//   sequences to `W` (stdout in production, a `Vec<u8>` in tests). Every
//   toggle is idempotent. `restore()` undoes whatever is still active, and
//   so does `Drop`.
//
// The panic hook writes a fixed restore sequence straight to fd 1 and puts
// the saved termios back, so a panic in raw mode still leaves a usable
// shell and a readable panic message. It bypasses the stdout lock, which
// the panicking thread may be holding mid-flush.

use std::fmt;
use std::io::{self, Write};
use std::sync::Once;

use bitflags::bitflags;

use crate::ansi::{self, MouseMode};
use crate::error::{Error, Result};

// ─── Size ───────────────────────────────────────────────────────────────────

/// Terminal dimensions in character cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Size {
    pub width: u16,
    pub height: u16,
}

// ─── Terminal Queries ───────────────────────────────────────────────────────

/// Query the terminal size via `ioctl(TIOCGWINSZ)` on stdout.
///
/// # Errors
///
/// Returns [`Error::NotATerminal`] if stdout is not a terminal or reports
/// a zero dimension.
#[cfg(unix)]
pub fn get_size() -> Result<Size> {
    // SAFETY: winsize is plain data; the ioctl fills it or fails.
    let mut ws: libc::winsize = unsafe { std::mem::zeroed() };
    let rc = unsafe { libc::ioctl(libc::STDOUT_FILENO, libc::TIOCGWINSZ, &raw mut ws) };

    if rc == 0 && ws.ws_col > 0 && ws.ws_row > 0 {
        Ok(Size {
            width: ws.ws_col,
            height: ws.ws_row,
        })
    } else {
        Err(Error::NotATerminal)
    }
}

#[cfg(not(unix))]
pub fn get_size() -> Result<Size> {
    Err(Error::NotATerminal)
}

/// Whether stdin is connected to a terminal.
#[cfg(unix)]
#[must_use]
pub fn is_tty() -> bool {
    unsafe { libc::isatty(libc::STDIN_FILENO) != 0 }
}

#[cfg(not(unix))]
#[must_use]
pub fn is_tty() -> bool {
    false
}

// ─── Raw Mode ───────────────────────────────────────────────────────────────

/// Line-discipline settings captured before entering raw mode.
#[derive(Clone, Copy)]
pub struct SavedMode {
    #[cfg(unix)]
    termios: libc::termios,
}

impl fmt::Debug for SavedMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SavedMode").finish_non_exhaustive()
    }
}

/// Put stdin into raw mode: no echo, no line buffering, no signal keys,
/// 8-bit input, no output post-processing.
///
/// Also installs the panic hook (once per process) and keeps a copy of the
/// original settings for it.
///
/// # Errors
///
/// Returns [`Error::NotATerminal`] if stdin is not a TTY, or the OS error
/// from `tcgetattr`/`tcsetattr`.
#[cfg(unix)]
pub fn enable_raw_mode() -> Result<SavedMode> {
    if !is_tty() {
        return Err(Error::NotATerminal);
    }
    install_panic_hook();

    let fd = libc::STDIN_FILENO;
    // SAFETY: termios is plain data filled by tcgetattr; both calls get a
    // valid pointer to a live local.
    unsafe {
        let mut termios: libc::termios = std::mem::zeroed();
        if libc::tcgetattr(fd, &raw mut termios) != 0 {
            return Err(io::Error::last_os_error().into());
        }
        let saved = SavedMode { termios };

        {
            let mut backup = TERMIOS_BACKUP.lock();
            if backup.is_none() {
                *backup = Some(termios);
            }
        }

        libc::cfmakeraw(&raw mut termios);
        termios.c_cc[libc::VMIN] = 1;
        termios.c_cc[libc::VTIME] = 0;

        if libc::tcsetattr(fd, libc::TCSAFLUSH, &raw const termios) != 0 {
            return Err(io::Error::last_os_error().into());
        }
        Ok(saved)
    }
}

#[cfg(not(unix))]
pub fn enable_raw_mode() -> Result<SavedMode> {
    Err(Error::NotATerminal)
}

/// Restore the settings captured by [`enable_raw_mode`].
///
/// # Errors
///
/// Returns the OS error from `tcsetattr`.
#[cfg(unix)]
pub fn restore(saved: &SavedMode) -> Result<()> {
    // SAFETY: `saved.termios` came from tcgetattr.
    let rc = unsafe {
        libc::tcsetattr(libc::STDIN_FILENO, libc::TCSAFLUSH, &raw const saved.termios)
    };
    if rc != 0 {
        return Err(io::Error::last_os_error().into());
    }
    *TERMIOS_BACKUP.lock() = None;
    Ok(())
}

#[cfg(not(unix))]
pub fn restore(_saved: &SavedMode) -> Result<()> {
    Ok(())
}

// ─── Panic-Safe Restore ─────────────────────────────────────────────────────

/// Original termios for the panic hook, which cannot reach any `SavedMode`.
/// The first raw-mode entry wins, so nested sessions keep the shell's
/// settings.
#[cfg(unix)]
static TERMIOS_BACKUP: parking_lot::Mutex<Option<libc::termios>> =
    parking_lot::const_mutex(None);

/// Everything a `Terminal` can turn on, turned off. Alternate screen exit
/// comes last so the shell content reappears clean.
#[rustfmt::skip]
const EMERGENCY_RESTORE: &[u8] = b"\
    \x1b[?1002l\x1b[?1003l\x1b[?1006l\
    \x1b[?2004l\
    \x1b[?1004l\
    \x1b[0m\
    \x1b[?25h\
    \x1b[?1049l";

static PANIC_HOOK_INSTALLED: Once = Once::new();

fn install_panic_hook() {
    PANIC_HOOK_INSTALLED.call_once(|| {
        let original = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            emergency_restore();
            original(info);
        }));
    });
}

/// Write [`EMERGENCY_RESTORE`] to fd 1 and put termios back. Best-effort.
fn emergency_restore() {
    #[cfg(unix)]
    {
        // SAFETY: writing a static buffer to a valid fd.
        unsafe {
            let _ = libc::write(
                libc::STDOUT_FILENO,
                EMERGENCY_RESTORE.as_ptr().cast::<libc::c_void>(),
                EMERGENCY_RESTORE.len(),
            );
        }
        // `try_lock`: the panic may have happened while the lock was held.
        if let Some(guard) = TERMIOS_BACKUP.try_lock() {
            if let Some(original) = guard.as_ref() {
                // SAFETY: `original` came from tcgetattr.
                unsafe {
                    let _ = libc::tcsetattr(libc::STDIN_FILENO, libc::TCSANOW, original);
                }
            }
        }
    }

    #[cfg(not(unix))]
    {
        let mut stdout = io::stdout();
        let _ = stdout.write_all(EMERGENCY_RESTORE);
        let _ = stdout.flush();
    }
}

// ─── Terminal ───────────────────────────────────────────────────────────────

bitflags! {
    /// Modes a `Terminal` has turned on.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    struct Modes: u8 {
        const RAW             = 1 << 0;
        const ALT_SCREEN      = 1 << 1;
        const CURSOR_HIDDEN   = 1 << 2;
        const MOUSE           = 1 << 3;
        const BRACKETED_PASTE = 1 << 4;
        const FOCUS           = 1 << 5;
    }
}

/// Terminal mode tracker with RAII cleanup.
///
/// # Example
///
/// ```no_run
/// use n_tty::ansi::MouseMode;
/// use n_tty::terminal::Terminal;
///
/// let mut term = Terminal::new();
/// term.enter_raw_mode()?;
/// term.enter_alt_screen()?;
/// term.enable_mouse(MouseMode::CellMotion)?;
/// // ... render frames, handle input ...
/// // Everything is undone on drop.
/// # Ok::<(), n_tty::Error>(())
/// ```
pub struct Terminal<W: Write = io::Stdout> {
    out: W,
    modes: Modes,
    mouse: Option<MouseMode>,
    saved: Option<SavedMode>,
}

impl Terminal<io::Stdout> {
    /// A terminal writing to stdout. No mode is changed yet.
    #[must_use]
    pub fn new() -> Self {
        Self::with_writer(io::stdout())
    }
}

impl Default for Terminal<io::Stdout> {
    fn default() -> Self {
        Self::new()
    }
}

impl<W: Write> Terminal<W> {
    /// A terminal writing its escape sequences to `out`.
    pub const fn with_writer(out: W) -> Self {
        Self {
            out,
            modes: Modes::empty(),
            mouse: None,
            saved: None,
        }
    }

    /// The underlying writer.
    pub const fn writer(&self) -> &W {
        &self.out
    }

    /// Whether any mode is still active.
    pub const fn is_active(&self) -> bool {
        !self.modes.is_empty()
    }

    pub const fn is_raw(&self) -> bool {
        self.modes.contains(Modes::RAW)
    }

    pub const fn is_alt_screen(&self) -> bool {
        self.modes.contains(Modes::ALT_SCREEN)
    }

    /// The active mouse mode, if reporting is on.
    pub const fn mouse_mode(&self) -> Option<MouseMode> {
        self.mouse
    }

    /// Write `seq` and flush, then record `mode` as on or off.
    fn toggle(
        &mut self,
        mode: Modes,
        on: bool,
        seq: impl FnOnce(&mut W) -> io::Result<()>,
    ) -> io::Result<()> {
        if self.modes.contains(mode) == on {
            return Ok(());
        }
        seq(&mut self.out)?;
        self.out.flush()?;
        self.modes.set(mode, on);
        Ok(())
    }

    // ── Raw mode ────────────────────────────────────────────────────

    /// Enter raw mode. No-op if already raw.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotATerminal`] if stdin is not a TTY.
    pub fn enter_raw_mode(&mut self) -> Result<()> {
        if self.is_raw() {
            return Ok(());
        }
        self.saved = Some(enable_raw_mode()?);
        self.modes.insert(Modes::RAW);
        Ok(())
    }

    /// Leave raw mode. No-op if not raw.
    ///
    /// # Errors
    ///
    /// Returns the OS error from restoring termios.
    pub fn exit_raw_mode(&mut self) -> Result<()> {
        if let Some(saved) = self.saved.take() {
            restore(&saved)?;
        }
        self.modes.remove(Modes::RAW);
        Ok(())
    }

    // ── Screen and cursor ───────────────────────────────────────────

    /// Switch to the alternate screen, clear it, and home the cursor.
    ///
    /// # Errors
    ///
    /// Returns an error if writing fails.
    pub fn enter_alt_screen(&mut self) -> io::Result<()> {
        self.toggle(Modes::ALT_SCREEN, true, |w| {
            ansi::enter_alt_screen(w)?;
            ansi::clear_screen(w)?;
            ansi::cursor_home(w)
        })
    }

    /// Return to the main screen.
    ///
    /// # Errors
    ///
    /// Returns an error if writing fails.
    pub fn exit_alt_screen(&mut self) -> io::Result<()> {
        self.toggle(Modes::ALT_SCREEN, false, |w| ansi::exit_alt_screen(w))
    }

    /// # Errors
    ///
    /// Returns an error if writing fails.
    pub fn hide_cursor(&mut self) -> io::Result<()> {
        self.toggle(Modes::CURSOR_HIDDEN, true, |w| ansi::cursor_hide(w))
    }

    /// # Errors
    ///
    /// Returns an error if writing fails.
    pub fn show_cursor(&mut self) -> io::Result<()> {
        self.toggle(Modes::CURSOR_HIDDEN, false, |w| ansi::cursor_show(w))
    }

    /// Erase the screen and home the cursor.
    ///
    /// # Errors
    ///
    /// Returns an error if writing fails.
    pub fn clear_screen(&mut self) -> io::Result<()> {
        ansi::clear_screen(&mut self.out)?;
        ansi::cursor_home(&mut self.out)?;
        self.out.flush()
    }

    /// Set the window title.
    ///
    /// # Errors
    ///
    /// Returns an error if writing fails.
    pub fn set_window_title(&mut self, title: &str) -> io::Result<()> {
        ansi::set_window_title(&mut self.out, title)?;
        self.out.flush()
    }

    // ── Reporting modes ─────────────────────────────────────────────

    /// Turn on mouse reporting. Switching from another mode disables the
    /// old one first.
    ///
    /// # Errors
    ///
    /// Returns an error if writing fails.
    pub fn enable_mouse(&mut self, mode: MouseMode) -> io::Result<()> {
        if self.mouse == Some(mode) {
            return Ok(());
        }
        self.disable_mouse()?;
        self.toggle(Modes::MOUSE, true, |w| ansi::enable_mouse(w, mode))?;
        self.mouse = Some(mode);
        Ok(())
    }

    /// # Errors
    ///
    /// Returns an error if writing fails.
    pub fn disable_mouse(&mut self) -> io::Result<()> {
        self.toggle(Modes::MOUSE, false, |w| ansi::disable_mouse(w))?;
        self.mouse = None;
        Ok(())
    }

    /// # Errors
    ///
    /// Returns an error if writing fails.
    pub fn enable_bracketed_paste(&mut self) -> io::Result<()> {
        self.toggle(Modes::BRACKETED_PASTE, true, |w| ansi::enable_bracketed_paste(w))
    }

    /// # Errors
    ///
    /// Returns an error if writing fails.
    pub fn disable_bracketed_paste(&mut self) -> io::Result<()> {
        self.toggle(Modes::BRACKETED_PASTE, false, |w| ansi::disable_bracketed_paste(w))
    }

    /// # Errors
    ///
    /// Returns an error if writing fails.
    pub fn enable_focus_reporting(&mut self) -> io::Result<()> {
        self.toggle(Modes::FOCUS, true, |w| ansi::enable_focus_reporting(w))
    }

    /// # Errors
    ///
    /// Returns an error if writing fails.
    pub fn disable_focus_reporting(&mut self) -> io::Result<()> {
        self.toggle(Modes::FOCUS, false, |w| ansi::disable_focus_reporting(w))
    }

    // ── Restore ─────────────────────────────────────────────────────

    /// Undo every active mode, in reverse order of how an application
    /// usually enables them. Every step is attempted; the first error is
    /// returned.
    ///
    /// # Errors
    ///
    /// Returns the first write or termios error encountered.
    pub fn restore(&mut self) -> Result<()> {
        let steps = [
            self.disable_focus_reporting().map_err(Error::from),
            self.disable_bracketed_paste().map_err(Error::from),
            self.disable_mouse().map_err(Error::from),
            self.show_cursor().map_err(Error::from),
            self.exit_alt_screen().map_err(Error::from),
            self.exit_raw_mode(),
        ];
        steps.into_iter().collect()
    }
}

impl<W: Write> Drop for Terminal<W> {
    fn drop(&mut self) {
        if self.is_active() {
            if let Err(e) = self.restore() {
                log::warn!("terminal restore on drop failed: {e}");
            }
        }
    }
}

impl<W: Write> fmt::Debug for Terminal<W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Terminal")
            .field("modes", &self.modes)
            .field("mouse", &self.mouse)
            .finish_non_exhaustive()
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn term() -> Terminal<Vec<u8>> {
        Terminal::with_writer(Vec::new())
    }

    fn written(t: &Terminal<Vec<u8>>) -> String {
        String::from_utf8(t.writer().clone()).unwrap()
    }

    // ── Queries ─────────────────────────────────────────────────────

    #[test]
    fn queries_do_not_panic() {
        let _ = get_size();
        let _ = is_tty();
    }

    #[test]
    fn raw_mode_requires_tty() {
        if !is_tty() {
            assert!(matches!(enable_raw_mode(), Err(Error::NotATerminal)));
            let mut t = term();
            assert!(matches!(t.enter_raw_mode(), Err(Error::NotATerminal)));
            assert!(!t.is_raw());
        }
    }

    // ── Emergency restore ───────────────────────────────────────────

    #[test]
    fn emergency_restore_exits_alt_screen_last() {
        let s = std::str::from_utf8(EMERGENCY_RESTORE).unwrap();
        assert!(s.ends_with("\x1b[?1049l"));
    }

    #[test]
    fn emergency_restore_covers_every_mode() {
        let s = std::str::from_utf8(EMERGENCY_RESTORE).unwrap();
        for seq in [
            "\x1b[?1002l",
            "\x1b[?1003l",
            "\x1b[?1006l",
            "\x1b[?2004l",
            "\x1b[?1004l",
            "\x1b[0m",
            "\x1b[?25h",
        ] {
            assert!(s.contains(seq), "missing {seq:?}");
        }
    }

    // ── Toggles ─────────────────────────────────────────────────────

    #[test]
    fn alt_screen_clears_and_homes() {
        let mut t = term();
        t.enter_alt_screen().unwrap();
        assert_eq!(written(&t), "\x1b[?1049h\x1b[2J\x1b[H");
        assert!(t.is_alt_screen());
    }

    #[test]
    fn toggles_are_idempotent() {
        let mut t = term();
        t.hide_cursor().unwrap();
        t.hide_cursor().unwrap();
        t.enable_bracketed_paste().unwrap();
        t.enable_bracketed_paste().unwrap();
        t.show_cursor().unwrap();
        t.show_cursor().unwrap();
        assert_eq!(written(&t), "\x1b[?25l\x1b[?2004h\x1b[?25h");
    }

    #[test]
    fn disable_without_enable_writes_nothing() {
        let mut t = term();
        t.disable_mouse().unwrap();
        t.disable_focus_reporting().unwrap();
        t.exit_alt_screen().unwrap();
        t.exit_raw_mode().unwrap();
        assert_eq!(written(&t), "");
        assert!(!t.is_active());
    }

    #[test]
    fn mouse_mode_switch_disables_first() {
        let mut t = term();
        t.enable_mouse(MouseMode::CellMotion).unwrap();
        t.enable_mouse(MouseMode::CellMotion).unwrap();
        t.enable_mouse(MouseMode::AllMotion).unwrap();
        assert_eq!(t.mouse_mode(), Some(MouseMode::AllMotion));
        assert_eq!(
            written(&t),
            "\x1b[?1002h\x1b[?1006h\
             \x1b[?1002l\x1b[?1003l\x1b[?1006l\
             \x1b[?1003h\x1b[?1006h"
        );
    }

    #[test]
    fn title_and_clear() {
        let mut t = term();
        t.set_window_title("demo").unwrap();
        t.clear_screen().unwrap();
        assert_eq!(written(&t), "\x1b]2;demo\x07\x1b[2J\x1b[H");
        assert!(!t.is_active());
    }

    // ── Restore ─────────────────────────────────────────────────────

    #[test]
    fn restore_undoes_active_modes_in_order() {
        let mut t = term();
        t.enter_alt_screen().unwrap();
        t.hide_cursor().unwrap();
        t.enable_mouse(MouseMode::CellMotion).unwrap();
        t.enable_focus_reporting().unwrap();
        let before = written(&t).len();

        t.restore().unwrap();
        assert!(!t.is_active());
        assert_eq!(t.mouse_mode(), None);
        assert_eq!(
            &written(&t)[before..],
            "\x1b[?1004l\
             \x1b[?1002l\x1b[?1003l\x1b[?1006l\
             \x1b[?25h\
             \x1b[?1049l"
        );

        // Nothing left to undo.
        let after = written(&t).len();
        t.restore().unwrap();
        assert_eq!(written(&t).len(), after);
    }

    /// Writer that shares its bytes so they survive the terminal's drop.
    #[derive(Clone, Default)]
    struct Shared(std::sync::Arc<parking_lot::Mutex<Vec<u8>>>);

    impl Write for Shared {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn drop_restores() {
        let sink = Shared::default();
        {
            let mut t = Terminal::with_writer(sink.clone());
            t.enter_alt_screen().unwrap();
            t.enable_bracketed_paste().unwrap();
        }
        let bytes = sink.0.lock().clone();
        let s = String::from_utf8(bytes).unwrap();
        assert!(s.ends_with("\x1b[?2004l\x1b[?1049l"));
    }
}
