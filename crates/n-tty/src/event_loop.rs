// SPDX-License-Identifier: MIT
#![allow(unsafe_code)]
//
// Event loop: the heartbeat of a terminal application.
//
// Bytes flow in from the session's background reader, get decoded into
// events, the application handles them and describes its screen as a
// string, and the session's diff renderer writes only what changed.
//
// # Tick-driven polling
//
// The loop blocks on the input queue with a short timeout (8.3ms, 120 Hz
// by default). Input wakes it immediately; an idle terminal costs nothing
// because the thread sleeps in `recv_timeout`; the timeout doubles as the
// animation tick and as the escape-sequence timeout, so a lone ESC turns
// into the Escape key one tick after it was typed.
//
// A frame is rendered only when something changed: an event arrived, the
// terminal was resized, or `on_tick` asked for a repaint.
//
// # SIGWINCH
//
// Resize is detected by a signal handler that sets an `AtomicBool`. The
// loop checks it every iteration, queries the new size, and hands the
// application a `Resize` event.

use std::io::{self, Write};
use std::ops::ControlFlow;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crate::ansi::MouseMode;
use crate::error::Result;
use crate::input::Event;
use crate::reader::ReaderConfig;
use crate::registry::{Polled, Session};
use crate::terminal::{self, Size};

// ─── SIGWINCH ────────────────────────────────────────────────────────────────

static SIGWINCH_RECEIVED: AtomicBool = AtomicBool::new(false);

/// Install a SIGWINCH handler that only sets [`SIGWINCH_RECEIVED`].
///
/// Storing to an atomic is async-signal-safe.
#[cfg(unix)]
fn install_sigwinch_handler() {
    unsafe {
        let mut sa: libc::sigaction = std::mem::zeroed();
        sa.sa_sigaction = sigwinch_handler as *const () as usize;
        sa.sa_flags = libc::SA_RESTART;
        libc::sigemptyset(&raw mut sa.sa_mask);
        libc::sigaction(libc::SIGWINCH, &raw const sa, std::ptr::null_mut());
    }
}

#[cfg(unix)]
extern "C" fn sigwinch_handler(_sig: libc::c_int) {
    SIGWINCH_RECEIVED.store(true, Ordering::Relaxed);
}

#[cfg(not(unix))]
const fn install_sigwinch_handler() {}

/// Used when the terminal cannot report its size.
const FALLBACK_SIZE: Size = Size {
    width: 80,
    height: 24,
};

// ─── App Trait ───────────────────────────────────────────────────────────────

/// What the application tells the loop after handling an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Continue,
    Quit,
}

/// Application interface for [`EventLoop`].
///
/// Only [`view`](App::view) is required.
pub trait App {
    /// Handle one input or resize event.
    ///
    /// Return [`Action::Quit`] to leave the loop.
    fn on_event(&mut self, _event: &Event) -> Action {
        Action::Continue
    }

    /// Called every iteration, even without input. Return `true` if
    /// time-based state changed and the screen needs repainting.
    fn on_tick(&mut self) -> bool {
        false
    }

    /// The full screen contents, lines separated by `\n`.
    fn view(&self) -> String;
}

// ─── LoopConfig ──────────────────────────────────────────────────────────────

/// Terminal modes and timing for [`EventLoop`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopConfig {
    /// Input poll timeout. Also the tick rate and the escape timeout.
    pub tick_interval: Duration,
    /// Paint on the alternate screen instead of inline.
    pub alt_screen: bool,
    /// Mouse reporting, off when `None`.
    pub mouse: Option<MouseMode>,
    pub report_focus: bool,
    pub bracketed_paste: bool,
    pub reader: ReaderConfig,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_micros(8333), // 120 Hz
            alt_screen: true,
            mouse: None,
            report_focus: false,
            bracketed_paste: false,
            reader: ReaderConfig::default(),
        }
    }
}

// ─── EventLoop ───────────────────────────────────────────────────────────────

/// Drives an [`App`] against one [`Session`].
///
/// # Example
///
/// ```no_run
/// use n_tty::event_loop::{Action, App, EventLoop, LoopConfig};
/// use n_tty::input::Event;
/// use n_tty::registry::SessionRegistry;
///
/// struct Counter(u32);
///
/// impl App for Counter {
///     fn on_event(&mut self, event: &Event) -> Action {
///         match event {
///             Event::Key(key) if key.name == "q" => Action::Quit,
///             Event::Key(_) => {
///                 self.0 += 1;
///                 Action::Continue
///             }
///             _ => Action::Continue,
///         }
///     }
///
///     fn view(&self) -> String {
///         format!("{} keys pressed\npress q to quit", self.0)
///     }
/// }
///
/// let registry = SessionRegistry::new();
/// let session = registry.get(registry.create())?;
/// EventLoop::new(session, LoopConfig::default()).run(&mut Counter(0))?;
/// # Ok::<(), n_tty::Error>(())
/// ```
#[derive(Debug)]
pub struct EventLoop {
    session: Arc<Session>,
    config: LoopConfig,
}

impl EventLoop {
    #[must_use]
    pub const fn new(session: Arc<Session>, config: LoopConfig) -> Self {
        Self { session, config }
    }

    #[must_use]
    pub const fn config(&self) -> LoopConfig {
        self.config
    }

    #[must_use]
    pub const fn session(&self) -> &Arc<Session> {
        &self.session
    }

    /// Run until the application quits or input ends.
    ///
    /// Enters raw mode and the configured modes, starts the session's
    /// reader, and loops. Input is stopped and the terminal restored on
    /// every exit path, errors included.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotATerminal`](crate::Error::NotATerminal) when
    /// stdin is not a TTY, or the first I/O error from entering modes,
    /// rendering, or restoring.
    pub fn run(&mut self, app: &mut impl App) -> Result<()> {
        let result = self.enter().and_then(|()| self.run_inner(app));

        self.session.stop_input();
        let restored = self.session.terminal().restore();

        if !self.config.alt_screen && result.is_ok() {
            // Leave the shell prompt below the last inline frame.
            let mut stdout = io::stdout();
            stdout.write_all(b"\r\n").and_then(|()| stdout.flush()).ok();
        }

        result.and(restored)
    }

    fn enter(&self) -> Result<()> {
        {
            let mut term = self.session.terminal();
            term.enter_raw_mode()?;
            if self.config.alt_screen {
                term.enter_alt_screen()?;
            }
            term.hide_cursor()?;
            if let Some(mode) = self.config.mouse {
                term.enable_mouse(mode)?;
            }
            if self.config.bracketed_paste {
                term.enable_bracketed_paste()?;
            }
            if self.config.report_focus {
                term.enable_focus_reporting()?;
            }
        }
        self.session.set_alt_screen(self.config.alt_screen);

        install_sigwinch_handler();
        SIGWINCH_RECEIVED.store(false, Ordering::Relaxed);

        self.session.start_input(self.config.reader)
    }

    fn run_inner(&self, app: &mut impl App) -> Result<()> {
        let size = terminal::get_size().unwrap_or(FALLBACK_SIZE);
        let initial = self.session.resize(size.width, size.height);
        if deliver(app, &[initial]).is_break() {
            return Ok(());
        }
        let mut dirty = true;

        loop {
            // ── Input ────────────────────────────────────────────
            match self.session.poll_events(self.config.tick_interval)? {
                Polled::Events(events) => match deliver(app, &events) {
                    ControlFlow::Break(()) => return Ok(()),
                    ControlFlow::Continue(changed) => dirty |= changed,
                },
                Polled::Timeout => {}
                Polled::Closed => {
                    log::debug!("input closed, leaving event loop");
                    return Ok(());
                }
            }

            // ── Resize ───────────────────────────────────────────
            if SIGWINCH_RECEIVED.swap(false, Ordering::Relaxed) {
                if let Ok(size) = terminal::get_size() {
                    let event = self.session.resize(size.width, size.height);
                    if deliver(app, &[event]).is_break() {
                        return Ok(());
                    }
                    dirty = true;
                }
            }

            // ── Tick ─────────────────────────────────────────────
            if app.on_tick() {
                dirty = true;
            }

            // ── Render ───────────────────────────────────────────
            if dirty {
                self.session.render(&app.view())?;
                dirty = false;
            }
        }
    }
}

/// Hand `events` to the app in order. Breaks on the first `Quit`;
/// otherwise continues with whether anything was delivered.
fn deliver(app: &mut impl App, events: &[Event]) -> ControlFlow<(), bool> {
    for event in events {
        if app.on_event(event) == Action::Quit {
            return ControlFlow::Break(());
        }
    }
    ControlFlow::Continue(!events.is_empty())
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::KeyEvent;
    use crate::keys::KeyCode;
    use crate::registry::SessionRegistry;
    use pretty_assertions::assert_eq;

    #[derive(Default)]
    struct Recorder {
        seen: Vec<Event>,
        quit_on: Option<KeyCode>,
    }

    impl App for Recorder {
        fn on_event(&mut self, event: &Event) -> Action {
            self.seen.push(event.clone());
            match event {
                Event::Key(key) if Some(key.code) == self.quit_on => Action::Quit,
                _ => Action::Continue,
            }
        }

        fn view(&self) -> String {
            format!("{} events", self.seen.len())
        }
    }

    // ── LoopConfig ──────────────────────────────────────────────

    #[test]
    fn default_config_is_120hz_alt_screen() {
        let config = LoopConfig::default();
        assert_eq!(config.tick_interval, Duration::from_micros(8333));
        assert!(config.alt_screen);
        assert_eq!(config.mouse, None);
        assert_eq!(config.reader, ReaderConfig::default());
    }

    // ── deliver ─────────────────────────────────────────────────

    #[test]
    fn deliver_reports_whether_anything_arrived() {
        let mut app = Recorder::default();
        assert_eq!(deliver(&mut app, &[]), ControlFlow::Continue(false));
        let events = [Event::Focus { focused: true }];
        assert_eq!(deliver(&mut app, &events), ControlFlow::Continue(true));
        assert_eq!(app.seen, events);
    }

    #[test]
    fn deliver_stops_at_quit() {
        let mut app = Recorder {
            quit_on: Some(KeyCode::CtrlC),
            ..Recorder::default()
        };
        let events = [
            Event::Key(KeyEvent::rune('a', false)),
            Event::Key(KeyEvent::named(KeyCode::CtrlC)),
            Event::Key(KeyEvent::rune('b', false)),
        ];
        assert_eq!(deliver(&mut app, &events), ControlFlow::Break(()));
        assert_eq!(app.seen, events[..2]);
    }

    #[test]
    fn default_hooks_are_noops() {
        struct Static;
        impl App for Static {
            fn view(&self) -> String {
                String::from("static")
            }
        }
        let mut app = Static;
        assert_eq!(app.on_event(&Event::Focus { focused: false }), Action::Continue);
        assert!(!app.on_tick());
    }

    // ── run ─────────────────────────────────────────────────────

    #[test]
    fn run_without_tty_fails_and_cleans_up() {
        if terminal::is_tty() {
            return;
        }
        let registry = SessionRegistry::new();
        let session = registry.get(registry.create()).unwrap();
        let mut event_loop = EventLoop::new(Arc::clone(&session), LoopConfig::default());

        let err = event_loop.run(&mut Recorder::default()).unwrap_err();
        assert!(matches!(err, crate::Error::NotATerminal));
        assert!(!session.has_input());
        assert!(!session.terminal().is_active());
    }
}
