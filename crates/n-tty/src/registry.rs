// SPDX-License-Identifier: MIT
//
// Session registry.
//
// A session bundles everything one terminal UI needs: a renderer, an
// input parser, the terminal-mode tracker, and (once started) a background
// input reader. Host code refers to sessions through opaque `SessionHandle`s
// so it never holds Rust references across a language boundary.
//
// Storage is a slot map behind one `RwLock`. A slot-map key carries its
// slot index plus a generation counter that changes every time the slot is
// reused, so a handle to a destroyed session never resolves again, even
// after a new session lands in the same slot. Lookups take the read lock
// and clone an `Arc`; the lock is never held while a session does work.
//
// Inside a session each component sits behind its own mutex. Rendering
// needs `&mut DiffRenderer`, so concurrent renders on one session are
// serialized by the lock while different sessions render in parallel.

use std::fmt;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, MutexGuard, RwLock};
use slotmap::{Key, KeyData, SlotMap};

use crate::diff::{DiffRenderer, RenderConfig, RenderStats};
use crate::error::{Error, Result};
use crate::input::{Event, Parser};
use crate::reader::{ByteSource, CancelToken, InputReader, Pull, ReaderConfig};
use crate::terminal::Terminal;

slotmap::new_key_type! {
    struct SessionKey;
}

// ─── SessionHandle ───────────────────────────────────────────────────────────

/// Opaque, generation-tagged session identifier.
///
/// Round-trips through `u64` for host bindings. A handle that was never
/// issued, or whose session was destroyed, resolves to
/// [`Error::SessionNotFound`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionHandle(u64);

impl SessionHandle {
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    #[must_use]
    pub const fn from_u64(raw: u64) -> Self {
        Self(raw)
    }

    fn key(self) -> SessionKey {
        KeyData::from_ffi(self.0).into()
    }
}

impl From<SessionKey> for SessionHandle {
    fn from(key: SessionKey) -> Self {
        Self(key.data().as_ffi())
    }
}

impl fmt::Display for SessionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

// ─── Session ─────────────────────────────────────────────────────────────────

/// Result of [`Session::poll_events`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Polled {
    /// Events decoded from new input, or flushed after a quiet period.
    Events(Vec<Event>),
    /// No input within the timeout and nothing pending.
    Timeout,
    /// The input source ended. Further polls keep returning this.
    Closed,
}

/// One terminal UI: renderer, parser, terminal modes, input reader.
pub struct Session {
    handle: SessionHandle,
    renderer: Mutex<DiffRenderer>,
    parser: Mutex<Parser>,
    terminal: Mutex<Terminal>,
    input: Mutex<Option<InputReader>>,
    /// Cancels the running reader without taking `input`, which a poll
    /// holds while it waits.
    input_cancel: Mutex<Option<CancelToken>>,
}

impl Session {
    fn new(handle: SessionHandle, config: RenderConfig) -> Self {
        Self {
            handle,
            renderer: Mutex::new(DiffRenderer::with_config(config)),
            parser: Mutex::new(Parser::new()),
            terminal: Mutex::new(Terminal::new()),
            input: Mutex::new(None),
            input_cancel: Mutex::new(None),
        }
    }

    #[must_use]
    pub const fn handle(&self) -> SessionHandle {
        self.handle
    }

    // ── Rendering ───────────────────────────────────────────────────

    /// Render `frame` and write the result to stdout.
    ///
    /// # Errors
    ///
    /// Returns an error if writing to stdout fails.
    pub fn render(&self, frame: &str) -> Result<RenderStats> {
        let mut renderer = self.renderer.lock();
        let stats = renderer.render(frame);
        renderer.flush()?;
        Ok(stats)
    }

    /// Render `frame` and write the result to `w`.
    ///
    /// # Errors
    ///
    /// Returns an error if writing to `w` fails.
    pub fn render_to(&self, frame: &str, w: &mut impl Write) -> Result<RenderStats> {
        let mut renderer = self.renderer.lock();
        let stats = renderer.render(frame);
        renderer.flush_to(w)?;
        Ok(stats)
    }

    /// Erase the screen, home the cursor, and reset the renderer.
    ///
    /// # Errors
    ///
    /// Returns an error if writing to stdout fails.
    pub fn clear(&self) -> Result<()> {
        let mut renderer = self.renderer.lock();
        renderer.clear();
        renderer.flush()?;
        Ok(())
    }

    /// Like [`clear`](Self::clear), writing to `w`.
    ///
    /// # Errors
    ///
    /// Returns an error if writing to `w` fails.
    pub fn clear_to(&self, w: &mut impl Write) -> Result<()> {
        let mut renderer = self.renderer.lock();
        renderer.clear();
        renderer.flush_to(w)?;
        Ok(())
    }

    /// Set the renderer's size limits (0 = unconstrained).
    pub fn set_size(&self, width: u16, height: u16) {
        self.renderer.lock().set_size(width, height);
    }

    pub fn set_alt_screen(&self, enabled: bool) {
        self.renderer.lock().set_alt_screen(enabled);
    }

    #[must_use]
    pub fn render_config(&self) -> RenderConfig {
        self.renderer.lock().config()
    }

    /// Apply a new terminal size and return the matching event.
    ///
    /// Zero dimensions are raised to 1.
    pub fn resize(&self, width: u16, height: u16) -> Event {
        let (width, height) = (width.max(1), height.max(1));
        self.set_size(width, height);
        Event::Resize { width, height }
    }

    // ── Input ───────────────────────────────────────────────────────

    /// Start reading stdin in the background. No-op if a reader exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the reader thread cannot be spawned.
    pub fn start_input(&self, config: ReaderConfig) -> Result<()> {
        self.start_input_from(InputReader::stdin(config))
    }

    /// Start reading from `source` instead of stdin.
    ///
    /// # Errors
    ///
    /// Returns an error if the reader thread cannot be spawned.
    pub fn start_input_with(
        &self,
        source: impl ByteSource + 'static,
        config: ReaderConfig,
    ) -> Result<()> {
        self.start_input_from(InputReader::new(source, config))
    }

    fn start_input_from(&self, mut reader: InputReader) -> Result<()> {
        let mut input = self.input.lock();
        if input.is_some() {
            return Ok(());
        }
        reader.start()?;
        *self.input_cancel.lock() = Some(reader.cancel_token());
        *input = Some(reader);
        Ok(())
    }

    /// Stop the input reader. Idempotent.
    ///
    /// Returns promptly even while another thread is inside
    /// [`poll_events`](Self::poll_events): the reader exits first, which
    /// ends that poll with `Closed`.
    pub fn stop_input(&self) {
        let cancel = self.input_cancel.lock().take();
        if let Some(cancel) = cancel {
            cancel.cancel();
        }
        let reader = self.input.lock().take();
        if let Some(mut reader) = reader {
            reader.stop();
        }
    }

    /// Whether a reader has been started and not stopped.
    #[must_use]
    pub fn has_input(&self) -> bool {
        self.input.lock().is_some()
    }

    /// Wait up to `timeout` for input and decode it.
    ///
    /// A quiet period flushes bytes held back for an incomplete sequence,
    /// so a lone ESC arrives as the Escape key one timeout after it was
    /// typed. `Events` can be empty when a chunk held only part of a
    /// sequence.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ReaderNotRunning`] if no reader was started.
    pub fn poll_events(&self, timeout: Duration) -> Result<Polled> {
        let input = self.input.lock();
        let reader = input.as_ref().ok_or(Error::ReaderNotRunning)?;

        let pulled = reader.next_chunk(timeout);
        let mut parser = self.parser.lock();
        Ok(match pulled {
            Pull::Chunk(bytes) => Polled::Events(parser.advance(&bytes)),
            Pull::Timeout => {
                let events = parser.flush();
                if events.is_empty() {
                    Polled::Timeout
                } else {
                    Polled::Events(events)
                }
            }
            Pull::Closed => {
                let events = parser.flush();
                if events.is_empty() {
                    Polled::Closed
                } else {
                    Polled::Events(events)
                }
            }
        })
    }

    // ── Terminal ────────────────────────────────────────────────────

    /// Lock the terminal-mode tracker.
    pub fn terminal(&self) -> MutexGuard<'_, Terminal> {
        self.terminal.lock()
    }

    /// Stop input and undo every terminal mode still active.
    fn shutdown(&self) {
        self.stop_input();
        if let Err(e) = self.terminal.lock().restore() {
            log::warn!("session {}: terminal restore failed: {e}", self.handle);
        }
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("handle", &self.handle)
            .finish_non_exhaustive()
    }
}

// ─── SessionRegistry ─────────────────────────────────────────────────────────

/// Thread-safe map from handles to sessions.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: RwLock<SlotMap<SessionKey, Arc<Session>>>,
}

impl SessionRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an unconstrained inline session.
    pub fn create(&self) -> SessionHandle {
        self.create_with(RenderConfig::default())
    }

    /// Create a session whose renderer starts with `config`.
    pub fn create_with(&self, config: RenderConfig) -> SessionHandle {
        let key = self
            .sessions
            .write()
            .insert_with_key(|key| Arc::new(Session::new(key.into(), config)));
        let handle = SessionHandle::from(key);
        log::debug!("created session {handle}");
        handle
    }

    /// Look up a session.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SessionNotFound`] for unknown or destroyed handles.
    pub fn get(&self, handle: SessionHandle) -> Result<Arc<Session>> {
        self.sessions
            .read()
            .get(handle.key())
            .cloned()
            .ok_or(Error::SessionNotFound(handle))
    }

    /// Remove a session, stop its input, and restore its terminal modes.
    ///
    /// Returns `false` if the handle was unknown.
    pub fn destroy(&self, handle: SessionHandle) -> bool {
        let removed = self.sessions.write().remove(handle.key());
        let Some(session) = removed else {
            return false;
        };
        session.shutdown();
        log::debug!("destroyed session {handle}");
        true
    }

    /// Number of live sessions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }

    /// Handles of every live session.
    #[must_use]
    pub fn handles(&self) -> Vec<SessionHandle> {
        self.sessions.read().keys().map(SessionHandle::from).collect()
    }
}

impl fmt::Debug for SessionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionRegistry")
            .field("sessions", &self.len())
            .finish()
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::KeyEvent;
    use crate::keys::KeyCode;
    use crate::reader::tests::{Scripted, Then};
    use pretty_assertions::assert_eq;
    use std::sync::atomic::Ordering;
    use std::time::Instant;

    const WAIT: Duration = Duration::from_secs(2);

    // ── Registry ────────────────────────────────────────────────────

    #[test]
    fn create_get_destroy() {
        let reg = SessionRegistry::new();
        assert!(reg.is_empty());
        let h = reg.create();
        assert_eq!(reg.len(), 1);
        assert_eq!(reg.get(h).unwrap().handle(), h);
        assert!(reg.destroy(h));
        assert!(reg.is_empty());
    }

    #[test]
    fn destroyed_handle_is_not_found() {
        let reg = SessionRegistry::new();
        let h = reg.create();
        reg.destroy(h);
        assert!(matches!(reg.get(h), Err(Error::SessionNotFound(x)) if x == h));
    }

    #[test]
    fn destroy_twice_returns_false() {
        let reg = SessionRegistry::new();
        let h = reg.create();
        assert!(reg.destroy(h));
        assert!(!reg.destroy(h));
    }

    #[test]
    fn unknown_handles_are_harmless() {
        let reg = SessionRegistry::new();
        let bogus = SessionHandle::from_u64(0xDEAD_BEEF);
        assert!(!reg.destroy(bogus));
        assert!(reg.get(bogus).is_err());
        assert!(reg.get(SessionHandle::from_u64(0)).is_err());
    }

    #[test]
    fn recreated_sessions_never_reuse_handles() {
        let reg = SessionRegistry::new();
        let mut seen = Vec::new();
        for _ in 0..10 {
            let h = reg.create();
            assert!(!seen.contains(&h));
            seen.push(h);
            reg.destroy(h);
        }
        for h in seen {
            assert!(reg.get(h).is_err());
        }
    }

    #[test]
    fn handle_round_trips_through_u64() {
        let reg = SessionRegistry::new();
        let h = reg.create();
        let raw = h.as_u64();
        assert!(reg.get(SessionHandle::from_u64(raw)).is_ok());
    }

    #[test]
    fn handles_lists_live_sessions() {
        let reg = SessionRegistry::new();
        let a = reg.create();
        let b = reg.create();
        reg.destroy(a);
        assert_eq!(reg.handles(), vec![b]);
    }

    #[test]
    fn sessions_render_concurrently() {
        let reg = Arc::new(SessionRegistry::new());
        let handles: Vec<_> = (0..4).map(|_| reg.create()).collect();
        let threads: Vec<_> = handles
            .iter()
            .map(|&h| {
                let reg = Arc::clone(&reg);
                std::thread::spawn(move || {
                    let session = reg.get(h).unwrap();
                    let mut sink = Vec::new();
                    for i in 0..50 {
                        session.render_to(&format!("frame {i}"), &mut sink).unwrap();
                    }
                    sink
                })
            })
            .collect();
        for t in threads {
            let sink = t.join().unwrap();
            assert!(String::from_utf8(sink).unwrap().contains("frame 49"));
        }
    }

    // ── Rendering ───────────────────────────────────────────────────

    #[test]
    fn session_render_and_clear() {
        let reg = SessionRegistry::new();
        let h = reg.create_with(RenderConfig {
            alt_screen: true,
            ..RenderConfig::default()
        });
        let s = reg.get(h).unwrap();

        let mut out = Vec::new();
        let stats = s.render_to("hi", &mut out).unwrap();
        assert_eq!(stats.lines, 1);
        assert_eq!(out, b"\x1b[Hhi\x1b[K");

        out.clear();
        assert!(s.render_to("hi", &mut out).unwrap().skipped);
        assert!(out.is_empty());

        s.clear_to(&mut out).unwrap();
        assert_eq!(out, b"\x1b[2J\x1b[H");
    }

    #[test]
    fn resize_updates_renderer_and_returns_event() {
        let reg = SessionRegistry::new();
        let s = reg.get(reg.create()).unwrap();
        assert_eq!(s.resize(120, 40), Event::Resize { width: 120, height: 40 });
        let config = s.render_config();
        assert_eq!((config.width, config.height), (120, 40));
        assert_eq!(s.resize(0, 0), Event::Resize { width: 1, height: 1 });
    }

    #[test]
    fn set_alt_screen_reaches_renderer() {
        let reg = SessionRegistry::new();
        let s = reg.get(reg.create()).unwrap();
        s.set_alt_screen(true);
        assert!(s.render_config().alt_screen);
    }

    // ── Input ───────────────────────────────────────────────────────

    #[test]
    fn poll_without_reader_errors() {
        let reg = SessionRegistry::new();
        let s = reg.get(reg.create()).unwrap();
        assert!(matches!(
            s.poll_events(Duration::ZERO),
            Err(Error::ReaderNotRunning)
        ));
    }

    #[test]
    fn poll_decodes_chunks_then_closes() {
        let reg = SessionRegistry::new();
        let s = reg.get(reg.create()).unwrap();
        let (source, _) = Scripted::new(&[b"a\x1b[A"], Then::Eof);
        s.start_input_with(source, ReaderConfig::default()).unwrap();

        assert_eq!(
            s.poll_events(WAIT).unwrap(),
            Polled::Events(vec![
                Event::Key(KeyEvent::rune('a', false)),
                Event::Key(KeyEvent::named(KeyCode::Up)),
            ])
        );
        assert_eq!(s.poll_events(WAIT).unwrap(), Polled::Closed);
    }

    #[test]
    fn lone_esc_flushes_after_quiet_period() {
        let reg = SessionRegistry::new();
        let s = reg.get(reg.create()).unwrap();
        let (source, _) = Scripted::new(&[b"\x1b"], Then::Block);
        s.start_input_with(source, ReaderConfig::default()).unwrap();

        assert_eq!(s.poll_events(WAIT).unwrap(), Polled::Events(vec![]));
        assert_eq!(
            s.poll_events(Duration::from_millis(20)).unwrap(),
            Polled::Events(vec![Event::Key(KeyEvent::named(KeyCode::Esc))])
        );
        assert_eq!(
            s.poll_events(Duration::from_millis(20)).unwrap(),
            Polled::Timeout
        );
        s.stop_input();
    }

    #[test]
    fn start_and_stop_input_are_idempotent() {
        let reg = SessionRegistry::new();
        let s = reg.get(reg.create()).unwrap();
        let (first, first_closed) = Scripted::new(&[], Then::Block);
        let (second, second_closed) = Scripted::new(&[], Then::Block);
        s.start_input_with(first, ReaderConfig::default()).unwrap();
        s.start_input_with(second, ReaderConfig::default()).unwrap();
        assert!(s.has_input());

        s.stop_input();
        s.stop_input();
        assert!(!s.has_input());
        assert!(first_closed.load(Ordering::SeqCst));
        // The second source was never started.
        assert!(!second_closed.load(Ordering::SeqCst));
    }

    #[test]
    fn stop_input_interrupts_a_waiting_poll() {
        let reg = SessionRegistry::new();
        let s = reg.get(reg.create()).unwrap();
        let (source, closed) = Scripted::new(&[], Then::Block);
        s.start_input_with(source, ReaderConfig::default()).unwrap();

        let poller = {
            let s = Arc::clone(&s);
            std::thread::spawn(move || s.poll_events(Duration::from_secs(10)))
        };
        std::thread::sleep(Duration::from_millis(50));

        let started = Instant::now();
        s.stop_input();
        let polled = poller.join().unwrap();
        assert!(started.elapsed() < Duration::from_secs(2));
        assert!(closed.load(Ordering::SeqCst));
        assert!(matches!(
            polled,
            Ok(Polled::Closed) | Err(Error::ReaderNotRunning)
        ));
    }

    #[test]
    fn destroy_stops_input() {
        let reg = SessionRegistry::new();
        let h = reg.create();
        let s = reg.get(h).unwrap();
        let (source, closed) = Scripted::new(&[], Then::Block);
        s.start_input_with(source, ReaderConfig::default()).unwrap();

        assert!(reg.destroy(h));
        assert!(closed.load(Ordering::SeqCst));
        assert!(!s.has_input());
        assert!(!s.terminal().is_active());
    }
}
