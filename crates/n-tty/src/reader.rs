// SPDX-License-Identifier: MIT
#![allow(unsafe_code)]
//
// Background input reader: raw bytes from a source into a bounded queue.
//
// A dedicated thread pulls chunks from a `ByteSource` and pushes them onto
// a `sync_channel`. The consumer takes them with `next_chunk(timeout)`, so
// the event loop stays responsive for rendering, resize handling, and the
// escape-sequence timeout while no input arrives.
//
// Backpressure: the queue is bounded and nothing is ever dropped. When it
// is full the producer retries after a short sleep, checking the cancel
// token between attempts, so `stop()` never waits on a consumer that has
// gone away.
//
// Shutdown: `stop()` raises the `CancelToken`. The source sees it on its
// next poll (`StdinSource` polls the fd with a short timeout instead of
// blocking in `read()`), the thread calls `close()` on the source, drops
// the sender, and exits. `stop()` joins it.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, SyncSender, TrySendError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Pause between attempts to push onto a full queue.
const SEND_RETRY: Duration = Duration::from_millis(1);

// ─── Configuration ───────────────────────────────────────────────────────────

/// Reader thread tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReaderConfig {
    /// Chunks the queue holds before the producer waits.
    pub queue_capacity: usize,
    /// Largest chunk a single read returns. A keypress is 1-6 bytes, a
    /// paste can be kilobytes.
    pub read_buf_size: usize,
    /// How long a source may block before rechecking cancellation. This
    /// bounds shutdown latency.
    pub poll_interval: Duration,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 100,
            read_buf_size: 4096,
            poll_interval: Duration::from_millis(50),
        }
    }
}

// ─── Cancellation ────────────────────────────────────────────────────────────

/// Shared stop flag between the reader thread and its owner.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Raise the flag. Idempotent.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

// ─── ByteSource ──────────────────────────────────────────────────────────────

/// Outcome of one [`ByteSource::read`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadStatus {
    /// `n` bytes were written to the front of the buffer.
    Data(usize),
    /// The source is exhausted.
    Eof,
    /// The token was raised while waiting for data.
    Cancelled,
}

/// Where raw input bytes come from.
///
/// `read` may block, but must return [`ReadStatus::Cancelled`] within a
/// bounded time once `cancel` is raised.
pub trait ByteSource: Send {
    /// Read available bytes into `buf`.
    ///
    /// # Errors
    ///
    /// Returns the underlying I/O error. The reader logs it and stops.
    fn read(&mut self, buf: &mut [u8], cancel: &CancelToken) -> io::Result<ReadStatus>;

    /// Release the source. Called once from the reader thread on exit.
    fn close(&mut self) {}
}

/// Standard input as a byte source.
#[derive(Debug, Clone, Copy)]
pub struct StdinSource {
    poll_interval: Duration,
}

impl StdinSource {
    #[must_use]
    pub const fn new(poll_interval: Duration) -> Self {
        Self { poll_interval }
    }
}

#[cfg(unix)]
impl ByteSource for StdinSource {
    fn read(&mut self, buf: &mut [u8], cancel: &CancelToken) -> io::Result<ReadStatus> {
        let fd = libc::STDIN_FILENO;
        let timeout = i32::try_from(self.poll_interval.as_millis()).unwrap_or(i32::MAX);

        loop {
            if cancel.is_cancelled() {
                return Ok(ReadStatus::Cancelled);
            }

            let mut pfd = libc::pollfd {
                fd,
                events: libc::POLLIN,
                revents: 0,
            };
            // SAFETY: `pfd` is a valid pollfd for the duration of the call.
            let ready = unsafe { libc::poll(&raw mut pfd, 1, timeout) };
            if ready < 0 {
                let err = io::Error::last_os_error();
                if err.kind() == io::ErrorKind::Interrupted {
                    continue;
                }
                return Err(err);
            }
            if ready == 0 {
                continue;
            }

            // SAFETY: `buf` is valid for writes of `buf.len()` bytes.
            let n = unsafe { libc::read(fd, buf.as_mut_ptr().cast(), buf.len()) };
            if n < 0 {
                let err = io::Error::last_os_error();
                if matches!(
                    err.kind(),
                    io::ErrorKind::Interrupted | io::ErrorKind::WouldBlock
                ) {
                    continue;
                }
                return Err(err);
            }
            if n == 0 {
                return Ok(ReadStatus::Eof);
            }
            return Ok(ReadStatus::Data(usize::try_from(n).unwrap_or(0)));
        }
    }
}

/// Blocking fallback: cancellation takes effect after the next read
/// returns.
#[cfg(not(unix))]
impl ByteSource for StdinSource {
    fn read(&mut self, buf: &mut [u8], cancel: &CancelToken) -> io::Result<ReadStatus> {
        use std::io::Read;

        if cancel.is_cancelled() {
            return Ok(ReadStatus::Cancelled);
        }
        match io::stdin().lock().read(buf)? {
            0 => Ok(ReadStatus::Eof),
            n => Ok(ReadStatus::Data(n)),
        }
    }
}

// ─── InputReader ─────────────────────────────────────────────────────────────

/// Result of waiting for the next chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Pull {
    /// A non-empty chunk of raw bytes.
    Chunk(Vec<u8>),
    /// Nothing arrived within the timeout.
    Timeout,
    /// The reader is stopped, never started, or its source ended.
    Closed,
}

/// A byte source drained by a background thread into a bounded queue.
///
/// # Example
///
/// ```no_run
/// use std::time::Duration;
/// use n_tty::reader::{InputReader, Pull, ReaderConfig};
///
/// let mut reader = InputReader::stdin(ReaderConfig::default());
/// reader.start()?;
/// loop {
///     match reader.next_chunk(Duration::from_millis(100)) {
///         Pull::Chunk(bytes) => println!("{} bytes", bytes.len()),
///         Pull::Timeout => {}
///         Pull::Closed => break,
///     }
/// }
/// reader.stop();
/// # Ok::<(), std::io::Error>(())
/// ```
pub struct InputReader {
    config: ReaderConfig,
    /// Moved into the thread by `start()`.
    source: Option<Box<dyn ByteSource>>,
    cancel: CancelToken,
    handle: Option<JoinHandle<()>>,
    rx: Option<Receiver<Vec<u8>>>,
}

impl InputReader {
    /// Wrap `source`. Nothing is read until [`start`](Self::start).
    #[must_use]
    pub fn new(source: impl ByteSource + 'static, config: ReaderConfig) -> Self {
        Self {
            config,
            source: Some(Box::new(source)),
            cancel: CancelToken::new(),
            handle: None,
            rx: None,
        }
    }

    /// A reader over standard input.
    #[must_use]
    pub fn stdin(config: ReaderConfig) -> Self {
        Self::new(StdinSource::new(config.poll_interval), config)
    }

    #[must_use]
    pub const fn config(&self) -> ReaderConfig {
        self.config
    }

    /// A handle to this reader's cancellation token.
    ///
    /// Raising it makes the thread exit and close the queue, which wakes a
    /// consumer blocked in [`next_chunk`](Self::next_chunk) with `Closed`.
    #[must_use]
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Spawn the reader thread.
    ///
    /// Idempotent while running. A reader that was stopped stays stopped:
    /// its source is gone, so this is a no-op.
    ///
    /// # Errors
    ///
    /// Returns an error if the OS cannot spawn the thread.
    pub fn start(&mut self) -> io::Result<()> {
        let Some(source) = self.source.take() else {
            return Ok(());
        };

        let (tx, rx) = mpsc::sync_channel(self.config.queue_capacity.max(1));
        let cancel = self.cancel.clone();
        let buf_size = self.config.read_buf_size.max(1);

        let handle = thread::Builder::new()
            .name("n-tty-input".into())
            .spawn(move || read_loop(source, &tx, &cancel, buf_size))?;

        self.handle = Some(handle);
        self.rx = Some(rx);
        log::debug!(
            "input reader started (queue {}, buf {})",
            self.config.queue_capacity,
            buf_size
        );
        Ok(())
    }

    /// Cancel the source, join the thread, and close the queue.
    ///
    /// Idempotent. Stopping a reader that never started only prevents it
    /// from starting later.
    pub fn stop(&mut self) {
        self.cancel.cancel();
        self.source = None;
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                log::warn!("input reader thread panicked");
            }
        }
        self.rx = None;
    }

    /// Whether the thread is alive.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Wait up to `timeout` for the next chunk.
    ///
    /// Chunks queued before the source ended are still delivered; `Closed`
    /// comes after the last one.
    #[must_use]
    pub fn next_chunk(&self, timeout: Duration) -> Pull {
        let Some(rx) = &self.rx else {
            return Pull::Closed;
        };
        match rx.recv_timeout(timeout) {
            Ok(chunk) => Pull::Chunk(chunk),
            Err(RecvTimeoutError::Timeout) => Pull::Timeout,
            Err(RecvTimeoutError::Disconnected) => Pull::Closed,
        }
    }
}

impl Drop for InputReader {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for InputReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InputReader")
            .field("config", &self.config)
            .field("running", &self.is_running())
            .field("cancelled", &self.cancel.is_cancelled())
            .finish_non_exhaustive()
    }
}

/// The reader thread's main loop.
///
/// Exits when the token is raised, the source ends or fails, or the
/// receiver is gone.
#[allow(clippy::needless_pass_by_value)] // The source is owned by the thread.
fn read_loop(
    mut source: Box<dyn ByteSource>,
    tx: &SyncSender<Vec<u8>>,
    cancel: &CancelToken,
    buf_size: usize,
) {
    let mut buf = vec![0u8; buf_size];

    while !cancel.is_cancelled() {
        match source.read(&mut buf, cancel) {
            Ok(ReadStatus::Data(0)) => {}
            Ok(ReadStatus::Data(n)) => {
                let chunk = buf[..n.min(buf.len())].to_vec();
                if !push(tx, chunk, cancel) {
                    break;
                }
            }
            Ok(ReadStatus::Eof) => {
                log::debug!("input source reached end of input");
                break;
            }
            Ok(ReadStatus::Cancelled) => break,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => {
                log::warn!("input source read failed: {e}");
                break;
            }
        }
    }

    source.close();
    log::debug!("input reader stopped");
}

/// Queue `chunk`, waiting while the queue is full. Returns `false` when
/// the reader should exit instead.
fn push(tx: &SyncSender<Vec<u8>>, mut chunk: Vec<u8>, cancel: &CancelToken) -> bool {
    loop {
        match tx.try_send(chunk) {
            Ok(()) => return true,
            Err(TrySendError::Full(back)) => {
                if cancel.is_cancelled() {
                    return false;
                }
                chunk = back;
                thread::sleep(SEND_RETRY);
            }
            Err(TrySendError::Disconnected(_)) => return false,
        }
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::VecDeque;
    use std::time::Instant;

    const WAIT: Duration = Duration::from_secs(2);

    /// What a scripted source does once its chunks run out.
    #[derive(Clone, Copy)]
    pub(crate) enum Then {
        Eof,
        Fail,
        /// Wait for cancellation, polling like `StdinSource`.
        Block,
        /// Produce `b"x"` forever.
        Flood,
    }

    /// A `ByteSource` that replays fixed chunks.
    pub(crate) struct Scripted {
        chunks: VecDeque<Vec<u8>>,
        then: Then,
        closed: Arc<AtomicBool>,
    }

    impl Scripted {
        pub(crate) fn new(chunks: &[&[u8]], then: Then) -> (Self, Arc<AtomicBool>) {
            let closed = Arc::new(AtomicBool::new(false));
            let source = Self {
                chunks: chunks.iter().map(|c| c.to_vec()).collect(),
                then,
                closed: Arc::clone(&closed),
            };
            (source, closed)
        }
    }

    impl ByteSource for Scripted {
        fn read(&mut self, buf: &mut [u8], cancel: &CancelToken) -> io::Result<ReadStatus> {
            if let Some(chunk) = self.chunks.pop_front() {
                buf[..chunk.len()].copy_from_slice(&chunk);
                return Ok(ReadStatus::Data(chunk.len()));
            }
            match self.then {
                Then::Eof => Ok(ReadStatus::Eof),
                Then::Fail => Err(io::Error::other("device gone")),
                Then::Block => {
                    while !cancel.is_cancelled() {
                        thread::sleep(Duration::from_millis(5));
                    }
                    Ok(ReadStatus::Cancelled)
                }
                Then::Flood => {
                    buf[0] = b'x';
                    Ok(ReadStatus::Data(1))
                }
            }
        }

        fn close(&mut self) {
            self.closed.store(true, Ordering::SeqCst);
        }
    }

    fn reader(chunks: &[&[u8]], then: Then, capacity: usize) -> (InputReader, Arc<AtomicBool>) {
        let (source, closed) = Scripted::new(chunks, then);
        let config = ReaderConfig {
            queue_capacity: capacity,
            ..ReaderConfig::default()
        };
        (InputReader::new(source, config), closed)
    }

    #[test]
    fn default_config() {
        let config = ReaderConfig::default();
        assert_eq!(config.queue_capacity, 100);
        assert_eq!(config.read_buf_size, 4096);
        assert_eq!(config.poll_interval, Duration::from_millis(50));
    }

    #[test]
    fn delivers_chunks_in_order_then_closes() {
        let (mut r, closed) = reader(&[b"ab", b"\x1b[A", b"c"], Then::Eof, 100);
        r.start().unwrap();
        assert_eq!(r.next_chunk(WAIT), Pull::Chunk(b"ab".to_vec()));
        assert_eq!(r.next_chunk(WAIT), Pull::Chunk(b"\x1b[A".to_vec()));
        assert_eq!(r.next_chunk(WAIT), Pull::Chunk(b"c".to_vec()));
        assert_eq!(r.next_chunk(WAIT), Pull::Closed);
        r.stop();
        assert!(closed.load(Ordering::SeqCst));
    }

    #[test]
    fn timeout_is_not_closed() {
        let (mut r, _) = reader(&[], Then::Block, 100);
        r.start().unwrap();
        assert_eq!(r.next_chunk(Duration::from_millis(20)), Pull::Timeout);
        assert!(r.is_running());
        r.stop();
    }

    #[test]
    fn stop_unblocks_read_and_closes_source() {
        let (mut r, closed) = reader(&[], Then::Block, 100);
        r.start().unwrap();
        let started = Instant::now();
        r.stop();
        assert!(started.elapsed() < WAIT);
        assert!(closed.load(Ordering::SeqCst));
        assert!(!r.is_running());
        assert_eq!(r.next_chunk(Duration::ZERO), Pull::Closed);
    }

    #[test]
    fn cancel_token_closes_queue_for_waiting_consumer() {
        let (mut r, closed) = reader(&[], Then::Block, 100);
        r.start().unwrap();
        let cancel = r.cancel_token();
        let canceller = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            cancel.cancel();
        });
        let started = Instant::now();
        assert_eq!(r.next_chunk(Duration::from_secs(10)), Pull::Closed);
        assert!(started.elapsed() < WAIT);
        canceller.join().unwrap();
        r.stop();
        assert!(closed.load(Ordering::SeqCst));
    }

    #[test]
    fn stop_is_idempotent() {
        let (mut r, _) = reader(&[], Then::Block, 100);
        r.start().unwrap();
        r.stop();
        r.stop();
    }

    #[test]
    fn stop_without_start_is_noop() {
        let (mut r, closed) = reader(&[b"a"], Then::Eof, 100);
        r.stop();
        r.stop();
        // The source was never handed to a thread, so it was never closed.
        assert!(!closed.load(Ordering::SeqCst));
        assert_eq!(r.next_chunk(Duration::ZERO), Pull::Closed);
    }

    #[test]
    fn start_is_idempotent_and_stopped_reader_stays_stopped() {
        let (mut r, _) = reader(&[], Then::Block, 100);
        r.start().unwrap();
        r.start().unwrap();
        assert!(r.is_running());
        r.stop();
        r.start().unwrap();
        assert!(!r.is_running());
    }

    #[test]
    fn full_queue_blocks_instead_of_dropping() {
        let chunks: Vec<Vec<u8>> = (0..50u8).map(|i| vec![i]).collect();
        let refs: Vec<&[u8]> = chunks.iter().map(Vec::as_slice).collect();
        let (mut r, _) = reader(&refs, Then::Eof, 1);
        r.start().unwrap();
        // Let the producer fill the queue and wait on it.
        thread::sleep(Duration::from_millis(20));
        for i in 0..50u8 {
            assert_eq!(r.next_chunk(WAIT), Pull::Chunk(vec![i]));
        }
        assert_eq!(r.next_chunk(WAIT), Pull::Closed);
    }

    #[test]
    fn stop_with_full_queue_does_not_deadlock() {
        let (mut r, closed) = reader(&[], Then::Flood, 1);
        r.start().unwrap();
        thread::sleep(Duration::from_millis(20));
        r.stop();
        assert!(closed.load(Ordering::SeqCst));
    }

    #[test]
    fn read_error_closes_queue() {
        let (mut r, closed) = reader(&[b"z"], Then::Fail, 100);
        r.start().unwrap();
        assert_eq!(r.next_chunk(WAIT), Pull::Chunk(b"z".to_vec()));
        assert_eq!(r.next_chunk(WAIT), Pull::Closed);
        r.stop();
        assert!(closed.load(Ordering::SeqCst));
    }

    #[test]
    fn drop_stops_reader() {
        let (mut r, closed) = reader(&[], Then::Block, 100);
        r.start().unwrap();
        drop(r);
        assert!(closed.load(Ordering::SeqCst));
    }

    #[test]
    fn cancel_token_is_shared() {
        let token = CancelToken::new();
        let clone = token.clone();
        assert!(!clone.is_cancelled());
        token.cancel();
        token.cancel();
        assert!(clone.is_cancelled());
    }
}
