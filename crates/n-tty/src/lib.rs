// SPDX-License-Identifier: MIT
//
// n-tty: terminal UI runtime core for n-tea.
//
// Two pure engines and the plumbing around them:
//
//   Input: raw terminal bytes, possibly split at any point, decode into
//   key, mouse, focus, and resize events. `input::decode` is stateless and
//   total; `input::Parser` holds back incomplete sequences until more
//   bytes or a quiet period arrive.
//
//   Output: the application hands over the whole screen as a string every
//   frame. `diff::DiffRenderer` skips unchanged frames, clips and
//   truncates to the terminal, and repaints either from the top of the
//   alternate screen or in place below the shell prompt.
//
// Around them: a cancellable stdin reader, terminal-mode control over raw
// termios, a registry of sessions addressed by opaque handles, and an
// event loop that ties it all together. No TUI framework underneath:
// every escape sequence is written by `ansi`.

pub mod ansi;
pub mod diff;
pub mod error;
pub mod event_loop;
pub mod input;
pub mod keys;
pub mod output;
pub mod reader;
pub mod registry;
pub mod terminal;
pub mod width;

pub use error::{Error, Result};
pub use input::{Event, KeyEvent, MouseEvent};
pub use keys::{KeyCode, key_name};
pub use registry::{Session, SessionHandle, SessionRegistry};
