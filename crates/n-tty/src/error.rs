// SPDX-License-Identifier: MIT
//
// Crate error type.
//
// Decoding and rendering never fail, so errors only come from the edges:
// handle lookups, the input reader, and the OS terminal interfaces.
// Byte-level writers in `ansi` and `output` stay on plain `io::Result`.

use std::io;

use thiserror::Error;

use crate::registry::SessionHandle;

#[derive(Debug, Error)]
pub enum Error {
    /// The handle was never issued or its session was destroyed.
    #[error("session not found: {0}")]
    SessionNotFound(SessionHandle),

    /// Input was polled on a session with no running reader.
    #[error("input reader is not running")]
    ReaderNotRunning,

    /// A terminal operation needs a TTY and stdin/stdout is not one.
    #[error("not a terminal")]
    NotATerminal,

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
