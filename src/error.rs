//! Session-local error types.
//!
//! None of these ever reach the client as a structured response: the only
//! observable outcome of a failed session is the closed connection.

use std::io;
use thiserror::Error;

/// Errors raised while reading a framed message.
#[derive(Debug, Error)]
pub enum FrameError {
    /// The stream ended before the full length header arrived.
    #[error("stream ended before the length header was complete")]
    IncompleteHeader,

    /// The length header is not a decimal number.
    #[error("invalid length header: '{0}'")]
    InvalidHeader(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Errors that abort a session.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Frame(#[from] FrameError),

    /// No complete request arrived within the read timeout.
    #[error("read timed out after {0} ms")]
    ReadTimeout(u64),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}
