//! Reasons a background query can fail.
//!
//! None of these reach callers of the detection functions: every variant ends
//! up as [`Classification::Unknown`](crate::Classification::Unknown) and is only
//! reported through `tracing`.

use std::io;
use std::time::Duration;

use thiserror::Error;

/// Failure of one background color query.
#[derive(Debug, Error)]
pub enum ProbeError {
    /// stdin or stdout is redirected, so there is no terminal to ask.
    #[error("stdin or stdout is not an interactive terminal")]
    NonInteractive,

    /// The controlling terminal could not be opened.
    #[error("failed to open the controlling terminal")]
    Open(#[source] io::Error),

    /// Raw mode could not be inspected or enabled.
    #[error("failed to switch the terminal to raw mode")]
    RawMode(#[source] io::Error),

    /// The query could not be written.
    #[error("failed to write the background color query")]
    Write(#[source] io::Error),

    /// Reading the reply failed.
    #[error("failed to read the terminal reply")]
    Read(#[source] io::Error),

    /// Input ended before a reply was recognized.
    #[error("terminal input closed before a reply arrived")]
    Closed,

    /// No well-formed reply within the time budget.
    #[error("no background color reply within {0:?}")]
    Timeout(Duration),
}
