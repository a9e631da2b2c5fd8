//! OSC 11 (Operating System Command) background color exchange.
//!
//! This module provides:
//! - The query bytes sent to the terminal
//! - [`ReplyParser`], an incremental matcher for the terminal's reply
//! - The timed query/reply exchange itself
//!
//! A reply looks like `ESC ] 11 ; rgb:RRRR/GGGG/BBBB` followed by a
//! terminator, usually BEL (`0x07`) or ST (`ESC \`). Each channel has 1 to 4
//! hex digits.

use std::time::Duration;

use tokio::time::timeout;
use tracing::trace;

use crate::color::{HexComponent, Rgb};
use crate::error::ProbeError;
use crate::terminal::{RawModeGuard, Terminal};

/// `ESC ] 11 ; ? ESC \`: ask the terminal for its background color.
pub const OSC11_QUERY: &[u8] = b"\x1b]11;?\x1b\\";

const REPLY_PREFIX: &[u8] = b"\x1b]11;rgb:";
const ESC: u8 = 0x1b;
const CHUNK_SIZE: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    /// Number of `REPLY_PREFIX` bytes matched so far.
    Prefix(usize),
    /// Reading the channel at this index.
    Component(usize),
    Matched,
}

/// Outcome of feeding one chunk to a [`ReplyParser`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Progress<'a> {
    /// No complete reply yet, keep reading.
    Awaiting,
    /// A reply was recognized in this chunk.
    Matched {
        /// Red, green and blue channels as written by the terminal.
        components: [HexComponent; 3],
        /// Bytes of the chunk after the blue channel, terminator included.
        rest: &'a [u8],
    },
    /// A reply was already returned; input is ignored.
    Finished,
}

/// Incremental matcher for the OSC 11 reply.
///
/// Bytes are examined once each, as they arrive, so a reply split over several
/// reads costs the same as one delivered whole. Bytes preceding the reply
/// (other escape sequences, keys typed meanwhile) are skipped.
///
/// The terminator is not checked: the blue channel ends at its fourth digit or
/// at the first byte that is not a hex digit, whatever that byte is.
#[derive(Debug, Clone)]
pub struct ReplyParser {
    state: State,
    components: [HexComponent; 3],
}

impl Default for ReplyParser {
    fn default() -> Self {
        Self::new()
    }
}

impl ReplyParser {
    /// A parser waiting for the start of a reply.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: State::Prefix(0),
            components: [HexComponent::EMPTY; 3],
        }
    }

    /// Whether a reply has been recognized.
    #[must_use]
    pub fn is_matched(&self) -> bool {
        self.state == State::Matched
    }

    /// Consume the next chunk of terminal input.
    pub fn feed<'a>(&mut self, chunk: &'a [u8]) -> Progress<'a> {
        if self.is_matched() {
            return Progress::Finished;
        }
        for (i, &byte) in chunk.iter().enumerate() {
            if let Some(consumed) = self.step(byte) {
                self.state = State::Matched;
                let end = if consumed { i + 1 } else { i };
                return Progress::Matched {
                    components: self.components,
                    rest: &chunk[end..],
                };
            }
        }
        Progress::Awaiting
    }

    /// Advance by one byte. Returns `Some(consumed)` once the blue channel is
    /// complete, `consumed` telling whether `byte` belongs to it.
    fn step(&mut self, byte: u8) -> Option<bool> {
        match self.state {
            State::Prefix(n) => {
                if byte == REPLY_PREFIX[n] {
                    if n + 1 == REPLY_PREFIX.len() {
                        self.components = [HexComponent::EMPTY; 3];
                        self.state = State::Component(0);
                    } else {
                        self.state = State::Prefix(n + 1);
                    }
                } else {
                    self.restart(byte);
                }
                None
            }
            State::Component(index) => {
                let current = &mut self.components[index];
                if let Some(nibble) = hex_value(byte) {
                    if !current.push_nibble(nibble) {
                        self.restart(byte);
                    } else if index == 2 && current.digits() == HexComponent::MAX_DIGITS {
                        return Some(true);
                    }
                    None
                } else if current.digits() == 0 {
                    self.restart(byte);
                    None
                } else if index == 2 {
                    Some(false)
                } else if byte == b'/' {
                    self.state = State::Component(index + 1);
                    None
                } else {
                    self.restart(byte);
                    None
                }
            }
            State::Matched => None,
        }
    }

    /// Drop the partial match. An ESC may itself open the next reply.
    fn restart(&mut self, byte: u8) {
        self.state = State::Prefix(usize::from(byte == ESC));
    }
}

fn hex_value(byte: u8) -> Option<u8> {
    match byte {
        b'0'..=b'9' => Some(byte - b'0'),
        b'a'..=b'f' => Some(byte - b'a' + 10),
        b'A'..=b'F' => Some(byte - b'A' + 10),
        _ => None,
    }
}

/// Read terminal input until a reply is recognized.
///
/// Input is read in chunks of up to 64 bytes and fed to a [`ReplyParser`].
/// Anything after the reply in the same chunk is discarded.
///
/// # Arguments
///
/// - `terminal` - Terminal to read from, normally already in raw mode
///
/// # Returns
///
/// - `Ok([r, g, b])` with the channels exactly as the terminal wrote them
/// - `Err` if reading fails or input ends first
///
/// # Errors
///
/// Returns [`ProbeError::Read`] if reading fails and [`ProbeError::Closed`] on
/// end of input.
pub async fn read_reply<T: Terminal>(terminal: &mut T) -> Result<[HexComponent; 3], ProbeError> {
    let mut parser = ReplyParser::new();
    let mut chunk = [0u8; CHUNK_SIZE];
    loop {
        let n = terminal
            .read_chunk(&mut chunk)
            .await
            .map_err(ProbeError::Read)?;
        if n == 0 {
            return Err(ProbeError::Closed);
        }
        trace!(chunk = ?String::from_utf8_lossy(&chunk[..n]), "terminal input");

        if let Progress::Matched { components, rest } = parser.feed(&chunk[..n]) {
            if !rest.is_empty() {
                trace!(rest = ?String::from_utf8_lossy(rest), "left after reply");
            }
            return Ok(components);
        }
    }
}

/// Query the terminal for its background color using the OSC 11 escape sequence.
///
/// The process:
/// 1. Bail out if the streams are not an interactive terminal
/// 2. Enable raw mode unless it is already on
/// 3. Start the `budget` timer, send the query and read until a reply matches
/// 4. Restore the previous input mode
///
/// Whichever of reply, timer or I/O failure comes first settles the call; the
/// other side is dropped unobserved. Raw mode is restored on every path.
///
/// # Arguments
///
/// - `terminal` - Terminal to query
/// - `budget` - Time allowed for writing the query and receiving the reply
///
/// # Returns
///
/// - `Ok(Rgb)` with the background color normalized to the 0-255 scale
/// - `Err` if the terminal is not interactive, misbehaves, or stays silent
///
/// # Errors
///
/// Returns [`ProbeError::NonInteractive`] without touching the terminal when it
/// is not interactive, [`ProbeError::Timeout`] when no reply matched within
/// `budget`, and the I/O variants when the terminal misbehaves.
pub async fn query_background<T: Terminal>(
    terminal: &mut T,
    budget: Duration,
) -> Result<Rgb, ProbeError> {
    if !terminal.is_interactive() {
        return Err(ProbeError::NonInteractive);
    }

    let mut session = RawModeGuard::acquire(terminal).map_err(ProbeError::RawMode)?;
    let exchange = async {
        session
            .write_query(OSC11_QUERY)
            .await
            .map_err(ProbeError::Write)?;
        read_reply(&mut *session).await
    };
    let components = timeout(budget, exchange)
        .await
        .map_err(|_| ProbeError::Timeout(budget))??;

    Ok(Rgb::from_components(components))
}
