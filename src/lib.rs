//! Terminal background color detection library.
//!
//! Asks the attached terminal for its background color with an OSC 11 query
//! and classifies the answer as light or dark. Detection is best effort: it
//! never fails and never takes longer than its time budget, falling back to
//! [`Classification::Unknown`] whenever the terminal cannot tell.
//!
//! ```no_run
//! # async fn run() {
//! match bgsense::detect().await {
//!     bgsense::Classification::Light => println!("using the light theme"),
//!     _ => println!("using the dark theme"),
//! }
//! # }
//! ```

pub mod color;
mod error;
pub mod osc;
pub mod terminal;
#[cfg(test)]
mod testing;

use std::time::Duration;

use tracing::debug;

pub use color::{Classification, HexComponent, Rgb, parse_color_spec};
pub use error::ProbeError;
pub use osc::{OSC11_QUERY, ReplyParser};
pub use terminal::{RawModeGuard, Terminal, Tty};

/// Time budget used by [`detect`].
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(200);

/// Detect whether the terminal background is light or dark.
///
/// Equivalent to [`detect_with_timeout`] with [`DEFAULT_TIMEOUT`].
pub async fn detect() -> Classification {
    detect_with_timeout(DEFAULT_TIMEOUT).await
}

/// Detect the background of the process' controlling terminal.
///
/// Returns [`Classification::Unknown`] right away, without writing anything,
/// when stdin or stdout is not a terminal. Must be awaited from within a tokio
/// runtime.
pub async fn detect_with_timeout(budget: Duration) -> Classification {
    if !terminal::stdio_is_terminal() {
        debug!(error = %ProbeError::NonInteractive, "skipping background detection");
        return Classification::Unknown;
    }

    let mut tty = match Tty::open() {
        Ok(tty) => tty,
        Err(err) => {
            report(&ProbeError::Open(err));
            return Classification::Unknown;
        }
    };
    detect_on(&mut tty, budget).await
}

/// Detect the background of an arbitrary [`Terminal`].
///
/// Every failure, timeout included, is logged and folded into
/// [`Classification::Unknown`].
pub async fn detect_on<T: Terminal>(terminal: &mut T, budget: Duration) -> Classification {
    match osc::query_background(terminal, budget).await {
        Ok(rgb) => {
            let classification = rgb.classify();
            debug!(?rgb, lum = rgb.luminance(), %classification, "background detected");
            classification
        }
        Err(err) => {
            report(&err);
            Classification::Unknown
        }
    }
}

fn report(err: &ProbeError) {
    match std::error::Error::source(err) {
        Some(cause) => debug!(error = %err, %cause, "background detection failed"),
        None => debug!(error = %err, "background detection failed"),
    }
}
