//! Terminal background color detection utility.
//!
//! Queries the terminal for its background color using an OSC 11 escape
//! sequence and reports whether it is light or dark.
//!
//! # Usage
//!
//! The program prints one of three values:
//! - `light` - for light backgrounds (luminance >= 128 of 255)
//! - `dark` - for dark backgrounds (luminance < 128 of 255)
//! - `unknown` - when the background color cannot be determined
//!
//! Exit codes:
//! - 0: Successfully determined background color
//! - 2: Unable to determine background color
//!
//! # Environment Variables
//!
//! - `DEBUG`: When set, enables debug output to stderr (same as `--verbose`).
//! - `RUST_LOG`: Overrides the log filter entirely.
//! - `BGSENSE_TIMEOUT_MS`: Default for `--timeout-ms`.

mod logs;

use std::io::{self, Write};
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result};
use bgsense::{Classification, parse_color_spec};
use clap::Parser;
use tracing::{debug, error};

/// Detect whether the terminal background is light or dark.
#[derive(Debug, Parser)]
#[command(name = "bgsense", version, about)]
struct Cli {
    /// Give up waiting for the terminal after this many milliseconds
    #[arg(long, env = "BGSENSE_TIMEOUT_MS", default_value_t = 200, value_name = "MS")]
    timeout_ms: u64,

    /// Classify this color instead of asking the terminal
    /// (`rgb:R/G/B`, `rgba:R/G/B/A`, `#RRGGBB` or `rgb(r, g, b)`)
    #[arg(long, value_name = "SPEC")]
    color: Option<String>,

    /// Log the reply, parsed color and luminance to stderr
    #[arg(short, long)]
    verbose: bool,
}

fn classify_spec(spec: &str) -> Result<Classification> {
    let rgb = parse_color_spec(spec).with_context(|| format!("Invalid color: {spec}"))?;
    debug!(?rgb, lum = rgb.luminance(), "parsed color");
    Ok(rgb.classify())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    logs::init(cli.verbose);

    let classification = match cli.color.as_deref() {
        Some(spec) => classify_spec(spec).unwrap_or_else(|err| {
            error!("{err:#}");
            Classification::Unknown
        }),
        None => bgsense::detect_with_timeout(Duration::from_millis(cli.timeout_ms)).await,
    };

    print!("{classification}");
    let _ = io::stdout().flush();

    if classification.is_known() {
        ExitCode::SUCCESS
    } else {
        debug!("unable to determine background color");
        ExitCode::from(2)
    }
}
