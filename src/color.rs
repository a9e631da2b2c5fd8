//! Color components, luminance and light/dark classification.
//!
//! This module provides:
//! - [`HexComponent`], one channel of an X11 color spec (1 to 4 hex digits)
//! - [`Rgb`], three channels normalized onto a common 0-255 scale
//! - [`Classification`], the light/dark/unknown verdict
//! - [`parse_color_spec`] for the textual color formats terminals and users hand us

use std::fmt;
use std::str::FromStr;

use anyhow::{Context, Result, anyhow};
use regex::Regex;

/// Luminance below this value is dark. The boundary itself is light.
const DARK_THRESHOLD: f64 = 128.0;

/// Light/dark verdict for a terminal background.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Classification {
    /// Background luminance is at least 128 on the 0-255 scale.
    Light,
    /// Background luminance is below 128 on the 0-255 scale.
    Dark,
    /// Detection could not complete.
    #[default]
    Unknown,
}

impl Classification {
    /// Whether detection produced an actual verdict.
    #[must_use]
    pub fn is_known(self) -> bool {
        self != Self::Unknown
    }

    /// Lowercase name as printed by the command line tool.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Light => "light",
            Self::Dark => "dark",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One color channel written as 1 to 4 hexadecimal digits.
///
/// The digit count carries the channel's bit depth: `f` is 4-bit, `ff` 8-bit,
/// `fff` 12-bit and `ffff` 16-bit. All of them denote full intensity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HexComponent {
    value: u16,
    digits: u8,
}

impl HexComponent {
    /// Longest accepted component.
    pub const MAX_DIGITS: u8 = 4;

    pub(crate) const EMPTY: Self = Self {
        value: 0,
        digits: 0,
    };

    /// Build a component from its integer value and digit count.
    ///
    /// # Arguments
    ///
    /// * `value` - Integer value of the channel
    /// * `digits` - Number of hex digits it was written with (1-4)
    ///
    /// # Returns
    ///
    /// - `Some(HexComponent)` if `value` fits in `digits` hex digits
    /// - `None` when `digits` is outside `1..=4` or `value` is too large
    #[must_use]
    pub fn new(value: u16, digits: u8) -> Option<Self> {
        if !(1..=Self::MAX_DIGITS).contains(&digits) || u32::from(value) > max_for(digits) {
            return None;
        }
        Some(Self { value, digits })
    }

    /// Integer value as written.
    #[must_use]
    pub fn value(self) -> u16 {
        self.value
    }

    /// Number of hex digits the component was written with.
    #[must_use]
    pub fn digits(self) -> u8 {
        self.digits
    }

    /// Appends one hex digit. Returns `false`, leaving the component untouched,
    /// when it already holds [`Self::MAX_DIGITS`] digits.
    pub(crate) fn push_nibble(&mut self, nibble: u8) -> bool {
        if self.digits == Self::MAX_DIGITS {
            return false;
        }
        self.value = (self.value << 4) | u16::from(nibble);
        self.digits += 1;
        true
    }

    /// Scale the component onto the 8-bit range.
    ///
    /// Two-digit components are returned as-is; the other depths are divided by
    /// their maximum (`0xf`, `0xfff`, `0xffff`) and multiplied by 255.
    ///
    /// # Examples
    ///
    /// ```
    /// # use bgsense::HexComponent;
    /// let half: HexComponent = "80".parse().unwrap();
    /// assert_eq!(half.normalize(), 128.0);
    /// let full: HexComponent = "ffff".parse().unwrap();
    /// assert_eq!(full.normalize(), 255.0);
    /// ```
    #[must_use]
    pub fn normalize(self) -> f64 {
        match self.digits {
            0 => 0.0,
            2 => f64::from(self.value),
            n => f64::from(self.value) / f64::from(max_for(n)) * 255.0,
        }
    }
}

fn max_for(digits: u8) -> u32 {
    (1u32 << (4 * u32::from(digits))) - 1
}

impl FromStr for HexComponent {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        if s.is_empty() || s.len() > usize::from(Self::MAX_DIGITS) {
            return Err(anyhow!(
                "Invalid hex length: expected 1 to 4 characters, got {}",
                s.len()
            ));
        }
        if !s.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(anyhow!("Invalid hex string: {s}"));
        }
        let value = u16::from_str_radix(s, 16).with_context(|| format!("Invalid hex string: {s}"))?;
        #[allow(clippy::cast_possible_truncation)]
        let digits = s.len() as u8;
        Ok(Self { value, digits })
    }
}

/// RGB color with each channel on the 0-255 scale.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rgb {
    /// Red channel (0.0-255.0)
    pub r: f64,
    /// Green channel (0.0-255.0)
    pub g: f64,
    /// Blue channel (0.0-255.0)
    pub b: f64,
}

impl Rgb {
    /// Create a color from already normalized channels.
    #[must_use]
    pub fn new(r: f64, g: f64, b: f64) -> Self {
        Self { r, g, b }
    }

    /// Create a color from three hex components of any supported depth.
    ///
    /// # Arguments
    ///
    /// * `components` - Red, green and blue channels, each 1 to 4 hex digits
    ///
    /// # Returns
    ///
    /// The color with every channel normalized onto the 0-255 scale.
    #[must_use]
    pub fn from_components([r, g, b]: [HexComponent; 3]) -> Self {
        Self::new(r.normalize(), g.normalize(), b.normalize())
    }

    /// Relative luminance on the 0-255 scale.
    ///
    /// # Formula
    ///
    /// L = 0.2126 × R + 0.7152 × G + 0.0722 × B
    ///
    /// The channels are used as-is, without gamma linearization, so an
    /// achromatic gray has the luminance of its channel value.
    #[must_use]
    pub fn luminance(&self) -> f64 {
        0.2126 * self.r + 0.7152 * self.g + 0.0722 * self.b
    }

    /// Classify the color as [`Classification::Dark`] when its luminance is
    /// below 128, [`Classification::Light`] otherwise.
    #[must_use]
    pub fn classify(&self) -> Classification {
        if self.luminance() < DARK_THRESHOLD {
            Classification::Dark
        } else {
            Classification::Light
        }
    }
}

/// Parse a textual color specification.
///
/// Supported formats:
/// - `rgb:R/G/B` - X11 format, each channel 1 to 4 hex digits
/// - `rgba:R/G/B/A` - X11 format with alpha (alpha ignored)
/// - `#RRGGBB` and `#RRGGBBAA` - hex color (alpha ignored)
/// - `rgb(r, g, b)` - CSS function with decimal channels
///
/// # Arguments
///
/// * `s` - The color string to parse, surrounding whitespace allowed
///
/// # Returns
///
/// - `Ok(Rgb)` with each channel on the 0-255 scale
/// - `Err` if the string cannot be parsed as a valid color
///
/// # Errors
///
/// Returns an error when the string matches none of the formats above, or when
/// one of its channels is malformed (non-hex digits, too many digits, a decimal
/// channel above 255).
///
/// # Examples
///
/// ```
/// # use bgsense::{Classification, parse_color_spec};
/// assert_eq!(parse_color_spec("rgb:ffff/ffff/ffff").unwrap().classify(), Classification::Light);
/// assert_eq!(parse_color_spec("#1e1e2e").unwrap().classify(), Classification::Dark);
/// assert_eq!(parse_color_spec("rgb(255, 128, 0)").unwrap().g, 128.0);
/// ```
pub fn parse_color_spec(s: &str) -> Result<Rgb> {
    let s = s.trim();

    if let Some(body) = s.strip_prefix("rgb:").or_else(|| s.strip_prefix("rgba:")) {
        let parts: Vec<&str> = body.split('/').collect();
        if parts.len() != 3 && parts.len() != 4 {
            return Err(anyhow!(
                "Invalid rgb: format - expected 3 or 4 components, got {}",
                parts.len()
            ));
        }
        let r = parts[0]
            .parse()
            .with_context(|| format!("Failed to parse red component: {}", parts[0]))?;
        let g = parts[1]
            .parse()
            .with_context(|| format!("Failed to parse green component: {}", parts[1]))?;
        let b = parts[2]
            .parse()
            .with_context(|| format!("Failed to parse blue component: {}", parts[2]))?;
        return Ok(Rgb::from_components([r, g, b]));
    }

    if s.starts_with('#') && s.is_ascii() && (s.len() == 7 || s.len() == 9) {
        let r = s[1..3]
            .parse()
            .with_context(|| format!("Failed to parse red hex component: {}", &s[1..3]))?;
        let g = s[3..5]
            .parse()
            .with_context(|| format!("Failed to parse green hex component: {}", &s[3..5]))?;
        let b = s[5..7]
            .parse()
            .with_context(|| format!("Failed to parse blue hex component: {}", &s[5..7]))?;
        return Ok(Rgb::from_components([r, g, b]));
    }

    let re = Regex::new(r"^rgb\((\d+),\s*(\d+),\s*(\d+)\)$").context("Failed to compile RGB regex")?;
    if let Some(caps) = re.captures(s) {
        let r = caps[1]
            .parse::<u8>()
            .with_context(|| format!("Failed to parse red component: {}", &caps[1]))?;
        let g = caps[2]
            .parse::<u8>()
            .with_context(|| format!("Failed to parse green component: {}", &caps[2]))?;
        let b = caps[3]
            .parse::<u8>()
            .with_context(|| format!("Failed to parse blue component: {}", &caps[3]))?;
        return Ok(Rgb::new(f64::from(r), f64::from(g), f64::from(b)));
    }

    Err(anyhow!("Unrecognized color format: {s}"))
}
