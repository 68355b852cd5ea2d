//! Colors and the 16-entry terminal palette.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

use crate::{Error, Result};

/// Number of entries a terminal palette must have.
pub const PALETTE_SIZE: usize = 16;

const FUNCTIONAL_PATTERN: &str =
    r"^rgba?\(\s*(\d{1,3})\s*,\s*(\d{1,3})\s*,\s*(\d{1,3})\s*(?:,\s*([0-9]*\.?[0-9]+)\s*)?\)$";

/// `rgb(r, g, b)` / `rgba(r, g, b, a)`, compiled once.
fn functional_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(FUNCTIONAL_PATTERN).expect("color pattern is valid"))
}

/// An RGBA color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Color {
    /// Red channel
    pub r: u8,
    /// Green channel
    pub g: u8,
    /// Blue channel
    pub b: u8,
    /// Alpha channel (255 = opaque)
    pub a: u8,
}

impl Color {
    /// Create an opaque color.
    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 255 }
    }

    /// Parse a color string.
    ///
    /// Accepted forms: `#RGB`, `#RRGGBB`, `#RRGGBBAA`, `rgb(r, g, b)` and
    /// `rgba(r, g, b, a)` where `a` is a float in `0.0..=1.0`.
    pub fn parse(s: &str) -> Result<Self> {
        let s = s.trim();
        if let Some(hex) = s.strip_prefix('#') {
            return Self::parse_hex(hex).ok_or_else(|| Error::InvalidColor(s.to_string()));
        }
        Self::parse_functional(s).ok_or_else(|| Error::InvalidColor(s.to_string()))
    }

    fn parse_hex(hex: &str) -> Option<Self> {
        if !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return None;
        }
        let byte = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).ok();
        match hex.len() {
            3 => {
                let nibble = |i: usize| u8::from_str_radix(&hex[i..i + 1], 16).ok().map(|n| n * 17);
                Some(Self::rgb(nibble(0)?, nibble(1)?, nibble(2)?))
            }
            6 => Some(Self::rgb(byte(0)?, byte(2)?, byte(4)?)),
            8 => Some(Self {
                r: byte(0)?,
                g: byte(2)?,
                b: byte(4)?,
                a: byte(6)?,
            }),
            _ => None,
        }
    }

    fn parse_functional(s: &str) -> Option<Self> {
        let caps = functional_pattern().captures(s)?;
        let channel = |i: usize| caps.get(i)?.as_str().parse::<u8>().ok();
        let alpha = match caps.get(4) {
            Some(m) => {
                let a: f64 = m.as_str().parse().ok()?;
                if !(0.0..=1.0).contains(&a) {
                    return None;
                }
                (a * 255.0).round() as u8
            }
            None => 255,
        };
        Some(Self {
            r: channel(1)?,
            g: channel(2)?,
            b: channel(3)?,
            a: alpha,
        })
    }

    /// Format as `#RRGGBB` (alpha is dropped).
    pub fn to_hex(&self) -> String {
        format!("#{:02X}{:02X}{:02X}", self.r, self.g, self.b)
    }
}

impl std::str::FromStr for Color {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// Named palette slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(missing_docs)]
pub enum PaletteColor {
    Black = 0,
    Red,
    Green,
    Yellow,
    Blue,
    Magenta,
    Cyan,
    White,
    BlackLight,
    RedLight,
    GreenLight,
    YellowLight,
    BlueLight,
    MagentaLight,
    CyanLight,
    WhiteLight,
}

/// A full 16-color terminal palette.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Palette {
    colors: [Color; PALETTE_SIZE],
}

impl Palette {
    /// Build a palette from exactly 16 color strings, in slot order.
    pub fn from_strings<S: AsRef<str>>(colors: &[S]) -> Result<Self> {
        if colors.len() != PALETTE_SIZE {
            return Err(Error::InvalidPalette(colors.len()));
        }
        let mut parsed = [Color::rgb(0, 0, 0); PALETTE_SIZE];
        for (slot, s) in parsed.iter_mut().zip(colors) {
            *slot = Color::parse(s.as_ref())?;
        }
        Ok(Self { colors: parsed })
    }

    /// The default dark palette.
    pub fn mike() -> Self {
        const MIKE: [Color; PALETTE_SIZE] = [
            Color::rgb(0x00, 0x00, 0x00),
            Color::rgb(0x80, 0x32, 0x32),
            Color::rgb(0x85, 0xA1, 0x36),
            Color::rgb(0xAA, 0x99, 0x43),
            Color::rgb(0x32, 0x4C, 0x80),
            Color::rgb(0x70, 0x6C, 0x9A),
            Color::rgb(0x92, 0xB1, 0x9E),
            Color::rgb(0xFF, 0xFF, 0xFF),
            Color::rgb(0x25, 0x25, 0x25),
            Color::rgb(0x98, 0x2B, 0x2B),
            Color::rgb(0x85, 0xA1, 0x36),
            Color::rgb(0xEF, 0xEF, 0x60),
            Color::rgb(0x41, 0x86, 0xBE),
            Color::rgb(0x82, 0x6A, 0xB1),
            Color::rgb(0xA1, 0xCD, 0xCD),
            Color::rgb(0xE7, 0xE7, 0xE7),
        ];
        Self { colors: MIKE }
    }

    /// Color in a named slot.
    pub fn get(&self, slot: PaletteColor) -> Color {
        self.colors[slot as usize]
    }

    /// All colors in slot order.
    pub fn colors(&self) -> &[Color; PALETTE_SIZE] {
        &self.colors
    }
}

impl Default for Palette {
    fn default() -> Self {
        Self::mike()
    }
}
