use super::StimError;

use serde::Deserialize;
use std::fmt;
use std::str::FromStr;

/// An RGB colour with components in `[0, 1]`.
///
/// Written in configuration either as a grey level (`"0.5"`) or as hex
/// (`"0xFF8000"`).
#[derive(Debug, Clone, Copy, PartialEq, Default, Deserialize)]
#[serde(try_from = "String")]
pub struct Color {
    /// Red, `[0, 1]`.
    pub r: f64,
    /// Green, `[0, 1]`.
    pub g: f64,
    /// Blue, `[0, 1]`.
    pub b: f64,
}

impl Color {
    /// Black.
    pub const BLACK: Color = Color::grey(0.0);
    /// White.
    pub const WHITE: Color = Color::grey(1.0);

    /// A grey with all components at `level`.
    pub const fn grey(level: f64) -> Self {
        Self {
            r: level,
            g: level,
            b: level,
        }
    }
}

impl FromStr for Color {
    type Err = StimError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let bad = || StimError::BadColor(s.to_owned());

        if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
            let v = u32::from_str_radix(hex, 16).map_err(|_| bad())?;
            let byte = |shift: u32| ((v >> shift) & 0xFF) as f64 / 255.0;
            return Ok(Color {
                r: byte(16),
                g: byte(8),
                b: byte(0),
            });
        }

        let level: f64 = s.parse().map_err(|_| bad())?;
        Ok(Color::grey(level))
    }
}

impl TryFrom<String> for Color {
    type Error = StimError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.r == self.g && self.g == self.b {
            write!(f, "grey {:.3}", self.r)
        } else {
            write!(f, "rgb({:.3}, {:.3}, {:.3})", self.r, self.g, self.b)
        }
    }
}
