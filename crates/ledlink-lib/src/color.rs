//! RGB color type, parsing and formatting.
//!
//! Colors travel on the wire as three decimal channels (`COLOR:r,g,b`); users
//! supply them as `#RRGGBB` hex or a handful of names.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{LedError, Result};

/// An 8-bit-per-channel RGB color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const BLACK: Rgb = Rgb::new(0, 0, 0);
    pub const WHITE: Rgb = Rgb::new(255, 255, 255);
    pub const RED: Rgb = Rgb::new(255, 0, 0);

    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Rgb { r, g, b }
    }

    /// Build a color from wider integers, clamping each channel to `0..=255`.
    pub fn clamped(r: i64, g: i64, b: i64) -> Self {
        let c = |v: i64| v.clamp(0, 255) as u8;
        Rgb::new(c(r), c(g), c(b))
    }

    /// Format as `#RRGGBB`.
    pub fn to_hex(self) -> String {
        format!("#{:02X}{:02X}{:02X}", self.r, self.g, self.b)
    }
}

impl fmt::Display for Rgb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl FromStr for Rgb {
    type Err = LedError;

    fn from_str(s: &str) -> Result<Self> {
        parse_color(s)
    }
}

impl Serialize for Rgb {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Rgb {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        parse_color(&s).map_err(serde::de::Error::custom)
    }
}

/// Parse a color string.
///
/// Accepts:
/// - Hex: `"#FF0000"`, `"FF0000"`, `"#ff0000"`
/// - Named: `"red"`, `"green"`, `"blue"`, `"white"`, `"orange"`, `"yellow"`, `"purple"`, `"cyan"`, `"off"`
pub fn parse_color(s: &str) -> Result<Rgb> {
    let s = s.trim();

    match s.to_lowercase().as_str() {
        "red" => return Ok(Rgb::RED),
        "green" => return Ok(Rgb::new(0, 255, 0)),
        "blue" => return Ok(Rgb::new(0, 0, 255)),
        "white" => return Ok(Rgb::WHITE),
        "orange" => return Ok(Rgb::new(255, 128, 0)),
        "yellow" => return Ok(Rgb::new(255, 255, 0)),
        "purple" => return Ok(Rgb::new(128, 0, 255)),
        "cyan" => return Ok(Rgb::new(0, 255, 255)),
        "off" | "black" => return Ok(Rgb::BLACK),
        _ => {}
    }

    let hex = s.strip_prefix('#').unwrap_or(s);
    if hex.len() != 6 || !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(LedError::Validation(format!(
            "Invalid color: {s} (use #RRGGBB or a color name)"
        )));
    }
    let val = u32::from_str_radix(hex, 16)
        .map_err(|_| LedError::Validation(format!("Invalid hex color: {s}")))?;
    Ok(Rgb::new(
        ((val >> 16) & 0xFF) as u8,
        ((val >> 8) & 0xFF) as u8,
        (val & 0xFF) as u8,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    // ── parse_color ──

    #[test]
    fn parse_named_primaries() {
        assert_eq!(parse_color("red").unwrap(), Rgb::new(255, 0, 0));
        assert_eq!(parse_color("green").unwrap(), Rgb::new(0, 255, 0));
        assert_eq!(parse_color("blue").unwrap(), Rgb::new(0, 0, 255));
    }

    #[test]
    fn parse_named_off() {
        assert_eq!(parse_color("off").unwrap(), Rgb::BLACK);
        assert_eq!(parse_color("black").unwrap(), Rgb::BLACK);
    }

    #[test]
    fn parse_named_case_insensitive() {
        assert_eq!(parse_color("RED").unwrap(), Rgb::RED);
        assert_eq!(parse_color("  Red  ").unwrap(), Rgb::RED);
    }

    #[test]
    fn parse_hex_with_and_without_hash() {
        assert_eq!(parse_color("#123456").unwrap(), Rgb::new(0x12, 0x34, 0x56));
        assert_eq!(parse_color("abcdef").unwrap(), Rgb::new(0xAB, 0xCD, 0xEF));
    }

    #[test]
    fn parse_rejects_signs_and_spaces_in_hex() {
        for bad in ["#+12345", "#-12345", "# 12345", "+12345", "#12 345"] {
            assert!(
                matches!(parse_color(bad), Err(LedError::Validation(_))),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn parse_invalid_lengths() {
        assert!(parse_color("#FFF").is_err());
        assert!(parse_color("#FF000000").is_err());
    }

    #[test]
    fn parse_invalid_chars_is_validation_error() {
        let err = parse_color("#GGHHII").unwrap_err();
        assert!(matches!(err, LedError::Validation(_)));
    }

    #[test]
    fn parse_rejects_multibyte_input_of_hex_length() {
        assert!(parse_color("#ééé").is_err());
    }

    #[test]
    fn parse_invalid_name() {
        assert!(parse_color("chartreuse").is_err());
    }

    // ── formatting ──

    #[test]
    fn to_hex_is_uppercase() {
        assert_eq!(Rgb::new(0xab, 0x01, 0xff).to_hex(), "#AB01FF");
    }

    #[test]
    fn clamped_limits_channels() {
        assert_eq!(Rgb::clamped(-5, 128, 300), Rgb::new(0, 128, 255));
    }

    #[test]
    fn hex_round_trip() {
        for hex in ["#000000", "#FFFFFF", "#AB12CD", "#0F0F0F"] {
            assert_eq!(parse_color(hex).unwrap().to_hex(), hex);
        }
    }

    #[test]
    fn serde_uses_hex_strings() {
        let json = serde_json::to_string(&Rgb::new(255, 128, 0)).unwrap();
        assert_eq!(json, "\"#FF8000\"");
        let back: Rgb = serde_json::from_str("\"orange\"").unwrap();
        assert_eq!(back, Rgb::new(255, 128, 0));
    }
}
