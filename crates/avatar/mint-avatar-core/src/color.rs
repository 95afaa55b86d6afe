//! Clear colour and CSS colour parsing.

use serde::{Deserialize, Serialize};

/// Linear RGBA, every channel in `[0, 1]`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Rgba {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl Default for Rgba {
    fn default() -> Self {
        Self::BLACK
    }
}

impl Rgba {
    pub const BLACK: Rgba = Rgba {
        r: 0.0,
        g: 0.0,
        b: 0.0,
        a: 1.0,
    };

    /// Build a colour, clamping each channel into `[0, 1]`. NaN becomes 0.
    pub fn new(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self {
            r: unit(r),
            g: unit(g),
            b: unit(b),
            a: unit(a),
        }
    }

    /// Parse `#rgb`, `#rrggbb`, `rgb(r, g, b)` or `rgba(r, g, b, a)`.
    /// Anything else yields opaque black.
    pub fn parse_css(text: &str) -> Self {
        parse(text).unwrap_or(Self::BLACK)
    }
}

fn unit(v: f32) -> f32 {
    if v.is_nan() {
        0.0
    } else {
        v.clamp(0.0, 1.0)
    }
}

fn parse(text: &str) -> Option<Rgba> {
    let s = text.trim().to_ascii_lowercase();
    if let Some(hex) = s.strip_prefix('#') {
        return parse_hex(hex);
    }
    let (args, has_alpha) = if let Some(rest) = s.strip_prefix("rgba(") {
        (rest.strip_suffix(')')?, true)
    } else if let Some(rest) = s.strip_prefix("rgb(") {
        (rest.strip_suffix(')')?, false)
    } else {
        return None;
    };
    let parts: Vec<&str> = args.split(',').map(str::trim).collect();
    let expected = if has_alpha { 4 } else { 3 };
    if parts.len() != expected {
        return None;
    }
    let channel = |p: &str| p.parse::<f32>().ok().map(|v| v / 255.0);
    let r = channel(parts[0])?;
    let g = channel(parts[1])?;
    let b = channel(parts[2])?;
    let a = if has_alpha {
        parts[3].parse::<f32>().ok()?
    } else {
        1.0
    };
    Some(Rgba::new(r, g, b, a))
}

fn parse_hex(hex: &str) -> Option<Rgba> {
    if !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    let byte = |s: &str| u8::from_str_radix(s, 16).ok().map(|v| v as f32 / 255.0);
    match hex.len() {
        3 => {
            let expand = |i: usize| {
                let c = &hex[i..i + 1];
                byte(&format!("{c}{c}"))
            };
            Some(Rgba::new(expand(0)?, expand(1)?, expand(2)?, 1.0))
        }
        6 => Some(Rgba::new(
            byte(&hex[0..2])?,
            byte(&hex[2..4])?,
            byte(&hex[4..6])?,
            1.0,
        )),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-3
    }

    #[test]
    fn parses_short_and_long_hex() {
        let c = Rgba::parse_css("#f80");
        assert!(approx(c.r, 1.0) && approx(c.g, 0x88 as f32 / 255.0) && approx(c.b, 0.0));
        let c = Rgba::parse_css("  #FFFFFF ");
        assert_eq!(c, Rgba::new(1.0, 1.0, 1.0, 1.0));
    }

    #[test]
    fn parses_functional_forms() {
        let c = Rgba::parse_css("rgb(255, 0, 0)");
        assert_eq!(c, Rgba::new(1.0, 0.0, 0.0, 1.0));
        let c = Rgba::parse_css("rgba(0, 0, 255, 0.25)");
        assert!(approx(c.b, 1.0) && approx(c.a, 0.25));
    }

    #[test]
    fn garbage_falls_back_to_black() {
        assert_eq!(Rgba::parse_css("transparent"), Rgba::BLACK);
        assert_eq!(Rgba::parse_css("#12"), Rgba::BLACK);
        assert_eq!(Rgba::parse_css("rgb(1,2)"), Rgba::BLACK);
    }

    #[test]
    fn channels_are_clamped() {
        let c = Rgba::new(2.0, -1.0, f32::NAN, 0.5);
        assert_eq!(c, Rgba::new(1.0, 0.0, 0.0, 0.5));
        assert_eq!(Rgba::parse_css("rgb(300, 0, 0)").r, 1.0);
    }
}
