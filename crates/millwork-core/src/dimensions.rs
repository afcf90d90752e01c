//! Dimension text parsing and range helpers.

use once_cell::sync::Lazy;
use regex::Regex;

static MIXED_FRACTION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d+)[- ](\d+)/(\d+)$").expect("static regex"));
static FRACTION: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(\d+)/(\d+)$").expect("static regex"));
static DECIMAL: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(\d+(?:\.\d*)?)$").expect("static regex"));

/// Parse dimension annotation text into inches.
///
/// Accepts `32-3/4"` (32.75), `3/4` (0.75), `19.5`, `4"`. Quotes, primes and
/// surrounding spaces are ignored. Zero denominators and anything else yield
/// `None`.
pub fn parse_dimension_text(text: &str) -> Option<f64> {
    let trimmed = text.trim_matches(|c: char| c == ' ' || c == '"' || c == '\'');

    if let Some(caps) = MIXED_FRACTION.captures(trimmed) {
        let whole: f64 = caps[1].parse().ok()?;
        let num: f64 = caps[2].parse().ok()?;
        let den: f64 = caps[3].parse().ok()?;
        if den == 0.0 {
            return None;
        }
        return Some(whole + num / den);
    }

    if let Some(caps) = FRACTION.captures(trimmed) {
        let num: f64 = caps[1].parse().ok()?;
        let den: f64 = caps[2].parse().ok()?;
        if den == 0.0 {
            return None;
        }
        return Some(num / den);
    }

    DECIMAL
        .captures(trimmed)
        .and_then(|caps| caps[1].parse().ok())
}

/// Inclusive range check.
pub fn within(value: f64, (min, max): (f64, f64)) -> bool {
    value >= min && value <= max
}

/// True when `value` is within `tolerance` of any standard size.
pub fn near_standard(value: f64, standards: &[f64], tolerance: f64) -> bool {
    standards.iter().any(|s| (value - s).abs() <= tolerance)
}

/// Closest standard size to `value`.
pub fn nearest_standard(value: f64, standards: &[f64]) -> Option<f64> {
    standards.iter().copied().min_by(|a, b| {
        (value - a)
            .abs()
            .partial_cmp(&(value - b).abs())
            .unwrap_or(std::cmp::Ordering::Equal)
    })
}
