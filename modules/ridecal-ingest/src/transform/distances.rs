//! Distance canonicalisation and intro-ride inference.

use std::sync::OnceLock;

use regex::Regex;

/// Intro rides run at or under this many miles.
const INTRO_MILES_MAX: f64 = 15.0;

fn numeric_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(\d+(?:\.\d+)?)").expect("valid regex"))
}

/// Leading numeric value of a distance text, if any.
pub fn leading_numeric(text: &str) -> Option<f64> {
    numeric_re()
        .captures(text)
        .and_then(|caps| caps[1].parse().ok())
}

/// True when the text already carries a unit marker.
fn has_unit(text: &str) -> bool {
    let lower = text.to_lowercase();
    ["mile", "mi", "km"].iter().any(|unit| lower.contains(unit))
}

/// Canonicalise a distance text: unitless numerics get " miles" appended;
/// everything else is preserved verbatim.
pub fn canonicalize(text: &str) -> String {
    let text = text.trim();
    match leading_numeric(text) {
        Some(_) if !has_unit(text) => {
            let numeric = &numeric_re().captures(text).expect("matched above")[1];
            format!("{numeric} miles")
        }
        _ => text.to_string(),
    }
}

/// Explicit intro class, or short enough to count as one.
pub fn is_intro(text: &str) -> bool {
    if text.to_lowercase().contains("intro") {
        return true;
    }
    leading_numeric(text).is_some_and(|miles| miles <= INTRO_MILES_MAX)
}
