//! Free-form location parsing.

/// Canadian province and territory codes. A state token in this set flips
/// the inferred country to Canada.
const CANADIAN_PROVINCES: [&str; 13] = [
    "AB", "BC", "MB", "NB", "NL", "NS", "NT", "NU", "ON", "PE", "QC", "SK", "YT",
];

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct LocationParts {
    pub city: Option<String>,
    pub state: Option<String>,
    pub country: Option<String>,
}

fn is_canadian_province(token: &str) -> bool {
    CANADIAN_PROVINCES.contains(&token.trim())
}

/// Parse a location string into city/state/country components.
///
/// Recognised patterns, in order:
/// 1. `"<venue> - <city>, <state>"` — venue stripped.
/// 2. `"<city>, <state>, <country>"`.
/// 3. `"<city>, <state>"` — country inferred from the province set.
/// 4. A single token — treated as the city.
pub fn parse_location(location: &str) -> LocationParts {
    let location = location.trim();
    if location.is_empty() {
        return LocationParts::default();
    }

    let mut parts = LocationParts::default();

    // Venue prefix: "<venue> - <city>, <state>"
    if location.contains(" - ") && location.contains(',') {
        let after_venue = location.split_once(" - ").map(|(_, rest)| rest).unwrap_or(location);
        if let Some((city, state)) = after_venue.split_once(',') {
            parts.city = non_empty(city);
            parts.state = non_empty(state);
            return with_inferred_country(parts);
        }
    }

    let segments: Vec<&str> = location.split(',').map(str::trim).collect();
    match segments.len() {
        1 => {
            // A bare venue-city pair still splits on the hyphen.
            let city = segments[0]
                .split_once(" - ")
                .map(|(_, city)| city)
                .unwrap_or(segments[0]);
            parts.city = non_empty(city);
        }
        2 => {
            parts.city = non_empty(segments[0]);
            let state_tokens: Vec<&str> = segments[1].split_whitespace().collect();
            match state_tokens.as_slice() {
                [] => {}
                [only] => parts.state = non_empty(only),
                [init @ .., last] if is_country(last) => {
                    parts.country = Some(canonical_country(last));
                    parts.state = non_empty(&init.join(" "));
                }
                tokens => {
                    parts.state = non_empty(&tokens.join(" "));
                    if tokens.iter().any(|t| is_canadian_province(t)) {
                        parts.country = Some("Canada".to_string());
                    }
                }
            }
        }
        _ => {
            let last = segments[segments.len() - 1];
            if is_country(last) {
                parts.country = Some(canonical_country(last));
                parts.state = non_empty(segments[segments.len() - 2]);
                parts.city = non_empty(segments[segments.len() - 3]);
            } else {
                parts.state = non_empty(last);
                parts.city = non_empty(segments[segments.len() - 2]);
            }
        }
    }

    with_inferred_country(parts)
}

fn with_inferred_country(mut parts: LocationParts) -> LocationParts {
    if parts.country.is_none() {
        let canadian = parts
            .state
            .as_deref()
            .is_some_and(|s| s.split_whitespace().last().is_some_and(is_canadian_province));
        if canadian {
            parts.country = Some("Canada".to_string());
        } else if parts.city.is_some() || parts.state.is_some() {
            parts.country = Some("USA".to_string());
        }
    }
    parts
}

fn is_country(token: &str) -> bool {
    matches!(token.to_lowercase().as_str(), "usa" | "canada")
}

fn canonical_country(token: &str) -> String {
    if token.to_lowercase() == "canada" {
        "Canada".to_string()
    } else {
        "USA".to_string()
    }
}

fn non_empty(s: &str) -> Option<String> {
    let trimmed = s.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}
