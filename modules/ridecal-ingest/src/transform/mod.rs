//! RawRow → CanonicalEvent transformation.

pub mod contacts;
pub mod distances;
pub mod location;
pub mod schedule;

use serde::Serialize;
use serde_json::{json, Value};
use tracing::warn;
use url::Url;

use ridecal_common::{CanonicalEvent, Distance, IngestError, Judge, RawRow, Result, Source};

use self::location::parse_location;
use self::schedule::{apply_ride_span, parse_date, to_utc};

/// Descriptions are clamped to this many characters.
const DESCRIPTION_MAX_CHARS: usize = 2000;

#[derive(Debug, Default, Clone, Serialize)]
pub struct TransformCounters {
    pub transformed: u32,
    pub errors: u32,
}

pub struct Transformer {
    source: Source,
    pub counters: TransformCounters,
}

impl Transformer {
    pub fn new(source: Source) -> Self {
        Self {
            source,
            counters: TransformCounters::default(),
        }
    }

    /// Transform validated rows in order, dropping (and counting) failures.
    pub fn transform_all(&mut self, rows: Vec<RawRow>) -> Vec<CanonicalEvent> {
        let mut events = Vec::with_capacity(rows.len());
        for row in rows {
            match self.transform(&row) {
                Ok(event) => {
                    self.counters.transformed += 1;
                    events.push(event);
                }
                Err(e) => {
                    warn!(
                        name = row.get_str("name").unwrap_or("<unnamed>"),
                        error = %e,
                        "Dropping row in transform"
                    );
                    self.counters.errors += 1;
                }
            }
        }
        events
    }

    pub fn transform(&self, row: &RawRow) -> Result<CanonicalEvent> {
        let name = row
            .get_str("name")
            .ok_or_else(|| IngestError::Transform("missing name".to_string()))?;
        let location = row
            .get_str("location")
            .ok_or_else(|| IngestError::Transform("missing location".to_string()))?
            .to_string();

        let start = row
            .get_str("date_start")
            .and_then(parse_date)
            .or_else(|| row.get_str("date").and_then(parse_date))
            .ok_or_else(|| IngestError::Transform("unparseable start date".to_string()))?;

        let mut event =
            CanonicalEvent::new(self.source, name.to_string(), to_utc(start), location.clone());

        if let Some(end) = row.get_str("date_end").and_then(parse_date) {
            event.date_end = to_utc(end.max(start));
        }

        event.region = row.get_str("region").map(str::to_string);
        event.external_id = row.get_str("external_id").map(str::to_string);
        event.ride_id = row.get_str("ride_id").map(str::to_string);
        event.website = row.get_str("website").and_then(normalize_url);
        event.flyer_url = row.get_str("flyer_url").and_then(normalize_url);
        event.map_link = row.get_str("map_link").and_then(normalize_url);
        event.directions = row.get_str("directions").map(str::to_string);
        event.notes = row.get_str("notes").map(str::to_string);
        event.description = row.get_str("description").map(truncate_description);
        event.is_canceled = row.get_bool("is_canceled").unwrap_or(false);
        if self.source == Source::Aerc {
            event.event_type = Some("endurance".to_string());
        }

        let parts = parse_location(&location);
        event.city = parts.city.clone();
        event.state = parts.state.clone();
        event.country = parts.country.clone();

        if let Some(coords) = row.get_object("coordinates") {
            event.latitude = coords.get("latitude").and_then(Value::as_f64);
            event.longitude = coords.get("longitude").and_then(Value::as_f64);
        }

        self.build_distances(row, &mut event, start);
        apply_ride_span(&mut event);
        contacts::consolidate(row, &mut event);
        self.build_judges(row, &mut event);
        self.build_details(row, &mut event);

        Ok(event)
    }

    fn build_distances(
        &self,
        row: &RawRow,
        event: &mut CanonicalEvent,
        start: chrono::NaiveDate,
    ) {
        let default_date = start.format("%Y-%m-%d").to_string();
        let Some(entries) = row.get_array("distances") else {
            return;
        };

        for entry in entries {
            let distance = match entry {
                Value::String(text) => {
                    let text = text.trim();
                    if text.is_empty() {
                        continue;
                    }
                    Distance {
                        distance: distances::canonicalize(text),
                        date: Some(default_date.clone()),
                        start_time: None,
                    }
                }
                Value::Object(map) => {
                    let Some(text) = map
                        .get("distance")
                        .and_then(Value::as_str)
                        .map(str::trim)
                        .filter(|s| !s.is_empty())
                    else {
                        continue;
                    };
                    Distance {
                        distance: distances::canonicalize(text),
                        date: map
                            .get("date")
                            .and_then(Value::as_str)
                            .map(str::to_string)
                            .or_else(|| Some(default_date.clone())),
                        start_time: map
                            .get("start_time")
                            .and_then(Value::as_str)
                            .map(str::to_string),
                    }
                }
                _ => continue,
            };
            event.distances.push(distance);
        }

        event.has_intro_ride = row.get_bool("has_intro_ride").unwrap_or_else(|| {
            event
                .distances
                .iter()
                .any(|d| distances::is_intro(&d.distance))
        });
    }

    fn build_judges(&self, row: &RawRow, event: &mut CanonicalEvent) {
        let Some(entries) = row.get_array("control_judges") else {
            return;
        };
        for entry in entries {
            let Some(map) = entry.as_object() else {
                continue;
            };
            let Some(name) = map
                .get("name")
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|s| !s.is_empty())
            else {
                continue;
            };
            let role = map
                .get("role")
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .unwrap_or("Control Judge");
            event.judges.push(Judge {
                name: name.to_string(),
                role: role.to_string(),
            });
        }
    }

    /// Everything not promoted to a column lands in the `event_details` bag.
    fn build_details(&self, row: &RawRow, event: &mut CanonicalEvent) {
        let mut details = serde_json::Map::new();

        let mut location_details = serde_json::Map::new();
        if let Some(city) = &event.city {
            location_details.insert("city".to_string(), json!(city));
        }
        if let Some(state) = &event.state {
            location_details.insert("state".to_string(), json!(state));
        }
        if let Some(country) = &event.country {
            location_details.insert("country".to_string(), json!(country));
        }
        location_details.insert("address".to_string(), json!(event.location));
        details.insert("location_details".to_string(), Value::Object(location_details));

        if let (Some(lat), Some(lng)) = (event.latitude, event.longitude) {
            details.insert(
                "coordinates".to_string(),
                json!({ "latitude": lat, "longitude": lng }),
            );
        }

        if !event.distances.is_empty() {
            details.insert(
                "distances".to_string(),
                serde_json::to_value(&event.distances).unwrap_or(Value::Null),
            );
        }
        if !event.judges.is_empty() {
            details.insert(
                "control_judges".to_string(),
                serde_json::to_value(&event.judges).unwrap_or(Value::Null),
            );
        }
        details.insert(
            "ride_manager_contact".to_string(),
            serde_json::to_value(&event.ride_manager_contact).unwrap_or(Value::Null),
        );

        details.insert("has_intro_ride".to_string(), json!(event.has_intro_ride));
        details.insert(
            "is_multi_day_event".to_string(),
            json!(event.is_multi_day_event),
        );
        details.insert("is_pioneer_ride".to_string(), json!(event.is_pioneer_ride));
        details.insert("ride_days".to_string(), json!(event.ride_days));

        // Source-specific extras pass through untouched.
        for key in ["sanctioning_status", "has_drug_testing", "treatment_vets"] {
            if let Some(value) = row.get(key) {
                details.insert(key.to_string(), value.clone());
            }
        }

        event.event_details = details;
    }
}

/// Normalise a URL: add a scheme when missing, reject obviously bad input.
fn normalize_url(raw: &str) -> Option<String> {
    let raw = raw.trim();
    if raw.is_empty() || raw.contains(' ') || !raw.contains('.') {
        return None;
    }
    let candidate = if raw.starts_with("http://") || raw.starts_with("https://") {
        raw.to_string()
    } else {
        format!("https://{raw}")
    };
    let parsed = Url::parse(&candidate).ok()?;
    parsed.host_str()?;
    Some(parsed.to_string())
}

/// Clamp a description, suffixing an ellipsis when cut.
fn truncate_description(text: &str) -> String {
    if text.chars().count() <= DESCRIPTION_MAX_CHARS {
        return text.to_string();
    }
    let mut clamped: String = text.chars().take(DESCRIPTION_MAX_CHARS - 1).collect();
    clamped.push('…');
    clamped
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn transform(fields: serde_json::Value) -> CanonicalEvent {
        let row = RawRow::from_value(fields).unwrap();
        Transformer::new(Source::Aerc).transform(&row).unwrap()
    }

    #[test]
    fn minimal_row_fills_defaults() {
        let event = transform(json!({
            "name": "X", "date_start": "2024-06-01", "location": "Reno, NV"
        }));
        assert_eq!(event.date_end, event.date_start);
        assert_eq!(event.ride_days, 1);
        assert!(!event.is_multi_day_event);
        assert_eq!(event.city.as_deref(), Some("Reno"));
        assert_eq!(event.state.as_deref(), Some("NV"));
        assert_eq!(event.country.as_deref(), Some("USA"));
        assert_eq!(event.event_type.as_deref(), Some("endurance"));
        assert!(!event.geocoding_attempted);
    }

    #[test]
    fn slash_dates_parse() {
        let event = transform(json!({
            "name": "X", "date_start": "03/15/2024", "location": "Reno, NV"
        }));
        assert_eq!(event.date_start.date_naive().to_string(), "2024-03-15");
    }

    #[test]
    fn distances_are_canonicalised_and_dated() {
        let event = transform(json!({
            "name": "X", "date_start": "2024-06-01", "location": "Reno, NV",
            "distances": ["50", { "distance": "25 miles", "start_time": "06:30" }, "intro"]
        }));
        assert_eq!(event.distances[0].distance, "50 miles");
        assert_eq!(event.distances[0].date.as_deref(), Some("2024-06-01"));
        assert_eq!(event.distances[1].distance, "25 miles");
        assert_eq!(event.distances[1].start_time.as_deref(), Some("06:30"));
        assert_eq!(event.distances[2].distance, "intro");
        assert!(event.has_intro_ride);
    }

    #[test]
    fn inverted_date_range_is_clamped() {
        let event = transform(json!({
            "name": "X", "date_start": "2024-06-05", "date_end": "2024-06-01",
            "location": "Reno, NV"
        }));
        assert!(event.date_end >= event.date_start);
    }

    #[test]
    fn description_is_clamped_with_ellipsis() {
        let long = "a".repeat(3000);
        let event = transform(json!({
            "name": "X", "date_start": "2024-06-01", "location": "Reno, NV",
            "description": long
        }));
        let description = event.description.unwrap();
        assert_eq!(description.chars().count(), DESCRIPTION_MAX_CHARS);
        assert!(description.ends_with('…'));
    }

    #[test]
    fn details_bag_carries_flags_and_structures() {
        let event = transform(json!({
            "name": "Big Horn Pioneer", "date_start": "2024-07-04",
            "date_end": "2024-07-06", "location": "Shell, WY",
            "distances": ["25", "25", "25"],
            "control_judges": [{ "name": "Dr. Vet", "role": "Head Control Judge" }],
            "sanctioning_status": "sanctioned"
        }));
        let details = &event.event_details;
        assert_eq!(details["is_pioneer_ride"], json!(true));
        assert_eq!(details["is_multi_day_event"], json!(true));
        assert_eq!(details["ride_days"], json!(3));
        assert_eq!(details["sanctioning_status"], json!("sanctioned"));
        assert_eq!(details["location_details"]["city"], json!("Shell"));
        assert_eq!(details["control_judges"][0]["name"], json!("Dr. Vet"));
    }

    #[test]
    fn urls_are_normalised_or_rejected() {
        assert_eq!(
            normalize_url("aerc.org/ride"),
            Some("https://aerc.org/ride".to_string())
        );
        assert_eq!(
            normalize_url("https://example.com/flyer.pdf"),
            Some("https://example.com/flyer.pdf".to_string())
        );
        assert_eq!(normalize_url("not a url"), None);
        assert_eq!(normalize_url("nodots"), None);
    }

    #[test]
    fn counters_track_drops() {
        let mut transformer = Transformer::new(Source::Aerc);
        let rows = vec![
            RawRow::from_value(json!({
                "name": "ok", "date_start": "2024-06-01", "location": "Reno, NV"
            }))
            .unwrap(),
            RawRow::from_value(json!({ "name": "broken" })).unwrap(),
        ];
        let events = transformer.transform_all(rows);
        assert_eq!(events.len(), 1);
        assert_eq!(transformer.counters.transformed, 1);
        assert_eq!(transformer.counters.errors, 1);
    }
}
