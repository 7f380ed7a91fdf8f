//! Validate → transform scenarios over the public API.

use serde_json::json;

use ridecal_common::{RawRow, Source};
use ridecal_ingest::transform::Transformer;
use ridecal_ingest::validator::{ValidationErrorKind, Validator};

fn row(fields: serde_json::Value) -> RawRow {
    RawRow::from_value(fields).unwrap()
}

fn run(rows: Vec<RawRow>) -> (Vec<ridecal_common::CanonicalEvent>, Validator, Transformer) {
    let mut validator = Validator::new();
    let valid = validator.validate(rows);
    let mut transformer = Transformer::new(Source::Aerc);
    let events = transformer.transform_all(valid);
    (events, validator, transformer)
}

#[test]
fn repeated_distances_make_a_pioneer_weekend() {
    let (events, ..) = run(vec![row(json!({
        "name": "X",
        "date_start": "2024-03-15",
        "date_end": "2024-03-17",
        "distances": ["50", "50", "50"],
        "location": "Reno, NV"
    }))]);

    let event = &events[0];
    assert!(event.is_multi_day_event);
    assert!(event.is_pioneer_ride);
    assert_eq!(event.ride_days, 3);
    assert_eq!(event.city.as_deref(), Some("Reno"));
    assert_eq!(event.state.as_deref(), Some("NV"));
    assert_eq!(event.country.as_deref(), Some("USA"));
}

#[test]
fn short_canadian_ride_is_an_intro() {
    let (events, ..) = run(vec![row(json!({
        "name": "Intro Fun Ride",
        "date_start": "2024-05-01",
        "distances": ["10 miles"],
        "location": "Calgary, AB"
    }))]);

    let event = &events[0];
    assert!(event.has_intro_ride);
    assert_eq!(event.country.as_deref(), Some("Canada"));
}

#[test]
fn bad_date_drops_with_typed_reason() {
    let (events, validator, _) = run(vec![row(json!({
        "name": "Z",
        "date_start": "bad",
        "location": "L"
    }))]);

    assert!(events.is_empty());
    assert_eq!(
        validator.errors_by_kind[&ValidationErrorKind::BadDateFormat],
        1
    );
}

#[test]
fn transform_never_grows_the_row_set_and_holds_invariants() {
    let rows = vec![
        row(json!({
            "name": "A", "date_start": "2024-06-01", "location": "Reno, NV",
            "distances": ["50", "25"]
        })),
        row(json!({
            "name": "B Pioneer", "date_start": "2024-07-01", "date_end": "2024-07-03",
            "location": "Oreana, ID"
        })),
        row(json!({ "date_start": "2024-08-01", "location": "L" })),
        row(json!({ "name": "D", "location": "L" })),
    ];
    let input_len = rows.len();

    let (events, ..) = run(rows);
    assert!(events.len() <= input_len);

    for event in &events {
        assert!(!event.name.is_empty());
        assert!(!event.location.is_empty());
        assert!(event.date_end >= event.date_start);
        assert!(event.ride_days >= 1);
        if event.is_pioneer_ride {
            assert!(event.is_multi_day_event);
            assert!(event.ride_days >= 3);
        }
        if event.date_end > event.date_start {
            assert!(event.is_multi_day_event);
        }
        if let (Some(contact_name), Some(manager)) =
            (&event.ride_manager_contact.name, &event.ride_manager)
        {
            assert_eq!(contact_name, manager);
        }
        for distance in &event.distances {
            // Canonical numeric forms carry a unit; everything else is
            // preserved verbatim and therefore unconstrained.
            if let Some(first_char) = distance.distance.chars().next() {
                if first_char.is_ascii_digit() {
                    let lower = distance.distance.to_lowercase();
                    assert!(
                        ["mile", "mi", "km"].iter().any(|u| lower.contains(u)),
                        "canonical numeric distance should carry a unit: {}",
                        distance.distance
                    );
                }
            }
        }
    }
}

#[test]
fn single_day_event_without_markers_stays_single() {
    let (events, ..) = run(vec![row(json!({
        "name": "Quicksilver Classic",
        "date_start": "2024-10-05",
        "date_end": "2024-10-05",
        "distances": ["25", "50"],
        "location": "San Jose, CA"
    }))]);

    let event = &events[0];
    assert!(!event.is_multi_day_event);
    assert_eq!(event.ride_days, 1);
}

#[test]
fn canadian_province_set_always_maps_to_canada() {
    for province in ["AB", "BC", "MB", "NB", "NL", "NS", "NT", "NU", "ON", "PE", "QC", "SK", "YT"] {
        let (events, ..) = run(vec![row(json!({
            "name": "Border Ride",
            "date_start": "2024-06-01",
            "location": format!("Townsite, {province}")
        }))]);
        assert_eq!(
            events[0].country.as_deref(),
            Some("Canada"),
            "province {province}"
        );
    }
}
