//! Date parsing and multi-day / pioneer inference.

use chrono::{DateTime, NaiveDate, TimeZone, Utc};

use ridecal_common::CanonicalEvent;

use crate::transform::distances::leading_numeric;

/// Name substrings that imply a multi-day event.
const MULTI_DAY_MARKERS: [&str; 4] = ["day", "days", "pioneer", "multi"];

/// Parse an event date. Accepts ISO `YYYY-MM-DD`, `MM/DD/YYYY`, and an
/// ISO datetime prefix.
pub fn parse_date(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Some(date);
    }
    if let Ok(date) = NaiveDate::parse_from_str(s, "%m/%d/%Y") {
        return Some(date);
    }
    // Datetime forms: keep the date part.
    if let Ok(dt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S") {
        return Some(dt.date());
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.date_naive());
    }
    None
}

pub fn to_utc(date: NaiveDate) -> DateTime<Utc> {
    Utc.from_utc_datetime(&date.and_hms_opt(0, 0, 0).expect("midnight exists"))
}

/// Enforce the multi-day invariants on a transformed event.
///
/// Sources of truth, in order: the start/end span, multi-day markers in
/// the name ("pioneer" also forces at least three days), and repeated
/// numeric distances (one day per listed distance).
pub fn apply_ride_span(event: &mut CanonicalEvent) {
    let mut is_multi_day = event.is_multi_day_event;
    let mut is_pioneer = event.is_pioneer_ride;
    let mut ride_days = event.ride_days.max(1);

    let span_days =
        (event.date_end.date_naive() - event.date_start.date_naive()).num_days() + 1;
    if span_days > 1 {
        is_multi_day = true;
        ride_days = ride_days.max(span_days as i32);
    }

    let name = event.name.to_lowercase();
    if MULTI_DAY_MARKERS.iter().any(|marker| name.contains(marker)) {
        is_multi_day = true;
        if name.contains("pioneer") {
            is_pioneer = true;
            ride_days = ride_days.max(3);
        }
    }

    let numerics: Vec<i64> = event
        .distances
        .iter()
        .filter_map(|d| leading_numeric(&d.distance))
        .map(|n| n as i64)
        .collect();
    if numerics.len() >= 2 {
        let mut unique = numerics.clone();
        unique.sort_unstable();
        unique.dedup();
        if unique.len() < numerics.len() {
            is_multi_day = true;
            ride_days = ride_days.max(event.distances.len() as i32);
        }
    }

    if is_multi_day && ride_days < 2 {
        ride_days = 2;
    }
    // Three or more consecutive days at one venue is a pioneer ride by
    // definition, named as one or not.
    if is_multi_day && ride_days >= 3 {
        is_pioneer = true;
    }
    if is_pioneer {
        is_multi_day = true;
        ride_days = ride_days.max(3);
    }

    event.is_multi_day_event = is_multi_day;
    event.is_pioneer_ride = is_pioneer;
    event.ride_days = ride_days;
}

#[cfg(test)]
mod tests {
    use super::*;
    use ridecal_common::{Distance, Source};

    fn event(name: &str, start: &str, end: &str, distances: &[&str]) -> CanonicalEvent {
        let start = to_utc(parse_date(start).unwrap());
        let mut event =
            CanonicalEvent::new(Source::Aerc, name.to_string(), start, "Reno, NV".to_string());
        event.date_end = to_utc(parse_date(end).unwrap());
        event.distances = distances.iter().map(|d| Distance::new(*d)).collect();
        event
    }

    #[test]
    fn parses_both_date_formats() {
        assert_eq!(
            parse_date("2024-03-15"),
            NaiveDate::from_ymd_opt(2024, 3, 15)
        );
        assert_eq!(
            parse_date("03/15/2024"),
            NaiveDate::from_ymd_opt(2024, 3, 15)
        );
        assert_eq!(
            parse_date("2024-03-15T08:00:00"),
            NaiveDate::from_ymd_opt(2024, 3, 15)
        );
        assert_eq!(parse_date("next week"), None);
    }

    #[test]
    fn single_day_stays_single() {
        let mut e = event("X", "2024-06-01", "2024-06-01", &["50 miles", "25 miles"]);
        apply_ride_span(&mut e);
        assert!(!e.is_multi_day_event);
        assert!(!e.is_pioneer_ride);
        assert_eq!(e.ride_days, 1);
    }

    #[test]
    fn three_day_span_is_a_pioneer() {
        let mut e = event("X", "2024-03-15", "2024-03-17", &[]);
        apply_ride_span(&mut e);
        assert!(e.is_multi_day_event);
        assert!(e.is_pioneer_ride);
        assert_eq!(e.ride_days, 3);
    }

    #[test]
    fn two_day_span_is_not_a_pioneer() {
        let mut e = event("X", "2024-03-15", "2024-03-16", &[]);
        apply_ride_span(&mut e);
        assert!(e.is_multi_day_event);
        assert!(!e.is_pioneer_ride);
        assert_eq!(e.ride_days, 2);
    }

    #[test]
    fn pioneer_name_forces_three_days() {
        let mut e = event("Owyhee Pioneer", "2024-06-01", "2024-06-01", &[]);
        apply_ride_span(&mut e);
        assert!(e.is_pioneer_ride);
        assert!(e.is_multi_day_event);
        assert_eq!(e.ride_days, 3);
    }

    #[test]
    fn repeated_distances_imply_one_day_each() {
        let mut e = event("X", "2024-03-15", "2024-03-15", &["50", "50", "50"]);
        apply_ride_span(&mut e);
        assert!(e.is_multi_day_event);
        assert_eq!(e.ride_days, 3);
        assert!(e.is_pioneer_ride);
    }

    #[test]
    fn multi_day_marker_without_span_gets_two_days() {
        let mut e = event("Two Day Fun Run", "2024-06-01", "2024-06-01", &[]);
        apply_ride_span(&mut e);
        assert!(e.is_multi_day_event);
        assert_eq!(e.ride_days, 2);
    }
}
