//! Upsert semantics against the in-memory store.

use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use chrono::{TimeZone, Utc};
use serde_json::json;

use ridecal_common::{CanonicalEvent, Source};
use ridecal_ingest::upserter::Upserter;
use ridecal_store::MemoryEventStore;

fn event(name: &str, ride_id: Option<&str>) -> CanonicalEvent {
    let start = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
    let mut event =
        CanonicalEvent::new(Source::Aerc, name.to_string(), start, "Reno, NV".to_string());
    event.ride_id = ride_id.map(str::to_string);
    event
}

#[tokio::test]
async fn two_passes_are_idempotent() {
    let store = Arc::new(MemoryEventStore::new());
    let batch = vec![event("Y", Some("R42")), event("Z", None)];
    let cancelled = AtomicBool::new(false);

    let mut first = Upserter::new(store.clone());
    first.upsert_batch(&batch, &cancelled).await.unwrap();
    assert_eq!(first.counters.added, 2);
    assert_eq!(first.counters.updated, 0);

    let mut second = Upserter::new(store.clone());
    second.upsert_batch(&batch, &cancelled).await.unwrap();
    assert_eq!(second.counters.added, 0);
    assert_eq!(second.counters.updated, 2);

    assert_eq!(store.len(), 2);
}

#[tokio::test]
async fn ride_id_lookup_wins_over_name_and_date() {
    let store = Arc::new(MemoryEventStore::new());
    let cancelled = AtomicBool::new(false);

    // Row 1 carries the ride id; row 2 collides on (name, date) with the
    // incoming event.
    let seeded = vec![event("Original Name", Some("R42")), event("B", None)];
    Upserter::new(store.clone())
        .upsert_batch(&seeded, &cancelled)
        .await
        .unwrap();

    let incoming = vec![event("B", Some("R42"))];
    let mut upserter = Upserter::new(store.clone());
    upserter.upsert_batch(&incoming, &cancelled).await.unwrap();
    assert_eq!(upserter.counters.updated, 1);

    let rows = store.snapshot();
    // The ride-id row took the update (its name changed); the name/date
    // collision row is untouched.
    assert_eq!(rows[0].event.ride_id.as_deref(), Some("R42"));
    assert_eq!(rows[0].event.name, "B");
    assert!(rows[1].event.ride_id.is_none());
}

#[tokio::test]
async fn incoming_nulls_preserve_stored_values() {
    let store = Arc::new(MemoryEventStore::new());
    let cancelled = AtomicBool::new(false);

    let mut with_details = event("Y", Some("R42"));
    with_details.description = Some("Original description".to_string());
    with_details.website = Some("https://example.com/".to_string());
    with_details
        .event_details
        .insert("stored_only".to_string(), json!("kept"));
    with_details
        .event_details
        .insert("shared".to_string(), json!("old"));
    Upserter::new(store.clone())
        .upsert_batch(&[with_details], &cancelled)
        .await
        .unwrap();

    let mut sparse = event("Y", Some("R42"));
    sparse.event_details.insert("shared".to_string(), json!("new"));
    Upserter::new(store.clone())
        .upsert_batch(&[sparse], &cancelled)
        .await
        .unwrap();

    let row = &store.snapshot()[0];
    assert_eq!(row.event.description.as_deref(), Some("Original description"));
    assert_eq!(row.event.website.as_deref(), Some("https://example.com/"));
    assert_eq!(row.event.event_details["stored_only"], json!("kept"));
    assert_eq!(row.event.event_details["shared"], json!("new"));
}

#[tokio::test]
async fn update_leaves_geocoding_attempted_alone() {
    let store = Arc::new(MemoryEventStore::new());
    let cancelled = AtomicBool::new(false);

    // Inserts always land un-geocoded, whatever the incoming value claims.
    let mut seeded = event("Y", Some("R42"));
    seeded.geocoding_attempted = true;
    Upserter::new(store.clone())
        .upsert_batch(&[seeded], &cancelled)
        .await
        .unwrap();
    assert!(!store.snapshot()[0].event.geocoding_attempted);

    // Updates never write the flag either.
    let mut incoming = event("Y", Some("R42"));
    incoming.geocoding_attempted = true;
    Upserter::new(store.clone())
        .upsert_batch(&[incoming], &cancelled)
        .await
        .unwrap();
    assert!(!store.snapshot()[0].event.geocoding_attempted);
}

#[tokio::test]
async fn duplicate_within_batch_is_skipped() {
    let store = Arc::new(MemoryEventStore::new());
    let cancelled = AtomicBool::new(false);

    let batch = vec![event("Y", Some("R42")), event("Y", Some("R42"))];
    let mut upserter = Upserter::new(store.clone());
    upserter.upsert_batch(&batch, &cancelled).await.unwrap();

    assert_eq!(upserter.counters.added, 1);
    assert_eq!(upserter.counters.skipped, 1);
    assert_eq!(store.len(), 1);
}

#[tokio::test]
async fn cancellation_aborts_the_batch() {
    let store = Arc::new(MemoryEventStore::new());
    let mut upserter = Upserter::new(store.clone());

    let err = upserter
        .upsert_batch(&[event("Y", None)], &AtomicBool::new(true))
        .await
        .unwrap_err();
    assert!(matches!(err, ridecal_common::IngestError::Cancelled));
    assert!(store.is_empty());
}
