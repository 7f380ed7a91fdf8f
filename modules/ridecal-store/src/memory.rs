//! In-memory event store for tests.
//!
//! Mirrors the Postgres merge contract — non-null overwrite, shallow
//! `event_details` merge, `created_at` fixed at insert, untouched
//! `geocoding_attempted` on update — so upsert tests exercise the same
//! semantics without a database.

use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use ridecal_common::{CanonicalEvent, Source};

use crate::error::Result;
use crate::store::EventStore;

#[derive(Debug, Clone)]
pub struct StoredRow {
    pub id: i64,
    pub event: CanonicalEvent,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Default)]
pub struct MemoryEventStore {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    next_id: i64,
    rows: Vec<StoredRow>,
}

impl MemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all rows, in insertion order.
    pub fn snapshot(&self) -> Vec<StoredRow> {
        self.inner.lock().expect("store lock").rows.clone()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().expect("store lock").rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, id: i64) -> Option<StoredRow> {
        self.inner
            .lock()
            .expect("store lock")
            .rows
            .iter()
            .find(|r| r.id == id)
            .cloned()
    }
}

/// Apply update-merge semantics onto a stored event.
fn merge(stored: &mut CanonicalEvent, incoming: &CanonicalEvent) {
    fn keep_some(target: &mut Option<String>, incoming: &Option<String>) {
        if incoming.is_some() {
            *target = incoming.clone();
        }
    }

    stored.name = incoming.name.clone();
    stored.location = incoming.location.clone();
    stored.date_start = incoming.date_start;
    stored.date_end = incoming.date_end;

    keep_some(&mut stored.description, &incoming.description);
    keep_some(&mut stored.region, &incoming.region);
    keep_some(&mut stored.city, &incoming.city);
    keep_some(&mut stored.state, &incoming.state);
    keep_some(&mut stored.country, &incoming.country);
    keep_some(&mut stored.ride_manager, &incoming.ride_manager);
    keep_some(&mut stored.manager_email, &incoming.manager_email);
    keep_some(&mut stored.manager_phone, &incoming.manager_phone);
    keep_some(&mut stored.website, &incoming.website);
    keep_some(&mut stored.flyer_url, &incoming.flyer_url);
    keep_some(&mut stored.map_link, &incoming.map_link);
    keep_some(&mut stored.directions, &incoming.directions);
    keep_some(&mut stored.notes, &incoming.notes);
    keep_some(&mut stored.event_type, &incoming.event_type);
    keep_some(&mut stored.external_id, &incoming.external_id);
    keep_some(&mut stored.ride_id, &incoming.ride_id);

    if incoming.latitude.is_some() {
        stored.latitude = incoming.latitude;
    }
    if incoming.longitude.is_some() {
        stored.longitude = incoming.longitude;
    }

    stored.distances = incoming.distances.clone();
    stored.judges = incoming.judges.clone();
    stored.ride_manager_contact = incoming.ride_manager_contact.clone();
    stored.has_intro_ride = incoming.has_intro_ride;
    stored.is_canceled = incoming.is_canceled;
    stored.is_verified = incoming.is_verified;
    stored.is_multi_day_event = incoming.is_multi_day_event;
    stored.is_pioneer_ride = incoming.is_pioneer_ride;
    stored.ride_days = incoming.ride_days;

    // Shallow merge: incoming keys win, stored-only keys survive.
    for (key, value) in &incoming.event_details {
        stored.event_details.insert(key.clone(), value.clone());
    }

    // geocoding_attempted deliberately untouched.
}

#[async_trait]
impl EventStore for MemoryEventStore {
    async fn find_by_ride_id(&self, source: Source, ride_id: &str) -> Result<Option<i64>> {
        let inner = self.inner.lock().expect("store lock");
        Ok(inner
            .rows
            .iter()
            .find(|r| r.event.source == source && r.event.ride_id.as_deref() == Some(ride_id))
            .map(|r| r.id))
    }

    async fn find_by_name_and_date(
        &self,
        source: Source,
        name: &str,
        date_start: NaiveDate,
    ) -> Result<Option<i64>> {
        let inner = self.inner.lock().expect("store lock");
        Ok(inner
            .rows
            .iter()
            .find(|r| {
                r.event.source == source
                    && r.event.name == name
                    && r.event.date_start.date_naive() == date_start
            })
            .map(|r| r.id))
    }

    async fn insert(&self, event: &CanonicalEvent) -> Result<i64> {
        let mut inner = self.inner.lock().expect("store lock");
        inner.next_id += 1;
        let id = inner.next_id;
        let now = Utc::now();

        let mut stored = event.clone();
        stored.geocoding_attempted = false;
        inner.rows.push(StoredRow {
            id,
            event: stored,
            created_at: now,
            updated_at: now,
        });

        Ok(id)
    }

    async fn update(&self, id: i64, event: &CanonicalEvent) -> Result<()> {
        let mut inner = self.inner.lock().expect("store lock");
        if let Some(row) = inner.rows.iter_mut().find(|r| r.id == id) {
            merge(&mut row.event, event);
            row.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn count_by_source(&self, source: Source) -> Result<i64> {
        let inner = self.inner.lock().expect("store lock");
        Ok(inner.rows.iter().filter(|r| r.event.source == source).count() as i64)
    }
}
