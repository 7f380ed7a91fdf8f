//! Idempotent reconciliation of transformed events against the store.
//!
//! Per event: look up by `(source, ride_id)` first, then by
//! `(source, name, date_start::date)`; update a match, insert otherwise.
//! A natural key that resolves to a row already written this run is
//! skipped rather than written twice. Row failures are counted and the
//! batch continues.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, warn};

use ridecal_common::{CanonicalEvent, IngestError, Result};
use ridecal_store::EventStore;

#[derive(Debug, Default, Clone, Serialize)]
pub struct UpsertCounters {
    pub added: u32,
    pub updated: u32,
    pub skipped: u32,
    pub errors: u32,
}

pub struct Upserter {
    store: Arc<dyn EventStore>,
    pub counters: UpsertCounters,
}

impl Upserter {
    pub fn new(store: Arc<dyn EventStore>) -> Self {
        Self {
            store,
            counters: UpsertCounters::default(),
        }
    }

    /// Reconcile a batch in order. Only cancellation aborts the batch.
    pub async fn upsert_batch(
        &mut self,
        events: &[CanonicalEvent],
        cancelled: &AtomicBool,
    ) -> Result<()> {
        let mut touched: HashSet<i64> = HashSet::new();

        for event in events {
            if cancelled.load(Ordering::Relaxed) {
                return Err(IngestError::Cancelled);
            }

            match self.resolve(event).await {
                Ok(Some(id)) => {
                    if !touched.insert(id) {
                        debug!(name = %event.name, id, "Duplicate within batch, skipping");
                        self.counters.skipped += 1;
                        continue;
                    }
                    match self.store.update(id, event).await {
                        Ok(()) => self.counters.updated += 1,
                        Err(e) => {
                            warn!(name = %event.name, id, error = %e, "Update failed");
                            self.counters.errors += 1;
                        }
                    }
                }
                Ok(None) => match self.store.insert(event).await {
                    Ok(id) => {
                        touched.insert(id);
                        self.counters.added += 1;
                    }
                    Err(e) => {
                        warn!(name = %event.name, error = %e, "Insert failed");
                        self.counters.errors += 1;
                    }
                },
                Err(e) => {
                    warn!(name = %event.name, error = %e, "Lookup failed");
                    self.counters.errors += 1;
                }
            }
        }

        Ok(())
    }

    /// Existing row id for an event, ride_id path first.
    async fn resolve(&self, event: &CanonicalEvent) -> ridecal_store::Result<Option<i64>> {
        if let Some(ride_id) = &event.ride_id {
            if let Some(id) = self.store.find_by_ride_id(event.source, ride_id).await? {
                return Ok(Some(id));
            }
        }
        self.store
            .find_by_name_and_date(event.source, &event.name, event.date_start.date_naive())
            .await
    }
}
