//! Run orchestration.
//!
//! Drives one source through the staged state machine
//! `INIT → FETCH → CLEAN → CHUNK → EXTRACT → VALIDATE → TRANSFORM →
//! UPSERT → VERIFY → DONE`, dropping to `FAIL` on the first stage error.
//! Cancellation is checked between stages; the per-run timeout flips the
//! same flag. Metrics are finalised and written on every exit path.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{error, info, warn};
use uuid::Uuid;

use ridecal_common::{Config, IngestError, Result};
use ridecal_store::EventStore;

use crate::cache::Cache;
use crate::chunker;
use crate::cleaner::Cleaner;
use crate::extract::{self, AiExtractor};
use crate::fetcher::Fetcher;
use crate::metrics::{save_best_effort, RunMetrics};
use crate::sources::SourceDriver;
use crate::transform::Transformer;
use crate::upserter::Upserter;
use crate::validator::Validator;

/// Extraction loss beyond this share of found rows logs at ERROR.
const EXTRACTION_LOSS_ERROR_PCT: f64 = 10.0;

pub(crate) fn check_cancelled(cancelled: &AtomicBool) -> Result<()> {
    if cancelled.load(Ordering::Relaxed) {
        info!("Ingest run cancelled");
        return Err(IngestError::Cancelled);
    }
    Ok(())
}

/// One source's pipeline. Owns its fetcher, cache subtree, and metrics;
/// shares only the event store with concurrently running pipelines.
pub struct Pipeline {
    config: Config,
    driver: Arc<dyn SourceDriver>,
    store: Arc<dyn EventStore>,
    cancelled: Arc<AtomicBool>,
}

impl Pipeline {
    pub fn new(config: Config, driver: Arc<dyn SourceDriver>, store: Arc<dyn EventStore>) -> Self {
        Self {
            config,
            driver,
            store,
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Handle for requesting cancellation from outside the run.
    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        self.cancelled.clone()
    }

    /// Execute a full run. The metrics JSON is written whether the run
    /// succeeds, fails, or times out.
    pub async fn run(&self) -> Result<RunMetrics> {
        let run_id = Uuid::new_v4().to_string();
        let source = self.driver.source();
        info!(%source, run_id = %run_id, "Starting ingest run");

        let mut metrics = RunMetrics::new(run_id, source);

        let outcome = tokio::time::timeout(
            self.config.run_timeout_duration(),
            self.run_stages(&mut metrics),
        )
        .await;

        let result = match outcome {
            Ok(Ok(())) => {
                metrics.enter_stage("DONE");
                Ok(())
            }
            Ok(Err(e)) => {
                if matches!(e, IngestError::Cancelled) {
                    metrics.cancelled = true;
                }
                metrics.error = Some(e.to_string());
                metrics.enter_stage("FAIL");
                Err(e)
            }
            Err(_) => {
                self.cancelled.store(true, Ordering::Relaxed);
                warn!(%source, "Run timeout exceeded, cancelling");
                metrics.cancelled = true;
                metrics.error = Some(format!(
                    "run timeout ({}s) exceeded",
                    self.config.run_timeout
                ));
                metrics.enter_stage("FAIL");
                Err(IngestError::Cancelled)
            }
        };

        metrics.finish();
        save_best_effort(&metrics, &self.config.metrics_dir);
        info!("{metrics}");

        result.map(|()| metrics)
    }

    async fn run_stages(&self, metrics: &mut RunMetrics) -> Result<()> {
        let source = self.driver.source();

        // FETCH
        metrics.enter_stage("FETCH");
        check_cancelled(&self.cancelled)?;
        let mut fetcher = Fetcher::new(&self.config)?;
        let mut cache = Cache::new(&self.config, source);
        let fetch_result = self
            .driver
            .fetch_payload(&mut fetcher, &mut cache, &self.cancelled)
            .await;
        metrics.merge_fetcher(&fetcher.counters);
        metrics.merge_cache(&cache.counters);
        let payload = fetch_result?;

        // CLEAN
        metrics.enter_stage("CLEAN");
        check_cancelled(&self.cancelled)?;
        let mut cleaner = Cleaner::new();
        let clean_result = cleaner.clean(&payload, self.driver.row_selector());
        metrics.rows_found = cleaner.rows_found;
        let cleaned = clean_result?;

        // CHUNK
        metrics.enter_stage("CHUNK");
        check_cancelled(&self.cancelled)?;
        let chunks = chunker::chunk_rows(
            &cleaned,
            self.driver.row_selector(),
            self.config.chunk_size(),
        )?;

        // EXTRACT
        metrics.enter_stage("EXTRACT");
        check_cancelled(&self.cancelled)?;
        let ai = (self.config.use_ai_extraction && !self.config.anthropic_api_key.is_empty())
            .then(|| AiExtractor::new(&self.config.anthropic_api_key));
        let (rows, extraction) = extract::extract_all(
            &chunks,
            self.driver.clone(),
            ai.as_ref(),
            self.config.extractor_parallelism,
            &self.cancelled,
        )
        .await?;
        metrics.merge_extraction(&extraction);
        if rows.is_empty() && !chunks.is_empty() {
            return Err(IngestError::Extraction(format!(
                "{} chunks yielded zero events ({} errors)",
                extraction.chunks_processed, extraction.extraction_errors
            )));
        }

        // VALIDATE
        metrics.enter_stage("VALIDATE");
        check_cancelled(&self.cancelled)?;
        let mut validator = Validator::new();
        let valid = validator.validate(rows);
        metrics.events_valid = valid.len() as u32;
        metrics.validation_errors_by_kind = validator.errors_by_name();

        // TRANSFORM
        metrics.enter_stage("TRANSFORM");
        check_cancelled(&self.cancelled)?;
        let mut transformer = Transformer::new(source);
        let events = transformer.transform_all(valid);
        metrics.merge_transform(&transformer.counters);

        // UPSERT
        metrics.enter_stage("UPSERT");
        check_cancelled(&self.cancelled)?;
        let mut upserter = Upserter::new(self.store.clone());
        let upsert_result = upserter.upsert_batch(&events, &self.cancelled).await;
        metrics.merge_upsert(&upserter.counters);
        upsert_result?;

        // VERIFY
        metrics.enter_stage("VERIFY");
        self.verify(metrics).await;

        Ok(())
    }

    /// Compare per-stage counts and the post-run store count. Discrepancies
    /// are logged, never fatal.
    async fn verify(&self, metrics: &mut RunMetrics) {
        let source = self.driver.source();

        match self.store.count_by_source(source).await {
            Ok(count) => metrics.store_count = Some(count),
            Err(e) => warn!(error = %e, "Failed to count stored events"),
        }

        if metrics.rows_found > metrics.events_extracted {
            let lost = metrics.rows_found - metrics.events_extracted;
            let pct = lost as f64 / metrics.rows_found as f64 * 100.0;
            if pct > EXTRACTION_LOSS_ERROR_PCT {
                error!(lost, pct, "Significant extraction loss");
            } else {
                warn!(lost, pct, "Extraction loss");
            }
        }

        if metrics.events_extracted > metrics.events_valid {
            let lost = metrics.events_extracted - metrics.events_valid;
            let pct = lost as f64 / metrics.events_extracted as f64 * 100.0;
            warn!(lost, pct, "Validation loss");
        }

        let written = metrics.added + metrics.updated + metrics.skipped;
        if written != metrics.events_transformed {
            warn!(
                transformed = metrics.events_transformed,
                written, "Upsert discrepancy"
            );
        }

        if let Some(count) = metrics.store_count {
            if count < metrics.added as i64 {
                warn!(
                    store_count = count,
                    added = metrics.added,
                    "Store count below events added this run"
                );
            }
        }
    }
}
