//! Per-run metrics.
//!
//! One mutable aggregate per run, fed by every component's counters, then
//! frozen to JSON under `logs/metrics/<source>_<timestamp>.json` and logged
//! as a textual summary. The JSON is written on success and failure paths
//! alike.

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::warn;

use ridecal_common::{IngestError, Result, Source};

use crate::cache::CacheCounters;
use crate::extract::ExtractionCounters;
use crate::fetcher::FetcherCounters;
use crate::transform::TransformCounters;
use crate::upserter::UpsertCounters;

/// One opportunistic memory reading, taken at a stage boundary.
#[derive(Debug, Clone, Serialize)]
pub struct MemorySample {
    pub sampled_at: DateTime<Utc>,
    pub resident_bytes: u64,
    pub virtual_bytes: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunMetrics {
    pub run_id: String,
    pub source: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub duration_seconds: Option<f64>,
    /// Last stage the run reached.
    pub stage: String,
    pub cancelled: bool,
    pub error: Option<String>,

    // Fetcher
    pub requests: u32,
    pub http_errors: u32,
    pub retries: u32,

    // Cache
    pub cache: CacheCounters,

    // Cleaner
    pub rows_found: u32,

    // Extractor
    pub chunks_processed: u32,
    pub events_extracted: u32,
    pub extraction_errors: u32,
    pub ai_fallbacks: u32,

    // Validator
    pub events_valid: u32,
    pub validation_errors_by_kind: BTreeMap<String, u32>,

    // Transformer
    pub events_transformed: u32,
    pub transform_errors: u32,

    // Upserter
    pub added: u32,
    pub updated: u32,
    pub skipped: u32,
    pub upsert_errors: u32,

    // Verification
    pub store_count: Option<i64>,
    /// events_valid / events_extracted, percent.
    pub success_rate: f64,
    /// events_valid / rows_found, percent.
    pub processing_rate: f64,

    pub memory_samples: Vec<MemorySample>,
}

impl RunMetrics {
    pub fn new(run_id: String, source: Source) -> Self {
        Self {
            run_id,
            source: source.as_str().to_string(),
            started_at: Utc::now(),
            finished_at: None,
            duration_seconds: None,
            stage: "INIT".to_string(),
            cancelled: false,
            error: None,
            requests: 0,
            http_errors: 0,
            retries: 0,
            cache: CacheCounters::default(),
            rows_found: 0,
            chunks_processed: 0,
            events_extracted: 0,
            extraction_errors: 0,
            ai_fallbacks: 0,
            events_valid: 0,
            validation_errors_by_kind: BTreeMap::new(),
            events_transformed: 0,
            transform_errors: 0,
            added: 0,
            updated: 0,
            skipped: 0,
            upsert_errors: 0,
            store_count: None,
            success_rate: 0.0,
            processing_rate: 0.0,
            memory_samples: Vec::new(),
        }
    }

    /// Enter a stage: record it and take a memory sample.
    pub fn enter_stage(&mut self, stage: &str) {
        self.stage = stage.to_string();
        self.sample_memory();
    }

    pub fn merge_fetcher(&mut self, counters: &FetcherCounters) {
        self.requests += counters.requests;
        self.http_errors += counters.errors;
        self.retries += counters.retries;
    }

    pub fn merge_cache(&mut self, counters: &CacheCounters) {
        self.cache = counters.clone();
    }

    pub fn merge_extraction(&mut self, counters: &ExtractionCounters) {
        self.chunks_processed = counters.chunks_processed;
        self.events_extracted = counters.events_extracted;
        self.extraction_errors = counters.extraction_errors;
        self.ai_fallbacks = counters.ai_fallbacks;
    }

    pub fn merge_transform(&mut self, counters: &TransformCounters) {
        self.events_transformed = counters.transformed;
        self.transform_errors = counters.errors;
    }

    pub fn merge_upsert(&mut self, counters: &UpsertCounters) {
        self.added = counters.added;
        self.updated = counters.updated;
        self.skipped = counters.skipped;
        self.upsert_errors = counters.errors;
    }

    /// Freeze timing and derived rates.
    pub fn finish(&mut self) {
        let finished = Utc::now();
        self.finished_at = Some(finished);
        self.duration_seconds =
            Some((finished - self.started_at).num_milliseconds() as f64 / 1000.0);
        if self.events_extracted > 0 {
            self.success_rate = self.events_valid as f64 / self.events_extracted as f64 * 100.0;
        }
        if self.rows_found > 0 {
            self.processing_rate = self.events_valid as f64 / self.rows_found as f64 * 100.0;
        }
    }

    /// Best-effort resident/virtual reading from /proc/self/statm.
    pub fn sample_memory(&mut self) {
        let Some((resident, virtual_)) = read_statm() else {
            return;
        };
        self.memory_samples.push(MemorySample {
            sampled_at: Utc::now(),
            resident_bytes: resident,
            virtual_bytes: virtual_,
        });
    }

    /// Write the metrics JSON atomically. Returns the file path.
    pub fn save(&self, metrics_dir: &str) -> Result<PathBuf> {
        let dir = PathBuf::from(metrics_dir);
        fs::create_dir_all(&dir)
            .map_err(|e| IngestError::Other(anyhow::anyhow!("metrics dir: {e}")))?;

        let filename = format!(
            "{}_{}.json",
            self.source.to_lowercase(),
            self.started_at.format("%Y%m%d_%H%M%S")
        );
        let path = dir.join(filename);

        let encoded = serde_json::to_string_pretty(self)
            .map_err(|e| IngestError::Other(anyhow::anyhow!("metrics encode: {e}")))?;

        let mut tmp = tempfile::NamedTempFile::new_in(&dir)
            .map_err(|e| IngestError::Other(anyhow::anyhow!("metrics temp file: {e}")))?;
        tmp.write_all(encoded.as_bytes())
            .map_err(|e| IngestError::Other(anyhow::anyhow!("metrics write: {e}")))?;
        tmp.persist(&path)
            .map_err(|e| IngestError::Other(anyhow::anyhow!("metrics persist: {e}")))?;

        Ok(path)
    }
}

/// Parse resident and virtual bytes out of /proc/self/statm.
fn read_statm() -> Option<(u64, u64)> {
    const PAGE_SIZE: u64 = 4096;
    let statm = fs::read_to_string("/proc/self/statm").ok()?;
    let mut fields = statm.split_whitespace();
    let virtual_pages: u64 = fields.next()?.parse().ok()?;
    let resident_pages: u64 = fields.next()?.parse().ok()?;
    Some((resident_pages * PAGE_SIZE, virtual_pages * PAGE_SIZE))
}

impl std::fmt::Display for RunMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "\n=== Ingest Run Complete ({}) ===", self.source)?;
        writeln!(f, "Stage reached:      {}", self.stage)?;
        if let Some(duration) = self.duration_seconds {
            writeln!(f, "Duration:           {duration:.2}s")?;
        }
        writeln!(
            f,
            "HTTP requests:      {} (errors: {}, retries: {})",
            self.requests, self.http_errors, self.retries
        )?;
        writeln!(
            f,
            "Cache:              {} hits, {} misses, {} expired",
            self.cache.hits, self.cache.misses, self.cache.expired
        )?;
        writeln!(f, "Calendar rows:      {}", self.rows_found)?;
        writeln!(
            f,
            "Chunks processed:   {} (errors: {})",
            self.chunks_processed, self.extraction_errors
        )?;
        writeln!(f, "Events extracted:   {}", self.events_extracted)?;
        writeln!(f, "Events valid:       {}", self.events_valid)?;
        if !self.validation_errors_by_kind.is_empty() {
            for (kind, count) in &self.validation_errors_by_kind {
                writeln!(f, "  dropped ({kind}): {count}")?;
            }
        }
        writeln!(
            f,
            "Events transformed: {} (errors: {})",
            self.events_transformed, self.transform_errors
        )?;
        writeln!(f, "Events added:       {}", self.added)?;
        writeln!(f, "Events updated:     {}", self.updated)?;
        writeln!(f, "Events skipped:     {}", self.skipped)?;
        if self.upsert_errors > 0 {
            writeln!(f, "Upsert errors:      {}", self.upsert_errors)?;
        }
        if let Some(count) = self.store_count {
            writeln!(f, "Store total:        {count}")?;
        }
        writeln!(f, "Validation rate:    {:.1}%", self.success_rate)?;
        writeln!(f, "Processing rate:    {:.1}%", self.processing_rate)?;
        if self.cancelled {
            writeln!(f, "Cancelled:          true")?;
        }
        if let Some(error) = &self.error {
            writeln!(f, "Error:              {error}")?;
        }
        if let Some(peak) = self
            .memory_samples
            .iter()
            .map(|s| s.resident_bytes)
            .max()
        {
            writeln!(f, "Peak resident:      {:.1} MB", peak as f64 / 1_048_576.0)?;
        }
        Ok(())
    }
}

/// Warn-only save helper for finalisation paths.
pub fn save_best_effort(metrics: &RunMetrics, metrics_dir: &str) {
    match metrics.save(metrics_dir) {
        Ok(path) => tracing::info!(path = %path.display(), "Metrics saved"),
        Err(e) => warn!(error = %e, "Failed to save metrics"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finish_computes_rates() {
        let mut metrics = RunMetrics::new("run-1".to_string(), Source::Aerc);
        metrics.rows_found = 100;
        metrics.events_extracted = 80;
        metrics.events_valid = 60;
        metrics.finish();

        assert_eq!(metrics.success_rate, 75.0);
        assert_eq!(metrics.processing_rate, 60.0);
        assert!(metrics.duration_seconds.is_some());
    }

    #[test]
    fn save_writes_run_dated_json() {
        let dir = tempfile::tempdir().unwrap();
        let mut metrics = RunMetrics::new("run-1".to_string(), Source::Aerc);
        metrics.finish();

        let path = metrics.save(dir.path().to_str().unwrap()).unwrap();
        assert!(path.file_name().unwrap().to_str().unwrap().starts_with("aerc_"));

        let raw = fs::read_to_string(path).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(parsed["source"], "AERC");
        assert_eq!(parsed["run_id"], "run-1");
    }

    #[test]
    fn zero_denominators_leave_rates_at_zero() {
        let mut metrics = RunMetrics::new("run-1".to_string(), Source::Aerc);
        metrics.finish();
        assert_eq!(metrics.success_rate, 0.0);
        assert_eq!(metrics.processing_rate, 0.0);
    }
}
