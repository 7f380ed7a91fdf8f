//! Chunk extraction.
//!
//! The structural strategy (driver selectors) always runs; the AI-assisted
//! strategy is an optional fallback for chunks where the structural pass
//! produced nothing — it never overrides a non-empty structural result.
//! Chunks may fan out up to `extractor_parallelism`, but results are
//! gathered in input order before validation.

pub mod ai;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};

use ridecal_common::{IngestError, RawRow, Result};

use crate::sources::SourceDriver;

pub use ai::AiExtractor;

#[derive(Debug, Default, Clone, Serialize)]
pub struct ExtractionCounters {
    pub chunks_processed: u32,
    pub events_extracted: u32,
    pub extraction_errors: u32,
    pub ai_fallbacks: u32,
}

/// Extract every chunk, preserving chunk order in the output.
pub async fn extract_all(
    chunks: &[String],
    driver: Arc<dyn SourceDriver>,
    ai: Option<&AiExtractor>,
    parallelism: usize,
    cancelled: &AtomicBool,
) -> Result<(Vec<RawRow>, ExtractionCounters)> {
    let mut counters = ExtractionCounters::default();
    let mut per_chunk: Vec<Vec<RawRow>> = Vec::with_capacity(chunks.len());

    let parallelism = parallelism.max(1);
    for window in chunks.chunks(parallelism) {
        if cancelled.load(Ordering::Relaxed) {
            return Err(IngestError::Cancelled);
        }

        let results = futures::future::join_all(
            window
                .iter()
                .map(|chunk| extract_chunk(chunk, driver.as_ref(), ai)),
        )
        .await;

        for outcome in results {
            counters.chunks_processed += 1;
            match outcome {
                Ok(ChunkOutcome { rows, used_ai }) => {
                    counters.events_extracted += rows.len() as u32;
                    if used_ai {
                        counters.ai_fallbacks += 1;
                    }
                    per_chunk.push(rows);
                }
                Err(e) => {
                    warn!(error = %e, "Chunk extraction failed");
                    counters.extraction_errors += 1;
                    per_chunk.push(Vec::new());
                }
            }
        }
    }

    // A zero-event outcome is judged by the orchestrator (it is fatal for
    // the run) so the counters still make it into the metrics document.
    let rows: Vec<RawRow> = per_chunk.into_iter().flatten().collect();

    info!(
        chunks = counters.chunks_processed,
        events = counters.events_extracted,
        errors = counters.extraction_errors,
        ai_fallbacks = counters.ai_fallbacks,
        "Extraction complete"
    );
    Ok((rows, counters))
}

struct ChunkOutcome {
    rows: Vec<RawRow>,
    used_ai: bool,
}

async fn extract_chunk(
    chunk: &str,
    driver: &dyn SourceDriver,
    ai: Option<&AiExtractor>,
) -> Result<ChunkOutcome> {
    let structural = driver.extract_rows(chunk)?;
    if !structural.is_empty() {
        return Ok(ChunkOutcome {
            rows: structural,
            used_ai: false,
        });
    }

    // Structural came up empty; try the AI path if it is enabled.
    let Some(ai) = ai else {
        return Ok(ChunkOutcome {
            rows: structural,
            used_ai: false,
        });
    };

    match ai.extract(chunk).await {
        Ok(rows) => Ok(ChunkOutcome {
            rows,
            used_ai: true,
        }),
        Err(e) => {
            // AI failures fall back to the (empty) structural result.
            warn!(error = %e, "AI extraction failed, keeping structural result");
            Ok(ChunkOutcome {
                rows: structural,
                used_ai: false,
            })
        }
    }
}
