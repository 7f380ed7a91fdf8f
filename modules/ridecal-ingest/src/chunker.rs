//! Row-boundary HTML partitioning.
//!
//! Splits cleaned HTML into chunks that each hold whole event rows and stay
//! near the target byte size. Rows are never split; a single oversized row
//! becomes its own chunk. Concatenating the rows of all chunks, in order,
//! reproduces the input row sequence.

use scraper::{Html, Selector};
use tracing::info;

use ridecal_common::{IngestError, Result};

/// Stable wrapper so extraction sees a uniform container in every chunk.
const CHUNK_OPEN: &str = "<div class=\"calendar-content\">";
const CHUNK_CLOSE: &str = "</div>";

pub fn chunk_rows(cleaned_html: &str, row_selector: &str, target_size: usize) -> Result<Vec<String>> {
    let selector = Selector::parse(row_selector)
        .map_err(|e| IngestError::Config(format!("row selector {row_selector:?}: {e}")))?;

    let fragment = Html::parse_fragment(cleaned_html);
    let rows: Vec<String> = fragment.select(&selector).map(|el| el.html()).collect();

    let mut chunks = Vec::new();
    let mut current = String::new();

    for row in rows {
        if !current.is_empty() && current.len() + row.len() > target_size {
            chunks.push(seal(&current));
            current.clear();
        }
        current.push_str(&row);
    }
    if !current.is_empty() {
        chunks.push(seal(&current));
    }

    info!(chunks = chunks.len(), target_size, "Partitioned rows into chunks");
    Ok(chunks)
}

fn seal(rows: &str) -> String {
    format!("{CHUNK_OPEN}{rows}{CHUNK_CLOSE}")
}
