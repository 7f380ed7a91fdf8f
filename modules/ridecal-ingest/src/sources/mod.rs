//! Source drivers.
//!
//! A [`SourceDriver`] bundles everything source-specific — endpoints, the
//! calendar-row selector, and structural field extraction — so the
//! surrounding pipeline stays source-agnostic. Drivers register here;
//! the `Source` enum also carries identities (PNER, Facebook) whose
//! drivers have not landed yet.

pub mod aerc;

use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use async_trait::async_trait;

use ridecal_common::{Config, IngestError, RawRow, Result, Source};

use crate::cache::Cache;
use crate::fetcher::Fetcher;

#[async_trait]
pub trait SourceDriver: Send + Sync {
    fn source(&self) -> Source;

    /// CSS selector matching one calendar row. The cleaner and chunker
    /// both partition on it.
    fn row_selector(&self) -> &str;

    /// Fetch the raw calendar payload, consulting the cache.
    async fn fetch_payload(
        &self,
        fetcher: &mut Fetcher,
        cache: &mut Cache,
        cancelled: &AtomicBool,
    ) -> Result<String>;

    /// Structural extraction: one chunk of cleaned HTML to raw field maps.
    fn extract_rows(&self, chunk: &str) -> Result<Vec<RawRow>>;
}

/// All drivers that can currently run.
pub fn registry(config: &Config) -> Vec<Arc<dyn SourceDriver>> {
    vec![Arc::new(aerc::AercDriver::new(config))]
}

/// Resolve CLI source identifiers to drivers. Empty input means all.
pub fn resolve(config: &Config, names: &[String]) -> Result<Vec<Arc<dyn SourceDriver>>> {
    let all = registry(config);
    if names.is_empty() {
        return Ok(all);
    }

    let mut drivers = Vec::new();
    for name in names {
        let source: Source = name
            .parse()
            .map_err(|e: String| IngestError::Config(e))?;
        let driver = all
            .iter()
            .find(|d| d.source() == source)
            .cloned()
            .ok_or_else(|| {
                IngestError::Config(format!("no driver registered for source {source}"))
            })?;
        drivers.push(driver);
    }
    Ok(drivers)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_defaults_to_all_registered() {
        let config = Config::default();
        let drivers = resolve(&config, &[]).unwrap();
        assert_eq!(drivers.len(), 1);
        assert_eq!(drivers[0].source(), Source::Aerc);
    }

    #[test]
    fn resolve_rejects_unknown_and_unregistered() {
        let config = Config::default();
        assert!(resolve(&config, &["eventbrite".to_string()]).is_err());
        // Known source, no driver yet.
        assert!(resolve(&config, &["pner".to_string()]).is_err());
    }
}
