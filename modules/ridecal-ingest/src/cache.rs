//! File-based TTL cache for fetched payloads.
//!
//! Entries are JSON files named by the 128-bit digest of the caller's key,
//! stored under `cache/<source>/`. Writes go through a temp file and an
//! atomic rename so a concurrent reader never observes a partial entry.

use std::fs;
use std::io::Write;
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use ridecal_common::{content_hash, Config, IngestError, Result, Source};

#[derive(Debug, Serialize, Deserialize)]
struct CacheEntry {
    /// Unix seconds at write time.
    stored_at: u64,
    payload: String,
}

#[derive(Debug, Default, Clone, Serialize)]
pub struct CacheCounters {
    pub hits: u32,
    pub misses: u32,
    pub expired: u32,
    pub errors: u32,
}

/// Content-keyed, TTL-bounded payload cache for one source.
pub struct Cache {
    dir: PathBuf,
    ttl: u64,
    refresh: bool,
    pub counters: CacheCounters,
}

impl Cache {
    pub fn new(config: &Config, source: Source) -> Self {
        let dir = PathBuf::from(&config.cache_dir).join(source.as_str().to_lowercase());
        Self {
            dir,
            ttl: config.cache_ttl,
            refresh: config.refresh_cache,
            counters: CacheCounters::default(),
        }
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", content_hash(key)))
    }

    fn now() -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0)
    }

    /// Cached payload for a key, honouring TTL and the refresh flag.
    /// Expired entries are removed on read. Read errors count and miss.
    pub fn get(&mut self, key: &str) -> Option<String> {
        if self.refresh {
            self.counters.misses += 1;
            return None;
        }

        let path = self.entry_path(key);
        if !path.exists() {
            self.counters.misses += 1;
            return None;
        }

        let entry: CacheEntry = match fs::read_to_string(&path)
            .map_err(anyhow::Error::from)
            .and_then(|raw| serde_json::from_str(&raw).map_err(anyhow::Error::from))
        {
            Ok(entry) => entry,
            Err(e) => {
                warn!(key, error = %e, "Cache read failed");
                self.counters.errors += 1;
                self.counters.misses += 1;
                return None;
            }
        };

        if Self::now().saturating_sub(entry.stored_at) > self.ttl {
            debug!(key, "Cache entry expired");
            self.counters.expired += 1;
            let _ = fs::remove_file(&path);
            return None;
        }

        self.counters.hits += 1;
        Some(entry.payload)
    }

    /// Write a payload atomically. Failures surface as `CacheWrite`.
    pub fn set(&mut self, key: &str, payload: &str) -> Result<()> {
        fs::create_dir_all(&self.dir)
            .map_err(|e| IngestError::CacheWrite(format!("create {}: {e}", self.dir.display())))?;

        let entry = CacheEntry {
            stored_at: Self::now(),
            payload: payload.to_string(),
        };
        let encoded = serde_json::to_string(&entry)
            .map_err(|e| IngestError::CacheWrite(e.to_string()))?;

        let mut tmp = tempfile::NamedTempFile::new_in(&self.dir)
            .map_err(|e| IngestError::CacheWrite(e.to_string()))?;
        tmp.write_all(encoded.as_bytes())
            .map_err(|e| IngestError::CacheWrite(e.to_string()))?;
        tmp.persist(self.entry_path(key))
            .map_err(|e| IngestError::CacheWrite(e.to_string()))?;

        Ok(())
    }

    /// Remove every entry for this source.
    pub fn clear(&mut self) -> Result<()> {
        if !self.dir.exists() {
            return Ok(());
        }
        let entries = fs::read_dir(&self.dir)
            .map_err(|e| IngestError::CacheWrite(format!("clear: {e}")))?;
        for entry in entries.flatten() {
            if entry.path().extension().is_some_and(|ext| ext == "json") {
                fs::remove_file(entry.path())
                    .map_err(|e| IngestError::CacheWrite(format!("clear: {e}")))?;
            }
        }
        Ok(())
    }
}
