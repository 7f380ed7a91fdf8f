use std::env;
use std::time::Duration;

/// Pipeline configuration loaded from environment variables.
///
/// One `Config` is built per process and threaded explicitly through
/// constructors; nothing reads the environment after startup.
#[derive(Debug, Clone)]
pub struct Config {
    /// Postgres connection string.
    pub database_url: String,

    /// Root directory for the fetch cache. Each source owns a subtree.
    pub cache_dir: String,

    /// Directory for per-run metrics JSON files.
    pub metrics_dir: String,

    /// API key for the AI-assisted extraction path. Empty disables it even
    /// when `use_ai_extraction` is set.
    pub anthropic_api_key: String,

    // Network
    /// Retry budget per request.
    pub max_retries: u32,
    /// Base backoff between retries, in seconds.
    pub retry_delay: u64,
    /// Per-request timeout, in seconds.
    pub request_timeout: u64,
    /// Per-run timeout, in seconds. Exceeding it cancels the run.
    pub run_timeout: u64,

    // Cache
    /// Cache entry lifetime, in seconds.
    pub cache_ttl: u64,
    /// Force cache misses for this run.
    pub refresh_cache: bool,

    // Chunking
    /// Target chunk size in bytes.
    pub initial_chunk_size: usize,
    /// Lower clamp on the target chunk size.
    pub min_chunk_size: usize,
    /// Upper clamp on the target chunk size.
    pub max_chunk_size: usize,

    // Extraction
    /// Enable the AI-assisted extraction fallback.
    pub use_ai_extraction: bool,
    /// Chunk fan-out degree. 1 = sequential.
    pub extractor_parallelism: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: String::new(),
            cache_dir: "cache".to_string(),
            metrics_dir: "logs/metrics".to_string(),
            anthropic_api_key: String::new(),
            max_retries: 3,
            retry_delay: 2,
            request_timeout: 30,
            run_timeout: 900,
            cache_ttl: 3600,
            refresh_cache: false,
            initial_chunk_size: 10_000,
            min_chunk_size: 5_000,
            max_chunk_size: 15_000,
            use_ai_extraction: false,
            extractor_parallelism: 1,
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    /// Panics with a clear message if `DATABASE_URL` is missing.
    pub fn from_env() -> Self {
        let defaults = Config::default();
        Self {
            database_url: required_env("DATABASE_URL"),
            cache_dir: env::var("CACHE_DIR").unwrap_or(defaults.cache_dir),
            metrics_dir: env::var("METRICS_DIR").unwrap_or(defaults.metrics_dir),
            anthropic_api_key: env::var("ANTHROPIC_API_KEY").unwrap_or_default(),
            max_retries: parsed_env("MAX_RETRIES", defaults.max_retries),
            retry_delay: parsed_env("RETRY_DELAY", defaults.retry_delay),
            request_timeout: parsed_env("REQUEST_TIMEOUT", defaults.request_timeout),
            run_timeout: parsed_env("RUN_TIMEOUT", defaults.run_timeout),
            cache_ttl: parsed_env("CACHE_TTL", defaults.cache_ttl),
            refresh_cache: bool_env("REFRESH_CACHE"),
            initial_chunk_size: parsed_env("INITIAL_CHUNK_SIZE", defaults.initial_chunk_size),
            min_chunk_size: parsed_env("MIN_CHUNK_SIZE", defaults.min_chunk_size),
            max_chunk_size: parsed_env("MAX_CHUNK_SIZE", defaults.max_chunk_size),
            use_ai_extraction: bool_env("USE_AI_EXTRACTION"),
            extractor_parallelism: parsed_env("EXTRACTOR_PARALLELISM", defaults.extractor_parallelism)
                .max(1),
        }
    }

    /// Target chunk size clamped into `[min_chunk_size, max_chunk_size]`.
    pub fn chunk_size(&self) -> usize {
        self.initial_chunk_size
            .clamp(self.min_chunk_size, self.max_chunk_size)
    }

    pub fn request_timeout_duration(&self) -> Duration {
        Duration::from_secs(self.request_timeout)
    }

    pub fn retry_delay_duration(&self) -> Duration {
        Duration::from_secs(self.retry_delay)
    }

    pub fn run_timeout_duration(&self) -> Duration {
        Duration::from_secs(self.run_timeout)
    }

    /// Log a redacted view of the configuration for debugging.
    pub fn log_redacted(&self) {
        tracing::info!(
            cache_dir = %self.cache_dir,
            metrics_dir = %self.metrics_dir,
            max_retries = self.max_retries,
            retry_delay = self.retry_delay,
            request_timeout = self.request_timeout,
            cache_ttl = self.cache_ttl,
            refresh_cache = self.refresh_cache,
            chunk_size = self.chunk_size(),
            use_ai_extraction = self.use_ai_extraction,
            extractor_parallelism = self.extractor_parallelism,
            "Configuration loaded"
        );
        if self.anthropic_api_key.is_empty() {
            tracing::info!("ANTHROPIC_API_KEY = (empty)");
        } else {
            tracing::info!("ANTHROPIC_API_KEY = ({} chars)", self.anthropic_api_key.len());
        }
    }
}

fn required_env(key: &str) -> String {
    env::var(key).unwrap_or_else(|_| panic!("{key} environment variable is required"))
}

fn parsed_env<T: std::str::FromStr + Copy>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn bool_env(key: &str) -> bool {
    matches!(
        env::var(key).unwrap_or_default().to_lowercase().as_str(),
        "1" | "true" | "yes"
    )
}
