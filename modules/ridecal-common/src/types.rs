use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

// --- Source identity ---

/// Where an event record came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Source {
    Aerc,
    Pner,
    Facebook,
    Manual,
}

impl Source {
    /// The canonical tag persisted in the store's `source` column.
    pub fn as_str(&self) -> &'static str {
        match self {
            Source::Aerc => "AERC",
            Source::Pner => "PNER",
            Source::Facebook => "FACEBOOK",
            Source::Manual => "MANUAL",
        }
    }
}

impl std::fmt::Display for Source {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Source {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "AERC" => Ok(Source::Aerc),
            "PNER" => Ok(Source::Pner),
            "FACEBOOK" => Ok(Source::Facebook),
            "MANUAL" => Ok(Source::Manual),
            other => Err(format!("unknown source: {other}")),
        }
    }
}

// --- RawRow ---

/// Untyped field map produced by the extractor for one event candidate.
///
/// The inter-stage currency between extraction and transformation. Values
/// are JSON: strings, numbers, bools, lists, or nested maps. Only the
/// validator and transformer inspect unknown shapes; everything downstream
/// uses [`CanonicalEvent`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawRow(pub serde_json::Map<String, Value>);

impl RawRow {
    pub fn new() -> Self {
        Self(serde_json::Map::new())
    }

    /// Wrap a JSON value if it is an object; None otherwise.
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(map) => Some(Self(map)),
            _ => None,
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Trimmed, non-empty string value for a key.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.0
            .get(key)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.0.get(key).and_then(Value::as_bool)
    }

    pub fn get_array(&self, key: &str) -> Option<&Vec<Value>> {
        self.0.get(key).and_then(Value::as_array)
    }

    pub fn get_object(&self, key: &str) -> Option<&serde_json::Map<String, Value>> {
        self.0.get(key).and_then(Value::as_object)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        self.0.insert(key.into(), value);
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

// --- Structured values ---

/// One ride distance offered by an event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Distance {
    /// Canonicalised text, e.g. "50 miles". Non-numeric forms are kept verbatim.
    pub distance: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_time: Option<String>,
}

impl Distance {
    pub fn new(distance: impl Into<String>) -> Self {
        Self {
            distance: distance.into(),
            date: None,
            start_time: None,
        }
    }
}

/// Ride-manager contact details. Always fully populated with nulls for unknowns.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactInfo {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
}

/// A control judge or similar official.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Judge {
    pub name: String,
    pub role: String,
}

// --- CanonicalEvent ---

/// The normalised, source-agnostic event record produced by the transformer
/// and reconciled against the store by the upserter. Never mutated after
/// upsert resolution; each run re-derives it from the source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CanonicalEvent {
    // Identity
    pub source: Source,
    pub external_id: Option<String>,
    pub ride_id: Option<String>,

    // Core
    pub name: String,
    pub date_start: DateTime<Utc>,
    pub date_end: DateTime<Utc>,
    pub location: String,
    pub region: Option<String>,

    // Structured location
    pub city: Option<String>,
    pub state: Option<String>,
    pub country: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,

    // Distances, in source order
    pub distances: Vec<Distance>,

    // Flags
    pub is_canceled: bool,
    pub is_verified: bool,
    pub has_intro_ride: bool,
    pub is_multi_day_event: bool,
    pub is_pioneer_ride: bool,
    /// Number of ride days, >= 1.
    pub ride_days: i32,
    pub geocoding_attempted: bool,

    // Contacts
    pub ride_manager: Option<String>,
    pub manager_email: Option<String>,
    pub manager_phone: Option<String>,
    pub ride_manager_contact: ContactInfo,

    // References
    pub website: Option<String>,
    pub flyer_url: Option<String>,
    pub map_link: Option<String>,
    pub directions: Option<String>,
    pub judges: Vec<Judge>,
    pub description: Option<String>,
    pub notes: Option<String>,
    pub event_type: Option<String>,

    // Free-form structured bag for anything not promoted to a column
    pub event_details: serde_json::Map<String, Value>,
}

impl CanonicalEvent {
    /// A minimally-valid event; used by the transformer as the starting point.
    pub fn new(source: Source, name: String, date_start: DateTime<Utc>, location: String) -> Self {
        Self {
            source,
            external_id: None,
            ride_id: None,
            name,
            date_start,
            date_end: date_start,
            location,
            region: None,
            city: None,
            state: None,
            country: None,
            latitude: None,
            longitude: None,
            distances: Vec::new(),
            is_canceled: false,
            is_verified: false,
            has_intro_ride: false,
            is_multi_day_event: false,
            is_pioneer_ride: false,
            ride_days: 1,
            geocoding_attempted: false,
            ride_manager: None,
            manager_email: None,
            manager_phone: None,
            ride_manager_contact: ContactInfo::default(),
            website: None,
            flyer_url: None,
            map_link: None,
            directions: None,
            judges: Vec::new(),
            description: None,
            notes: None,
            event_type: None,
            event_details: serde_json::Map::new(),
        }
    }

    /// Distance texts only, for the store's string-array column.
    pub fn distance_texts(&self) -> Vec<String> {
        self.distances.iter().map(|d| d.distance.clone()).collect()
    }

    /// Judge names only, for the store's string-array column.
    pub fn judge_names(&self) -> Vec<String> {
        self.judges.iter().map(|j| j.name.clone()).collect()
    }
}

// --- Hashing ---

/// Stable 128-bit content digest, hex-encoded. Used to derive cache storage
/// tokens from arbitrary string keys.
pub fn content_hash(content: &str) -> String {
    let digest = Sha256::digest(content.as_bytes());
    hex::encode(&digest[..16])
}

// --- Geocoding seam ---

/// Resolves a human-readable location to coordinates.
///
/// The pipeline never geocodes; a separate batch process implements this
/// trait and backfills rows where `geocoding_attempted` is still false.
#[async_trait::async_trait]
pub trait Geocoder: Send + Sync {
    async fn geocode(&self, location: &str) -> Option<(f64, f64)>;
}
