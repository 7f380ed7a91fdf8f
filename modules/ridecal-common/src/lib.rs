//! Shared types, configuration, and errors for the ridecal workspace.

pub mod config;
pub mod error;
pub mod types;

pub use config::Config;
pub use error::{IngestError, Result};
pub use types::{
    content_hash, CanonicalEvent, ContactInfo, Distance, Geocoder, Judge, RawRow, Source,
};
