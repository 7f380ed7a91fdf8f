//! AI-assisted extraction.
//!
//! Sends a chunk to the Anthropic Messages API with a forced tool call
//! whose input schema mirrors the calendar-row field set, and parses the
//! tool input back into raw rows. Used only as a fallback for chunks the
//! structural strategy could not read.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::debug;

use ridecal_common::{IngestError, RawRow, Result};

const API_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_MODEL: &str = "claude-haiku-4-5-20251001";
const TOOL_NAME: &str = "record_events";
const MAX_CHUNK_CHARS: usize = 30_000;

/// What the model returns for one extracted event.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ExtractedRide {
    pub name: String,
    /// ISO date, e.g. "2024-03-15"
    pub date_start: Option<String>,
    pub date_end: Option<String>,
    pub region: Option<String>,
    pub location: Option<String>,
    pub distances: Option<Vec<ExtractedDistance>>,
    pub ride_manager: Option<String>,
    pub manager_email: Option<String>,
    pub manager_phone: Option<String>,
    pub control_judges: Option<Vec<ExtractedJudge>>,
    pub website: Option<String>,
    pub flyer_url: Option<String>,
    pub map_link: Option<String>,
    pub directions: Option<String>,
    pub description: Option<String>,
    pub ride_id: Option<String>,
    pub is_canceled: Option<bool>,
    pub has_intro_ride: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ExtractedDistance {
    pub distance: String,
    pub date: Option<String>,
    pub start_time: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ExtractedJudge {
    pub name: String,
    pub role: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct RideExtraction {
    #[serde(default)]
    pub events: Vec<ExtractedRide>,
}

pub struct AiExtractor {
    client: reqwest::Client,
    api_key: String,
    model: String,
}

impl AiExtractor {
    pub fn new(api_key: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.to_string(),
            model: DEFAULT_MODEL.to_string(),
        }
    }

    pub async fn extract(&self, chunk: &str) -> Result<Vec<RawRow>> {
        let chunk = truncate_on_char_boundary(chunk, MAX_CHUNK_CHARS);
        let schema = schemars::schema_for!(RideExtraction);
        let schema = serde_json::to_value(schema)
            .map_err(|e| IngestError::Extraction(format!("schema: {e}")))?;

        let body = serde_json::json!({
            "model": self.model,
            "max_tokens": 8192,
            "temperature": 0.0,
            "system": SYSTEM_PROMPT,
            "messages": [{
                "role": "user",
                "content": format!(
                    "Extract every endurance ride event from this calendar HTML fragment.\n\n---\n\n{chunk}"
                ),
            }],
            "tools": [{
                "name": TOOL_NAME,
                "description": "Record the structured event rows found in the fragment.",
                "input_schema": schema,
            }],
            "tool_choice": { "type": "tool", "name": TOOL_NAME },
        });

        debug!(model = %self.model, chunk_bytes = chunk.len(), "AI extraction request");

        let response = self
            .client
            .post(API_URL)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body)
            .send()
            .await
            .map_err(|e| IngestError::Extraction(format!("AI request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(IngestError::Extraction(format!(
                "AI API error ({status}): {text}"
            )));
        }

        let reply: serde_json::Value = response
            .json()
            .await
            .map_err(|e| IngestError::Extraction(format!("AI response parse: {e}")))?;

        let input = reply["content"]
            .as_array()
            .and_then(|blocks| {
                blocks
                    .iter()
                    .find(|b| b["type"] == "tool_use")
                    .map(|b| b["input"].clone())
            })
            .ok_or_else(|| {
                IngestError::Extraction("no tool_use block in AI response".to_string())
            })?;

        let extraction: RideExtraction = serde_json::from_value(input)
            .map_err(|e| IngestError::Extraction(format!("AI output shape: {e}")))?;

        Ok(to_raw_rows(extraction))
    }
}

fn to_raw_rows(extraction: RideExtraction) -> Vec<RawRow> {
    extraction
        .events
        .into_iter()
        .filter_map(|ride| {
            serde_json::to_value(ride)
                .ok()
                .and_then(RawRow::from_value)
        })
        .collect()
}

fn truncate_on_char_boundary(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

const SYSTEM_PROMPT: &str = "\
You are a calendar-row extractor for endurance riding events.

Each input fragment contains zero or more calendar rows. For every row,
record one event with the fields you can read directly from the markup:
ride name, start/end dates (ISO 8601), AERC region code, location text,
offered distances, ride manager and contact details, control judges,
and any website / flyer / map links.

Rules:
- Extract only what is present; never invent values.
- Keep distance text as written (e.g. \"50\", \"25 miles\", \"intro\").
- A row marked cancelled sets is_canceled.
- If the fragment has no event rows, return an empty events array.";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_input_converts_to_raw_rows() {
        let extraction: RideExtraction = serde_json::from_value(serde_json::json!({
            "events": [{
                "name": "Owyhee Canyonlands",
                "date_start": "2024-09-25",
                "location": "Oreana, ID",
                "distances": [{ "distance": "50" }, { "distance": "25" }],
                "ride_manager": "John Doe"
            }]
        }))
        .unwrap();

        let rows = to_raw_rows(extraction);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get_str("name"), Some("Owyhee Canyonlands"));
        assert_eq!(rows[0].get_array("distances").unwrap().len(), 2);
    }

    #[test]
    fn missing_events_key_is_empty() {
        let extraction: RideExtraction =
            serde_json::from_value(serde_json::json!({})).unwrap();
        assert!(to_raw_rows(extraction).is_empty());
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        let s = "é".repeat(100);
        let truncated = truncate_on_char_boundary(&s, 101);
        assert!(truncated.len() <= 101);
        assert!(truncated.chars().all(|c| c == 'é'));
    }
}
