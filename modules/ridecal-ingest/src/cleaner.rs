//! Payload decoding and HTML reduction.
//!
//! Source endpoints return either raw HTML or a JSON wrapper
//! (`{"html": "..."}`); both are handled. The cleaner strips script and
//! style blocks, then keeps only the elements matching the source's row
//! selector — page chrome (nav, header, footer) falls away with everything
//! else outside the rows. Re-parsing through html5ever also repairs
//! unbalanced tags on the way.

use regex::Regex;
use scraper::{Html, Selector};
use tracing::{debug, info};

use ridecal_common::{IngestError, Result};

pub struct Cleaner {
    script_re: Regex,
    style_re: Regex,
    pub rows_found: u32,
}

impl Cleaner {
    pub fn new() -> Self {
        Self {
            script_re: Regex::new(r"(?is)<script\b[^>]*>.*?</script>").expect("valid regex"),
            style_re: Regex::new(r"(?is)<style\b[^>]*>.*?</style>").expect("valid regex"),
            rows_found: 0,
        }
    }

    /// Reduce a raw payload to the concatenated HTML of its event rows.
    pub fn clean(&mut self, payload: &str, row_selector: &str) -> Result<String> {
        let html = Self::decode(payload);

        let stripped = self.script_re.replace_all(&html, "");
        let stripped = self.style_re.replace_all(&stripped, "");

        let selector = Selector::parse(row_selector)
            .map_err(|e| IngestError::Config(format!("row selector {row_selector:?}: {e}")))?;

        let document = Html::parse_document(&stripped);
        let mut rows = String::new();
        let mut count: u32 = 0;
        for element in document.select(&selector) {
            rows.push_str(&element.html());
            count += 1;
        }

        if count == 0 {
            return Err(IngestError::NoRowsFound);
        }

        self.rows_found = count;
        info!(rows = count, bytes = rows.len(), "Cleaned payload");
        Ok(rows)
    }

    /// Unwrap a JSON `{"html": ...}` envelope, or pass raw HTML through.
    fn decode(payload: &str) -> String {
        match serde_json::from_str::<serde_json::Value>(payload) {
            Ok(value) => {
                if let Some(html) = value.get("html").and_then(|v| v.as_str()) {
                    debug!("Payload is JSON-wrapped HTML");
                    html.to_string()
                } else {
                    payload.to_string()
                }
            }
            Err(_) => payload.to_string(),
        }
    }
}

impl Default for Cleaner {
    fn default() -> Self {
        Self::new()
    }
}
