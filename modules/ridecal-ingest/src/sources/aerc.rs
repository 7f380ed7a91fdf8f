//! AERC calendar driver.
//!
//! The AERC calendar is a WordPress page backed by an admin-ajax form
//! endpoint. A run first GETs the calendar page to read the hidden season
//! identifiers, then POSTs the form to receive the full season's rows as
//! JSON-wrapped HTML.

use std::sync::atomic::AtomicBool;

use async_trait::async_trait;
use scraper::{ElementRef, Html, Selector};
use serde_json::{json, Value};
use tracing::{info, warn};

use ridecal_common::{Config, IngestError, RawRow, Result, Source};

use crate::cache::Cache;
use crate::fetcher::{FetchRequest, Fetcher};
use crate::sources::SourceDriver;

const CALENDAR_URL: &str = "https://aerc.org/calendar";
const AJAX_URL: &str = "https://aerc.org/wp-admin/admin-ajax.php";
const ROW_SELECTOR: &str = "div.calendarRow";

pub struct AercDriver {
    calendar_url: String,
    ajax_url: String,
    selectors: RowSelectors,
}

/// Compiled selectors for the fields inside one calendar row.
struct RowSelectors {
    row: Selector,
    season_input: Selector,
    name: Selector,
    date: Selector,
    region: Selector,
    location: Selector,
    distance: Selector,
    manager: Selector,
    judge: Selector,
    description: Selector,
    directions: Selector,
    email_link: Selector,
    phone_link: Selector,
    website_link: Selector,
    flyer_link: Selector,
    map_link: Selector,
}

impl RowSelectors {
    fn new() -> Self {
        let parse = |s: &str| Selector::parse(s).expect("valid selector");
        Self {
            row: parse(ROW_SELECTOR),
            season_input: parse(r#"input[name="season[]"]"#),
            name: parse(".rideName"),
            date: parse(".rideDate"),
            region: parse(".rideRegion"),
            location: parse(".rideLocation"),
            distance: parse(".rideDistance"),
            manager: parse(".rideManager"),
            judge: parse(".controlJudge"),
            description: parse(".rideDescription"),
            directions: parse(".rideDirections"),
            email_link: parse(r#"a[href^="mailto:"]"#),
            phone_link: parse(r#"a[href^="tel:"]"#),
            website_link: parse("a.rideWebsite"),
            flyer_link: parse("a.rideFlyer"),
            map_link: parse("a.rideMapLink"),
        }
    }
}

impl AercDriver {
    pub fn new(_config: &Config) -> Self {
        Self::with_urls(CALENDAR_URL, AJAX_URL)
    }

    /// Endpoint override for tests.
    pub fn with_urls(calendar_url: &str, ajax_url: &str) -> Self {
        Self {
            calendar_url: calendar_url.to_string(),
            ajax_url: ajax_url.to_string(),
            selectors: RowSelectors::new(),
        }
    }

    /// Hidden `season[]` input values from the calendar page; the first two
    /// cover the current and next season.
    fn season_ids(&self, page_html: &str) -> Vec<String> {
        let document = Html::parse_document(page_html);
        document
            .select(&self.selectors.season_input)
            .filter_map(|el| el.value().attr("value"))
            .filter(|v| !v.is_empty())
            .take(2)
            .map(str::to_string)
            .collect()
    }

    fn calendar_form(season_ids: &[String]) -> Vec<(String, String)> {
        let mut form = vec![
            ("action".to_string(), "aerc_calendar_form".to_string()),
            ("calendar".to_string(), "calendar".to_string()),
            ("country[]".to_string(), "United States".to_string()),
            ("country[]".to_string(), "Canada".to_string()),
            ("within".to_string(), String::new()),
            ("zip".to_string(), String::new()),
            ("span[]".to_string(), "#cal-span-season".to_string()),
        ];
        for id in season_ids {
            form.push(("season[]".to_string(), id.clone()));
        }
        form.push(("daterangefrom".to_string(), String::new()));
        form.push(("daterangeto".to_string(), String::new()));
        form.push(("distance[]".to_string(), "any".to_string()));
        form
    }

    fn extract_row(&self, row: ElementRef<'_>) -> Option<RawRow> {
        let sel = &self.selectors;
        let mut raw = RawRow::new();

        let name_el = row.select(&sel.name).next()?;
        let name = element_text(name_el);
        if name.is_empty() {
            return None;
        }
        raw.insert("name", Value::String(name.clone()));

        if let Some(tag) = name_el.value().attr("tag").filter(|t| !t.is_empty()) {
            raw.insert("ride_id", Value::String(tag.to_string()));
        }

        let row_classes: Vec<_> = row.value().classes().collect();
        let canceled =
            row_classes.contains(&"cancelled") || name.to_lowercase().contains("cancelled");
        raw.insert("is_canceled", Value::Bool(canceled));

        let dates: Vec<String> = row
            .select(&sel.date)
            .map(element_text)
            .filter(|t| !t.is_empty())
            .collect();
        if let Some(first) = dates.first() {
            raw.insert("date_start", Value::String(first.clone()));
        }
        if dates.len() > 1 {
            raw.insert("date_end", Value::String(dates[dates.len() - 1].clone()));
        }

        if let Some(region) = select_text(row, &sel.region) {
            raw.insert("region", Value::String(region));
        }
        if let Some(location) = select_text(row, &sel.location) {
            raw.insert("location", Value::String(location));
        }

        let distances: Vec<Value> = row
            .select(&sel.distance)
            .filter_map(|el| {
                let text = element_text(el);
                if text.is_empty() {
                    return None;
                }
                match el.value().attr("data-start") {
                    Some(start) if !start.is_empty() => Some(json!({
                        "distance": text,
                        "start_time": start,
                    })),
                    _ => Some(Value::String(text)),
                }
            })
            .collect();
        if !distances.is_empty() {
            raw.insert("distances", Value::Array(distances));
        }

        if let Some(manager) = select_text(row, &sel.manager) {
            raw.insert("ride_manager", Value::String(manager));
        }
        if let Some(email) = row
            .select(&sel.email_link)
            .next()
            .and_then(|el| el.value().attr("href"))
            .and_then(|href| href.strip_prefix("mailto:"))
            .filter(|e| !e.is_empty())
        {
            raw.insert("manager_email", Value::String(email.to_string()));
        }
        if let Some(phone) = row
            .select(&sel.phone_link)
            .next()
            .and_then(|el| el.value().attr("href"))
            .and_then(|href| href.strip_prefix("tel:"))
            .filter(|p| !p.is_empty())
        {
            raw.insert("manager_phone", Value::String(phone.to_string()));
        }

        for (key, selector) in [
            ("website", &sel.website_link),
            ("flyer_url", &sel.flyer_link),
            ("map_link", &sel.map_link),
        ] {
            if let Some(href) = row
                .select(selector)
                .next()
                .and_then(|el| el.value().attr("href"))
                .filter(|h| !h.is_empty())
            {
                raw.insert(key, Value::String(href.to_string()));
            }
        }

        let judges: Vec<Value> = row
            .select(&sel.judge)
            .filter_map(|el| {
                let name = element_text(el);
                if name.is_empty() {
                    return None;
                }
                let role = el
                    .value()
                    .attr("data-role")
                    .filter(|r| !r.is_empty())
                    .unwrap_or("Control Judge");
                Some(json!({ "name": name, "role": role }))
            })
            .collect();
        if !judges.is_empty() {
            raw.insert("control_judges", Value::Array(judges));
        }

        if let Some(description) = select_text(row, &sel.description) {
            raw.insert("description", Value::String(description));
        }
        if let Some(directions) = select_text(row, &sel.directions) {
            raw.insert("directions", Value::String(directions));
        }

        Some(raw)
    }
}

fn element_text(el: ElementRef<'_>) -> String {
    el.text().collect::<String>().trim().to_string()
}

fn select_text(row: ElementRef<'_>, selector: &Selector) -> Option<String> {
    row.select(selector)
        .next()
        .map(element_text)
        .filter(|t| !t.is_empty())
}

#[async_trait]
impl SourceDriver for AercDriver {
    fn source(&self) -> Source {
        Source::Aerc
    }

    fn row_selector(&self) -> &str {
        ROW_SELECTOR
    }

    async fn fetch_payload(
        &self,
        fetcher: &mut Fetcher,
        cache: &mut Cache,
        cancelled: &AtomicBool,
    ) -> Result<String> {
        let page = fetcher
            .fetch(&FetchRequest::get(&self.calendar_url), cancelled)
            .await?;

        let season_ids = self.season_ids(&page);
        if season_ids.is_empty() {
            return Err(IngestError::Network(format!(
                "no season identifiers on {}",
                self.calendar_url
            )));
        }
        info!(seasons = ?season_ids, "Resolved season identifiers");

        let cache_key = format!("calendar_html_{}", season_ids.join("_"));
        if let Some(cached) = cache.get(&cache_key) {
            info!("Using cached calendar payload");
            return Ok(cached);
        }

        let request = FetchRequest::post_form(&self.ajax_url, Self::calendar_form(&season_ids))
            .header("Referer", "https://aerc.org/");
        let payload = fetcher.fetch(&request, cancelled).await?;

        if let Err(e) = cache.set(&cache_key, &payload) {
            warn!(error = %e, "Failed to cache calendar payload");
        }

        Ok(payload)
    }

    fn extract_rows(&self, chunk: &str) -> Result<Vec<RawRow>> {
        let fragment = Html::parse_fragment(chunk);
        let rows = fragment
            .select(&self.selectors.row)
            .filter_map(|row| self.extract_row(row))
            .collect();
        Ok(rows)
    }
}
