use async_trait::async_trait;
use chrono::NaiveDate;
use ridecal_common::{CanonicalEvent, Source};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

use crate::error::Result;

/// The pipeline's view of the event store.
///
/// Lookups back the upserter's dedup policy; `insert`/`update` carry its
/// merge semantics: incoming non-null fields overwrite, incoming nulls
/// preserve, `event_details` merges shallowly, `created_at` is set on
/// insert only, and `geocoding_attempted` is never touched by updates.
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Event id for `(source, ride_id)`, if present.
    async fn find_by_ride_id(&self, source: Source, ride_id: &str) -> Result<Option<i64>>;

    /// Event id for `(source, name, date_start::date)`, if present.
    async fn find_by_name_and_date(
        &self,
        source: Source,
        name: &str,
        date_start: NaiveDate,
    ) -> Result<Option<i64>>;

    /// Insert a new event row. Returns the new id.
    async fn insert(&self, event: &CanonicalEvent) -> Result<i64>;

    /// Merge an event into an existing row.
    async fn update(&self, id: i64, event: &CanonicalEvent) -> Result<()>;

    /// Total rows for a source, for post-run verification.
    async fn count_by_source(&self, source: Source) -> Result<i64>;
}

/// Postgres-backed event store.
#[derive(Clone)]
pub struct PgEventStore {
    pool: PgPool,
}

impl PgEventStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;
        Ok(Self { pool })
    }

    /// Run the embedded SQL migrations.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl EventStore for PgEventStore {
    async fn find_by_ride_id(&self, source: Source, ride_id: &str) -> Result<Option<i64>> {
        let id = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT id FROM events
            WHERE source = $1 AND ride_id = $2
            LIMIT 1
            "#,
        )
        .bind(source.as_str())
        .bind(ride_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(id)
    }

    async fn find_by_name_and_date(
        &self,
        source: Source,
        name: &str,
        date_start: NaiveDate,
    ) -> Result<Option<i64>> {
        let id = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT id FROM events
            WHERE source = $1 AND name = $2 AND date_start::date = $3
            LIMIT 1
            "#,
        )
        .bind(source.as_str())
        .bind(name)
        .bind(date_start)
        .fetch_optional(&self.pool)
        .await?;

        Ok(id)
    }

    async fn insert(&self, event: &CanonicalEvent) -> Result<i64> {
        let manager_contact = serde_json::to_value(&event.ride_manager_contact)
            .unwrap_or(serde_json::Value::Null);
        let event_details = serde_json::Value::Object(event.event_details.clone());

        let id = sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO events
                (name, description, location, date_start, date_end, organizer,
                 website, flyer_url, region, distances, latitude, longitude,
                 ride_manager, manager_contact, event_type, event_details,
                 notes, external_id, manager_email, manager_phone, judges,
                 directions, map_link, source, ride_id, has_intro_ride,
                 is_canceled, is_verified, geocoding_attempted,
                 created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13,
                    $14, $15, $16, $17, $18, $19, $20, $21, $22, $23, $24,
                    $25, $26, $27, $28, FALSE, NOW(), NOW())
            RETURNING id
            "#,
        )
        .bind(&event.name)
        .bind(&event.description)
        .bind(&event.location)
        .bind(event.date_start)
        .bind(event.date_end)
        .bind(&event.ride_manager)
        .bind(&event.website)
        .bind(&event.flyer_url)
        .bind(&event.region)
        .bind(event.distance_texts())
        .bind(event.latitude)
        .bind(event.longitude)
        .bind(&event.ride_manager)
        .bind(&manager_contact)
        .bind(&event.event_type)
        .bind(&event_details)
        .bind(&event.notes)
        .bind(&event.external_id)
        .bind(&event.manager_email)
        .bind(&event.manager_phone)
        .bind(event.judge_names())
        .bind(&event.directions)
        .bind(&event.map_link)
        .bind(event.source.as_str())
        .bind(&event.ride_id)
        .bind(event.has_intro_ride)
        .bind(event.is_canceled)
        .bind(event.is_verified)
        .fetch_one(&self.pool)
        .await?;

        Ok(id)
    }

    async fn update(&self, id: i64, event: &CanonicalEvent) -> Result<()> {
        let manager_contact = serde_json::to_value(&event.ride_manager_contact)
            .unwrap_or(serde_json::Value::Null);
        let event_details = serde_json::Value::Object(event.event_details.clone());

        sqlx::query(
            r#"
            UPDATE events SET
                name = $2,
                description = COALESCE($3, description),
                location = $4,
                date_start = $5,
                date_end = $6,
                organizer = COALESCE($7, organizer),
                website = COALESCE($8, website),
                flyer_url = COALESCE($9, flyer_url),
                region = COALESCE($10, region),
                distances = $11,
                latitude = COALESCE($12, latitude),
                longitude = COALESCE($13, longitude),
                ride_manager = COALESCE($14, ride_manager),
                manager_contact = COALESCE($15, manager_contact),
                event_type = COALESCE($16, event_type),
                event_details = COALESCE(event_details, '{}'::jsonb) || $17,
                notes = COALESCE($18, notes),
                external_id = COALESCE($19, external_id),
                manager_email = COALESCE($20, manager_email),
                manager_phone = COALESCE($21, manager_phone),
                judges = $22,
                directions = COALESCE($23, directions),
                map_link = COALESCE($24, map_link),
                ride_id = COALESCE($25, ride_id),
                has_intro_ride = $26,
                is_canceled = $27,
                is_verified = $28,
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(&event.name)
        .bind(&event.description)
        .bind(&event.location)
        .bind(event.date_start)
        .bind(event.date_end)
        .bind(&event.ride_manager)
        .bind(&event.website)
        .bind(&event.flyer_url)
        .bind(&event.region)
        .bind(event.distance_texts())
        .bind(event.latitude)
        .bind(event.longitude)
        .bind(&event.ride_manager)
        .bind(&manager_contact)
        .bind(&event.event_type)
        .bind(&event_details)
        .bind(&event.notes)
        .bind(&event.external_id)
        .bind(&event.manager_email)
        .bind(&event.manager_phone)
        .bind(event.judge_names())
        .bind(&event.directions)
        .bind(&event.map_link)
        .bind(&event.ride_id)
        .bind(event.has_intro_ride)
        .bind(event.is_canceled)
        .bind(event.is_verified)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn count_by_source(&self, source: Source) -> Result<i64> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM events WHERE source = $1",
        )
        .bind(source.as_str())
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }
}
