//! PostgreSQL-backed store.

use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::info;

use super::{ReadingFilter, StoreResult, WeatherStore, Window};
use crate::error::StoreError;
use crate::{schema, Reading, StationYearFilter, UpsertOutcome, YearlyStat};

// ---

#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Open a pool and make sure the schema exists.
    pub async fn connect(db_url: &str, max_connections: u32) -> StoreResult<Self> {
        // ---
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(db_url)
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;

        info!("Successfully connected to database");
        schema::create_schema(&pool).await?;
        Ok(PgStore { pool })
    }
}

fn conflict_or_database(err: sqlx::Error, station_id: &str, key: String) -> StoreError {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => StoreError::Conflict {
            station_id: station_id.to_string(),
            key,
        },
        _ => StoreError::Database(err),
    }
}

#[async_trait]
impl WeatherStore for PgStore {
    // ---
    async fn upsert_reading(&self, reading: &Reading) -> StoreResult<UpsertOutcome> {
        // No row back means the existing row already held these values.
        let inserted: Option<bool> = sqlx::query_scalar(
            r#"
            INSERT INTO weather (station_id, date, max_temp_c, min_temp_c, precip_cm)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (station_id, date) DO UPDATE SET
                max_temp_c = EXCLUDED.max_temp_c,
                min_temp_c = EXCLUDED.min_temp_c,
                precip_cm  = EXCLUDED.precip_cm
            WHERE (weather.max_temp_c, weather.min_temp_c, weather.precip_cm)
                IS DISTINCT FROM (EXCLUDED.max_temp_c, EXCLUDED.min_temp_c, EXCLUDED.precip_cm)
            RETURNING (xmax = 0)
            "#,
        )
        .bind(&reading.station_id)
        .bind(reading.date)
        .bind(reading.max_temp_c)
        .bind(reading.min_temp_c)
        .bind(reading.precip_cm)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| conflict_or_database(e, &reading.station_id, reading.date.to_string()))?;

        Ok(match inserted {
            Some(true) => UpsertOutcome::Inserted,
            Some(false) => UpsertOutcome::Updated,
            None => UpsertOutcome::Unchanged,
        })
    }

    async fn station_years(&self, filter: &StationYearFilter) -> StoreResult<Vec<(String, i32)>> {
        let rows: Vec<(String, i32)> = sqlx::query_as(
            r#"
            SELECT DISTINCT station_id, EXTRACT(YEAR FROM date)::INT AS year
            FROM weather
            WHERE ($1::TEXT IS NULL OR station_id = $1)
              AND ($2::INT IS NULL OR EXTRACT(YEAR FROM date)::INT = $2)
            ORDER BY station_id, year
            "#,
        )
        .bind(filter.station_id.as_deref())
        .bind(filter.year)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn readings_for_year(&self, station_id: &str, year: i32) -> StoreResult<Vec<Reading>> {
        let rows = sqlx::query_as::<_, Reading>(
            r#"
            SELECT station_id, date, max_temp_c, min_temp_c, precip_cm
            FROM weather
            WHERE station_id = $1 AND EXTRACT(YEAR FROM date)::INT = $2
            ORDER BY date
            "#,
        )
        .bind(station_id)
        .bind(year)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn upsert_stat(&self, stat: &YearlyStat) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO weather_stats (
                station_id, year, avg_max_temp_c, avg_min_temp_c, total_precip_cm,
                record_count, max_temp_count, min_temp_count, precip_count
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (station_id, year) DO UPDATE SET
                avg_max_temp_c  = EXCLUDED.avg_max_temp_c,
                avg_min_temp_c  = EXCLUDED.avg_min_temp_c,
                total_precip_cm = EXCLUDED.total_precip_cm,
                record_count    = EXCLUDED.record_count,
                max_temp_count  = EXCLUDED.max_temp_count,
                min_temp_count  = EXCLUDED.min_temp_count,
                precip_count    = EXCLUDED.precip_count
            "#,
        )
        .bind(&stat.station_id)
        .bind(stat.year)
        .bind(stat.avg_max_temp_c)
        .bind(stat.avg_min_temp_c)
        .bind(stat.total_precip_cm)
        .bind(stat.record_count)
        .bind(stat.max_temp_count)
        .bind(stat.min_temp_count)
        .bind(stat.precip_count)
        .execute(&self.pool)
        .await
        .map_err(|e| conflict_or_database(e, &stat.station_id, stat.year.to_string()))?;
        Ok(())
    }

    async fn count_readings(&self, filter: &ReadingFilter) -> StoreResult<i64> {
        let total: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM weather
            WHERE ($1::TEXT IS NULL OR station_id = $1)
              AND ($2::DATE IS NULL OR date = $2)
            "#,
        )
        .bind(filter.station_id.as_deref())
        .bind(filter.date)
        .fetch_one(&self.pool)
        .await?;
        Ok(total)
    }

    async fn list_readings(&self, filter: &ReadingFilter, window: Window) -> StoreResult<Vec<Reading>> {
        let rows = sqlx::query_as::<_, Reading>(
            r#"
            SELECT station_id, date, max_temp_c, min_temp_c, precip_cm
            FROM weather
            WHERE ($1::TEXT IS NULL OR station_id = $1)
              AND ($2::DATE IS NULL OR date = $2)
            ORDER BY station_id, date
            LIMIT $3 OFFSET $4
            "#,
        )
        .bind(filter.station_id.as_deref())
        .bind(filter.date)
        .bind(window.limit)
        .bind(window.offset)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn count_stats(&self, filter: &StationYearFilter) -> StoreResult<i64> {
        let total: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM weather_stats
            WHERE ($1::TEXT IS NULL OR station_id = $1)
              AND ($2::INT IS NULL OR year = $2)
            "#,
        )
        .bind(filter.station_id.as_deref())
        .bind(filter.year)
        .fetch_one(&self.pool)
        .await?;
        Ok(total)
    }

    async fn list_stats(&self, filter: &StationYearFilter, window: Window) -> StoreResult<Vec<YearlyStat>> {
        let rows = sqlx::query_as::<_, YearlyStat>(
            r#"
            SELECT station_id, year, avg_max_temp_c, avg_min_temp_c, total_precip_cm,
                   record_count, max_temp_count, min_temp_count, precip_count
            FROM weather_stats
            WHERE ($1::TEXT IS NULL OR station_id = $1)
              AND ($2::INT IS NULL OR year = $2)
            ORDER BY station_id, year
            LIMIT $3 OFFSET $4
            "#,
        )
        .bind(filter.station_id.as_deref())
        .bind(filter.year)
        .bind(window.limit)
        .bind(window.offset)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}
