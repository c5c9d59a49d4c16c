//! Database schema management for `wx-analytics`.
//!
//! Ensures required tables and indexes exist before ingesting or serving.
//! Applied once per process from `PgStore::connect`.

use sqlx::PgPool;

// ---

/// Create the schema (idempotent).
///
/// Creates the `weather` table for daily readings and `weather_stats` for
/// yearly aggregates. The unique constraints are what the upserts resolve
/// against. Safe to call on every startup, even from concurrent processes.
pub async fn create_schema(pool: &PgPool) -> Result<(), sqlx::Error> {
    // ---
    let mut tx = pool.begin().await?;

    // Serialize concurrent first-time setup
    sqlx::query("SELECT pg_advisory_xact_lock(727274)")
        .execute(&mut *tx)
        .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS weather (
            id          BIGSERIAL PRIMARY KEY,
            station_id  TEXT             NOT NULL,
            date        DATE             NOT NULL,
            max_temp_c  DOUBLE PRECISION,
            min_temp_c  DOUBLE PRECISION,
            precip_cm   DOUBLE PRECISION,
            CONSTRAINT uix_station_date UNIQUE (station_id, date)
        );
        "#,
    )
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS weather_stats (
            id               BIGSERIAL PRIMARY KEY,
            station_id       TEXT             NOT NULL,
            year             INTEGER          NOT NULL,
            avg_max_temp_c   DOUBLE PRECISION,
            avg_min_temp_c   DOUBLE PRECISION,
            total_precip_cm  DOUBLE PRECISION,
            record_count     BIGINT           NOT NULL,
            max_temp_count   BIGINT           NOT NULL,
            min_temp_count   BIGINT           NOT NULL,
            precip_count     BIGINT           NOT NULL,
            CONSTRAINT uix_station_year UNIQUE (station_id, year)
        );
        "#,
    )
    .execute(&mut *tx)
    .await?;

    // Date and year lookups from the query API
    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_weather_date
            ON weather (date);
        "#,
    )
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_weather_stats_year
            ON weather_stats (year);
        "#,
    )
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(())
}
