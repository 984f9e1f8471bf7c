//! Telemetry repository implementation
//!
//! Every simulated sample lands in the append-only `positions` table.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqliteRow, Pool, Row, Sqlite};

use super::traits::TelemetryStore;
use crate::errors::{RepositoryError, RepositoryResult};
use crate::models::{TelemetrySample, TelemetryStatus};

const SELECT_COLUMNS: &str =
    "drone_id, timestamp, lat, lon, altitude, speed, battery, signal_strength, status";

pub struct TelemetryRepository {
    pool: Pool<Sqlite>,
}

impl TelemetryRepository {
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }

    fn map_row(row: &SqliteRow) -> RepositoryResult<TelemetrySample> {
        let status: String = row.try_get("status")?;
        let status = status
            .parse::<TelemetryStatus>()
            .map_err(|_| RepositoryError::InvalidValue {
                table: "positions".to_string(),
                field: "status".to_string(),
                value: status,
            })?;
        let timestamp: DateTime<Utc> = row.try_get("timestamp")?;

        Ok(TelemetrySample {
            path_id: row.try_get("drone_id")?,
            latitude: row.try_get("lat")?,
            longitude: row.try_get("lon")?,
            altitude: row.try_get("altitude")?,
            speed: row.try_get("speed")?,
            battery: row.try_get("battery")?,
            signal_strength: row.try_get("signal_strength")?,
            status,
            timestamp,
        })
    }

    fn insert_query(
        sample: &TelemetrySample,
    ) -> sqlx::query::Query<'_, Sqlite, sqlx::sqlite::SqliteArguments<'_>> {
        sqlx::query(
            r#"
            INSERT INTO positions (drone_id, timestamp, lat, lon, altitude, speed, battery, signal_strength, status)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&sample.path_id)
        .bind(sample.timestamp)
        .bind(sample.latitude)
        .bind(sample.longitude)
        .bind(sample.altitude)
        .bind(sample.speed)
        .bind(sample.battery)
        .bind(sample.signal_strength)
        .bind(sample.status.as_str())
    }
}

#[async_trait]
impl TelemetryStore for TelemetryRepository {
    async fn insert_sample(&self, sample: &TelemetrySample) -> RepositoryResult<()> {
        Self::insert_query(sample).execute(&self.pool).await?;
        Ok(())
    }

    async fn insert_samples(&self, samples: &[TelemetrySample]) -> RepositoryResult<()> {
        if samples.is_empty() {
            return Ok(());
        }
        let mut tx = self.pool.begin().await?;
        for sample in samples {
            Self::insert_query(sample).execute(&mut *tx).await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn last_sample(&self, path_id: &str) -> RepositoryResult<Option<TelemetrySample>> {
        let sql = format!(
            "SELECT {SELECT_COLUMNS} FROM positions WHERE drone_id = ? ORDER BY id DESC LIMIT 1"
        );
        let row = sqlx::query(&sql)
            .bind(path_id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(Self::map_row).transpose()
    }

    async fn history(&self, path_id: &str, limit: usize) -> RepositoryResult<Vec<TelemetrySample>> {
        let sql = format!(
            "SELECT {SELECT_COLUMNS} FROM positions WHERE drone_id = ? ORDER BY id DESC LIMIT ?"
        );
        let rows = sqlx::query(&sql)
            .bind(path_id)
            .bind(i64::try_from(limit).unwrap_or(i64::MAX))
            .fetch_all(&self.pool)
            .await?;
        let mut samples = rows
            .iter()
            .map(Self::map_row)
            .collect::<RepositoryResult<Vec<_>>>()?;
        samples.reverse();
        Ok(samples)
    }
}
