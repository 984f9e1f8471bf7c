//! Drone repository implementation

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqliteRow, Pool, Row, Sqlite};

use super::traits::PathStore;
use crate::errors::{RepositoryError, RepositoryResult};
use crate::models::{DroneRecord, PathStatus, SourceType};

pub struct DroneRepository {
    pool: Pool<Sqlite>,
}

impl DroneRepository {
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }

    fn invalid(field: &str, value: String) -> RepositoryError {
        RepositoryError::InvalidValue {
            table: "drones".to_string(),
            field: field.to_string(),
            value,
        }
    }

    fn map_row(row: &SqliteRow) -> RepositoryResult<DroneRecord> {
        let source_type: String = row.try_get("source_type")?;
        let status: String = row.try_get("status")?;
        let created_at: DateTime<Utc> = row.try_get("created_at")?;
        let updated_at: DateTime<Utc> = row.try_get("updated_at")?;

        Ok(DroneRecord {
            id: row.try_get("id")?,
            rtmp_url: row.try_get("rtmp_url")?,
            rtsp_url: row.try_get("rtsp_url")?,
            hls_url: row.try_get("hls_url")?,
            source_type: source_type
                .parse::<SourceType>()
                .map_err(|_| Self::invalid("source_type", source_type.clone()))?,
            status: status
                .parse::<PathStatus>()
                .map_err(|_| Self::invalid("status", status.clone()))?,
            file_path: row.try_get("file_path")?,
            loop_file: row.try_get("loop_file")?,
            created_at,
            updated_at,
        })
    }
}

#[async_trait]
impl PathStore for DroneRepository {
    async fn upsert_path_state(&self, record: &DroneRecord) -> RepositoryResult<()> {
        sqlx::query(
            r#"
            INSERT INTO drones (id, rtmp_url, rtsp_url, hls_url, source_type, status, file_path, loop_file, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                rtsp_url = excluded.rtsp_url,
                hls_url = excluded.hls_url,
                source_type = excluded.source_type,
                status = excluded.status,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&record.id)
        .bind(&record.rtmp_url)
        .bind(&record.rtsp_url)
        .bind(&record.hls_url)
        .bind(record.source_type.as_str())
        .bind(record.status.as_str())
        .bind(&record.file_path)
        .bind(record.loop_file)
        .bind(record.created_at)
        .bind(record.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn save_drone(&self, record: &DroneRecord) -> RepositoryResult<()> {
        sqlx::query(
            r#"
            INSERT INTO drones (id, rtmp_url, rtsp_url, hls_url, source_type, status, file_path, loop_file, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                rtmp_url = excluded.rtmp_url,
                rtsp_url = excluded.rtsp_url,
                hls_url = excluded.hls_url,
                source_type = excluded.source_type,
                status = excluded.status,
                file_path = excluded.file_path,
                loop_file = excluded.loop_file,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&record.id)
        .bind(&record.rtmp_url)
        .bind(&record.rtsp_url)
        .bind(&record.hls_url)
        .bind(record.source_type.as_str())
        .bind(record.status.as_str())
        .bind(&record.file_path)
        .bind(record.loop_file)
        .bind(record.created_at)
        .bind(record.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_drone(&self, id: &str) -> RepositoryResult<Option<DroneRecord>> {
        let row = sqlx::query("SELECT * FROM drones WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(Self::map_row).transpose()
    }

    async fn list_drones(&self) -> RepositoryResult<Vec<DroneRecord>> {
        let rows = sqlx::query("SELECT * FROM drones ORDER BY created_at, id")
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(Self::map_row).collect()
    }

    async fn delete_drone(&self, id: &str) -> RepositoryResult<bool> {
        let result = sqlx::query("DELETE FROM drones WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
