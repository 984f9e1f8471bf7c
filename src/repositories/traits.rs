//! Repository trait definitions

use async_trait::async_trait;

use crate::errors::RepositoryResult;
use crate::models::{DroneRecord, TelemetrySample};

/// Durable, append-only telemetry history
#[async_trait]
pub trait TelemetryStore: Send + Sync {
    async fn insert_sample(&self, sample: &TelemetrySample) -> RepositoryResult<()>;

    /// Insert a batch in one transaction
    async fn insert_samples(&self, samples: &[TelemetrySample]) -> RepositoryResult<()>;

    /// Most recent persisted sample for a path, used to seed a restarted model
    async fn last_sample(&self, path_id: &str) -> RepositoryResult<Option<TelemetrySample>>;

    /// Up to `limit` most recent samples, oldest first
    async fn history(&self, path_id: &str, limit: usize) -> RepositoryResult<Vec<TelemetrySample>>;
}

/// One durable row per path
#[async_trait]
pub trait PathStore: Send + Sync {
    /// Upsert the fields the reconciler owns (urls, source type, status),
    /// leaving any stored encoder source untouched
    async fn upsert_path_state(&self, record: &DroneRecord) -> RepositoryResult<()>;

    /// Insert or fully replace a row, including its encoder source
    async fn save_drone(&self, record: &DroneRecord) -> RepositoryResult<()>;

    async fn find_drone(&self, id: &str) -> RepositoryResult<Option<DroneRecord>>;

    async fn list_drones(&self) -> RepositoryResult<Vec<DroneRecord>>;

    /// Returns false when no row existed
    async fn delete_drone(&self, id: &str) -> RepositoryResult<bool>;
}
