//! Fleet coordinator.
//!
//! Builds the reconciler, encoder supervisor, telemetry engine and event bus
//! from one [`Config`], runs their periodic loops, and exposes the operations
//! the API layer calls. Constructed once at startup and shared behind an
//! `Arc`; there are no process-wide registries.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::config::Config;
use crate::database::Database;
use crate::errors::{AppError, AppResult, RegistryError};
use crate::models::{
    DroneRecord, EncoderProcessInfo, FleetStats, LifecycleEvent, LifecycleEventType,
    PathRegistration, PathState, SourceSpec, StreamUrls, TelemetrySample, TrajectoryPoint,
};
use crate::relay::RelayApi;
use crate::repositories::{DroneRepository, PathStore, TelemetryRepository, TelemetryStore};
use crate::services::encoder_supervisor::EncoderSupervisor;
use crate::services::event_bus::EventBus;
use crate::services::path_reconciler::{PathReconciler, ReconcilerSettings};
use crate::telemetry::{writer, SampleWriter, TelemetryEngine};

/// Durable stores backing the coordinator
#[derive(Clone)]
pub struct Stores {
    pub drones: Arc<dyn PathStore>,
    pub telemetry: Arc<dyn TelemetryStore>,
}

impl Stores {
    pub fn sqlite(database: &Database) -> Self {
        Self {
            drones: Arc::new(DroneRepository::new(database.pool())),
            telemetry: Arc::new(TelemetryRepository::new(database.pool())),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HealthReport {
    pub relay_healthy: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub relay_detail: Option<String>,
    pub tracked_paths: usize,
    pub active_paths: usize,
    pub encoders: usize,
    pub dropped_events: u64,
}

pub struct FleetCoordinator {
    config: Config,
    relay: Arc<dyn RelayApi>,
    events: Arc<EventBus>,
    reconciler: Arc<PathReconciler>,
    encoders: Arc<EncoderSupervisor>,
    telemetry: Arc<TelemetryEngine>,
    drones: Option<Arc<dyn PathStore>>,
    loops_cancel: CancellationToken,
    writer_cancel: CancellationToken,
    loops: Mutex<Vec<JoinHandle<()>>>,
    writer: Mutex<Option<SampleWriter>>,
    writer_task: Mutex<Option<JoinHandle<()>>>,
}

impl FleetCoordinator {
    pub fn new(config: Config, relay: Arc<dyn RelayApi>, stores: Option<Stores>) -> Self {
        let urls = StreamUrls::new(
            &config.relay.rtsp_base_url,
            &config.relay.hls_base_url,
            &config.relay.ingest_base_url,
        );
        let events = Arc::new(EventBus::new(config.events.capacity));

        let settings = ReconcilerSettings {
            stale_after: config.reconciler.stale_after,
            max_concurrent_fetches: config.relay.max_concurrent_fetches,
        };
        let mut reconciler =
            PathReconciler::new(relay.clone(), events.clone(), urls.clone(), settings);
        let mut telemetry = TelemetryEngine::new(config.telemetry.clone());
        let mut sample_writer = None;
        let mut drones = None;

        if let Some(stores) = stores {
            reconciler = reconciler.with_store(stores.drones.clone());
            let (tx, writer) =
                writer::channel(stores.telemetry.clone(), config.telemetry.persistence_queue);
            telemetry = telemetry.with_persistence(stores.telemetry, tx);
            sample_writer = Some(writer);
            drones = Some(stores.drones);
        }

        Self {
            encoders: Arc::new(EncoderSupervisor::new(&config.encoder, urls)),
            relay,
            events,
            reconciler: Arc::new(reconciler),
            telemetry: Arc::new(telemetry),
            drones,
            loops_cancel: CancellationToken::new(),
            writer_cancel: CancellationToken::new(),
            loops: Mutex::new(Vec::new()),
            writer: Mutex::new(sample_writer),
            writer_task: Mutex::new(None),
            config,
        }
    }

    pub fn reconciler(&self) -> &PathReconciler {
        &self.reconciler
    }

    pub fn encoders(&self) -> &EncoderSupervisor {
        &self.encoders
    }

    pub fn telemetry(&self) -> &TelemetryEngine {
        &self.telemetry
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Spawn the reconcile, telemetry, reaper and persistence tasks
    pub async fn start(&self) {
        let mut loops = self.loops.lock().await;
        if !loops.is_empty() {
            warn!("Fleet coordinator already started");
            return;
        }

        if let Some(writer) = self.writer.lock().await.take() {
            *self.writer_task.lock().await = Some(tokio::spawn(writer.run(self.writer_cancel.clone())));
        }

        loops.push(tokio::spawn(reconcile_loop(
            self.reconciler.clone(),
            self.telemetry.clone(),
            self.config.reconciler.poll_interval,
            self.loops_cancel.clone(),
        )));
        loops.push(tokio::spawn(telemetry_loop(
            self.telemetry.clone(),
            self.config.telemetry.tick_interval,
            self.loops_cancel.clone(),
        )));
        loops.push(tokio::spawn(reaper_loop(
            self.encoders.clone(),
            self.config.encoder.reap_interval,
            self.loops_cancel.clone(),
        )));

        info!(
            "Fleet coordinator started (poll every {:?}, telemetry every {:?})",
            self.config.reconciler.poll_interval, self.config.telemetry.tick_interval
        );
    }

    /// Every tracked path with its last known status, ordered by id
    pub async fn get_active_streams(&self) -> Vec<PathState> {
        self.reconciler.snapshot().await
    }

    pub fn get_telemetry(&self, path_id: &str) -> AppResult<TelemetrySample> {
        self.telemetry
            .get_telemetry(path_id)
            .ok_or_else(|| AppError::not_found("telemetry", path_id))
    }

    pub fn get_all_telemetry(&self) -> HashMap<String, TelemetrySample> {
        self.telemetry.get_all()
    }

    pub fn get_telemetry_history(&self, path_id: &str, limit: usize) -> Vec<TelemetrySample> {
        self.telemetry.get_history(path_id, limit)
    }

    /// Drain the event bus
    pub fn get_events(&self) -> Vec<LifecycleEvent> {
        self.events.drain_all()
    }

    pub fn fleet_stats(&self) -> FleetStats {
        self.telemetry.fleet_stats()
    }

    pub fn trajectories(&self) -> HashMap<String, TrajectoryPoint> {
        self.telemetry.trajectories()
    }

    pub async fn encoder_status(&self, path_id: &str) -> Option<EncoderProcessInfo> {
        self.encoders.status(path_id).await
    }

    pub async fn list_encoders(&self) -> Vec<EncoderProcessInfo> {
        self.encoders.list().await
    }

    pub async fn start_encoder(
        &self,
        path_id: &str,
        source: &SourceSpec,
    ) -> AppResult<EncoderProcessInfo> {
        let info = self.encoders.start(path_id, source).await?;
        if let Some(state) = self.reconciler.get(path_id).await {
            self.save_drone(&state, Some(source)).await;
        }
        Ok(info)
    }

    /// Stop the encoder for a path; `Ok(None)` when none was registered
    pub async fn stop_encoder(&self, path_id: &str) -> AppResult<Option<EncoderProcessInfo>> {
        Ok(self.encoders.stop(path_id).await?)
    }

    /// Register a path ahead of the relay reporting it.
    ///
    /// Relay provisioning failures are logged, not returned; the reconciler
    /// will pick the path up once the relay knows it. An encoder that fails
    /// to start leaves the path registered.
    pub async fn register_path(
        &self,
        path_id: &str,
        registration: PathRegistration,
    ) -> AppResult<PathState> {
        if path_id.trim().is_empty() || path_id.chars().any(char::is_whitespace) {
            return Err(AppError::validation(format!("invalid path id '{path_id}'")));
        }
        if let Some(source) = &registration.source {
            if source.source_type() != registration.source_type {
                return Err(AppError::validation(format!(
                    "source type {} does not match encoder source {}",
                    registration.source_type,
                    source.source_type()
                )));
            }
        }

        let state = self
            .reconciler
            .register_path(path_id, registration.source_type)
            .await?;

        if let Err(e) = self.relay.ensure_path_config(path_id).await {
            warn!("Could not provision relay path {}: {}", path_id, e);
        }
        self.save_drone(&state, registration.source.as_ref()).await;
        self.telemetry.ensure_path(path_id).await;

        if let Some(source) = &registration.source {
            self.encoders.start(path_id, source).await?;
        }
        Ok(state)
    }

    /// Forget a path everywhere except its telemetry history
    pub async fn remove_path(&self, path_id: &str) -> AppResult<()> {
        let encoder = self.encoders.stop(path_id).await?;
        let tracked = self.reconciler.remove_path(path_id).await.is_some();
        let telemetry = self.telemetry.remove_path(path_id);

        if let Err(e) = self.relay.remove_path(path_id).await {
            warn!("Could not remove relay path {}: {}", path_id, e);
        }
        let stored = match &self.drones {
            Some(store) => store.delete_drone(path_id).await?,
            None => false,
        };

        if !(tracked || stored || telemetry || encoder.is_some()) {
            return Err(AppError::not_found("path", path_id));
        }
        info!("Removed path {}", path_id);
        Ok(())
    }

    pub async fn health(&self) -> HealthReport {
        let relay = self.relay.health_check().await;
        let paths = self.reconciler.snapshot().await;
        HealthReport {
            relay_healthy: relay.is_ok(),
            relay_detail: relay.err().map(|e| e.to_string()),
            tracked_paths: paths.len(),
            active_paths: paths.iter().filter(|p| p.is_active()).count(),
            encoders: self.encoders.list().await.len(),
            dropped_events: self.events.dropped_count(),
        }
    }

    /// Re-register every persisted drone and relaunch its encoder.
    ///
    /// Returns how many drones were restored; individual failures are logged
    /// and skipped.
    pub async fn restore_from_store(&self) -> AppResult<usize> {
        let Some(store) = &self.drones else {
            return Ok(0);
        };
        let records = store.list_drones().await?;
        let mut restored = 0;

        for record in records {
            match self
                .reconciler
                .register_path(&record.id, record.source_type)
                .await
            {
                Ok(_) => {}
                Err(RegistryError::DuplicatePath(_)) => {
                    debug!("Path {} already tracked, restoring the rest", record.id)
                }
            }
            if let Err(e) = self.relay.ensure_path_config(&record.id).await {
                warn!("Could not provision relay path {}: {}", record.id, e);
            }
            self.telemetry.ensure_path(&record.id).await;

            if let Some(source) = record.source_spec() {
                if let Err(e) = self.encoders.start(&record.id, &source).await {
                    error!("Could not restart encoder for {}: {}", record.id, e);
                    continue;
                }
            }
            restored += 1;
        }

        info!("Restored {} drones from the database", restored);
        Ok(restored)
    }

    /// Stop loops, encoders and the persistence writer within the configured timeout
    pub async fn shutdown(&self) -> AppResult<()> {
        let timeout = self.config.shutdown.timeout;
        info!("Shutting down fleet coordinator (timeout {:?})", timeout);
        match tokio::time::timeout(timeout, self.shutdown_inner()).await {
            Ok(()) => {
                info!("Fleet coordinator stopped");
                Ok(())
            }
            Err(_) => Err(AppError::internal(format!(
                "shutdown did not finish within {timeout:?}"
            ))),
        }
    }

    async fn shutdown_inner(&self) {
        self.loops_cancel.cancel();
        let loops: Vec<JoinHandle<()>> = self.loops.lock().await.drain(..).collect();
        for result in futures::future::join_all(loops).await {
            if let Err(e) = result {
                error!("Coordinator loop ended abnormally: {}", e);
            }
        }

        let failures = self.encoders.stop_all().await;
        if !failures.is_empty() {
            warn!("{} encoders did not stop cleanly", failures.len());
        }

        self.writer_cancel.cancel();
        let writer_task = self.writer_task.lock().await.take();
        match writer_task {
            Some(task) => {
                if let Err(e) = task.await {
                    error!("Telemetry writer ended abnormally: {}", e);
                }
            }
            // Never started; flush whatever was queued
            None => {
                if let Some(writer) = self.writer.lock().await.take() {
                    writer.run(self.writer_cancel.clone()).await;
                }
            }
        }
    }

    async fn save_drone(&self, state: &PathState, source: Option<&SourceSpec>) {
        let Some(store) = &self.drones else {
            return;
        };
        let urls = self.reconciler.urls();
        let mut record = DroneRecord::from_state(state, urls, source);
        if let Ok(Some(existing)) = store.find_drone(&state.id).await {
            record.created_at = existing.created_at;
        }
        if let Err(e) = store.save_drone(&record).await {
            error!("Failed to save drone {}: {}", state.id, e);
        }
    }
}

async fn reconcile_loop(
    reconciler: Arc<PathReconciler>,
    telemetry: Arc<TelemetryEngine>,
    period: Duration,
    cancel: CancellationToken,
) {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                let events = reconciler.poll().await;
                for event in events
                    .iter()
                    .filter(|e| e.event_type == LifecycleEventType::Created)
                {
                    telemetry.ensure_path(&event.path_id).await;
                }
            }
        }
    }
    debug!("Reconcile loop stopped");
}

async fn telemetry_loop(telemetry: Arc<TelemetryEngine>, period: Duration, cancel: CancellationToken) {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                let samples = telemetry.tick_all();
                trace!("Telemetry tick produced {} samples", samples.len());
            }
        }
    }
    debug!("Telemetry loop stopped");
}

async fn reaper_loop(encoders: Arc<EncoderSupervisor>, period: Duration, cancel: CancellationToken) {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                for info in encoders.reap_exited().await {
                    info!(
                        "Encoder for {} finished ({}, exit code {:?})",
                        info.path_id, info.state, info.exit_code
                    );
                }
            }
        }
    }
    debug!("Reaper loop stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::{RelayApiError, RelayResult};
    use crate::models::{PathStatus, SourceType};
    use crate::relay::{RelayPathDetail, RelayPathSummary};
    use async_trait::async_trait;
    use std::sync::Mutex as StdMutex;

    /// Relay with no paths that records provisioning calls
    #[derive(Default)]
    struct StubRelay {
        configured: StdMutex<Vec<String>>,
        calls: StdMutex<Vec<String>>,
    }

    impl StubRelay {
        fn record(&self, call: String) {
            self.calls.lock().unwrap().push(call);
        }
    }

    fn not_found(name: &str) -> RelayApiError {
        RelayApiError::Status {
            url: format!("stub/{name}"),
            status: 404,
            body: String::new(),
        }
    }

    #[async_trait]
    impl RelayApi for StubRelay {
        async fn list_paths(&self) -> RelayResult<Vec<RelayPathSummary>> {
            Ok(Vec::new())
        }

        async fn get_path(&self, name: &str) -> RelayResult<RelayPathDetail> {
            Err(not_found(name))
        }

        async fn get_path_config(&self, name: &str) -> RelayResult<serde_json::Value> {
            if self.configured.lock().unwrap().iter().any(|n| n == name) {
                Ok(serde_json::json!({ "name": name }))
            } else {
                Err(not_found(name))
            }
        }

        async fn add_path_config(&self, name: &str) -> RelayResult<()> {
            self.record(format!("add {name}"));
            self.configured.lock().unwrap().push(name.to_string());
            Ok(())
        }

        async fn patch_path_config(&self, name: &str) -> RelayResult<()> {
            self.record(format!("patch {name}"));
            Ok(())
        }

        async fn delete_path_config(&self, name: &str) -> RelayResult<()> {
            self.record(format!("delete-config {name}"));
            self.configured.lock().unwrap().retain(|n| n != name);
            Ok(())
        }

        async fn delete_path(&self, name: &str) -> RelayResult<()> {
            Err(not_found(name))
        }

        async fn health_check(&self) -> RelayResult<()> {
            Ok(())
        }
    }

    async fn coordinator() -> (FleetCoordinator, Arc<StubRelay>, Database) {
        let db = Database::in_memory().await;
        let relay = Arc::new(StubRelay::default());
        let coordinator =
            FleetCoordinator::new(Config::default(), relay.clone(), Some(Stores::sqlite(&db)));
        (coordinator, relay, db)
    }

    #[tokio::test]
    async fn test_register_provisions_relay_and_telemetry() {
        let (coordinator, relay, db) = coordinator().await;

        let state = coordinator
            .register_path("drone-1", PathRegistration::publisher())
            .await
            .unwrap();
        assert_eq!(state.status, PathStatus::Inactive);
        assert_eq!(relay.calls.lock().unwrap().as_slice(), ["add drone-1"]);
        assert!(coordinator.get_telemetry("drone-1").is_ok());

        let events = coordinator.get_events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, LifecycleEventType::Created);
        assert!(coordinator.get_events().is_empty());

        let stored = DroneRepository::new(db.pool())
            .find_drone("drone-1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.rtmp_url, "rtmp://localhost:1935/drone-1");

        let duplicate = coordinator
            .register_path("drone-1", PathRegistration::publisher())
            .await;
        assert!(matches!(duplicate, Err(AppError::Registry(_))));
    }

    #[tokio::test]
    async fn test_register_rejects_bad_input() {
        let (coordinator, _, _db) = coordinator().await;
        assert!(matches!(
            coordinator.register_path(" ", PathRegistration::publisher()).await,
            Err(AppError::Validation { .. })
        ));

        let mismatched = PathRegistration {
            source_type: SourceType::Camera,
            source: Some(SourceSpec::Screen),
        };
        assert!(matches!(
            coordinator.register_path("drone-2", mismatched).await,
            Err(AppError::Validation { .. })
        ));
        assert!(coordinator.get_active_streams().await.is_empty());
    }

    #[tokio::test]
    async fn test_missing_file_source_keeps_path_registered() {
        let (coordinator, _, _db) = coordinator().await;
        let registration = PathRegistration::with_encoder(SourceSpec::File {
            path: "missing.mp4".into(),
            looping: false,
        });

        let result = coordinator.register_path("drone-2", registration).await;
        assert!(matches!(
            result,
            Err(AppError::Encoder(crate::errors::EncoderError::InvalidSource { .. }))
        ));
        assert!(coordinator.encoder_status("drone-2").await.is_none());
        assert_eq!(coordinator.get_active_streams().await.len(), 1);
    }

    #[tokio::test]
    async fn test_remove_path() {
        let (coordinator, relay, db) = coordinator().await;
        coordinator
            .register_path("drone-3", PathRegistration::publisher())
            .await
            .unwrap();

        coordinator.remove_path("drone-3").await.unwrap();
        assert!(coordinator.get_active_streams().await.is_empty());
        assert!(matches!(
            coordinator.get_telemetry("drone-3"),
            Err(AppError::NotFound { .. })
        ));
        assert!(relay
            .calls
            .lock()
            .unwrap()
            .contains(&"delete-config drone-3".to_string()));
        assert!(DroneRepository::new(db.pool())
            .find_drone("drone-3")
            .await
            .unwrap()
            .is_none());

        assert!(matches!(
            coordinator.remove_path("drone-3").await,
            Err(AppError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_stop_encoder_without_process_is_noop() {
        let (coordinator, _, _db) = coordinator().await;
        assert!(coordinator.stop_encoder("drone-3").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_restore_from_store() {
        let db = Database::in_memory().await;
        let repo = DroneRepository::new(db.pool());
        let urls = StreamUrls::default();
        let mut state = PathState::new("drone-7", SourceType::Publisher, &urls);
        state.status = PathStatus::Active;
        repo.save_drone(&DroneRecord::from_state(&state, &urls, None))
            .await
            .unwrap();

        let relay = Arc::new(StubRelay::default());
        relay.configured.lock().unwrap().push("drone-7".to_string());
        let coordinator =
            FleetCoordinator::new(Config::default(), relay.clone(), Some(Stores::sqlite(&db)));

        assert_eq!(coordinator.restore_from_store().await.unwrap(), 1);
        let streams = coordinator.get_active_streams().await;
        assert_eq!(streams.len(), 1);
        assert_eq!(streams[0].status, PathStatus::Inactive);
        assert_eq!(relay.calls.lock().unwrap().as_slice(), ["patch drone-7"]);
        assert!(coordinator.get_telemetry("drone-7").is_ok());
    }

    #[tokio::test]
    async fn test_loops_run_and_shutdown_flushes_telemetry() {
        let db = Database::in_memory().await;
        let mut config = Config::default();
        config.telemetry.tick_interval = Duration::from_millis(10);
        let coordinator = FleetCoordinator::new(
            config,
            Arc::new(StubRelay::default()),
            Some(Stores::sqlite(&db)),
        );
        coordinator
            .register_path("drone-1", PathRegistration::publisher())
            .await
            .unwrap();

        coordinator.start().await;
        tokio::time::sleep(Duration::from_millis(100)).await;
        coordinator.shutdown().await.unwrap();

        let ticks = coordinator.get_telemetry_history("drone-1", 1000).len();
        assert!(ticks > 0);
        let persisted = TelemetryRepository::new(db.pool())
            .history("drone-1", 1000)
            .await
            .unwrap();
        assert_eq!(persisted.len(), ticks);
    }

    #[tokio::test]
    async fn test_health_reports_counts() {
        let (coordinator, _, _db) = coordinator().await;
        coordinator
            .register_path("drone-1", PathRegistration::publisher())
            .await
            .unwrap();
        let health = coordinator.health().await;
        assert!(health.relay_healthy);
        assert_eq!(health.tracked_paths, 1);
        assert_eq!(health.active_paths, 0);
        assert_eq!(health.encoders, 0);
    }
}
