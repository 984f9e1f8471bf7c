//! Telemetry simulation engine.
//!
//! Owns one [`DroneModel`] and one bounded history ring per path. Ticking is
//! synchronous and never suspends; durable writes are handed off to the
//! [`SampleWriter`](super::writer::SampleWriter) queue.

use fastrand::Rng;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Instant;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, info, warn};

use super::model::DroneModel;
use crate::config::TelemetryConfig;
use crate::errors::RepositoryError;
use crate::models::{FleetStats, TelemetrySample, TrajectoryPoint};
use crate::repositories::TelemetryStore;

struct TrackedDrone {
    model: DroneModel,
    history: VecDeque<TelemetrySample>,
}

struct EngineState {
    drones: HashMap<String, TrackedDrone>,
    rng: Rng,
}

pub struct TelemetryEngine {
    config: TelemetryConfig,
    state: RwLock<EngineState>,
    store: Option<Arc<dyn TelemetryStore>>,
    writer: Option<mpsc::Sender<TelemetrySample>>,
    started: Instant,
}

impl TelemetryEngine {
    pub fn new(config: TelemetryConfig) -> Self {
        Self::with_rng(config, Rng::new())
    }

    /// Engine with a fixed random seed, for reproducible simulations
    pub fn with_seed(config: TelemetryConfig, seed: u64) -> Self {
        Self::with_rng(config, Rng::with_seed(seed))
    }

    fn with_rng(config: TelemetryConfig, rng: Rng) -> Self {
        Self {
            config,
            state: RwLock::new(EngineState {
                drones: HashMap::new(),
                rng,
            }),
            store: None,
            writer: None,
            started: Instant::now(),
        }
    }

    /// Seed new models from `store` and queue every sample on `writer`
    pub fn with_persistence(
        mut self,
        store: Arc<dyn TelemetryStore>,
        writer: mpsc::Sender<TelemetrySample>,
    ) -> Self {
        self.store = Some(store);
        self.writer = Some(writer);
        self
    }

    pub fn config(&self) -> &TelemetryConfig {
        &self.config
    }

    fn read(&self) -> RwLockReadGuard<'_, EngineState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, EngineState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Create (or re-seed) the model for a path.
    ///
    /// The last persisted sample, when there is one, wins over the given
    /// position so a restarted process resumes where the drone left off.
    pub async fn add_path(&self, path_id: &str, lat: f64, lon: f64) {
        let seed = match &self.store {
            Some(store) => match store.last_sample(path_id).await {
                Ok(seed) => seed,
                Err(e) => {
                    warn!("Could not load last telemetry for {}: {}", path_id, e);
                    None
                }
            },
            None => None,
        };

        let mut state = self.write();
        let EngineState { drones, rng } = &mut *state;
        let walk = &self.config.random_walk;
        let model = match &seed {
            Some(sample) => {
                debug!("Seeding telemetry for {} from persisted sample", path_id);
                DroneModel::from_seed(rng, sample, walk)
            }
            None => DroneModel::new(rng, path_id, lat, lon, walk),
        };
        info!(
            "Tracking telemetry for {} ({} pattern)",
            path_id,
            model.pattern().name()
        );

        match drones.get_mut(path_id) {
            Some(tracked) => tracked.model = model,
            None => {
                drones.insert(
                    path_id.to_string(),
                    TrackedDrone {
                        model,
                        history: VecDeque::new(),
                    },
                );
            }
        }
    }

    /// Add a model at the default position unless one already exists; true when added
    pub async fn ensure_path(&self, path_id: &str) -> bool {
        if self.contains(path_id) {
            return false;
        }
        self.add_path(
            path_id,
            self.config.default_latitude,
            self.config.default_longitude,
        )
        .await;
        true
    }

    /// Drop the in-memory model and ring; persisted history stays
    pub fn remove_path(&self, path_id: &str) -> bool {
        let removed = self.write().drones.remove(path_id).is_some();
        if removed {
            info!("Stopped tracking telemetry for {}", path_id);
        }
        removed
    }

    pub fn contains(&self, path_id: &str) -> bool {
        self.read().drones.contains_key(path_id)
    }

    pub fn path_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.read().drones.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Advance one path to `elapsed` seconds of flight time
    pub fn tick(&self, path_id: &str, elapsed: f64) -> Option<TelemetrySample> {
        let sample = {
            let mut state = self.write();
            let EngineState { drones, rng } = &mut *state;
            let tracked = drones.get_mut(path_id)?;
            self.advance(tracked, rng, elapsed)
        };
        self.persist(std::slice::from_ref(&sample));
        Some(sample)
    }

    /// Advance every path using the time since the engine was created
    pub fn tick_all(&self) -> Vec<TelemetrySample> {
        let elapsed = self.started.elapsed().as_secs_f64();
        let samples: Vec<TelemetrySample> = {
            let mut state = self.write();
            let EngineState { drones, rng } = &mut *state;
            drones
                .values_mut()
                .map(|tracked| self.advance(tracked, rng, elapsed))
                .collect()
        };
        self.persist(&samples);
        samples
    }

    fn advance(&self, tracked: &mut TrackedDrone, rng: &mut Rng, elapsed: f64) -> TelemetrySample {
        let sample = tracked.model.advance(rng, elapsed, &self.config.random_walk);
        tracked.history.push_back(sample.clone());
        while tracked.history.len() > self.config.history_size.max(1) {
            tracked.history.pop_front();
        }
        sample
    }

    fn persist(&self, samples: &[TelemetrySample]) {
        let Some(writer) = &self.writer else {
            return;
        };
        for sample in samples {
            if let Err(e) = writer.try_send(sample.clone()) {
                let message = match e {
                    TrySendError::Full(_) => "writer queue full",
                    TrySendError::Closed(_) => "writer stopped",
                };
                let error = RepositoryError::QueueUnavailable {
                    message: message.to_string(),
                };
                warn!("Telemetry for {} not persisted: {}", sample.path_id, error);
            }
        }
    }

    /// Latest reading for a path
    pub fn get_telemetry(&self, path_id: &str) -> Option<TelemetrySample> {
        self.read()
            .drones
            .get(path_id)
            .map(|tracked| tracked.model.current().clone())
    }

    pub fn get_all(&self) -> HashMap<String, TelemetrySample> {
        self.read()
            .drones
            .iter()
            .map(|(id, tracked)| (id.clone(), tracked.model.current().clone()))
            .collect()
    }

    /// Up to `limit` of the most recent ticks, oldest first
    pub fn get_history(&self, path_id: &str, limit: usize) -> Vec<TelemetrySample> {
        let state = self.read();
        let Some(tracked) = state.drones.get(path_id) else {
            return Vec::new();
        };
        let skip = tracked.history.len().saturating_sub(limit);
        tracked.history.iter().skip(skip).cloned().collect()
    }

    pub fn fleet_stats(&self) -> FleetStats {
        let state = self.read();
        FleetStats::from_samples(state.drones.values().map(|t| t.model.current()))
    }

    /// Latest position of every tracked path
    pub fn trajectories(&self) -> HashMap<String, TrajectoryPoint> {
        self.read()
            .drones
            .iter()
            .map(|(id, tracked)| (id.clone(), TrajectoryPoint::from(tracked.model.current())))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::Database;
    use crate::models::TelemetryStatus;
    use crate::repositories::TelemetryRepository;
    use crate::telemetry::writer;
    use chrono::Utc;

    fn engine() -> TelemetryEngine {
        TelemetryEngine::with_seed(TelemetryConfig::default(), 7)
    }

    #[tokio::test]
    async fn test_history_is_bounded_to_most_recent() {
        let engine = engine();
        engine.add_path("drone-1", 43.0, 76.0).await;

        let mut last = None;
        for step in 0..1200 {
            last = engine.tick("drone-1", step as f64);
        }

        let history = engine.get_history("drone-1", 10_000);
        assert_eq!(history.len(), 1000);
        assert_eq!(history.last(), last.as_ref());
        assert_eq!(engine.get_history("drone-1", 3).len(), 3);
    }

    #[tokio::test]
    async fn test_ticks_respect_clamps() {
        let engine = engine();
        engine.add_path("a", 43.0, 76.0).await;
        engine.add_path("b", 44.0, 77.0).await;

        let mut previous = engine.get_all();
        for _ in 0..300 {
            let samples = engine.tick_all();
            assert_eq!(samples.len(), 2);
            for sample in samples {
                assert!((50.0..=150.0).contains(&sample.altitude));
                assert!((5.0..=15.0).contains(&sample.speed));
                assert!((0.0..=100.0).contains(&sample.signal_strength));
                assert!(sample.battery <= previous[&sample.path_id].battery);
                previous.insert(sample.path_id.clone(), sample);
            }
        }
    }

    #[tokio::test]
    async fn test_unknown_path() {
        let engine = engine();
        assert!(engine.tick("ghost", 1.0).is_none());
        assert!(engine.get_telemetry("ghost").is_none());
        assert!(engine.get_history("ghost", 10).is_empty());
        assert_eq!(engine.fleet_stats().active_drones, 0);
    }

    #[tokio::test]
    async fn test_remove_keeps_nothing_in_memory() {
        let engine = engine();
        assert!(engine.ensure_path("drone-1").await);
        assert!(!engine.ensure_path("drone-1").await);
        engine.tick("drone-1", 1.0);

        assert!(engine.remove_path("drone-1"));
        assert!(!engine.remove_path("drone-1"));
        assert!(engine.get_telemetry("drone-1").is_none());
        assert!(engine.path_ids().is_empty());
    }

    #[tokio::test]
    async fn test_fleet_views() {
        let engine = engine();
        engine.add_path("a", 43.0, 76.0).await;
        engine.add_path("b", 44.0, 77.0).await;
        engine.tick_all();

        let stats = engine.fleet_stats();
        assert_eq!(stats.active_drones, 2);
        assert!((50.0..=150.0).contains(&stats.avg_altitude));

        let trajectories = engine.trajectories();
        assert_eq!(trajectories.len(), 2);
        assert_eq!(trajectories["a"].lat, engine.get_telemetry("a").unwrap().latitude);
    }

    #[tokio::test]
    async fn test_seeded_from_last_persisted_sample() {
        let db = Database::in_memory().await;
        let repo = Arc::new(TelemetryRepository::new(db.pool()));
        repo.insert_sample(&TelemetrySample {
            path_id: "drone-9".to_string(),
            latitude: 10.0,
            longitude: 20.0,
            altitude: 120.0,
            speed: 7.0,
            battery: 33.0,
            signal_strength: 25.0,
            status: TelemetryStatus::LowSignal,
            timestamp: Utc::now(),
        })
        .await
        .unwrap();

        let (tx, _writer) = writer::channel(repo.clone(), 8);
        let engine = engine().with_persistence(repo, tx);
        engine.add_path("drone-9", 43.0, 76.0).await;

        let seeded = engine.get_telemetry("drone-9").unwrap();
        assert_eq!(seeded.latitude, 10.0);
        assert_eq!(seeded.battery, 33.0);
        assert_eq!(seeded.status, TelemetryStatus::LowSignal);

        let next = engine.tick("drone-9", 1.0).unwrap();
        assert!(next.battery < 33.0);
    }

    #[tokio::test]
    async fn test_full_queue_does_not_lose_live_view() {
        let db = Database::in_memory().await;
        let repo = Arc::new(TelemetryRepository::new(db.pool()));
        let (tx, _writer) = writer::channel(repo.clone(), 1);
        let engine = engine().with_persistence(repo, tx);
        engine.add_path("drone-1", 43.0, 76.0).await;

        for step in 0..5 {
            engine.tick("drone-1", step as f64);
        }
        assert_eq!(engine.get_history("drone-1", 10).len(), 5);
    }
}
