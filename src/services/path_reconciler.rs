//! Path liveness reconciliation against the media relay.
//!
//! Each [`PathReconciler::poll`] lists the relay's paths, fetches their
//! details concurrently, and then applies every change under a single write
//! lock so readers never see a half-updated path. Transport failures leave
//! the last known state in place.

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, error, info, warn};

use crate::errors::RegistryError;
use crate::models::{
    DroneRecord, LifecycleEvent, LifecycleEventType, PathState, PathStatus, SourceType,
    StreamUrls,
};
use crate::relay::{RelayApi, RelayPathDetail};
use crate::repositories::PathStore;
use crate::services::event_bus::EventBus;

#[derive(Debug, Clone)]
pub struct ReconcilerSettings {
    /// Active paths absent from the listing for longer than this are ended
    pub stale_after: Duration,
    pub max_concurrent_fetches: usize,
}

impl Default for ReconcilerSettings {
    fn default() -> Self {
        use crate::config::defaults::*;
        Self {
            stale_after: Duration::from_secs(DEFAULT_STALE_AFTER_SECS),
            max_concurrent_fetches: DEFAULT_MAX_CONCURRENT_FETCHES,
        }
    }
}

pub struct PathReconciler {
    client: Arc<dyn RelayApi>,
    events: Arc<EventBus>,
    store: Option<Arc<dyn PathStore>>,
    urls: StreamUrls,
    settings: ReconcilerSettings,
    paths: RwLock<HashMap<String, PathState>>,
    /// Serializes polls so updates land in poll order
    poll_lock: Mutex<()>,
}

impl PathReconciler {
    pub fn new(
        client: Arc<dyn RelayApi>,
        events: Arc<EventBus>,
        urls: StreamUrls,
        settings: ReconcilerSettings,
    ) -> Self {
        Self {
            client,
            events,
            store: None,
            urls,
            settings,
            paths: RwLock::new(HashMap::new()),
            poll_lock: Mutex::new(()),
        }
    }

    pub fn with_store(mut self, store: Arc<dyn PathStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn urls(&self) -> &StreamUrls {
        &self.urls
    }

    /// Fetch a relay snapshot and fold it into the path map.
    ///
    /// Never fails: a list failure freezes state until the next poll, a
    /// failed or malformed detail skips only that path. Returns the events
    /// that were published.
    pub async fn poll(&self) -> Vec<LifecycleEvent> {
        let _poll = self.poll_lock.lock().await;

        let summaries = match self.client.list_paths().await {
            Ok(summaries) => summaries,
            Err(e) => {
                warn!("Relay path listing failed, keeping last known state: {}", e);
                return Vec::new();
            }
        };

        let names: Vec<String> = summaries.into_iter().map(|s| s.name).collect();
        let mut fetched: Vec<(usize, String, _)> = stream::iter(names.iter().cloned().enumerate())
            .map(|(index, name)| {
                let client = self.client.clone();
                async move {
                    let result = client.get_path(&name).await;
                    (index, name, result)
                }
            })
            .buffer_unordered(self.settings.max_concurrent_fetches.max(1))
            .collect()
            .await;
        fetched.sort_by_key(|(index, _, _)| *index);

        let listed: HashSet<String> = names.into_iter().collect();
        let mut details = Vec::with_capacity(fetched.len());
        for (_, name, result) in fetched {
            match result {
                Ok(detail) => details.push((name, detail)),
                Err(e) => warn!("Skipping path {} this poll: {}", name, e),
            }
        }

        let now = Utc::now();
        let mut emitted = Vec::new();
        let mut changed = Vec::new();
        {
            let mut paths = self.paths.write().await;
            for (name, detail) in &details {
                if let Some(state) =
                    self.apply_detail(&mut paths, name, detail, now, &mut emitted)
                {
                    changed.push(state);
                }
            }
            changed.extend(self.mark_stale(&mut paths, &listed, now, &mut emitted));

            for event in &mut emitted {
                event.sequence = self.events.publish(event.clone());
            }
        }

        if !emitted.is_empty() {
            debug!("Poll emitted {} lifecycle events", emitted.len());
        }
        self.persist(&changed).await;
        emitted
    }

    fn apply_detail(
        &self,
        paths: &mut HashMap<String, PathState>,
        name: &str,
        detail: &RelayPathDetail,
        now: DateTime<Utc>,
        emitted: &mut Vec<LifecycleEvent>,
    ) -> Option<PathState> {
        let publisher_count = detail.publisher_count();
        let status = PathStatus::from_publishers(publisher_count);

        if !paths.contains_key(name) {
            let mut state = PathState::new(name, observed_source_type(detail, None), &self.urls);
            state.publisher_count = publisher_count;
            state.reader_count = detail.reader_count();
            state.status = status;
            state.ready_time = detail.ready_time.clone();
            state.source_id = source_id(detail);
            state.last_seen = Some(now);
            if state.is_active() {
                state.start_time = Some(now);
            }

            info!("Discovered path {} ({})", name, state.status);
            emitted.push(LifecycleEvent::new(LifecycleEventType::Created, &state));
            if state.is_active() {
                emitted.push(LifecycleEvent::new(LifecycleEventType::Started, &state));
            }
            paths.insert(name.to_string(), state.clone());
            return Some(state);
        }

        let state = paths.get_mut(name)?;

        let previous_status = state.status;
        let previous_source = state.source_type;
        let previous_ready = state.ready_time.take();
        let previous_source_id = state.source_id.take();

        state.publisher_count = publisher_count;
        state.reader_count = detail.reader_count();
        state.status = status;
        state.source_type = observed_source_type(detail, Some(previous_source));
        state.ready_time = detail.ready_time.clone();
        state.source_id = source_id(detail);
        state.last_seen = Some(now);

        let restarted = match (&previous_ready, &state.ready_time) {
            (Some(before), Some(after)) => before != after,
            _ => matches!(
                (&previous_source_id, &state.source_id),
                (Some(before), Some(after)) if before != after
            ),
        };
        if status == PathStatus::Active && state.ready_time.is_none() && state.source_id.is_none() {
            debug!("Path {} reports neither readyTime nor a source id, restarts go unnoticed", name);
        }

        let transition = match (previous_status, status) {
            (PathStatus::Inactive, PathStatus::Active) => {
                if state.start_time.is_none() {
                    state.start_time = Some(now);
                }
                Some(LifecycleEventType::Started)
            }
            (PathStatus::Active, PathStatus::Inactive) => Some(LifecycleEventType::Ended),
            (PathStatus::Active, PathStatus::Active) if restarted => {
                Some(LifecycleEventType::Restarted)
            }
            _ => None,
        };

        if let Some(event_type) = transition {
            info!("Path {} {}", name, event_type);
            emitted.push(LifecycleEvent::new(event_type, state));
        }

        (previous_status != state.status || previous_source != state.source_type)
            .then(|| state.clone())
    }

    fn mark_stale(
        &self,
        paths: &mut HashMap<String, PathState>,
        listed: &HashSet<String>,
        now: DateTime<Utc>,
        emitted: &mut Vec<LifecycleEvent>,
    ) -> Vec<PathState> {
        let mut changed = Vec::new();

        for state in paths.values_mut() {
            if !state.is_active() || listed.contains(&state.id) {
                continue;
            }
            let expired = state.last_seen.map_or(true, |seen| {
                now.signed_duration_since(seen)
                    .to_std()
                    .map_or(false, |missing_for| missing_for > self.settings.stale_after)
            });
            if !expired {
                continue;
            }
            info!(
                "Path {} missing from relay since {:?}, marking inactive",
                state.id, state.last_seen
            );
            state.publisher_count = 0;
            state.status = PathStatus::Inactive;
            emitted.push(LifecycleEvent::new(LifecycleEventType::Ended, state));
            changed.push(state.clone());
        }
        changed
    }

    async fn persist(&self, changed: &[PathState]) {
        let Some(store) = &self.store else {
            return;
        };
        for state in changed {
            let record = DroneRecord::from_state(state, &self.urls, None);
            if let Err(e) = store.upsert_path_state(&record).await {
                error!("Failed to persist state of path {}: {}", state.id, e);
            }
        }
    }

    /// Track a path before the relay reports it
    pub async fn register_path(
        &self,
        id: &str,
        source_type: SourceType,
    ) -> Result<PathState, RegistryError> {
        let state = {
            let mut paths = self.paths.write().await;
            if paths.contains_key(id) {
                return Err(RegistryError::DuplicatePath(id.to_string()));
            }
            let state = PathState::new(id, source_type, &self.urls);
            paths.insert(id.to_string(), state.clone());
            self.events
                .publish(LifecycleEvent::new(LifecycleEventType::Created, &state));
            state
        };

        info!("Registered path {} ({})", id, source_type);
        self.persist(std::slice::from_ref(&state)).await;
        Ok(state)
    }

    /// Forget a path; returns its last state if it was tracked
    pub async fn remove_path(&self, id: &str) -> Option<PathState> {
        let removed = self.paths.write().await.remove(id);
        if removed.is_some() {
            info!("Removed path {}", id);
        }
        removed
    }

    pub async fn get(&self, id: &str) -> Option<PathState> {
        self.paths.read().await.get(id).cloned()
    }

    pub async fn contains(&self, id: &str) -> bool {
        self.paths.read().await.contains_key(id)
    }

    /// Every tracked path, ordered by id
    pub async fn snapshot(&self) -> Vec<PathState> {
        let mut paths: Vec<PathState> = self.paths.read().await.values().cloned().collect();
        paths.sort_by(|a, b| a.id.cmp(&b.id));
        paths
    }

    pub async fn active_paths(&self) -> Vec<PathState> {
        let mut paths = self.snapshot().await;
        paths.retain(PathState::is_active);
        paths
    }
}

fn source_id(detail: &RelayPathDetail) -> Option<String> {
    detail.source.as_ref().and_then(|source| source.id.clone())
}

/// The relay only knows that someone publishes; keep the more specific
/// type when we launched the encoder ourselves
fn observed_source_type(detail: &RelayPathDetail, previous: Option<SourceType>) -> SourceType {
    match (detail.source.is_some(), previous) {
        (true, Some(previous)) if previous.is_encoder_backed() => previous,
        (true, _) => SourceType::Publisher,
        (false, Some(previous)) => previous,
        (false, None) => SourceType::Unknown,
    }
}
