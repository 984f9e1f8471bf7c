use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{info, warn};

pub mod defaults;
pub mod duration_serde;

use defaults::*;
use duration_serde::duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub relay: RelayConfig,
    #[serde(default)]
    pub reconciler: ReconcilerConfig,
    #[serde(default)]
    pub encoder: EncoderConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
    #[serde(default)]
    pub events: EventBusConfig,
    #[serde(default)]
    pub shutdown: ShutdownConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_database_url")]
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

/// Media-relay control API connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayConfig {
    /// Control API base, including the version prefix (e.g. `http://localhost:9997/v3`)
    #[serde(default = "default_relay_api_url")]
    pub api_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(with = "duration", default = "default_relay_request_timeout")]
    pub request_timeout: Duration,
    #[serde(default = "default_rtsp_base_url")]
    pub rtsp_base_url: String,
    #[serde(default = "default_hls_base_url")]
    pub hls_base_url: String,
    /// Where encoders push their output; the path id is appended
    #[serde(default = "default_ingest_base_url")]
    pub ingest_base_url: String,
    #[serde(default = "default_max_concurrent_fetches")]
    pub max_concurrent_fetches: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconcilerConfig {
    #[serde(with = "duration", default = "default_poll_interval")]
    pub poll_interval: Duration,
    /// Active paths missing from the relay listing for longer than this are marked inactive
    #[serde(with = "duration", default = "default_stale_after")]
    pub stale_after: Duration,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncoderConfig {
    #[serde(default = "default_ffmpeg_command")]
    pub ffmpeg_command: String,
    /// Substring in encoder stderr that marks frame production
    #[serde(default = "default_readiness_marker")]
    pub readiness_marker: String,
    #[serde(with = "duration", default = "default_stop_timeout")]
    pub stop_timeout: Duration,
    #[serde(with = "duration", default = "default_reap_interval")]
    pub reap_interval: Duration,
    #[serde(default = "default_camera_device")]
    pub camera_device: String,
    #[serde(default = "default_screen_device")]
    pub screen_device: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    #[serde(with = "duration", default = "default_tick_interval")]
    pub tick_interval: Duration,
    #[serde(default = "default_history_size")]
    pub history_size: usize,
    #[serde(default = "default_latitude")]
    pub default_latitude: f64,
    #[serde(default = "default_longitude")]
    pub default_longitude: f64,
    #[serde(default = "default_persistence_queue")]
    pub persistence_queue: usize,
    #[serde(default)]
    pub random_walk: RandomWalkConfig,
}

/// Step sizes and clamp bounds for the simulated telemetry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RandomWalkConfig {
    #[serde(default = "default_altitude_step")]
    pub altitude_step: f64,
    #[serde(default = "default_altitude_min")]
    pub altitude_min: f64,
    #[serde(default = "default_altitude_max")]
    pub altitude_max: f64,
    #[serde(default = "default_speed_step")]
    pub speed_step: f64,
    #[serde(default = "default_speed_min")]
    pub speed_min: f64,
    #[serde(default = "default_speed_max")]
    pub speed_max: f64,
    #[serde(default = "default_battery_drain_min")]
    pub battery_drain_min: f64,
    #[serde(default = "default_battery_drain_max")]
    pub battery_drain_max: f64,
    #[serde(default = "default_signal_step")]
    pub signal_step: f64,
    #[serde(default = "default_low_signal_threshold")]
    pub low_signal_threshold: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventBusConfig {
    #[serde(default = "default_event_capacity")]
    pub capacity: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShutdownConfig {
    /// Upper bound for cancelling loops and stopping every encoder
    #[serde(with = "duration", default = "default_shutdown_timeout")]
    pub timeout: Duration,
}

fn default_database_url() -> String {
    DEFAULT_DATABASE_URL.to_string()
}
fn default_max_connections() -> u32 {
    DEFAULT_MAX_CONNECTIONS
}
fn default_relay_api_url() -> String {
    DEFAULT_RELAY_API_URL.to_string()
}
fn default_relay_request_timeout() -> Duration {
    Duration::from_secs(DEFAULT_RELAY_REQUEST_TIMEOUT_SECS)
}
fn default_rtsp_base_url() -> String {
    DEFAULT_RTSP_BASE_URL.to_string()
}
fn default_hls_base_url() -> String {
    DEFAULT_HLS_BASE_URL.to_string()
}
fn default_ingest_base_url() -> String {
    DEFAULT_INGEST_BASE_URL.to_string()
}
fn default_max_concurrent_fetches() -> usize {
    DEFAULT_MAX_CONCURRENT_FETCHES
}
fn default_poll_interval() -> Duration {
    Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS)
}
fn default_stale_after() -> Duration {
    Duration::from_secs(DEFAULT_STALE_AFTER_SECS)
}
fn default_ffmpeg_command() -> String {
    DEFAULT_FFMPEG_COMMAND.to_string()
}
fn default_readiness_marker() -> String {
    DEFAULT_READINESS_MARKER.to_string()
}
fn default_stop_timeout() -> Duration {
    Duration::from_secs(DEFAULT_STOP_TIMEOUT_SECS)
}
fn default_reap_interval() -> Duration {
    Duration::from_secs(DEFAULT_REAP_INTERVAL_SECS)
}
fn default_camera_device() -> String {
    DEFAULT_CAMERA_DEVICE.to_string()
}
fn default_screen_device() -> String {
    DEFAULT_SCREEN_DEVICE.to_string()
}
fn default_tick_interval() -> Duration {
    Duration::from_secs(DEFAULT_TICK_INTERVAL_SECS)
}
fn default_history_size() -> usize {
    DEFAULT_HISTORY_SIZE
}
fn default_latitude() -> f64 {
    DEFAULT_LATITUDE
}
fn default_longitude() -> f64 {
    DEFAULT_LONGITUDE
}
fn default_persistence_queue() -> usize {
    DEFAULT_PERSISTENCE_QUEUE
}
fn default_altitude_step() -> f64 {
    DEFAULT_ALTITUDE_STEP
}
fn default_altitude_min() -> f64 {
    DEFAULT_ALTITUDE_MIN
}
fn default_altitude_max() -> f64 {
    DEFAULT_ALTITUDE_MAX
}
fn default_speed_step() -> f64 {
    DEFAULT_SPEED_STEP
}
fn default_speed_min() -> f64 {
    DEFAULT_SPEED_MIN
}
fn default_speed_max() -> f64 {
    DEFAULT_SPEED_MAX
}
fn default_battery_drain_min() -> f64 {
    DEFAULT_BATTERY_DRAIN_MIN
}
fn default_battery_drain_max() -> f64 {
    DEFAULT_BATTERY_DRAIN_MAX
}
fn default_signal_step() -> f64 {
    DEFAULT_SIGNAL_STEP
}
fn default_low_signal_threshold() -> f64 {
    DEFAULT_LOW_SIGNAL_THRESHOLD
}
fn default_event_capacity() -> usize {
    DEFAULT_EVENT_CAPACITY
}
fn default_shutdown_timeout() -> Duration {
    Duration::from_secs(DEFAULT_SHUTDOWN_TIMEOUT_SECS)
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_database_url(),
            max_connections: default_max_connections(),
        }
    }
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            api_url: default_relay_api_url(),
            username: None,
            password: None,
            request_timeout: default_relay_request_timeout(),
            rtsp_base_url: default_rtsp_base_url(),
            hls_base_url: default_hls_base_url(),
            ingest_base_url: default_ingest_base_url(),
            max_concurrent_fetches: default_max_concurrent_fetches(),
        }
    }
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            poll_interval: default_poll_interval(),
            stale_after: default_stale_after(),
        }
    }
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            ffmpeg_command: default_ffmpeg_command(),
            readiness_marker: default_readiness_marker(),
            stop_timeout: default_stop_timeout(),
            reap_interval: default_reap_interval(),
            camera_device: default_camera_device(),
            screen_device: default_screen_device(),
        }
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            tick_interval: default_tick_interval(),
            history_size: default_history_size(),
            default_latitude: default_latitude(),
            default_longitude: default_longitude(),
            persistence_queue: default_persistence_queue(),
            random_walk: RandomWalkConfig::default(),
        }
    }
}

impl Default for RandomWalkConfig {
    fn default() -> Self {
        Self {
            altitude_step: default_altitude_step(),
            altitude_min: default_altitude_min(),
            altitude_max: default_altitude_max(),
            speed_step: default_speed_step(),
            speed_min: default_speed_min(),
            speed_max: default_speed_max(),
            battery_drain_min: default_battery_drain_min(),
            battery_drain_max: default_battery_drain_max(),
            signal_step: default_signal_step(),
            low_signal_threshold: default_low_signal_threshold(),
        }
    }
}

impl Default for EventBusConfig {
    fn default() -> Self {
        Self {
            capacity: default_event_capacity(),
        }
    }
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            timeout: default_shutdown_timeout(),
        }
    }
}

impl Config {
    pub fn load_from_file(config_file: &str) -> Result<Self> {
        let mut config = if std::path::Path::new(&config_file).exists() {
            let contents = std::fs::read_to_string(config_file)?;
            toml::from_str::<Self>(&contents)?
        } else {
            let default_config = Self::default();
            let contents = toml::to_string_pretty(&default_config)?;
            std::fs::write(config_file, contents)?;
            info!("Created default config file: {}", config_file);
            default_config
        };
        config.normalize();
        config.validate()?;
        Ok(config)
    }

    /// Pull values that have a hard operating range back inside it
    pub fn normalize(&mut self) {
        let min = Duration::from_secs(MIN_RELAY_REQUEST_TIMEOUT_SECS);
        let max = Duration::from_secs(MAX_RELAY_REQUEST_TIMEOUT_SECS);
        let clamped = self.relay.request_timeout.clamp(min, max);
        if clamped != self.relay.request_timeout {
            warn!(
                "relay.request_timeout {:?} outside {:?}..={:?}, using {:?}",
                self.relay.request_timeout, min, max, clamped
            );
            self.relay.request_timeout = clamped;
        }
        if self.relay.max_concurrent_fetches == 0 {
            self.relay.max_concurrent_fetches = 1;
        }
    }

    pub fn validate(&self) -> Result<()> {
        let walk = &self.telemetry.random_walk;
        if walk.altitude_min > walk.altitude_max {
            anyhow::bail!("telemetry.random_walk: altitude_min exceeds altitude_max");
        }
        if walk.speed_min > walk.speed_max {
            anyhow::bail!("telemetry.random_walk: speed_min exceeds speed_max");
        }
        if walk.battery_drain_min < 0.0 || walk.battery_drain_min > walk.battery_drain_max {
            anyhow::bail!("telemetry.random_walk: battery drain range must be non-negative and ordered");
        }
        if self.telemetry.history_size == 0 {
            anyhow::bail!("telemetry.history_size must be at least 1");
        }
        if self.events.capacity == 0 {
            anyhow::bail!("events.capacity must be at least 1");
        }
        let durations = [
            ("reconciler.poll_interval", self.reconciler.poll_interval),
            ("telemetry.tick_interval", self.telemetry.tick_interval),
            ("encoder.reap_interval", self.encoder.reap_interval),
            ("encoder.stop_timeout", self.encoder.stop_timeout),
            ("shutdown.timeout", self.shutdown.timeout),
        ];
        if let Some((name, _)) = durations.iter().find(|(_, value)| value.is_zero()) {
            anyhow::bail!("{} must be non-zero", name);
        }
        Ok(())
    }
}
