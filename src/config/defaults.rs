/// Configuration default values
///
/// All default values for configuration options live here so they can be
/// changed in one place.
// Database defaults
pub const DEFAULT_DATABASE_URL: &str = "sqlite://./drone-stream-monitor.db";
pub const DEFAULT_MAX_CONNECTIONS: u32 = 10;

// Media relay defaults
pub const DEFAULT_RELAY_API_URL: &str = "http://localhost:9997/v3";
pub const DEFAULT_RELAY_REQUEST_TIMEOUT_SECS: u64 = 4;
pub const MIN_RELAY_REQUEST_TIMEOUT_SECS: u64 = 1;
pub const MAX_RELAY_REQUEST_TIMEOUT_SECS: u64 = 5;
pub const DEFAULT_RTSP_BASE_URL: &str = "rtsp://localhost:8554";
pub const DEFAULT_HLS_BASE_URL: &str = "http://localhost:8888";
pub const DEFAULT_INGEST_BASE_URL: &str = "rtmp://localhost:1935";
pub const DEFAULT_MAX_CONCURRENT_FETCHES: usize = 8;

// Reconciler defaults
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 5;
pub const DEFAULT_STALE_AFTER_SECS: u64 = 30;

// Encoder defaults
pub const DEFAULT_FFMPEG_COMMAND: &str = "ffmpeg";
pub const DEFAULT_READINESS_MARKER: &str = "frame=";
pub const DEFAULT_STOP_TIMEOUT_SECS: u64 = 5;
pub const DEFAULT_REAP_INTERVAL_SECS: u64 = 10;
#[cfg(windows)]
pub const DEFAULT_CAMERA_DEVICE: &str = "video=Integrated Camera";
#[cfg(not(windows))]
pub const DEFAULT_CAMERA_DEVICE: &str = "/dev/video0";
#[cfg(windows)]
pub const DEFAULT_SCREEN_DEVICE: &str = "desktop";
#[cfg(not(windows))]
pub const DEFAULT_SCREEN_DEVICE: &str = ":0.0";

// Telemetry defaults
pub const DEFAULT_TICK_INTERVAL_SECS: u64 = 1;
pub const DEFAULT_HISTORY_SIZE: usize = 1000;
pub const DEFAULT_LATITUDE: f64 = 43.238949;
pub const DEFAULT_LONGITUDE: f64 = 76.889709;
pub const DEFAULT_PERSISTENCE_QUEUE: usize = 1024;

// Random walk defaults
pub const DEFAULT_ALTITUDE_STEP: f64 = 5.0;
pub const DEFAULT_ALTITUDE_MIN: f64 = 50.0;
pub const DEFAULT_ALTITUDE_MAX: f64 = 150.0;
pub const DEFAULT_SPEED_STEP: f64 = 1.0;
pub const DEFAULT_SPEED_MIN: f64 = 5.0;
pub const DEFAULT_SPEED_MAX: f64 = 15.0;
pub const DEFAULT_BATTERY_DRAIN_MIN: f64 = 0.1;
pub const DEFAULT_BATTERY_DRAIN_MAX: f64 = 0.3;
pub const DEFAULT_SIGNAL_STEP: f64 = 2.0;
pub const DEFAULT_LOW_SIGNAL_THRESHOLD: f64 = 30.0;

// Event bus defaults
pub const DEFAULT_EVENT_CAPACITY: usize = 10_000;

// Shutdown defaults
pub const DEFAULT_SHUTDOWN_TIMEOUT_SECS: u64 = 15;
