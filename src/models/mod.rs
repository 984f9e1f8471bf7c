pub mod encoder;
pub mod event;
pub mod path;
pub mod telemetry;

pub use encoder::{EncoderProcessInfo, EncoderState, SourceSpec};
pub use event::{LifecycleEvent, LifecycleEventType};
pub use path::{DroneRecord, PathRegistration, PathState, PathStatus, SourceType, StreamUrls};
pub use telemetry::{FleetStats, TelemetrySample, TelemetryStatus, TrajectoryPoint};
