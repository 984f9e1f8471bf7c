//! Simulated per-path telemetry.

pub mod engine;
pub mod flight_pattern;
pub mod model;
pub mod writer;

pub use engine::TelemetryEngine;
pub use flight_pattern::FlightPattern;
pub use model::DroneModel;
pub use writer::SampleWriter;
