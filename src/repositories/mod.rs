//! Repository pattern implementation for data access
//!
//! Services depend on the traits in [`traits`], never on sqlx directly, so
//! the reconciler and telemetry engine can run without a database in tests.
//!
//! # Usage
//!
//! ```rust,no_run
//! use drone_stream_monitor::repositories::{TelemetryRepository, TelemetryStore};
//!
//! async fn example(repo: TelemetryRepository) {
//!     let last = repo.last_sample("drone-1").await;
//! }
//! ```

pub mod drone;
pub mod telemetry;
pub mod traits;

pub use drone::DroneRepository;
pub use telemetry::TelemetryRepository;
pub use traits::*;
