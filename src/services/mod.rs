//! Long-running fleet services.

pub mod coordinator;
pub mod encoder_command;
pub mod encoder_supervisor;
pub mod event_bus;
pub mod path_reconciler;

pub use coordinator::{FleetCoordinator, HealthReport, Stores};
pub use encoder_command::{EncoderCommand, EncoderCommandBuilder};
pub use encoder_supervisor::EncoderSupervisor;
pub use event_bus::EventBus;
pub use path_reconciler::{PathReconciler, ReconcilerSettings};
