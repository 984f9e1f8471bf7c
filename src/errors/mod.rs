//! Centralized error handling for the drone stream monitor
//!
//! Every layer has its own error enum so callers can match on the failure
//! they care about, and all of them convert into [`AppError`] at the
//! coordinator boundary.
//!
//! # Error Categories
//!
//! - **Relay Errors**: media-relay control API unreachable, rejected or malformed
//! - **Encoder Errors**: invalid sources, spawn failures, duplicate processes
//! - **Repository Errors**: durable store reads and writes
//! - **Registry Errors**: explicit path registration conflicts
//!
//! # Usage
//!
//! ```rust
//! use drone_stream_monitor::errors::{AppError, AppResult};
//!
//! fn lookup(id: &str) -> AppResult<()> {
//!     Err(AppError::not_found("path", id))
//! }
//! ```

pub mod types;

pub use types::*;

/// Convenience type alias for Results using AppError
pub type AppResult<T> = Result<T, AppError>;

/// Convenience type alias for Repository Results
pub type RepositoryResult<T> = Result<T, RepositoryError>;

/// Convenience type alias for media-relay client Results
pub type RelayResult<T> = Result<T, RelayApiError>;

/// Convenience type alias for encoder supervisor Results
pub type EncoderResult<T> = Result<T, EncoderError>;
