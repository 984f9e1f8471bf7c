//! Error type definitions for the drone stream monitor

use thiserror::Error;

/// Top-level application error type
///
/// Returned by the coordinator operations exposed to the API layer.
#[derive(Error, Debug)]
pub enum AppError {
    /// Encoder process errors
    #[error("Encoder error: {0}")]
    Encoder(#[from] EncoderError),

    /// Repository layer errors
    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),

    /// Path registry errors
    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    /// Validation errors
    #[error("Validation error: {message}")]
    Validation { message: String },

    /// Resource not found errors
    #[error("Not found: {resource} with id {id}")]
    NotFound { resource: String, id: String },

    /// Generic internal errors
    #[error("Internal error: {message}")]
    Internal { message: String },
}

/// Errors raised while talking to the media-relay control API
#[derive(Error, Debug)]
pub enum RelayApiError {
    /// Relay unreachable, connection refused or request timed out
    #[error("Transport error calling {url}: {message}")]
    Transport { url: String, message: String },

    /// Relay answered with a non-success status
    #[error("Unexpected status {status} from {url}: {body}")]
    Status { url: String, status: u16, body: String },

    /// Relay answered with a body that does not have the expected shape
    #[error("Malformed upstream data for {path}: {message}")]
    Malformed { path: String, message: String },
}

/// Encoder supervisor errors
#[derive(Error, Debug)]
pub enum EncoderError {
    /// Source specification cannot be used (e.g. the input file is missing)
    #[error("Invalid source for {path_id}: {message}")]
    InvalidSource { path_id: String, message: String },

    /// The encoder binary could not be spawned
    #[error("Failed to spawn encoder for {path_id}: {message}")]
    Spawn { path_id: String, message: String },

    /// A live encoder is already registered for this path
    #[error("Encoder already running for path {path_id}")]
    Duplicate { path_id: String },

    /// Termination signal could not be delivered
    #[error("Failed to signal encoder for {path_id}: {message}")]
    Signal { path_id: String, message: String },

    /// Monitor task panicked or was aborted
    #[error("Encoder monitor for {path_id} failed: {message}")]
    Monitor { path_id: String, message: String },
}

/// Repository layer specific errors
#[derive(Error, Debug)]
pub enum RepositoryError {
    /// SQL query execution failures
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Background writer queue is full or closed
    #[error("Persistence queue unavailable: {message}")]
    QueueUnavailable { message: String },

    /// Stored value could not be mapped back into a model
    #[error("Invalid stored value in {table}.{field}: {value}")]
    InvalidValue {
        table: String,
        field: String,
        value: String,
    },
}

/// Path registry errors
#[derive(Error, Debug)]
pub enum RegistryError {
    /// Explicit registration for an id that is already tracked
    #[error("Path {0} is already registered")]
    DuplicatePath(String),
}

/// Convenience methods for creating common error types
impl AppError {
    /// Create a validation error with a custom message
    pub fn validation<S: Into<String>>(message: S) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Create a not found error for a specific resource
    pub fn not_found<R: Into<String>, I: Into<String>>(resource: R, id: I) -> Self {
        Self::NotFound {
            resource: resource.into(),
            id: id.into(),
        }
    }

    /// Create an internal error
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }
}

impl RelayApiError {
    pub fn transport<U: Into<String>>(url: U, err: &reqwest::Error) -> Self {
        let message = if err.is_timeout() {
            "request timed out".to_string()
        } else if err.is_connect() {
            format!("connection failed: {err}")
        } else {
            err.to_string()
        };
        Self::Transport {
            url: url.into(),
            message,
        }
    }

    pub fn malformed<P: Into<String>, M: Into<String>>(path: P, message: M) -> Self {
        Self::Malformed {
            path: path.into(),
            message: message.into(),
        }
    }

    /// True when the relay answered 404 for the requested resource
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Status { status: 404, .. })
    }
}

impl EncoderError {
    pub fn invalid_source<P: Into<String>, M: Into<String>>(path_id: P, message: M) -> Self {
        Self::InvalidSource {
            path_id: path_id.into(),
            message: message.into(),
        }
    }

    pub fn spawn<P: Into<String>, M: Into<String>>(path_id: P, message: M) -> Self {
        Self::Spawn {
            path_id: path_id.into(),
            message: message.into(),
        }
    }

    pub fn duplicate<P: Into<String>>(path_id: P) -> Self {
        Self::Duplicate {
            path_id: path_id.into(),
        }
    }

    pub fn signal<P: Into<String>, M: Into<String>>(path_id: P, message: M) -> Self {
        Self::Signal {
            path_id: path_id.into(),
            message: message.into(),
        }
    }
}
