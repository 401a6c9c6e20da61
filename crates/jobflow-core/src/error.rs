//! Core error type for the Jobflow pipeline.
//!
//! `CoreError` is used throughout the core (bus, state store, engine).
//! Routing failures never surface here: the bus turns them into
//! error-kind envelopes instead.

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid status transition for job {job_id}: {from} -> {to}")]
    InvalidTransition {
        job_id: String,
        from: String,
        to: String,
    },

    #[error("Step {step} failed after {attempts} attempts")]
    StepFailed { step: String, attempts: u32 },

    #[error("Agent '{agent}' raised an error: {message}")]
    Agent { agent: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// Whether this error means "the record does not exist", as opposed to
    /// a storage failure the caller may want to retry.
    pub fn is_not_found(&self) -> bool {
        matches!(self, CoreError::NotFound(_))
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(e: serde_json::Error) -> Self {
        CoreError::Serialization(e.to_string())
    }
}

impl From<serde_yaml::Error> for CoreError {
    fn from(e: serde_yaml::Error) -> Self {
        CoreError::Config(e.to_string())
    }
}

pub type CoreResult<T> = Result<T, CoreError>;
