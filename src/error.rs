//! Error types for the interview service.

use std::time::Duration;

/// Top-level error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Generation error: {0}")]
    Generation(#[from] GenerationError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Database-related errors.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Connection pool error: {0}")]
    Pool(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: String, id: String },

    #[error("Progress mismatch for session {session_id}: expected {expected}, found {actual}")]
    ProgressMismatch {
        session_id: String,
        expected: u32,
        actual: u32,
    },

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Failures of the external chat-completion call.
#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    #[error("No credential configured for {provider}")]
    MissingCredential { provider: String },

    #[error("Request to {provider} failed: {reason}")]
    RequestFailed { provider: String, reason: String },

    #[error("Request to {provider} timed out after {timeout:?}")]
    Timeout { provider: String, timeout: Duration },

    #[error("{provider} returned HTTP {status}: {body}")]
    Upstream {
        provider: String,
        status: u16,
        body: String,
    },

    #[error("Invalid response from {provider}: {reason}")]
    InvalidResponse { provider: String, reason: String },
}

impl GenerationError {
    /// Upstream HTTP status, when the service answered at all.
    pub fn upstream_status(&self) -> Option<u16> {
        match self {
            Self::Upstream { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Upstream response body, when the service answered at all.
    pub fn upstream_body(&self) -> Option<&str> {
        match self {
            Self::Upstream { body, .. } => Some(body),
            _ => None,
        }
    }
}

/// Errors raised by a question source.
#[derive(Debug, thiserror::Error)]
pub enum QuestionError {
    #[error("Question list exhausted at {progress} of {total}")]
    Exhausted { progress: u32, total: u32 },

    #[error(transparent)]
    Generation(#[from] GenerationError),
}

/// Errors raised by the turn coordinator.
///
/// Each variant corresponds to one failure kind reported to clients.
#[derive(Debug, thiserror::Error)]
pub enum TurnError {
    #[error("Invalid request: {0}")]
    Validation(String),

    #[error("Storage failure: {0}")]
    Persistence(#[from] DatabaseError),

    #[error("Question generation failed: {0}")]
    GenerationFailed(#[from] GenerationError),

    #[error("All {total} questions have been answered")]
    Exhausted { total: u32 },

    #[error("Turn rejected in state {state}: {reason}")]
    Conflict { state: String, reason: String },
}

impl From<QuestionError> for TurnError {
    fn from(err: QuestionError) -> Self {
        match err {
            QuestionError::Exhausted { total, .. } => Self::Exhausted { total },
            QuestionError::Generation(e) => Self::GenerationFailed(e),
        }
    }
}

impl TurnError {
    /// Stable machine-readable kind, used in HTTP failure bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::Persistence(DatabaseError::ProgressMismatch { .. }) => "conflict",
            Self::Persistence(_) => "persistence_failure",
            Self::GenerationFailed(_) => "generation_failed",
            Self::Exhausted { .. } => "exhausted",
            Self::Conflict { .. } => "conflict",
        }
    }
}

/// Errors seen by the HTTP client of the interview API.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("Request failed: {0}")]
    Transport(String),

    #[error("Server rejected the request ({status} {kind}): {message}")]
    Api {
        status: u16,
        kind: String,
        message: String,
        upstream_status: Option<u16>,
    },

    #[error("Unexpected response: {0}")]
    Decode(String),
}

impl ClientError {
    /// The failure kind reported by the server, if it answered.
    pub fn kind(&self) -> Option<&str> {
        match self {
            Self::Api { kind, .. } => Some(kind),
            _ => None,
        }
    }

    pub fn is_generation_failure(&self) -> bool {
        self.kind() == Some("generation_failed")
    }

    pub fn is_exhausted(&self) -> bool {
        self.kind() == Some("exhausted")
    }

    pub fn is_conflict(&self) -> bool {
        self.kind() == Some("conflict")
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::Decode(err.to_string())
        } else {
            Self::Transport(err.to_string())
        }
    }
}

/// Result type alias for the service.
pub type Result<T> = std::result::Result<T, Error>;
