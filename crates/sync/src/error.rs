//! Error types for the sync pipeline.

use crate::model::ReportId;
use fixmyarea_core::error::{exit_codes, ErrorCode, ErrorReport};
use std::path::PathBuf;
use fixmyarea_core::validation::FieldError;
use thiserror::Error;

/// Result type alias for sync operations.
pub type Result<T> = std::result::Result<T, SyncError>;

/// Failure reported by a remote port (object storage, document store).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RemoteError {
    /// Network trouble, 5xx, 429 or timeout; worth retrying
    #[error("transient remote failure: {0}")]
    Transient(String),

    /// Rejected for good; retrying cannot help
    #[error("permanent remote failure: {0}")]
    Permanent(String),
}

impl RemoteError {
    /// Returns true if the operation may succeed when retried.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

/// Errors raised by the store, the submitter and the sync engine.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The draft was rejected before it reached the store
    #[error("invalid report: {summary}")]
    Validation {
        summary: String,
        errors: Vec<FieldError>,
    },

    /// No record with this id
    #[error("report {0} not found")]
    NotFound(ReportId),

    /// A state change the lifecycle does not allow
    #[error("report {id}: cannot move from {from} to {to}")]
    InvalidTransition {
        id: ReportId,
        from: &'static str,
        to: &'static str,
    },

    /// Retryable remote failure
    #[error("transient failure: {0}")]
    Transient(String),

    /// Non-retryable failure (bad photo, rejected write)
    #[error("permanent failure: {0}")]
    Permanent(String),

    /// The operation observed its cancellation token
    #[error("operation cancelled")]
    Cancelled,

    /// Another process holds the store directory lock
    #[error("report store {} is in use by another process", .0.display())]
    StoreLocked(PathBuf),

    /// Mutation attempted through a store opened for reading and enqueueing only
    #[error("report store opened read-only, cannot {0}")]
    ReadOnly(&'static str),

    /// The coordinator task is no longer running
    #[error("sync coordinator has stopped")]
    CoordinatorStopped,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("atomic write failed: {0}")]
    Persist(#[from] tempfile::PersistError),

    #[error(transparent)]
    Core(#[from] fixmyarea_core::Error),
}

impl SyncError {
    /// Returns true if retrying later may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }

    /// Process exit code for command-line front ends.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Validation { .. } => exit_codes::VALIDATION_ERROR,
            Self::NotFound(_) => exit_codes::NOT_FOUND,
            Self::InvalidTransition { .. }
            | Self::StoreLocked(_)
            | Self::ReadOnly(_)
            | Self::Io(_)
            | Self::Json(_)
            | Self::Persist(_) => exit_codes::STORE_ERROR,
            Self::Transient(_) | Self::Permanent(_) => exit_codes::REMOTE_ERROR,
            Self::Core(e) if e.code.category() == "Configuration" => exit_codes::CONFIG_ERROR,
            Self::Cancelled | Self::CoordinatorStopped | Self::Core(_) => exit_codes::FAILURE,
        }
    }

    /// Structured error code
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Validation { .. } => ErrorCode::ValidationError,
            Self::NotFound(_) => ErrorCode::RecordNotFound,
            Self::InvalidTransition { .. } => ErrorCode::InvalidTransition,
            Self::StoreLocked(_) => ErrorCode::StoreLocked,
            Self::ReadOnly(_) | Self::Persist(_) => ErrorCode::StoreError,
            Self::Transient(_) => ErrorCode::TransientFailure,
            Self::Permanent(_) => ErrorCode::PermanentFailure,
            Self::Cancelled => ErrorCode::Cancelled,
            Self::CoordinatorStopped => ErrorCode::Internal,
            Self::Io(_) => ErrorCode::IoError,
            Self::Json(_) => ErrorCode::CorruptRecord,
            Self::Core(e) => e.code,
        }
    }

    /// Serializable form for `--format json` output
    pub fn to_report(&self) -> ErrorReport {
        if let Self::Core(e) = self {
            return e.to_report();
        }
        let error = fixmyarea_core::Error::new(self.code(), self.to_string());
        match self {
            Self::StoreLocked(_) => error
                .with_suggestion("Stop the running `fixmyarea sync` and try again")
                .to_report(),
            _ => error.to_report(),
        }
    }
}

impl From<RemoteError> for SyncError {
    fn from(err: RemoteError) -> Self {
        match err {
            RemoteError::Transient(msg) => Self::Transient(msg),
            RemoteError::Permanent(msg) => Self::Permanent(msg),
        }
    }
}
