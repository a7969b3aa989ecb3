use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Errors raised by the local SQLite repository layer.
#[derive(Debug, Error)]
pub enum DbError {
    #[error("SQLx error: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("Transaction error: {0}")]
    Transaction(String),

    #[error("Record not found: {0} with id {1}")]
    NotFound(String, String),

    #[error("Database is locked")]
    Locked,

    #[error("Database error: {0}")]
    Other(String),
}

impl Clone for DbError {
    fn clone(&self) -> Self {
        match self {
            DbError::Sqlx(err) => DbError::Other(err.to_string()),
            DbError::Transaction(s) => DbError::Transaction(s.clone()),
            DbError::NotFound(s1, s2) => DbError::NotFound(s1.clone(), s2.clone()),
            DbError::Locked => DbError::Locked,
            DbError::Other(s) => DbError::Other(s.clone()),
        }
    }
}

impl Serialize for DbError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

/// Errors raised while validating entity fields before they are persisted.
#[derive(Debug, Error, Clone, Serialize)]
pub enum ValidationError {
    #[error("Field '{field}' is required")]
    Required { field: String },

    #[error("Field '{field}' contains invalid format: {reason}")]
    Format { field: String, reason: String },

    #[error("Validation error: {0}")]
    Custom(String),
}

impl ValidationError {
    pub fn required(field: &str) -> Self {
        Self::Required { field: field.to_string() }
    }

    pub fn format(field: &str, reason: &str) -> Self {
        Self::Format { field: field.to_string(), reason: reason.to_string() }
    }

    pub fn custom(message: &str) -> Self {
        Self::Custom(message.to_string())
    }
}

/// Normalized kinds of WebDAV transport failure, independent of the HTTP
/// library used underneath.
#[derive(Debug, Error, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum TransportError {
    #[error("authentication failed")]
    AuthFailure,

    #[error("permission denied")]
    PermissionDenied,

    #[error("not found")]
    NotFound,

    #[error("method not allowed")]
    MethodNotAllowed,

    #[error("remote conflict")]
    RemoteConflict,

    #[error("quota exceeded")]
    QuotaExceeded,

    #[error("server error: {0}")]
    ServerError(String),

    #[error("network error: {0}")]
    NetworkError(String),

    #[error("failed to deserialize response: {0}")]
    DeserializationError(String),

    #[error("local store error: {0}")]
    LocalStoreError(String),
}

/// Domain-level errors: business rules over Notes/Todos/Settings and the
/// sync bookkeeping that rides along with them.
#[derive(Debug, Error, Clone, Serialize)]
pub enum DomainError {
    #[error("database error: {0}")]
    Database(#[from] DbError),

    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("entity {0} with id {1} is missing a sync_id")]
    MissingSyncId(String, String),

    #[error("entity not found: {0} with id {1}")]
    EntityNotFound(String, Uuid),

    #[error("invalid uuid: {0}")]
    InvalidUuid(String),

    #[error("io error: {0}")]
    Io(String),

    #[error("internal error: {0}")]
    Internal(String),
}

/// Service-level (composition-facing) errors.
#[derive(Debug, Error, Clone, Serialize)]
pub enum ServiceError {
    #[error("domain error: {0}")]
    Domain(#[from] DomainError),

    #[error("external service error: {0}")]
    ExternalService(String),

    #[error("configuration error: {0}")]
    Configuration(String),
}

/// Errors unique to the sync lifecycle that do not map cleanly onto a
/// domain/service error (they are control-flow signals as much as failures).
#[derive(Debug, Error, Clone, Serialize)]
pub enum SyncError {
    #[error("domain error: {0}")]
    Domain(#[from] DomainError),

    #[error("a full sync is required before incremental sync can proceed")]
    NeedsFullSync,

    #[error("conflict requires user intervention: {0}")]
    UserInterventionRequired(#[from] SyncConflict),

    #[error("a sync is already in progress for this device")]
    ConcurrentSyncInProgress,

    #[error("sync was stopped by the caller")]
    Stopped,
}

/// Detailed information about a field-level (or whole-entity) sync conflict,
/// surfaced to the orchestrator's `conflictDetected` event.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Error)]
#[error("conflict on {file_kind} '{file_name}' ({file_id}): {message}")]
pub struct SyncConflict {
    pub file_id: String,
    pub file_kind: String,
    pub file_name: String,
    pub local_time: i64,
    pub remote_time: i64,
    pub message: String,
}
