use aaa_policy::PolicyEngineError;
use aaa_store::StoreError;
use std::fmt;

/// Errors the access-control core surfaces to its callers.
///
/// Shape copied from `r2e-core::AppError`/`r2e-data::DataError`: a plain
/// enum, manual `Display`, targeted `From` impls from each collaborator's
/// error type — no `thiserror`.
#[derive(Debug)]
pub enum CoreError {
    /// Request shape or business rule violated before any write.
    Validation(String),
    /// Referenced entity absent.
    NotFound(String),
    /// Uniqueness invariant would be violated.
    Conflict(String),
    /// Versioned write raced with another writer.
    OptimisticLock {
        entity: &'static str,
        id: String,
        expected: i64,
        current: i64,
    },
    /// Tenant isolation or access rule denied.
    Unauthorized(String),
    /// Unexpected store/cache/policy-engine failure.
    Internal(String),
}

impl CoreError {
    pub fn validation(msg: impl Into<String>) -> Self {
        CoreError::Validation(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        CoreError::NotFound(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        CoreError::Conflict(msg.into())
    }

    pub fn unauthorized(msg: impl Into<String>) -> Self {
        CoreError::Unauthorized(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        CoreError::Internal(msg.into())
    }
}

impl fmt::Display for CoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CoreError::Validation(msg) => write!(f, "validation error: {msg}"),
            CoreError::NotFound(msg) => write!(f, "not found: {msg}"),
            CoreError::Conflict(msg) => write!(f, "conflict: {msg}"),
            CoreError::OptimisticLock {
                entity,
                id,
                expected,
                current,
            } => write!(
                f,
                "optimistic lock failed for {entity} {id}: expected version {expected}, current {current}"
            ),
            CoreError::Unauthorized(msg) => write!(f, "unauthorized: {msg}"),
            CoreError::Internal(msg) => write!(f, "internal error: {msg}"),
        }
    }
}

impl std::error::Error for CoreError {}

impl From<StoreError> for CoreError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(msg) => CoreError::NotFound(msg),
            StoreError::OptimisticLockFailed { entity, id, expected } => {
                // The store only knows the expected version it tried; the
                // current value is re-fetched by the caller (`repo` layer)
                // before this conversion so it can be folded into the
                // richer variant. When that doesn't happen, surface the
                // expected version as current too — still an accurate
                // "you raced someone" signal.
                CoreError::OptimisticLock {
                    entity,
                    id,
                    expected,
                    current: expected,
                }
            }
            StoreError::Conflict(msg) => CoreError::Conflict(msg),
            StoreError::Database(err) => CoreError::Internal(err.to_string()),
            StoreError::Other(msg) => CoreError::Internal(msg),
        }
    }
}

impl From<PolicyEngineError> for CoreError {
    fn from(err: PolicyEngineError) -> Self {
        CoreError::Internal(err.to_string())
    }
}
