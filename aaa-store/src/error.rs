/// Errors surfaced by the data access layer.
///
/// Mirrors `r2e-data::DataError`'s shape (plain enum, `Database` boxes the
/// driver error so backend crates never leak their error type), with an
/// added `OptimisticLockFailed` variant for the versioned-write protocol
/// in `spec.md` §5.
#[derive(Debug)]
pub enum StoreError {
    NotFound(String),
    /// A versioned write's `WHERE version = expected` predicate matched
    /// zero rows. Carries the entity name, id, and the version the caller
    /// presented; the current stored version is re-fetched by the caller
    /// (see `aaa-core::CoreError::OptimisticLock`, which adds it).
    OptimisticLockFailed { entity: &'static str, id: String, expected: i64 },
    Conflict(String),
    Database(Box<dyn std::error::Error + Send + Sync>),
    Other(String),
}

impl StoreError {
    pub fn database(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        StoreError::Database(Box::new(err))
    }
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::NotFound(msg) => write!(f, "not found: {msg}"),
            StoreError::OptimisticLockFailed { entity, id, expected } => write!(
                f,
                "optimistic lock failed for {entity} {id}: expected version {expected}"
            ),
            StoreError::Conflict(msg) => write!(f, "conflict: {msg}"),
            StoreError::Database(err) => write!(f, "database error: {err}"),
            StoreError::Other(msg) => write!(f, "store error: {msg}"),
        }
    }
}

impl std::error::Error for StoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StoreError::Database(err) => Some(err.as_ref()),
            _ => None,
        }
    }
}
