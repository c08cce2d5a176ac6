use aaa_store::StoreError;

/// Bridges `sqlx::Error` into `StoreError`, the same way
/// `r2e-data-sqlx::error` bridges driver errors into `DataError`.
pub fn map_sqlx_error(err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::RowNotFound => StoreError::NotFound("row not found".to_string()),
        sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
            StoreError::Conflict(db_err.to_string())
        }
        other => StoreError::database(other),
    }
}
