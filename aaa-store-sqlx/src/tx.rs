use crate::error::map_sqlx_error;
use aaa_store::StoreError;
use sqlx::{Postgres, Transaction};

/// Runs `body` inside a transaction, committing on `Ok` and rolling back on
/// `Err` or panic-unwind. Mirrors `r2e-data-sqlx::tx`'s helper, narrowed to
/// the one driver (`Postgres`) this workspace targets.
pub async fn with_transaction<F, T>(pool: &sqlx::PgPool, body: F) -> Result<T, StoreError>
where
    F: for<'c> FnOnce(
        &'c mut Transaction<'_, Postgres>,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<T, StoreError>> + Send + 'c>>,
{
    let mut tx = pool.begin().await.map_err(map_sqlx_error)?;
    match body(&mut tx).await {
        Ok(value) => {
            tx.commit().await.map_err(map_sqlx_error)?;
            Ok(value)
        }
        Err(err) => {
            // Best-effort rollback; the transaction drops and rolls back
            // automatically if this fails.
            let _ = tx.rollback().await;
            Err(err)
        }
    }
}
