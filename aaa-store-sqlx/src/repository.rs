use sqlx::PgPool;
use std::marker::PhantomData;

/// A generic handle to a Postgres-backed table for a given entity type.
///
/// Mirrors `r2e-data-sqlx::SqlxRepository<T, DB>`, narrowed to `Postgres`
/// (the one driver this workspace targets) since the core's entities are
/// concrete (`Group`, `GroupMembership`, `GroupRole`, `UserRole`) rather
/// than generic over driver.
pub struct SqlxTable<T> {
    pool: PgPool,
    _marker: PhantomData<T>,
}

impl<T> SqlxTable<T> {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            _marker: PhantomData,
        }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

impl<T> Clone for SqlxTable<T> {
    fn clone(&self) -> Self {
        Self {
            pool: self.pool.clone(),
            _marker: PhantomData,
        }
    }
}
