use crate::error::StoreError;
use crate::page::{Page, Pageable};

/// Generic async repository trait for CRUD operations.
#[async_trait::async_trait]
pub trait Repository<T, ID>: Send + Sync
where
    T: Send + Sync + 'static,
    ID: Send + Sync + 'static,
{
    async fn find_by_id(&self, id: &ID) -> Result<Option<T>, StoreError>;
    async fn find_all_paged(&self, pageable: &Pageable) -> Result<Page<T>, StoreError>;
    async fn insert(&self, entity: &T) -> Result<T, StoreError>;
    /// Soft-delete: sets `deleted_at`/`deleted_by`, does not remove the row.
    async fn soft_delete(&self, id: &ID, deleted_by: &str) -> Result<bool, StoreError>;
}

/// [`Repository`] extension implementing the optimistic-lock protocol from
/// `spec.md` §5: the caller presents the version it last read; the update
/// only takes effect if the stored version still matches.
///
/// Implementations perform a conditional
/// `UPDATE … SET version = version + 1 WHERE id = ? AND version = ?`
/// and translate "zero rows affected" into
/// [`StoreError::OptimisticLockFailed`].
#[async_trait::async_trait]
pub trait VersionedRepository<T, ID>: Repository<T, ID>
where
    T: Send + Sync + 'static,
    ID: Send + Sync + 'static,
{
    /// Apply `mutate` to the stored row currently at `expected_version`,
    /// bumping the version by exactly one on success.
    async fn update_versioned(
        &self,
        id: &ID,
        expected_version: i64,
        mutate: Box<dyn FnOnce(&mut T) + Send>,
    ) -> Result<T, StoreError>;

    /// Read the version currently stored for `id`, for callers that need
    /// to surface "expected X, current Y" on an optimistic-lock failure.
    async fn current_version(&self, id: &ID) -> Result<i64, StoreError>;
}
