use crate::model::Group;
use aaa_store::{Page, Pageable, Repository, StoreError, VersionedRepository};
use aaa_store_sqlx::SqlxTable;
use async_trait::async_trait;
use chrono::Utc;

/// Postgres-backed `Group` repository, generalizing `r2e-data-sqlx`'s
/// `SqlxRepository` wrapper with the conditional
/// `UPDATE … WHERE version = expected` dance `spec.md` §5 requires.
#[derive(Clone)]
pub struct GroupRepository {
    table: SqlxTable<Group>,
}

impl GroupRepository {
    pub fn new(table: SqlxTable<Group>) -> Self {
        Self { table }
    }

    /// Finds an active (non-deleted) group by name within an organization,
    /// used to enforce G1 (name uniqueness) before insert/update.
    pub async fn find_by_name(&self, organization_id: &str, name: &str) -> Result<Option<Group>, StoreError> {
        sqlx::query_as::<_, Group>(
            "SELECT * FROM groups WHERE organization_id = $1 AND name = $2 AND deleted_at IS NULL",
        )
        .bind(organization_id)
        .bind(name)
        .fetch_optional(self.table.pool())
        .await
        .map_err(aaa_store_sqlx::map_sqlx_error)
    }

    /// Direct, active children of `group_id` (`Hierarchy::children`).
    pub async fn find_active_children(&self, group_id: &str) -> Result<Vec<Group>, StoreError> {
        sqlx::query_as::<_, Group>(
            "SELECT * FROM groups WHERE parent_id = $1 AND is_active = true AND deleted_at IS NULL",
        )
        .bind(group_id)
        .fetch_all(self.table.pool())
        .await
        .map_err(aaa_store_sqlx::map_sqlx_error)
    }

    /// Whether `group_id` has any non-deleted child, active or not — used
    /// by `DeleteGroup`'s "no descendants" precondition.
    pub async fn has_any_children(&self, group_id: &str) -> Result<bool, StoreError> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM groups WHERE parent_id = $1 AND deleted_at IS NULL")
            .bind(group_id)
            .fetch_one(self.table.pool())
            .await
            .map_err(aaa_store_sqlx::map_sqlx_error)?;
        Ok(row.0 > 0)
    }
}

#[async_trait]
impl Repository<Group, String> for GroupRepository {
    async fn find_by_id(&self, id: &String) -> Result<Option<Group>, StoreError> {
        sqlx::query_as::<_, Group>("SELECT * FROM groups WHERE id = $1")
            .bind(id)
            .fetch_optional(self.table.pool())
            .await
            .map_err(aaa_store_sqlx::map_sqlx_error)
    }

    async fn find_all_paged(&self, pageable: &Pageable) -> Result<Page<Group>, StoreError> {
        let content = sqlx::query_as::<_, Group>(
            "SELECT * FROM groups WHERE deleted_at IS NULL ORDER BY id LIMIT $1 OFFSET $2",
        )
        .bind(pageable.size as i64)
        .bind(pageable.offset() as i64)
        .fetch_all(self.table.pool())
        .await
        .map_err(aaa_store_sqlx::map_sqlx_error)?;

        let total: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM groups WHERE deleted_at IS NULL")
            .fetch_one(self.table.pool())
            .await
            .map_err(aaa_store_sqlx::map_sqlx_error)?;

        Ok(Page::new(content, pageable, total.0 as u64))
    }

    async fn insert(&self, entity: &Group) -> Result<Group, StoreError> {
        sqlx::query_as::<_, Group>(
            "INSERT INTO groups (id, organization_id, name, description, parent_id, is_active, \
             version, created_at, updated_at, created_by, updated_by, deleted_by, deleted_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13) RETURNING *",
        )
        .bind(&entity.id)
        .bind(&entity.organization_id)
        .bind(&entity.name)
        .bind(&entity.description)
        .bind(&entity.parent_id)
        .bind(entity.is_active)
        .bind(entity.version)
        .bind(entity.created_at)
        .bind(entity.updated_at)
        .bind(&entity.created_by)
        .bind(&entity.updated_by)
        .bind(&entity.deleted_by)
        .bind(entity.deleted_at)
        .fetch_one(self.table.pool())
        .await
        .map_err(aaa_store_sqlx::map_sqlx_error)
    }

    async fn soft_delete(&self, id: &String, deleted_by: &str) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE groups SET deleted_at = $1, deleted_by = $2, updated_at = $1 \
             WHERE id = $3 AND deleted_at IS NULL",
        )
        .bind(Utc::now())
        .bind(deleted_by)
        .bind(id)
        .execute(self.table.pool())
        .await
        .map_err(aaa_store_sqlx::map_sqlx_error)?;

        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl VersionedRepository<Group, String> for GroupRepository {
    async fn update_versioned(
        &self,
        id: &String,
        expected_version: i64,
        mutate: Box<dyn FnOnce(&mut Group) + Send>,
    ) -> Result<Group, StoreError> {
        let mut current = self
            .find_by_id(id)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("group {id}")))?;

        mutate(&mut current);
        current.version = expected_version + 1;
        current.updated_at = Utc::now();

        let result = sqlx::query(
            "UPDATE groups SET name = $1, description = $2, parent_id = $3, is_active = $4, \
             version = $5, updated_at = $6, updated_by = $7 \
             WHERE id = $8 AND version = $9",
        )
        .bind(&current.name)
        .bind(&current.description)
        .bind(&current.parent_id)
        .bind(current.is_active)
        .bind(current.version)
        .bind(current.updated_at)
        .bind(&current.updated_by)
        .bind(id)
        .bind(expected_version)
        .execute(self.table.pool())
        .await
        .map_err(aaa_store_sqlx::map_sqlx_error)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::OptimisticLockFailed {
                entity: "group",
                id: id.clone(),
                expected: expected_version,
            });
        }

        Ok(current)
    }

    async fn current_version(&self, id: &String) -> Result<i64, StoreError> {
        let row: (i64,) = sqlx::query_as("SELECT version FROM groups WHERE id = $1")
            .bind(id)
            .fetch_optional(self.table.pool())
            .await
            .map_err(aaa_store_sqlx::map_sqlx_error)?
            .ok_or_else(|| StoreError::NotFound(format!("group {id}")))?;
        Ok(row.0)
    }
}
