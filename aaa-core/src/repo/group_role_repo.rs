use crate::model::GroupRole;
use aaa_store::{Page, Pageable, Repository, StoreError, VersionedRepository};
use aaa_store_sqlx::SqlxTable;
use async_trait::async_trait;
use chrono::Utc;

/// Postgres-backed `GroupRole` repository.
#[derive(Clone)]
pub struct GroupRoleRepository {
    table: SqlxTable<GroupRole>,
}

impl GroupRoleRepository {
    pub fn new(table: SqlxTable<GroupRole>) -> Self {
        Self { table }
    }

    /// The single active `(group, role)` assignment, if any (R1).
    pub async fn find_active(&self, group_id: &str, role_id: &str) -> Result<Option<GroupRole>, StoreError> {
        sqlx::query_as::<_, GroupRole>(
            "SELECT * FROM group_roles WHERE group_id = $1 AND role_id = $2 AND is_active = true",
        )
        .bind(group_id)
        .bind(role_id)
        .fetch_optional(self.table.pool())
        .await
        .map_err(aaa_store_sqlx::map_sqlx_error)
    }

    /// All active role assignments directly on a group — consulted by
    /// `Inheritance`'s per-group candidate enumeration and `Materializer`'s
    /// fan-out on membership add.
    pub async fn find_active_for_group(&self, group_id: &str) -> Result<Vec<GroupRole>, StoreError> {
        sqlx::query_as::<_, GroupRole>("SELECT * FROM group_roles WHERE group_id = $1 AND is_active = true")
            .bind(group_id)
            .fetch_all(self.table.pool())
            .await
            .map_err(aaa_store_sqlx::map_sqlx_error)
    }

    /// Deactivates the active `(group, role)` assignment.
    pub async fn deactivate(&self, group_id: &str, role_id: &str) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE group_roles SET is_active = false, updated_at = $1 \
             WHERE group_id = $2 AND role_id = $3 AND is_active = true",
        )
        .bind(Utc::now())
        .bind(group_id)
        .bind(role_id)
        .execute(self.table.pool())
        .await
        .map_err(aaa_store_sqlx::map_sqlx_error)?;

        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl Repository<GroupRole, String> for GroupRoleRepository {
    async fn find_by_id(&self, id: &String) -> Result<Option<GroupRole>, StoreError> {
        sqlx::query_as::<_, GroupRole>("SELECT * FROM group_roles WHERE id = $1")
            .bind(id)
            .fetch_optional(self.table.pool())
            .await
            .map_err(aaa_store_sqlx::map_sqlx_error)
    }

    async fn find_all_paged(&self, pageable: &Pageable) -> Result<Page<GroupRole>, StoreError> {
        let content = sqlx::query_as::<_, GroupRole>("SELECT * FROM group_roles ORDER BY id LIMIT $1 OFFSET $2")
            .bind(pageable.size as i64)
            .bind(pageable.offset() as i64)
            .fetch_all(self.table.pool())
            .await
            .map_err(aaa_store_sqlx::map_sqlx_error)?;

        let total: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM group_roles")
            .fetch_one(self.table.pool())
            .await
            .map_err(aaa_store_sqlx::map_sqlx_error)?;

        Ok(Page::new(content, pageable, total.0 as u64))
    }

    async fn insert(&self, entity: &GroupRole) -> Result<GroupRole, StoreError> {
        sqlx::query_as::<_, GroupRole>(
            "INSERT INTO group_roles (id, group_id, role_id, organization_id, assigned_by, starts_at, \
             ends_at, is_active, version, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11) RETURNING *",
        )
        .bind(&entity.id)
        .bind(&entity.group_id)
        .bind(&entity.role_id)
        .bind(&entity.organization_id)
        .bind(&entity.assigned_by)
        .bind(entity.starts_at)
        .bind(entity.ends_at)
        .bind(entity.is_active)
        .bind(entity.version)
        .bind(entity.created_at)
        .bind(entity.updated_at)
        .fetch_one(self.table.pool())
        .await
        .map_err(aaa_store_sqlx::map_sqlx_error)
    }

    async fn soft_delete(&self, id: &String, _deleted_by: &str) -> Result<bool, StoreError> {
        let result = sqlx::query("UPDATE group_roles SET is_active = false, updated_at = $1 WHERE id = $2")
            .bind(Utc::now())
            .bind(id)
            .execute(self.table.pool())
            .await
            .map_err(aaa_store_sqlx::map_sqlx_error)?;
        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl VersionedRepository<GroupRole, String> for GroupRoleRepository {
    async fn update_versioned(
        &self,
        id: &String,
        expected_version: i64,
        mutate: Box<dyn FnOnce(&mut GroupRole) + Send>,
    ) -> Result<GroupRole, StoreError> {
        let mut current = self
            .find_by_id(id)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("group_role {id}")))?;

        mutate(&mut current);
        current.version = expected_version + 1;
        current.updated_at = Utc::now();

        let result = sqlx::query(
            "UPDATE group_roles SET starts_at = $1, ends_at = $2, is_active = $3, \
             version = $4, updated_at = $5 WHERE id = $6 AND version = $7",
        )
        .bind(current.starts_at)
        .bind(current.ends_at)
        .bind(current.is_active)
        .bind(current.version)
        .bind(current.updated_at)
        .bind(id)
        .bind(expected_version)
        .execute(self.table.pool())
        .await
        .map_err(aaa_store_sqlx::map_sqlx_error)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::OptimisticLockFailed {
                entity: "group_role",
                id: id.clone(),
                expected: expected_version,
            });
        }

        Ok(current)
    }

    async fn current_version(&self, id: &String) -> Result<i64, StoreError> {
        let row: (i64,) = sqlx::query_as("SELECT version FROM group_roles WHERE id = $1")
            .bind(id)
            .fetch_optional(self.table.pool())
            .await
            .map_err(aaa_store_sqlx::map_sqlx_error)?
            .ok_or_else(|| StoreError::NotFound(format!("group_role {id}")))?;
        Ok(row.0)
    }
}
