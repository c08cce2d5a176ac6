use crate::model::{RoleSource, UserRole};
use aaa_store::{Page, Pageable, Repository, StoreError};
use aaa_store_sqlx::SqlxTable;
use async_trait::async_trait;
use chrono::Utc;

/// Postgres-backed `UserRole` repository. `UserRole` is not versioned
/// (`spec.md` §3) — the `Materializer`'s fan-out/fan-in is idempotent
/// upsert/delete rather than optimistic-lock arbitrated.
#[derive(Clone)]
pub struct UserRoleRepository {
    table: SqlxTable<UserRole>,
}

impl UserRoleRepository {
    pub fn new(table: SqlxTable<UserRole>) -> Self {
        Self { table }
    }

    /// Upserts an `inherited` row for `(user, role, source_group)` (U1):
    /// inserts if absent, reactivates if present but inactive, no-op if
    /// already active. Used by `Materializer` fan-out.
    pub async fn upsert_inherited(
        &self,
        id_for_insert: &str,
        user_id: &str,
        role_id: &str,
        source_group_id: &str,
    ) -> Result<(), StoreError> {
        let now = Utc::now();
        sqlx::query(
            "INSERT INTO user_roles (id, user_id, role_id, source, source_group_id, is_active, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, true, $6, $6) \
             ON CONFLICT (user_id, role_id, source_group_id) \
             DO UPDATE SET is_active = true, updated_at = $6 \
             WHERE user_roles.is_active = false",
        )
        .bind(id_for_insert)
        .bind(user_id)
        .bind(role_id)
        .bind(RoleSource::Inherited)
        .bind(source_group_id)
        .bind(now)
        .execute(self.table.pool())
        .await
        .map_err(aaa_store_sqlx::map_sqlx_error)?;
        Ok(())
    }

    /// Deletes all `UserRole` rows for `user_id` sourced from `group_id`
    /// (fan-in on membership removal).
    pub async fn delete_by_user_and_source_group(&self, user_id: &str, group_id: &str) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM user_roles WHERE user_id = $1 AND source_group_id = $2")
            .bind(user_id)
            .bind(group_id)
            .execute(self.table.pool())
            .await
            .map_err(aaa_store_sqlx::map_sqlx_error)?;
        Ok(result.rows_affected())
    }

    /// Deletes the single `UserRole` row for `(user_id, role_id, source_group_id)`,
    /// if present. Used by `Materializer::reconcile` to remove exactly the
    /// stale rows a recomputation finds, without touching the user's other
    /// materialized grants.
    pub async fn delete_one(&self, user_id: &str, role_id: &str, group_id: &str) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "DELETE FROM user_roles WHERE user_id = $1 AND role_id = $2 AND source_group_id = $3",
        )
        .bind(user_id)
        .bind(role_id)
        .bind(group_id)
        .execute(self.table.pool())
        .await
        .map_err(aaa_store_sqlx::map_sqlx_error)?;
        Ok(result.rows_affected() > 0)
    }

    /// Deletes the `UserRole` row matching `(role_id, source_group_id)` for
    /// every member (fan-in on role-from-group removal).
    pub async fn delete_by_role_and_source_group(&self, role_id: &str, group_id: &str) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM user_roles WHERE role_id = $1 AND source_group_id = $2")
            .bind(role_id)
            .bind(group_id)
            .execute(self.table.pool())
            .await
            .map_err(aaa_store_sqlx::map_sqlx_error)?;
        Ok(result.rows_affected())
    }

    /// All active `UserRole` rows for a user, direct and materialized-inherited.
    pub async fn find_active_for_user(&self, user_id: &str) -> Result<Vec<UserRole>, StoreError> {
        sqlx::query_as::<_, UserRole>("SELECT * FROM user_roles WHERE user_id = $1 AND is_active = true")
            .bind(user_id)
            .fetch_all(self.table.pool())
            .await
            .map_err(aaa_store_sqlx::map_sqlx_error)
    }
}

#[async_trait]
impl Repository<UserRole, String> for UserRoleRepository {
    async fn find_by_id(&self, id: &String) -> Result<Option<UserRole>, StoreError> {
        sqlx::query_as::<_, UserRole>("SELECT * FROM user_roles WHERE id = $1")
            .bind(id)
            .fetch_optional(self.table.pool())
            .await
            .map_err(aaa_store_sqlx::map_sqlx_error)
    }

    async fn find_all_paged(&self, pageable: &Pageable) -> Result<Page<UserRole>, StoreError> {
        let content = sqlx::query_as::<_, UserRole>("SELECT * FROM user_roles ORDER BY id LIMIT $1 OFFSET $2")
            .bind(pageable.size as i64)
            .bind(pageable.offset() as i64)
            .fetch_all(self.table.pool())
            .await
            .map_err(aaa_store_sqlx::map_sqlx_error)?;

        let total: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM user_roles")
            .fetch_one(self.table.pool())
            .await
            .map_err(aaa_store_sqlx::map_sqlx_error)?;

        Ok(Page::new(content, pageable, total.0 as u64))
    }

    async fn insert(&self, entity: &UserRole) -> Result<UserRole, StoreError> {
        sqlx::query_as::<_, UserRole>(
            "INSERT INTO user_roles (id, user_id, role_id, source, source_group_id, is_active, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8) RETURNING *",
        )
        .bind(&entity.id)
        .bind(&entity.user_id)
        .bind(&entity.role_id)
        .bind(entity.source)
        .bind(&entity.source_group_id)
        .bind(entity.is_active)
        .bind(entity.created_at)
        .bind(entity.updated_at)
        .fetch_one(self.table.pool())
        .await
        .map_err(aaa_store_sqlx::map_sqlx_error)
    }

    async fn soft_delete(&self, id: &String, _deleted_by: &str) -> Result<bool, StoreError> {
        let result = sqlx::query("UPDATE user_roles SET is_active = false, updated_at = $1 WHERE id = $2")
            .bind(Utc::now())
            .bind(id)
            .execute(self.table.pool())
            .await
            .map_err(aaa_store_sqlx::map_sqlx_error)?;
        Ok(result.rows_affected() > 0)
    }
}
