use crate::model::{GroupMembership, PrincipalType};
use aaa_store::{Page, Pageable, Repository, StoreError, VersionedRepository};
use aaa_store_sqlx::SqlxTable;
use async_trait::async_trait;
use chrono::Utc;

/// Postgres-backed `GroupMembership` repository.
#[derive(Clone)]
pub struct MembershipRepository {
    table: SqlxTable<GroupMembership>,
}

impl MembershipRepository {
    pub fn new(table: SqlxTable<GroupMembership>) -> Self {
        Self { table }
    }

    /// The single active membership for `(group_id, principal_id)`, if
    /// any (M1).
    pub async fn find_active(&self, group_id: &str, principal_id: &str) -> Result<Option<GroupMembership>, StoreError> {
        sqlx::query_as::<_, GroupMembership>(
            "SELECT * FROM group_memberships WHERE group_id = $1 AND principal_id = $2 AND is_active = true",
        )
        .bind(group_id)
        .bind(principal_id)
        .fetch_optional(self.table.pool())
        .await
        .map_err(aaa_store_sqlx::map_sqlx_error)
    }

    /// Active memberships for a principal across every group in an
    /// organization — the starting point for `Inheritance`'s direct-group
    /// resolution.
    pub async fn find_active_for_principal_in_org(
        &self,
        organization_id: &str,
        principal_id: &str,
    ) -> Result<Vec<GroupMembership>, StoreError> {
        sqlx::query_as::<_, GroupMembership>(
            "SELECT gm.* FROM group_memberships gm \
             JOIN groups g ON g.id = gm.group_id \
             WHERE g.organization_id = $1 AND gm.principal_id = $2 \
               AND gm.is_active = true AND g.deleted_at IS NULL",
        )
        .bind(organization_id)
        .bind(principal_id)
        .fetch_all(self.table.pool())
        .await
        .map_err(aaa_store_sqlx::map_sqlx_error)
    }

    /// Active user members of a group — `Materializer` fan-out target on
    /// role assignment.
    pub async fn find_active_user_members(&self, group_id: &str) -> Result<Vec<GroupMembership>, StoreError> {
        sqlx::query_as::<_, GroupMembership>(
            "SELECT * FROM group_memberships WHERE group_id = $1 AND principal_type = $2 AND is_active = true",
        )
        .bind(group_id)
        .bind(PrincipalType::User)
        .fetch_all(self.table.pool())
        .await
        .map_err(aaa_store_sqlx::map_sqlx_error)
    }

    /// Active members of any principal type — used by
    /// `DecisionAPI::GetGroupMembers`, which (unlike the `Materializer`)
    /// surfaces service principals too.
    pub async fn find_active_members(&self, group_id: &str) -> Result<Vec<GroupMembership>, StoreError> {
        sqlx::query_as::<_, GroupMembership>(
            "SELECT * FROM group_memberships WHERE group_id = $1 AND is_active = true",
        )
        .bind(group_id)
        .fetch_all(self.table.pool())
        .await
        .map_err(aaa_store_sqlx::map_sqlx_error)
    }

    /// Whether `group_id` has any active membership — used by
    /// `DeleteGroup`'s "no active memberships" precondition.
    pub async fn has_any_active_membership(&self, group_id: &str) -> Result<bool, StoreError> {
        let row: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM group_memberships WHERE group_id = $1 AND is_active = true",
        )
        .bind(group_id)
        .fetch_one(self.table.pool())
        .await
        .map_err(aaa_store_sqlx::map_sqlx_error)?;
        Ok(row.0 > 0)
    }

    /// Deactivates the active membership for `(group_id, principal_id)`.
    pub async fn deactivate(&self, group_id: &str, principal_id: &str) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE group_memberships SET is_active = false, updated_at = $1 \
             WHERE group_id = $2 AND principal_id = $3 AND is_active = true",
        )
        .bind(Utc::now())
        .bind(group_id)
        .bind(principal_id)
        .execute(self.table.pool())
        .await
        .map_err(aaa_store_sqlx::map_sqlx_error)?;

        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl Repository<GroupMembership, String> for MembershipRepository {
    async fn find_by_id(&self, id: &String) -> Result<Option<GroupMembership>, StoreError> {
        sqlx::query_as::<_, GroupMembership>("SELECT * FROM group_memberships WHERE id = $1")
            .bind(id)
            .fetch_optional(self.table.pool())
            .await
            .map_err(aaa_store_sqlx::map_sqlx_error)
    }

    async fn find_all_paged(&self, pageable: &Pageable) -> Result<Page<GroupMembership>, StoreError> {
        let content = sqlx::query_as::<_, GroupMembership>(
            "SELECT * FROM group_memberships ORDER BY id LIMIT $1 OFFSET $2",
        )
        .bind(pageable.size as i64)
        .bind(pageable.offset() as i64)
        .fetch_all(self.table.pool())
        .await
        .map_err(aaa_store_sqlx::map_sqlx_error)?;

        let total: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM group_memberships")
            .fetch_one(self.table.pool())
            .await
            .map_err(aaa_store_sqlx::map_sqlx_error)?;

        Ok(Page::new(content, pageable, total.0 as u64))
    }

    async fn insert(&self, entity: &GroupMembership) -> Result<GroupMembership, StoreError> {
        sqlx::query_as::<_, GroupMembership>(
            "INSERT INTO group_memberships (id, group_id, principal_id, principal_type, starts_at, \
             ends_at, is_active, added_by, version, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11) RETURNING *",
        )
        .bind(&entity.id)
        .bind(&entity.group_id)
        .bind(&entity.principal_id)
        .bind(entity.principal_type)
        .bind(entity.starts_at)
        .bind(entity.ends_at)
        .bind(entity.is_active)
        .bind(&entity.added_by)
        .bind(entity.version)
        .bind(entity.created_at)
        .bind(entity.updated_at)
        .fetch_one(self.table.pool())
        .await
        .map_err(aaa_store_sqlx::map_sqlx_error)
    }

    async fn soft_delete(&self, id: &String, _deleted_by: &str) -> Result<bool, StoreError> {
        // Memberships have no `deleted_at` column — removal is modeled as
        // deactivation (`deactivate`), not a soft-delete.
        self.deactivate_by_id(id).await
    }
}

impl MembershipRepository {
    async fn deactivate_by_id(&self, id: &str) -> Result<bool, StoreError> {
        let result = sqlx::query("UPDATE group_memberships SET is_active = false, updated_at = $1 WHERE id = $2")
            .bind(Utc::now())
            .bind(id)
            .execute(self.table.pool())
            .await
            .map_err(aaa_store_sqlx::map_sqlx_error)?;
        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl VersionedRepository<GroupMembership, String> for MembershipRepository {
    async fn update_versioned(
        &self,
        id: &String,
        expected_version: i64,
        mutate: Box<dyn FnOnce(&mut GroupMembership) + Send>,
    ) -> Result<GroupMembership, StoreError> {
        let mut current = self
            .find_by_id(id)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("membership {id}")))?;

        mutate(&mut current);
        current.version = expected_version + 1;
        current.updated_at = Utc::now();

        let result = sqlx::query(
            "UPDATE group_memberships SET starts_at = $1, ends_at = $2, is_active = $3, \
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
                entity: "group_membership",
                id: id.clone(),
                expected: expected_version,
            });
        }

        Ok(current)
    }

    async fn current_version(&self, id: &String) -> Result<i64, StoreError> {
        let row: (i64,) = sqlx::query_as("SELECT version FROM group_memberships WHERE id = $1")
            .bind(id)
            .fetch_optional(self.table.pool())
            .await
            .map_err(aaa_store_sqlx::map_sqlx_error)?
            .ok_or_else(|| StoreError::NotFound(format!("membership {id}")))?;
        Ok(row.0)
    }
}
