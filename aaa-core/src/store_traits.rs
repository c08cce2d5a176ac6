//! Narrow, domain-specific persistence traits over `Group`, `GroupMembership`,
//! `GroupRole`, and `UserRole`.
//!
//! `aaa-store::Repository`/`VersionedRepository` describe generic CRUD; the
//! algorithms in this crate (`Hierarchy`, `Inheritance`, `Materializer`,
//! `GroupCore`) need a few more domain-specific reads (`find_by_name`,
//! `find_active_children`, upsert-by-source, ...). These traits wrap the
//! concrete `aaa-core::repo::*Repository` (Postgres) adapters so the
//! algorithms can also run against in-memory fakes in tests — the same
//! "trait at the seam, swappable backend" shape `aaa-policy::PolicyEngine`
//! uses for the same reason.

use crate::model::{Group, GroupMembership, GroupRole, Organization, Role, UserRole};
use aaa_store::{Page, Pageable, StoreError};
use async_trait::async_trait;

#[async_trait]
pub trait GroupStore: Send + Sync + 'static {
    async fn find_by_id(&self, id: &str) -> Result<Option<Group>, StoreError>;
    async fn find_by_name(&self, organization_id: &str, name: &str) -> Result<Option<Group>, StoreError>;
    async fn find_active_children(&self, group_id: &str) -> Result<Vec<Group>, StoreError>;
    async fn has_any_children(&self, group_id: &str) -> Result<bool, StoreError>;
    async fn find_all_paged(&self, pageable: &Pageable) -> Result<Page<Group>, StoreError>;
    async fn insert(&self, entity: &Group) -> Result<Group, StoreError>;
    async fn soft_delete(&self, id: &str, deleted_by: &str) -> Result<bool, StoreError>;
    async fn update_versioned(
        &self,
        id: &str,
        expected_version: i64,
        mutate: Box<dyn FnOnce(&mut Group) + Send>,
    ) -> Result<Group, StoreError>;
    async fn current_version(&self, id: &str) -> Result<i64, StoreError>;
}

#[async_trait]
pub trait MembershipStore: Send + Sync + 'static {
    async fn find_by_id(&self, id: &str) -> Result<Option<GroupMembership>, StoreError>;
    async fn find_active(&self, group_id: &str, principal_id: &str) -> Result<Option<GroupMembership>, StoreError>;
    async fn find_active_for_principal_in_org(
        &self,
        organization_id: &str,
        principal_id: &str,
    ) -> Result<Vec<GroupMembership>, StoreError>;
    async fn find_active_user_members(&self, group_id: &str) -> Result<Vec<GroupMembership>, StoreError>;
    /// Active members of any principal type — `DecisionAPI::GetGroupMembers`
    /// reads through this rather than `find_active_user_members`, which the
    /// `Materializer` uses because it only ever fans out for users.
    async fn find_active_members(&self, group_id: &str) -> Result<Vec<GroupMembership>, StoreError>;
    async fn has_any_active_membership(&self, group_id: &str) -> Result<bool, StoreError>;
    async fn insert(&self, entity: &GroupMembership) -> Result<GroupMembership, StoreError>;
    async fn deactivate(&self, group_id: &str, principal_id: &str) -> Result<bool, StoreError>;
}

/// Read-only lookup of the external `Role` shape (`spec.md` §3 — "the core
/// treats roles as opaque identifiers with an active flag" and never
/// mutates them). Backed by whatever store owns role definitions; the core
/// only ever reads through this trait.
#[async_trait]
pub trait RoleLookup: Send + Sync + 'static {
    async fn find_by_id(&self, id: &str) -> Result<Option<Role>, StoreError>;
}

/// Read-only lookup of the external `Organization` (tenant) shape
/// (`spec.md` §3 — referenced only, never mutated by the core).
#[async_trait]
pub trait OrganizationLookup: Send + Sync + 'static {
    async fn find_by_id(&self, id: &str) -> Result<Option<Organization>, StoreError>;
}

#[async_trait]
pub trait GroupRoleStore: Send + Sync + 'static {
    async fn find_by_id(&self, id: &str) -> Result<Option<GroupRole>, StoreError>;
    async fn find_active(&self, group_id: &str, role_id: &str) -> Result<Option<GroupRole>, StoreError>;
    async fn find_active_for_group(&self, group_id: &str) -> Result<Vec<GroupRole>, StoreError>;
    async fn insert(&self, entity: &GroupRole) -> Result<GroupRole, StoreError>;
    async fn deactivate(&self, group_id: &str, role_id: &str) -> Result<bool, StoreError>;
}

#[async_trait]
pub trait UserRoleStore: Send + Sync + 'static {
    async fn upsert_inherited(
        &self,
        id_for_insert: &str,
        user_id: &str,
        role_id: &str,
        source_group_id: &str,
    ) -> Result<(), StoreError>;
    async fn delete_by_user_and_source_group(&self, user_id: &str, group_id: &str) -> Result<u64, StoreError>;
    async fn delete_by_role_and_source_group(&self, role_id: &str, group_id: &str) -> Result<u64, StoreError>;
    /// Deletes exactly one `(user_id, role_id, source_group_id)` row —
    /// used by `Materializer::reconcile` to prune stale entries surgically.
    async fn delete_one(&self, user_id: &str, role_id: &str, group_id: &str) -> Result<bool, StoreError>;
    async fn find_active_for_user(&self, user_id: &str) -> Result<Vec<UserRole>, StoreError>;
}

mod sqlx_impls {
    use super::*;
    use crate::repo::{GroupRepository, GroupRoleRepository, MembershipRepository, UserRoleRepository};
    use aaa_store::{Repository, VersionedRepository};

    #[async_trait]
    impl GroupStore for GroupRepository {
        async fn find_by_id(&self, id: &str) -> Result<Option<Group>, StoreError> {
            Repository::find_by_id(self, &id.to_string()).await
        }

        async fn find_by_name(&self, organization_id: &str, name: &str) -> Result<Option<Group>, StoreError> {
            GroupRepository::find_by_name(self, organization_id, name).await
        }

        async fn find_active_children(&self, group_id: &str) -> Result<Vec<Group>, StoreError> {
            GroupRepository::find_active_children(self, group_id).await
        }

        async fn has_any_children(&self, group_id: &str) -> Result<bool, StoreError> {
            GroupRepository::has_any_children(self, group_id).await
        }

        async fn find_all_paged(&self, pageable: &Pageable) -> Result<Page<Group>, StoreError> {
            Repository::find_all_paged(self, pageable).await
        }

        async fn insert(&self, entity: &Group) -> Result<Group, StoreError> {
            Repository::insert(self, entity).await
        }

        async fn soft_delete(&self, id: &str, deleted_by: &str) -> Result<bool, StoreError> {
            Repository::soft_delete(self, &id.to_string(), deleted_by).await
        }

        async fn update_versioned(
            &self,
            id: &str,
            expected_version: i64,
            mutate: Box<dyn FnOnce(&mut Group) + Send>,
        ) -> Result<Group, StoreError> {
            VersionedRepository::update_versioned(self, &id.to_string(), expected_version, mutate).await
        }

        async fn current_version(&self, id: &str) -> Result<i64, StoreError> {
            VersionedRepository::current_version(self, &id.to_string()).await
        }
    }

    #[async_trait]
    impl MembershipStore for MembershipRepository {
        async fn find_by_id(&self, id: &str) -> Result<Option<GroupMembership>, StoreError> {
            Repository::find_by_id(self, &id.to_string()).await
        }

        async fn find_active(&self, group_id: &str, principal_id: &str) -> Result<Option<GroupMembership>, StoreError> {
            MembershipRepository::find_active(self, group_id, principal_id).await
        }

        async fn find_active_for_principal_in_org(
            &self,
            organization_id: &str,
            principal_id: &str,
        ) -> Result<Vec<GroupMembership>, StoreError> {
            MembershipRepository::find_active_for_principal_in_org(self, organization_id, principal_id).await
        }

        async fn find_active_user_members(&self, group_id: &str) -> Result<Vec<GroupMembership>, StoreError> {
            MembershipRepository::find_active_user_members(self, group_id).await
        }

        async fn find_active_members(&self, group_id: &str) -> Result<Vec<GroupMembership>, StoreError> {
            MembershipRepository::find_active_members(self, group_id).await
        }

        async fn has_any_active_membership(&self, group_id: &str) -> Result<bool, StoreError> {
            MembershipRepository::has_any_active_membership(self, group_id).await
        }

        async fn insert(&self, entity: &GroupMembership) -> Result<GroupMembership, StoreError> {
            Repository::insert(self, entity).await
        }

        async fn deactivate(&self, group_id: &str, principal_id: &str) -> Result<bool, StoreError> {
            MembershipRepository::deactivate(self, group_id, principal_id).await
        }
    }

    #[async_trait]
    impl GroupRoleStore for GroupRoleRepository {
        async fn find_by_id(&self, id: &str) -> Result<Option<GroupRole>, StoreError> {
            Repository::find_by_id(self, &id.to_string()).await
        }

        async fn find_active(&self, group_id: &str, role_id: &str) -> Result<Option<GroupRole>, StoreError> {
            GroupRoleRepository::find_active(self, group_id, role_id).await
        }

        async fn find_active_for_group(&self, group_id: &str) -> Result<Vec<GroupRole>, StoreError> {
            GroupRoleRepository::find_active_for_group(self, group_id).await
        }

        async fn insert(&self, entity: &GroupRole) -> Result<GroupRole, StoreError> {
            Repository::insert(self, entity).await
        }

        async fn deactivate(&self, group_id: &str, role_id: &str) -> Result<bool, StoreError> {
            GroupRoleRepository::deactivate(self, group_id, role_id).await
        }
    }

    #[async_trait]
    impl UserRoleStore for UserRoleRepository {
        async fn upsert_inherited(
            &self,
            id_for_insert: &str,
            user_id: &str,
            role_id: &str,
            source_group_id: &str,
        ) -> Result<(), StoreError> {
            UserRoleRepository::upsert_inherited(self, id_for_insert, user_id, role_id, source_group_id).await
        }

        async fn delete_by_user_and_source_group(&self, user_id: &str, group_id: &str) -> Result<u64, StoreError> {
            UserRoleRepository::delete_by_user_and_source_group(self, user_id, group_id).await
        }

        async fn delete_by_role_and_source_group(&self, role_id: &str, group_id: &str) -> Result<u64, StoreError> {
            UserRoleRepository::delete_by_role_and_source_group(self, role_id, group_id).await
        }

        async fn delete_one(&self, user_id: &str, role_id: &str, group_id: &str) -> Result<bool, StoreError> {
            UserRoleRepository::delete_one(self, user_id, role_id, group_id).await
        }

        async fn find_active_for_user(&self, user_id: &str) -> Result<Vec<UserRole>, StoreError> {
            UserRoleRepository::find_active_for_user(self, user_id).await
        }
    }
}
