//! `DecisionAPI` — external-facing, read-only query surface (`spec.md` §4.6).
//!
//! Every method enforces tenant isolation: a group, role, or membership that
//! belongs to a different organization than the one named in the call is
//! reported as `NotFound`, never leaked across the boundary.

use crate::error::CoreError;
use crate::inheritance::Inheritance;
use crate::model::{EffectiveRole, Group, GroupRole};
use crate::store_traits::{GroupRoleStore, GroupStore, MembershipStore};
use aaa_cache::TypedCache;
use aaa_store::{Page, Pageable};
use std::sync::Arc;
use std::time::Duration;

/// Cache key for a group's directly-assigned roles (`spec.md` §4.6's
/// `GetGroupRoles`, cached per §9's `group:{id}:…` prefix convention).
pub(crate) fn group_roles_key(group_id: &str) -> String {
    format!("group:{group_id}:roles")
}

/// Cache key for a group's active members (`spec.md` §4.6's
/// `GetGroupMembers`).
pub(crate) fn group_members_key(group_id: &str) -> String {
    format!("group:{group_id}:members")
}

#[derive(Clone)]
pub struct DecisionAPI {
    inheritance: Inheritance,
    groups: Arc<dyn GroupStore>,
    memberships: Arc<dyn MembershipStore>,
    group_roles: Arc<dyn GroupRoleStore>,
    cache: TypedCache,
    members_ttl: Duration,
}

impl DecisionAPI {
    pub fn new(
        inheritance: Inheritance,
        groups: Arc<dyn GroupStore>,
        memberships: Arc<dyn MembershipStore>,
        group_roles: Arc<dyn GroupRoleStore>,
        cache: TypedCache,
        members_ttl: Duration,
    ) -> Self {
        Self {
            inheritance,
            groups,
            memberships,
            group_roles,
            cache,
            members_ttl,
        }
    }

    async fn require_group_in_org(&self, organization_id: &str, group_id: &str) -> Result<Group, CoreError> {
        let group = self
            .groups
            .find_by_id(group_id)
            .await
            .map_err(CoreError::from)?
            .ok_or_else(|| CoreError::not_found(format!("group {group_id}")))?;
        if group.organization_id != organization_id {
            return Err(CoreError::not_found(format!("group {group_id}")));
        }
        Ok(group)
    }

    /// Every role that applies to `user_id` within `organization_id`,
    /// cache-first via [`Inheritance`].
    pub async fn get_user_effective_roles(
        &self,
        organization_id: &str,
        user_id: &str,
    ) -> Result<Vec<EffectiveRole>, CoreError> {
        self.inheritance.effective_roles(organization_id, user_id).await
    }

    /// Roles assigned directly to `group_id` (not inherited), cache-first
    /// under `group:{id}:roles` (`spec.md` §4.6).
    pub async fn get_group_roles(&self, organization_id: &str, group_id: &str) -> Result<Vec<GroupRole>, CoreError> {
        self.require_group_in_org(organization_id, group_id).await?;

        let key = group_roles_key(group_id);
        if let Some(cached) = self.cache.get::<Vec<GroupRole>>(&key).await {
            return Ok(cached);
        }

        let roles = self.group_roles.find_active_for_group(group_id).await.map_err(CoreError::from)?;
        self.cache.set(&key, &roles, self.members_ttl).await;
        Ok(roles)
    }

    /// Active members of `group_id`, paginated. Direct members only — this
    /// is a membership listing, not an inheritance query. The unpaginated
    /// set is cached under `group:{id}:members` (`spec.md` §4.6).
    pub async fn get_group_members(
        &self,
        organization_id: &str,
        group_id: &str,
        pageable: &Pageable,
    ) -> Result<Page<crate::model::GroupMembership>, CoreError> {
        self.require_group_in_org(organization_id, group_id).await?;

        let key = group_members_key(group_id);
        let all = match self.cache.get::<Vec<crate::model::GroupMembership>>(&key).await {
            Some(cached) => cached,
            None => {
                let members = self.memberships.find_active_members(group_id).await.map_err(CoreError::from)?;
                self.cache.set(&key, &members, self.members_ttl).await;
                members
            }
        };
        Ok(paginate(all, pageable))
    }

    /// The single `EffectiveRole` covering `role_id` for `user_id`, or
    /// `NotFound` if that role does not apply to them.
    pub async fn get_role_inheritance_path(
        &self,
        organization_id: &str,
        user_id: &str,
        role_id: &str,
    ) -> Result<EffectiveRole, CoreError> {
        let effective = self.inheritance.effective_roles(organization_id, user_id).await?;
        effective
            .into_iter()
            .find(|r| r.role.id == role_id)
            .ok_or_else(|| CoreError::not_found(format!("role {role_id} does not apply to user {user_id}")))
    }

    /// The groups `user_id` directly belongs to within `organization_id`,
    /// paginated.
    pub async fn get_user_groups_in_organization(
        &self,
        organization_id: &str,
        user_id: &str,
        pageable: &Pageable,
    ) -> Result<Page<Group>, CoreError> {
        let group_ids = self.inheritance.direct_group_ids(organization_id, user_id).await?;
        let mut groups = Vec::with_capacity(group_ids.len());
        for group_id in &group_ids {
            if let Some(group) = self.groups.find_by_id(group_id).await.map_err(CoreError::from)? {
                groups.push(group);
            }
        }
        Ok(paginate(groups, pageable))
    }
}

fn paginate<T>(mut all: Vec<T>, pageable: &Pageable) -> Page<T> {
    let total = all.len() as u64;
    let start = pageable.offset() as usize;
    let content = if start >= all.len() {
        Vec::new()
    } else {
        let end = (start + pageable.size as usize).min(all.len());
        all.drain(start..end).collect()
    };
    Page::new(content, pageable, total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hierarchy::Hierarchy;
    use crate::model::{GroupMembership, Organization, PrincipalType, Role};
    use crate::tests_support::fake_repos::{
        FakeGroupRepository, FakeGroupRoleRepository, FakeMembershipRepository, FakeRoleLookup,
    };
    use aaa_cache::TypedCache;
    use chrono::Utc;
    use std::time::Duration;

    fn group(id: &str, org_id: &str, parent: Option<&str>) -> Group {
        Group {
            id: id.to_string(),
            organization_id: org_id.to_string(),
            name: id.to_string(),
            description: None,
            parent_id: parent.map(str::to_string),
            is_active: true,
            version: 1,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            created_by: "user:admin".to_string(),
            updated_by: "user:admin".to_string(),
            deleted_by: None,
            deleted_at: None,
        }
    }

    fn membership(group_id: &str, user_id: &str) -> GroupMembership {
        GroupMembership {
            id: format!("{group_id}-{user_id}"),
            group_id: group_id.to_string(),
            principal_id: user_id.to_string(),
            principal_type: PrincipalType::User,
            starts_at: None,
            ends_at: None,
            is_active: true,
            added_by: "user:admin".to_string(),
            version: 1,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn group_role(group_id: &str, role_id: &str) -> GroupRole {
        GroupRole {
            id: format!("GR-{group_id}-{role_id}"),
            group_id: group_id.to_string(),
            role_id: role_id.to_string(),
            organization_id: "O1".to_string(),
            assigned_by: "user:admin".to_string(),
            starts_at: None,
            ends_at: None,
            is_active: true,
            version: 1,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn build(
        groups: Vec<Group>,
        memberships: Vec<GroupMembership>,
        group_roles: Vec<GroupRole>,
        roles: Vec<Role>,
    ) -> DecisionAPI {
        let group_repo = FakeGroupRepository::new(groups);
        let membership_repo = FakeMembershipRepository::new(memberships);
        let group_role_repo = FakeGroupRoleRepository::new(group_roles);
        let role_lookup = FakeRoleLookup::new(roles);

        let hierarchy = Hierarchy::new(group_repo.clone().into_repo(), 32);
        let inheritance = Inheritance::new(
            hierarchy,
            group_repo.clone().into_repo(),
            membership_repo.clone().into_repo(),
            group_role_repo.clone().into_repo(),
            role_lookup.into_repo(),
            TypedCache::in_memory(),
            Duration::from_secs(300),
            Duration::from_secs(1800),
        );

        DecisionAPI::new(
            inheritance,
            group_repo.into_repo(),
            membership_repo.into_repo(),
            group_role_repo.into_repo(),
            TypedCache::in_memory(),
            Duration::from_secs(600),
        )
    }

    #[tokio::test]
    async fn get_group_roles_from_other_org_is_not_found() {
        let api = build(vec![group("G1", "O2", None)], vec![], vec![], vec![]);
        let result = api.get_group_roles("O1", "G1").await;
        assert!(matches!(result, Err(CoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn get_group_members_paginates() {
        let api = build(
            vec![group("G1", "O1", None)],
            vec![membership("G1", "U1"), membership("G1", "U2"), membership("G1", "U3")],
            vec![],
            vec![],
        );
        let page = api.get_group_members("O1", "G1", &Pageable::new(0, 2)).await.unwrap();
        assert_eq!(page.content.len(), 2);
        assert_eq!(page.total_elements, 3);
        assert_eq!(page.total_pages, 2);
    }

    #[tokio::test]
    async fn get_group_members_and_roles_populate_cache() {
        let api = build(
            vec![group("G1", "O1", None)],
            vec![membership("G1", "U1")],
            vec![group_role("G1", "R1")],
            vec![],
        );
        assert!(api.cache.is_empty());

        let _ = api.get_group_members("O1", "G1", &Pageable::new(0, 10)).await.unwrap();
        assert!(api.cache.get::<Vec<crate::model::GroupMembership>>(&group_members_key("G1")).await.is_some());

        let _ = api.get_group_roles("O1", "G1").await.unwrap();
        assert!(api.cache.get::<Vec<GroupRole>>(&group_roles_key("G1")).await.is_some());
    }

    #[tokio::test]
    async fn get_role_inheritance_path_returns_not_found_when_absent() {
        let api = build(vec![group("G1", "O1", None)], vec![membership("G1", "U1")], vec![], vec![]);
        let result = api.get_role_inheritance_path("O1", "U1", "R_missing").await;
        assert!(matches!(result, Err(CoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn get_role_inheritance_path_returns_effective_role() {
        let api = build(
            vec![group("G1", "O1", None)],
            vec![membership("G1", "U1")],
            vec![group_role("G1", "R1")],
            vec![Role { id: "R1".to_string(), name: "R1".to_string(), description: None, is_active: true }],
        );
        let found = api.get_role_inheritance_path("O1", "U1", "R1").await.unwrap();
        assert_eq!(found.role.id, "R1");
        assert_eq!(found.distance, 0);
    }

    #[tokio::test]
    async fn get_user_groups_in_organization_paginates() {
        let api = build(
            vec![group("G1", "O1", None), group("G2", "O1", None)],
            vec![membership("G1", "U1"), membership("G2", "U1")],
            vec![],
            vec![],
        );
        let page = api.get_user_groups_in_organization("O1", "U1", &Pageable::new(0, 1)).await.unwrap();
        assert_eq!(page.content.len(), 1);
        assert_eq!(page.total_elements, 2);
    }
}
