//! `GroupCore` — orchestration: validation, tenant isolation, audit
//! emission, cache invalidation (`spec.md` §4.5).

use crate::decision_api::{group_members_key, group_roles_key};
use crate::error::CoreError;
use crate::hierarchy::Hierarchy;
use crate::inheritance::Inheritance;
use crate::materializer::Materializer;
use crate::model::{Group, GroupMembership, GroupRole, PrincipalType};
use crate::store_traits::{GroupRoleStore, GroupStore, MembershipStore, OrganizationLookup, RoleLookup};
use aaa_audit::{AuditAction, AuditEvent, AuditSink};
use aaa_cache::TypedCache;
use aaa_idgen::{EntityPrefix, IdGenerator};
use aaa_store::StoreError;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

pub struct CreateGroupRequest {
    pub organization_id: String,
    pub name: String,
    pub description: Option<String>,
    pub parent_id: Option<String>,
    pub created_by: String,
}

/// `None` leaves a field unchanged. For `parent_id`, `Some(None)` clears it
/// (the group becomes a root); `Some(Some(id))` reparents it.
pub struct UpdateGroupRequest {
    pub name: Option<String>,
    pub description: Option<Option<String>>,
    pub parent_id: Option<Option<String>>,
    pub is_active: Option<bool>,
    pub expected_version: i64,
    pub updated_by: String,
}

pub struct AddMemberRequest {
    pub group_id: String,
    pub principal_id: String,
    pub principal_type: PrincipalType,
    pub starts_at: Option<DateTime<Utc>>,
    pub ends_at: Option<DateTime<Utc>>,
    pub added_by: String,
}

#[derive(Clone)]
pub struct GroupCore {
    hierarchy: Hierarchy,
    inheritance: Inheritance,
    materializer: Materializer,
    groups: Arc<dyn GroupStore>,
    memberships: Arc<dyn MembershipStore>,
    group_roles: Arc<dyn GroupRoleStore>,
    roles: Arc<dyn RoleLookup>,
    organizations: Arc<dyn OrganizationLookup>,
    audit: Arc<dyn AuditSink>,
    id_gen: Arc<dyn IdGenerator>,
    /// Shared with `DecisionAPI` — invalidated here so `GetGroupRoles`/
    /// `GetGroupMembers` (`spec.md` §4.6) never serve stale entries past a
    /// mutation, per §4.5's "invalidates ... the group-members cache".
    cache: TypedCache,
}

impl GroupCore {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        hierarchy: Hierarchy,
        inheritance: Inheritance,
        materializer: Materializer,
        groups: Arc<dyn GroupStore>,
        memberships: Arc<dyn MembershipStore>,
        group_roles: Arc<dyn GroupRoleStore>,
        roles: Arc<dyn RoleLookup>,
        organizations: Arc<dyn OrganizationLookup>,
        audit: Arc<dyn AuditSink>,
        id_gen: Arc<dyn IdGenerator>,
        cache: TypedCache,
    ) -> Self {
        Self {
            hierarchy,
            inheritance,
            materializer,
            groups,
            memberships,
            group_roles,
            roles,
            organizations,
            audit,
            id_gen,
            cache,
        }
    }

    async fn emit_audit(&self, event: AuditEvent) {
        if let Err(err) = self.audit.record(event).await {
            tracing::warn!(error = %err, "audit emission failed, continuing");
        }
    }

    async fn require_active_organization(&self, organization_id: &str) -> Result<(), CoreError> {
        let org = self
            .organizations
            .find_by_id(organization_id)
            .await
            .map_err(CoreError::from)?
            .ok_or_else(|| CoreError::not_found(format!("organization {organization_id}")))?;
        if !org.is_active {
            return Err(CoreError::validation(format!("organization {organization_id} is not active")));
        }
        Ok(())
    }

    async fn require_group(&self, group_id: &str) -> Result<Group, CoreError> {
        self.groups
            .find_by_id(group_id)
            .await
            .map_err(CoreError::from)?
            .ok_or_else(|| CoreError::not_found(format!("group {group_id}")))
    }

    pub async fn create_group(&self, req: CreateGroupRequest) -> Result<Group, CoreError> {
        if req.name.trim().is_empty() {
            return Err(CoreError::validation("group name must not be empty"));
        }
        self.require_active_organization(&req.organization_id).await?;

        if self
            .groups
            .find_by_name(&req.organization_id, &req.name)
            .await
            .map_err(CoreError::from)?
            .is_some()
        {
            return Err(CoreError::conflict(format!(
                "group name {:?} already exists in organization {}",
                req.name, req.organization_id
            )));
        }

        if let Some(parent_id) = &req.parent_id {
            let parent = self.require_group(parent_id).await?;
            if parent.organization_id != req.organization_id {
                return Err(CoreError::validation("parent group must belong to the same organization"));
            }
            if !parent.is_active || parent.is_deleted() {
                return Err(CoreError::validation("parent group must be active"));
            }
        }

        let now = Utc::now();
        let group = Group {
            id: self.id_gen.generate(EntityPrefix::Group),
            organization_id: req.organization_id.clone(),
            name: req.name,
            description: req.description,
            parent_id: req.parent_id,
            is_active: true,
            version: 1,
            created_at: now,
            updated_at: now,
            created_by: req.created_by.clone(),
            updated_by: req.created_by.clone(),
            deleted_by: None,
            deleted_at: None,
        };

        let created = self.groups.insert(&group).await.map_err(CoreError::from)?;

        self.emit_audit(AuditEvent::new(
            AuditAction::CreateGroup,
            &created.organization_id,
            &req.created_by,
            &created.id,
        ))
        .await;

        Ok(created)
    }

    pub async fn update_group(&self, group_id: &str, req: UpdateGroupRequest) -> Result<Group, CoreError> {
        let current = self.require_group(group_id).await?;

        if let Some(name) = &req.name {
            if name.trim().is_empty() {
                return Err(CoreError::validation("group name must not be empty"));
            }
            if let Some(existing) = self
                .groups
                .find_by_name(&current.organization_id, name)
                .await
                .map_err(CoreError::from)?
            {
                if existing.id != current.id {
                    return Err(CoreError::conflict(format!("group name {name:?} already exists in organization")));
                }
            }
        }

        let mut new_parent_id: Option<String> = current.parent_id.clone();
        if let Some(requested_parent) = &req.parent_id {
            match requested_parent {
                Some(parent_id) => {
                    let parent = self.require_group(parent_id).await?;
                    if parent.organization_id != current.organization_id {
                        return Err(CoreError::validation("parent group must belong to the same organization"));
                    }
                    if !parent.is_active || parent.is_deleted() {
                        return Err(CoreError::validation("parent group must be active"));
                    }
                    if self.hierarchy.would_create_cycle(group_id, parent_id).await? {
                        return Err(CoreError::validation("reparenting would create a cycle"));
                    }
                    new_parent_id = Some(parent_id.clone());
                }
                None => new_parent_id = None,
            }
        }

        let parent_changed = new_parent_id != current.parent_id;
        let old_parent_id = current.parent_id.clone();

        let name = req.name.clone();
        let description = req.description.clone();
        let is_active = req.is_active;
        let mutate_parent = new_parent_id.clone();
        let expected_version = req.expected_version;
        let updated_by = req.updated_by.clone();
        let mutate: Box<dyn FnOnce(&mut Group) + Send> = Box::new(move |g: &mut Group| {
            if let Some(name) = name {
                g.name = name;
            }
            if let Some(description) = description {
                g.description = description;
            }
            g.parent_id = mutate_parent;
            if let Some(is_active) = is_active {
                g.is_active = is_active;
            }
            g.updated_by = updated_by;
        });

        let updated = match self.groups.update_versioned(group_id, expected_version, mutate).await {
            Ok(g) => g,
            Err(StoreError::OptimisticLockFailed { entity, id, expected }) => {
                let current_version = self.groups.current_version(group_id).await.map_err(CoreError::from)?;
                return Err(CoreError::OptimisticLock {
                    entity,
                    id,
                    expected,
                    current: current_version,
                });
            }
            Err(other) => return Err(CoreError::from(other)),
        };

        self.emit_audit(AuditEvent::new(
            AuditAction::UpdateGroup,
            &updated.organization_id,
            &updated.updated_by,
            &updated.id,
        ))
        .await;

        if parent_changed {
            self.emit_audit(
                AuditEvent::new(
                    AuditAction::ChangeGroupHierarchy,
                    &updated.organization_id,
                    &updated.updated_by,
                    &updated.id,
                )
                .with_detail(serde_json::json!({
                    "old_parent_id": old_parent_id,
                    "new_parent_id": updated.parent_id,
                })),
            )
            .await;

            if let Err(err) = self
                .inheritance
                .invalidate_for_hierarchy_change(
                    &updated.organization_id,
                    group_id,
                    old_parent_id.as_deref(),
                    updated.parent_id.as_deref(),
                )
                .await
            {
                tracing::warn!(group_id, error = %err, "failed to invalidate caches after hierarchy change");
            }
        } else if req.is_active.is_some() {
            if let Err(err) = self.inheritance.invalidate_for_group_deletion(&updated.organization_id, group_id).await {
                tracing::warn!(group_id, error = %err, "failed to invalidate caches after activity change");
            }
        }

        Ok(updated)
    }

    pub async fn delete_group(&self, group_id: &str, actor: &str) -> Result<(), CoreError> {
        let group = self.require_group(group_id).await?;

        if self.groups.has_any_children(group_id).await.map_err(CoreError::from)? {
            return Err(CoreError::validation("group has children and cannot be deleted"));
        }
        if self.memberships.has_any_active_membership(group_id).await.map_err(CoreError::from)? {
            return Err(CoreError::validation("group has active memberships and cannot be deleted"));
        }

        let deleted = self.groups.soft_delete(group_id, actor).await.map_err(CoreError::from)?;
        if !deleted {
            return Err(CoreError::not_found(format!("group {group_id}")));
        }

        if let Err(err) = self.inheritance.invalidate_for_group_deletion(&group.organization_id, group_id).await {
            tracing::warn!(group_id, error = %err, "failed to invalidate caches after group deletion");
        }

        self.emit_audit(AuditEvent::new(AuditAction::DeleteGroup, &group.organization_id, actor, group_id))
            .await;

        Ok(())
    }

    pub async fn add_member(
        &self,
        req: AddMemberRequest,
        cancel: &CancellationToken,
    ) -> Result<GroupMembership, CoreError> {
        let group = self.require_group(&req.group_id).await?;
        if !group.is_active || group.is_deleted() {
            return Err(CoreError::validation("group is not active"));
        }

        if let (Some(starts), Some(ends)) = (req.starts_at, req.ends_at) {
            if starts >= ends {
                return Err(CoreError::validation("starts_at must be before ends_at"));
            }
        }

        if self
            .memberships
            .find_active(&req.group_id, &req.principal_id)
            .await
            .map_err(CoreError::from)?
            .is_some()
        {
            return Err(CoreError::conflict(format!(
                "principal {} already has an active membership in group {}",
                req.principal_id, req.group_id
            )));
        }

        let now = Utc::now();
        let membership = GroupMembership {
            id: self.id_gen.generate(EntityPrefix::Membership),
            group_id: req.group_id.clone(),
            principal_id: req.principal_id.clone(),
            principal_type: req.principal_type,
            starts_at: req.starts_at,
            ends_at: req.ends_at,
            is_active: true,
            added_by: req.added_by.clone(),
            version: 1,
            created_at: now,
            updated_at: now,
        };

        let created = self.memberships.insert(&membership).await.map_err(CoreError::from)?;

        self.inheritance.invalidate_user(&group.organization_id, &req.principal_id).await;
        self.cache.delete(&group_members_key(&req.group_id)).await;

        if req.principal_type == PrincipalType::User {
            match self.materializer.fan_out_membership_added(&req.group_id, &req.principal_id, cancel).await {
                Ok(summary) if summary.failed > 0 => {
                    tracing::warn!(group_id = %req.group_id, principal_id = %req.principal_id, failed = summary.failed, "partial materialization on membership add");
                }
                Err(err) => {
                    tracing::warn!(group_id = %req.group_id, principal_id = %req.principal_id, error = %err, "materializer fan-out failed, continuing");
                }
                _ => {}
            }
        }

        self.emit_audit(AuditEvent::new(
            AuditAction::AddMember,
            &group.organization_id,
            &req.added_by,
            &created.id,
        ))
        .await;

        Ok(created)
    }

    pub async fn remove_member(
        &self,
        group_id: &str,
        principal_id: &str,
        removed_by: &str,
        cancel: &CancellationToken,
    ) -> Result<(), CoreError> {
        let group = self.require_group(group_id).await?;

        let membership = self
            .memberships
            .find_active(group_id, principal_id)
            .await
            .map_err(CoreError::from)?
            .ok_or_else(|| CoreError::not_found(format!("active membership for {principal_id} in {group_id}")))?;

        let deactivated = self.memberships.deactivate(group_id, principal_id).await.map_err(CoreError::from)?;
        if !deactivated {
            return Err(CoreError::not_found(format!("active membership for {principal_id} in {group_id}")));
        }

        self.inheritance.invalidate_user(&group.organization_id, principal_id).await;
        self.cache.delete(&group_members_key(group_id)).await;

        if membership.principal_type == PrincipalType::User {
            if let Err(err) = self.materializer.fan_in_membership_removed(group_id, principal_id, cancel).await {
                tracing::warn!(group_id, principal_id, error = %err, "materializer fan-in failed, continuing");
            }
        }

        self.emit_audit(AuditEvent::new(AuditAction::RemoveMember, &group.organization_id, removed_by, &membership.id))
            .await;

        Ok(())
    }

    pub async fn assign_role_to_group(
        &self,
        group_id: &str,
        role_id: &str,
        assigned_by: &str,
        cancel: &CancellationToken,
    ) -> Result<GroupRole, CoreError> {
        let group = self.require_group(group_id).await?;
        if !group.is_active || group.is_deleted() {
            return Err(CoreError::validation("group is not active"));
        }

        let role = self
            .roles
            .find_by_id(role_id)
            .await
            .map_err(CoreError::from)?
            .ok_or_else(|| CoreError::not_found(format!("role {role_id}")))?;
        if !role.is_active {
            return Err(CoreError::validation("role is not active"));
        }

        self.require_active_organization(&group.organization_id).await?;

        if self
            .group_roles
            .find_active(group_id, role_id)
            .await
            .map_err(CoreError::from)?
            .is_some()
        {
            return Err(CoreError::conflict(format!("role {role_id} is already assigned to group {group_id}")));
        }

        let now = Utc::now();
        let group_role = GroupRole {
            id: self.id_gen.generate(EntityPrefix::GroupRole),
            group_id: group_id.to_string(),
            role_id: role_id.to_string(),
            organization_id: group.organization_id.clone(),
            assigned_by: assigned_by.to_string(),
            starts_at: None,
            ends_at: None,
            is_active: true,
            version: 1,
            created_at: now,
            updated_at: now,
        };

        let created = self.group_roles.insert(&group_role).await.map_err(CoreError::from)?;
        self.cache.delete(&group_roles_key(group_id)).await;

        if let Err(err) = self.materializer.fan_out_role_assigned(group_id, role_id, cancel).await {
            tracing::warn!(group_id, role_id, error = %err, "materializer fan-out failed, continuing");
        }

        if let Err(err) = self.inheritance.invalidate_for_group_and_ancestors(&group.organization_id, group_id).await {
            tracing::warn!(group_id, error = %err, "failed to invalidate caches after role assignment");
        }

        self.emit_audit(AuditEvent::new(
            AuditAction::AssignRoleToGroup,
            &group.organization_id,
            assigned_by,
            &created.id,
        ))
        .await;

        Ok(created)
    }

    pub async fn remove_role_from_group(
        &self,
        group_id: &str,
        role_id: &str,
        removed_by: &str,
        cancel: &CancellationToken,
    ) -> Result<(), CoreError> {
        let group = self.require_group(group_id).await?;

        let deactivated = self.group_roles.deactivate(group_id, role_id).await.map_err(CoreError::from)?;
        if !deactivated {
            return Err(CoreError::not_found(format!("active GroupRole for ({group_id}, {role_id})")));
        }
        self.cache.delete(&group_roles_key(group_id)).await;

        if let Err(err) = self.materializer.fan_in_role_removed(group_id, role_id, cancel).await {
            tracing::warn!(group_id, role_id, error = %err, "materializer fan-in failed, continuing");
        }

        if let Err(err) = self.inheritance.invalidate_for_group_and_ancestors(&group.organization_id, group_id).await {
            tracing::warn!(group_id, error = %err, "failed to invalidate caches after role removal");
        }

        self.emit_audit(AuditEvent::new(
            AuditAction::RemoveRoleFromGroup,
            &group.organization_id,
            removed_by,
            group_id,
        ))
        .await;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Organization, Role};
    use crate::tests_support::fake_repos::{
        FakeGroupRepository, FakeGroupRoleRepository, FakeMembershipRepository, FakeOrganizationLookup,
        FakeRoleLookup, FakeUserRoleRepository,
    };
    use aaa_audit::InMemoryAuditSink;
    use aaa_idgen::SequentialIdGenerator;
    use aaa_cache::TypedCache;
    use aaa_policy::PolicyEngineRegistry;
    use std::time::Duration;

    struct Fixture {
        core: GroupCore,
        audit: Arc<InMemoryAuditSink>,
        groups: FakeGroupRepository,
        cache: TypedCache,
    }

    fn build(
        orgs: Vec<Organization>,
        groups: Vec<Group>,
        roles: Vec<Role>,
    ) -> Fixture {
        let group_repo = FakeGroupRepository::new(groups);
        let membership_repo = FakeMembershipRepository::new(vec![]);
        let group_role_repo = FakeGroupRoleRepository::new(vec![]);
        let user_role_repo = FakeUserRoleRepository::new();
        let role_lookup = FakeRoleLookup::new(roles);
        let org_lookup = FakeOrganizationLookup::new(orgs);
        let (policy, _backend) = PolicyEngineRegistry::mock();
        let audit = Arc::new(InMemoryAuditSink::new());
        let id_gen: Arc<dyn IdGenerator> = Arc::new(SequentialIdGenerator::new());
        let cache = TypedCache::in_memory();

        let hierarchy = Hierarchy::new(group_repo.clone().into_repo(), 32);
        let inheritance = Inheritance::new(
            hierarchy.clone(),
            group_repo.clone().into_repo(),
            membership_repo.clone().into_repo(),
            group_role_repo.clone().into_repo(),
            role_lookup.clone().into_repo(),
            TypedCache::in_memory(),
            Duration::from_secs(300),
            Duration::from_secs(1800),
        );
        let materializer = Materializer::new(
            membership_repo.clone().into_repo(),
            group_role_repo.clone().into_repo(),
            user_role_repo.into_repo(),
            policy,
            id_gen.clone(),
            100,
        );

        let core = GroupCore::new(
            hierarchy,
            inheritance,
            materializer,
            group_repo.clone().into_repo(),
            membership_repo.into_repo(),
            group_role_repo.into_repo(),
            role_lookup.into_repo(),
            org_lookup.into_repo(),
            audit.clone(),
            id_gen,
            cache.clone(),
        );

        Fixture { core, audit, groups: group_repo, cache }
    }

    fn org(id: &str) -> Organization {
        Organization { id: id.to_string(), is_active: true }
    }

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

    #[tokio::test]
    async fn create_group_succeeds_and_emits_audit() {
        let fx = build(vec![org("O1")], vec![], vec![]);
        let created = fx
            .core
            .create_group(CreateGroupRequest {
                organization_id: "O1".to_string(),
                name: "Engineering".to_string(),
                description: None,
                parent_id: None,
                created_by: "user:admin".to_string(),
            })
            .await
            .unwrap();
        assert_eq!(created.name, "Engineering");
        assert_eq!(created.version, 1);
        assert_eq!(fx.audit.len(), 1);
    }

    #[tokio::test]
    async fn create_group_duplicate_name_conflicts() {
        let fx = build(vec![org("O1")], vec![group("G1", "O1", None)], vec![]);
        let result = fx
            .core
            .create_group(CreateGroupRequest {
                organization_id: "O1".to_string(),
                name: "G1".to_string(),
                description: None,
                parent_id: None,
                created_by: "user:admin".to_string(),
            })
            .await;
        assert!(matches!(result, Err(CoreError::Conflict(_))));
    }

    /// S5 — cross-organization parentage fails Validation and leaves the
    /// group unchanged.
    #[tokio::test]
    async fn s5_cross_org_reparent_fails_validation() {
        let fx = build(
            vec![org("O1"), org("O2")],
            vec![group("GroupA", "O1", None), group("GroupB", "O2", None)],
            vec![],
        );
        let result = fx
            .core
            .update_group(
                "GroupA",
                UpdateGroupRequest {
                    name: None,
                    description: None,
                    parent_id: Some(Some("GroupB".to_string())),
                    is_active: None,
                    expected_version: 1,
                    updated_by: "user:admin".to_string(),
                },
            )
            .await;
        assert!(matches!(result, Err(CoreError::Validation(_))));

        let unchanged = fx.groups.snapshot().into_iter().find(|g| g.id == "GroupA").unwrap();
        assert_eq!(unchanged.version, 1);
        assert_eq!(unchanged.parent_id, None);
    }

    /// S4 — concurrent UpdateGroup: the second caller's stale version loses.
    #[tokio::test]
    async fn s4_concurrent_update_group_one_wins() {
        let fx = build(vec![org("O1")], vec![group("G1", "O1", None)], vec![]);

        let first = fx
            .core
            .update_group(
                "G1",
                UpdateGroupRequest {
                    name: Some("Renamed".to_string()),
                    description: None,
                    parent_id: None,
                    is_active: None,
                    expected_version: 1,
                    updated_by: "user:admin".to_string(),
                },
            )
            .await
            .unwrap();
        assert_eq!(first.version, 2);

        let second = fx
            .core
            .update_group(
                "G1",
                UpdateGroupRequest {
                    name: Some("RenamedAgain".to_string()),
                    description: None,
                    parent_id: None,
                    is_active: None,
                    expected_version: 1,
                    updated_by: "user:admin".to_string(),
                },
            )
            .await;

        match second {
            Err(CoreError::OptimisticLock { expected, current, .. }) => {
                assert_eq!(expected, 1);
                assert_eq!(current, 2);
            }
            other => panic!("expected OptimisticLock, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn cycle_attempt_fails_validation() {
        let fx = build(
            vec![org("O1")],
            vec![group("CEO", "O1", None), group("Manager", "O1", Some("CEO"))],
            vec![],
        );
        let result = fx
            .core
            .update_group(
                "CEO",
                UpdateGroupRequest {
                    name: None,
                    description: None,
                    parent_id: Some(Some("Manager".to_string())),
                    is_active: None,
                    expected_version: 1,
                    updated_by: "user:admin".to_string(),
                },
            )
            .await;
        assert!(matches!(result, Err(CoreError::Validation(_))));
    }

    #[tokio::test]
    async fn delete_group_with_children_fails() {
        let fx = build(
            vec![org("O1")],
            vec![group("CEO", "O1", None), group("Manager", "O1", Some("CEO"))],
            vec![],
        );
        let result = fx.core.delete_group("CEO", "user:admin").await;
        assert!(matches!(result, Err(CoreError::Validation(_))));
    }

    #[tokio::test]
    async fn delete_group_without_children_or_members_succeeds() {
        let fx = build(vec![org("O1")], vec![group("G1", "O1", None)], vec![]);
        fx.core.delete_group("G1", "user:admin").await.unwrap();
        let deleted = fx.groups.snapshot().into_iter().find(|g| g.id == "G1").unwrap();
        assert!(deleted.is_deleted());
    }

    #[tokio::test]
    async fn add_member_then_remove_member_round_trips() {
        let fx = build(vec![org("O1")], vec![group("G1", "O1", None)], vec![]);
        let cancel = CancellationToken::new();

        let membership = fx
            .core
            .add_member(
                AddMemberRequest {
                    group_id: "G1".to_string(),
                    principal_id: "U1".to_string(),
                    principal_type: PrincipalType::User,
                    starts_at: None,
                    ends_at: None,
                    added_by: "user:admin".to_string(),
                },
                &cancel,
            )
            .await
            .unwrap();
        assert!(membership.is_active);

        fx.core.remove_member("G1", "U1", "user:admin", &cancel).await.unwrap();

        let result = fx
            .core
            .add_member(
                AddMemberRequest {
                    group_id: "G1".to_string(),
                    principal_id: "U2".to_string(),
                    principal_type: PrincipalType::User,
                    starts_at: Some(Utc::now()),
                    ends_at: Some(Utc::now() - chrono::Duration::days(1)),
                    added_by: "user:admin".to_string(),
                },
                &cancel,
            )
            .await;
        assert!(matches!(result, Err(CoreError::Validation(_))));
    }

    #[tokio::test]
    async fn add_member_invalidates_group_members_cache() {
        let fx = build(vec![org("O1")], vec![group("G1", "O1", None)], vec![]);
        let cancel = CancellationToken::new();
        let key = group_members_key("G1");

        fx.cache.set(&key, &vec![1u32], Duration::from_secs(60)).await;
        fx.core
            .add_member(
                AddMemberRequest {
                    group_id: "G1".to_string(),
                    principal_id: "U1".to_string(),
                    principal_type: PrincipalType::User,
                    starts_at: None,
                    ends_at: None,
                    added_by: "user:admin".to_string(),
                },
                &cancel,
            )
            .await
            .unwrap();
        assert!(fx.cache.get::<Vec<u32>>(&key).await.is_none());

        fx.cache.set(&key, &vec![2u32], Duration::from_secs(60)).await;
        fx.core.remove_member("G1", "U1", "user:admin", &cancel).await.unwrap();
        assert!(fx.cache.get::<Vec<u32>>(&key).await.is_none());
    }

    #[tokio::test]
    async fn assign_role_then_remove_role_round_trips() {
        let fx = build(
            vec![org("O1")],
            vec![group("G1", "O1", None)],
            vec![Role { id: "R1".to_string(), name: "R1".to_string(), description: None, is_active: true }],
        );
        let cancel = CancellationToken::new();

        let roles_key = group_roles_key("G1");
        fx.cache.set(&roles_key, &vec![1u32], Duration::from_secs(60)).await;
        let group_role = fx.core.assign_role_to_group("G1", "R1", "user:admin", &cancel).await.unwrap();
        assert!(group_role.is_active);
        assert!(fx.cache.get::<Vec<u32>>(&roles_key).await.is_none());

        fx.cache.set(&roles_key, &vec![2u32], Duration::from_secs(60)).await;
        fx.core.remove_role_from_group("G1", "R1", "user:admin", &cancel).await.unwrap();
        assert!(fx.cache.get::<Vec<u32>>(&roles_key).await.is_none());

        let result = fx.core.assign_role_to_group("G1", "R_missing", "user:admin", &cancel).await;
        assert!(matches!(result, Err(CoreError::NotFound(_))));
    }
}
