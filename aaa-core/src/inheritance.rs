//! Bottom-up effective-role computation with conflict resolution and
//! caching (`spec.md` §4.3).

use crate::error::CoreError;
use crate::hierarchy::Hierarchy;
use crate::model::{EffectiveRole, Group, GroupMembership};
use crate::store_traits::{GroupRoleStore, GroupStore, MembershipStore, RoleLookup};
use aaa_cache::TypedCache;
use chrono::Utc;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

/// Bottom-up effective-role resolver. Holds no graph state of its own —
/// every computation re-reads `Hierarchy` and the role/membership stores,
/// consulting [`TypedCache`] first (`spec.md` §9, "never rely on the cache
/// for correctness; only for throughput").
#[derive(Clone)]
pub struct Inheritance {
    hierarchy: Hierarchy,
    groups: Arc<dyn GroupStore>,
    memberships: Arc<dyn MembershipStore>,
    group_roles: Arc<dyn GroupRoleStore>,
    roles: Arc<dyn RoleLookup>,
    cache: TypedCache,
    effective_roles_ttl: Duration,
    groups_ttl: Duration,
}

fn effective_roles_key(org_id: &str, user_id: &str) -> String {
    format!("org:{org_id}:user:{user_id}:effective_roles")
}

fn direct_groups_key(org_id: &str, user_id: &str) -> String {
    format!("org:{org_id}:user:{user_id}:groups")
}

impl Inheritance {
    pub fn new(
        hierarchy: Hierarchy,
        groups: Arc<dyn GroupStore>,
        memberships: Arc<dyn MembershipStore>,
        group_roles: Arc<dyn GroupRoleStore>,
        roles: Arc<dyn RoleLookup>,
        cache: TypedCache,
        effective_roles_ttl: Duration,
        groups_ttl: Duration,
    ) -> Self {
        Self {
            hierarchy,
            groups,
            memberships,
            group_roles,
            roles,
            cache,
            effective_roles_ttl,
            groups_ttl,
        }
    }

    /// The user's direct, time-effective group memberships within an
    /// organization, cached under `org:{org}:user:{user}:groups`.
    pub async fn direct_group_ids(&self, organization_id: &str, user_id: &str) -> Result<Vec<String>, CoreError> {
        let key = direct_groups_key(organization_id, user_id);
        if let Some(cached) = self.cache.get::<Vec<String>>(&key).await {
            return Ok(cached);
        }

        let now = Utc::now();
        let memberships: Vec<GroupMembership> = self
            .memberships
            .find_active_for_principal_in_org(organization_id, user_id)
            .await
            .map_err(CoreError::from)?;

        let ids: Vec<String> = memberships
            .into_iter()
            .filter(|m| m.is_effective_at(now))
            .map(|m| m.group_id)
            .collect();

        self.cache.set(&key, &ids, self.groups_ttl).await;
        Ok(ids)
    }

    /// Every role that applies to `user_id` within `organization_id`, sorted
    /// by `(distance asc, role.name asc)` (`spec.md` §4.3 algorithm).
    pub async fn effective_roles(
        &self,
        organization_id: &str,
        user_id: &str,
    ) -> Result<Vec<EffectiveRole>, CoreError> {
        let key = effective_roles_key(organization_id, user_id);
        if let Some(cached) = self.cache.get::<Vec<EffectiveRole>>(&key).await {
            return Ok(cached);
        }

        let result = self.compute_effective_roles(organization_id, user_id).await?;
        self.cache.set(&key, &result, self.effective_roles_ttl).await;
        Ok(result)
    }

    async fn compute_effective_roles(
        &self,
        organization_id: &str,
        user_id: &str,
    ) -> Result<Vec<EffectiveRole>, CoreError> {
        let direct_group_ids = self.direct_group_ids(organization_id, user_id).await?;
        if direct_group_ids.is_empty() {
            return Ok(Vec::new());
        }

        // role_id -> (distance, EffectiveRole); merged across every direct group.
        let mut winners: HashMap<String, EffectiveRole> = HashMap::new();

        for direct_group_id in &direct_group_ids {
            let candidates = self.candidates_for_direct_group(direct_group_id).await?;
            for candidate in candidates {
                match winners.get(&candidate.role.id) {
                    None => {
                        winners.insert(candidate.role.id.clone(), candidate);
                    }
                    Some(existing) => {
                        if candidate.distance < existing.distance
                            || (candidate.distance == existing.distance && candidate.role.name < existing.role.name)
                        {
                            winners.insert(candidate.role.id.clone(), candidate);
                        }
                    }
                }
            }
        }

        let mut result: Vec<EffectiveRole> = winners.into_values().collect();
        result.sort_by(|a, b| a.distance.cmp(&b.distance).then_with(|| a.role.name.cmp(&b.role.name)));
        Ok(result)
    }

    /// Depth-first traversal of `direct_group_id`'s descendant subtree
    /// (including itself at depth 0), emitting one candidate per active,
    /// time-effective `GroupRole` found along the way. Cycles cannot occur
    /// under G3; a visited-set guards against them defensively.
    async fn candidates_for_direct_group(&self, direct_group_id: &str) -> Result<Vec<EffectiveRole>, CoreError> {
        let mut out = Vec::new();
        let mut visited = HashSet::new();
        self.walk_subtree(direct_group_id, vec![direct_group_id.to_string()], &mut visited, &mut out)
            .await?;
        Ok(out)
    }

    fn walk_subtree<'a>(
        &'a self,
        group_id: &'a str,
        path: Vec<String>,
        visited: &'a mut HashSet<String>,
        out: &'a mut Vec<EffectiveRole>,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<(), CoreError>> + Send + 'a>> {
        Box::pin(async move {
            if !visited.insert(group_id.to_string()) {
                tracing::warn!(group_id, "cycle detected while computing effective roles, pruning defensively");
                return Ok(());
            }

            let group = match self.groups.find_by_id(group_id).await.map_err(CoreError::from)? {
                Some(g) => g,
                None => return Ok(()),
            };
            if !group.is_active || group.is_deleted() {
                return Ok(());
            }

            let now = Utc::now();
            let assignments = self.group_roles.find_active_for_group(group_id).await.map_err(CoreError::from)?;
            for assignment in assignments {
                if !assignment.is_effective_at(now) {
                    continue;
                }
                let role = match self.roles.find_by_id(&assignment.role_id).await.map_err(CoreError::from)? {
                    Some(r) if r.is_active => r,
                    _ => continue,
                };
                out.push(EffectiveRole::new(role, group.id.clone(), group.name.clone(), path.clone()));
            }

            let children: Vec<Group> = self.hierarchy.children(group_id).await?;
            for child in children {
                let mut child_path = path.clone();
                child_path.push(child.id.clone());
                self.walk_subtree(&child.id, child_path, visited, out).await?;
            }

            Ok(())
        })
    }

    // ── cache invalidation ───────────────────────────────────────────────

    /// Invalidates a single user's effective-role and direct-groups cache
    /// entries (`spec.md` §4.3, "adding/removing a user from a group").
    pub async fn invalidate_user(&self, organization_id: &str, user_id: &str) {
        self.cache.delete(&effective_roles_key(organization_id, user_id)).await;
        self.cache.delete(&direct_groups_key(organization_id, user_id)).await;
    }

    /// Invalidates effective-role keys for every user with a membership in
    /// `group_id` or any of its ancestors (`spec.md` §4.3, "adding or
    /// removing a role from a group").
    pub async fn invalidate_for_group_and_ancestors(
        &self,
        organization_id: &str,
        group_id: &str,
    ) -> Result<(), CoreError> {
        let mut scope = vec![group_id.to_string()];
        scope.extend(self.hierarchy.ancestors(group_id).await?.into_iter().map(|g| g.id));
        self.invalidate_for_groups(organization_id, &scope).await
    }

    /// Invalidates effective-role keys for every user with a membership in
    /// the moved group or any ancestor on either side of a hierarchy change
    /// (`spec.md` §4.3, "group hierarchy change").
    pub async fn invalidate_for_hierarchy_change(
        &self,
        organization_id: &str,
        group_id: &str,
        old_parent_id: Option<&str>,
        new_parent_id: Option<&str>,
    ) -> Result<(), CoreError> {
        let mut scope = vec![group_id.to_string()];
        scope.extend(self.hierarchy.ancestors(group_id).await?.into_iter().map(|g| g.id));
        for side in [old_parent_id, new_parent_id].into_iter().flatten() {
            scope.push(side.to_string());
            scope.extend(self.hierarchy.ancestors(side).await?.into_iter().map(|g| g.id));
        }
        self.invalidate_for_groups(organization_id, &scope).await
    }

    /// Invalidates affected users' caches after a group soft-delete:
    /// descendants and ancestors of the deleted group.
    pub async fn invalidate_for_group_deletion(
        &self,
        organization_id: &str,
        group_id: &str,
    ) -> Result<(), CoreError> {
        let mut scope = vec![group_id.to_string()];
        scope.extend(self.hierarchy.ancestors(group_id).await?.into_iter().map(|g| g.id));
        scope.extend(self.hierarchy.descendants(group_id).await?.into_iter().map(|g| g.id));
        self.invalidate_for_groups(organization_id, &scope).await
    }

    async fn invalidate_for_groups(&self, organization_id: &str, group_ids: &[String]) -> Result<(), CoreError> {
        let mut seen_users = HashSet::new();
        for gid in group_ids {
            let members = self.memberships.find_active_members(gid).await.map_err(CoreError::from)?;
            for member in members {
                if seen_users.insert(member.principal_id.clone()) {
                    self.invalidate_user(organization_id, &member.principal_id).await;
                }
            }
        }
        Ok(())
    }

    // ── self-verification ───────────────────────────────────────────────

    /// Recomputes effective roles for `(organization_id, user_id)` bypassing
    /// the cache and asserts every structural invariant from `spec.md` §4.3's
    /// self-verification hook. Returns the violations found, if any.
    pub async fn verify_effective_roles(&self, organization_id: &str, user_id: &str) -> Result<Vec<String>, CoreError> {
        let direct_group_ids: HashSet<String> =
            self.direct_group_ids(organization_id, user_id).await?.into_iter().collect();
        let roles = self.compute_effective_roles(organization_id, user_id).await?;

        let mut violations = Vec::new();
        for role in &roles {
            if role.distance as usize != role.inheritance_path.len() - 1 {
                violations.push(format!(
                    "role {}: distance {} != len(path)-1 ({})",
                    role.role.id,
                    role.distance,
                    role.inheritance_path.len() - 1
                ));
            }
            if role.is_direct != (role.distance == 0) {
                violations.push(format!("role {}: is_direct does not match distance==0", role.role.id));
            }
            match role.inheritance_path.first() {
                Some(first) if direct_group_ids.contains(first) => {}
                _ => violations.push(format!(
                    "role {}: path[0] is not a group the user directly belongs to",
                    role.role.id
                )),
            }
            if role.inheritance_path.last() != Some(&role.group_id) {
                violations.push(format!("role {}: path[-1] != source_group", role.role.id));
            }
        }

        let mut sorted = roles.clone();
        sorted.sort_by(|a, b| a.distance.cmp(&b.distance).then_with(|| a.role.name.cmp(&b.role.name)));
        if sorted != roles {
            violations.push("effective-role list is not sorted by (distance asc, role.name asc)".to_string());
        }

        let mut seen_role_ids = HashSet::new();
        for role in &roles {
            if !seen_role_ids.insert(&role.role.id) {
                violations.push(format!("duplicate role id {} in effective-role list", role.role.id));
            }
        }

        Ok(violations)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Group, GroupRole, Role};
    use crate::tests_support::fake_repos::{
        FakeGroupRepository, FakeGroupRoleRepository, FakeMembershipRepository, FakeRoleLookup,
    };

    fn group(id: &str, parent: Option<&str>) -> Group {
        Group {
            id: id.to_string(),
            organization_id: "O1".to_string(),
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
            principal_type: crate::model::PrincipalType::User,
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

    fn role(id: &str) -> Role {
        Role {
            id: id.to_string(),
            name: id.to_string(),
            description: None,
            is_active: true,
        }
    }

    fn build(
        groups: Vec<Group>,
        memberships: Vec<GroupMembership>,
        group_roles: Vec<GroupRole>,
        roles: Vec<Role>,
    ) -> Inheritance {
        let group_repo = FakeGroupRepository::new(groups);
        let hierarchy = Hierarchy::new(group_repo.clone().into_repo(), 32);
        Inheritance::new(
            hierarchy,
            group_repo.into_repo(),
            FakeMembershipRepository::new(memberships).into_repo(),
            FakeGroupRoleRepository::new(group_roles).into_repo(),
            FakeRoleLookup::new(roles).into_repo(),
            TypedCache::in_memory(),
            Duration::from_secs(300),
            Duration::from_secs(1800),
        )
    }

    /// S1 — direct assignment wins over a more distant duplicate.
    #[tokio::test]
    async fn s1_direct_assignment_wins() {
        let inh = build(
            vec![group("CEO", None), group("Manager", Some("CEO"))],
            vec![membership("CEO", "U1")],
            vec![group_role("CEO", "R_admin"), group_role("Manager", "R_admin")],
            vec![role("R_admin")],
        );
        let roles = inh.effective_roles("O1", "U1").await.unwrap();
        assert_eq!(roles.len(), 1);
        assert_eq!(roles[0].group_id, "CEO");
        assert_eq!(roles[0].distance, 0);
        assert!(roles[0].is_direct);
    }

    /// S2 — bottom-up inheritance across three levels.
    #[tokio::test]
    async fn s2_bottom_up_three_levels() {
        let inh = build(
            vec![
                group("CEO", None),
                group("Manager", Some("CEO")),
                group("Employee", Some("Manager")),
            ],
            vec![membership("CEO", "U1")],
            vec![
                group_role("CEO", "R_ceo"),
                group_role("Manager", "R_mgr"),
                group_role("Employee", "R_emp"),
            ],
            vec![role("R_ceo"), role("R_mgr"), role("R_emp")],
        );
        let roles = inh.effective_roles("O1", "U1").await.unwrap();
        let distances: Vec<u32> = roles.iter().map(|r| r.distance).collect();
        assert_eq!(distances, vec![0, 1, 2]);
        for r in &roles {
            assert_eq!(r.inheritance_path.first().unwrap(), "CEO");
            assert_eq!(r.inheritance_path.last().unwrap(), &r.group_id);
        }
    }

    /// S3 — multiple root memberships, conflict resolution by distance.
    #[tokio::test]
    async fn s3_conflict_resolution_prefers_smaller_distance() {
        let inh = build(
            vec![group("GroupA", None), group("GroupB", None), group("GroupB1", Some("GroupB"))],
            vec![membership("GroupA", "U1"), membership("GroupB", "U1")],
            vec![group_role("GroupA", "R_shared"), group_role("GroupB1", "R_shared")],
            vec![role("R_shared")],
        );
        let roles = inh.effective_roles("O1", "U1").await.unwrap();
        assert_eq!(roles.len(), 1);
        assert_eq!(roles[0].group_id, "GroupA");
        assert_eq!(roles[0].distance, 0);
    }

    #[tokio::test]
    async fn inactive_descendant_is_pruned() {
        let mut employee = group("Employee", Some("Manager"));
        employee.is_active = false;
        let inh = build(
            vec![group("CEO", None), group("Manager", Some("CEO")), employee],
            vec![membership("CEO", "U1")],
            vec![group_role("Employee", "R_emp")],
            vec![role("R_emp")],
        );
        let roles = inh.effective_roles("O1", "U1").await.unwrap();
        assert!(roles.is_empty());
    }

    #[tokio::test]
    async fn inactive_role_is_pruned() {
        let mut r = role("R_x");
        r.is_active = false;
        let inh = build(
            vec![group("CEO", None)],
            vec![membership("CEO", "U1")],
            vec![group_role("CEO", "R_x")],
            vec![r],
        );
        let roles = inh.effective_roles("O1", "U1").await.unwrap();
        assert!(roles.is_empty());
    }

    #[tokio::test]
    async fn no_memberships_returns_empty() {
        let inh = build(vec![group("CEO", None)], vec![], vec![group_role("CEO", "R_x")], vec![role("R_x")]);
        let roles = inh.effective_roles("O1", "U1").await.unwrap();
        assert!(roles.is_empty());
    }

    #[tokio::test]
    async fn self_verification_passes_for_valid_result() {
        let inh = build(
            vec![group("CEO", None), group("Manager", Some("CEO"))],
            vec![membership("CEO", "U1")],
            vec![group_role("CEO", "R_ceo"), group_role("Manager", "R_mgr")],
            vec![role("R_ceo"), role("R_mgr")],
        );
        let violations = inh.verify_effective_roles("O1", "U1").await.unwrap();
        assert!(violations.is_empty(), "unexpected violations: {violations:?}");
    }

    #[tokio::test]
    async fn cache_is_populated_after_first_read() {
        let inh = build(
            vec![group("CEO", None)],
            vec![membership("CEO", "U1")],
            vec![group_role("CEO", "R_x")],
            vec![role("R_x")],
        );
        assert!(inh.cache.is_empty());
        let _ = inh.effective_roles("O1", "U1").await.unwrap();
        assert!(!inh.cache.is_empty());

        inh.invalidate_user("O1", "U1").await;
        assert!(inh.cache.is_empty());
    }
}
