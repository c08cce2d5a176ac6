//! Fan-out/fan-in materialization of direct `(membership × group-role)`
//! pairs into `UserRole` rows and policy-engine relation tuples
//! (`spec.md` §4.4).
//!
//! Deeper inheritance is never materialized — `Inheritance` computes it on
//! read. Every operation here is best-effort per element: one failed write
//! is logged and skipped, it never aborts the whole fan-out/fan-in and
//! never fails the `GroupCore` operation that triggered it.

use crate::error::CoreError;
use crate::model::PrincipalType;
use crate::store_traits::{GroupRoleStore, MembershipStore, UserRoleStore};
use aaa_idgen::{EntityPrefix, IdGenerator};
use aaa_policy::{ObjectType, PolicyEngineRegistry, RelationTuple};
use chrono::Utc;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Outcome of a fan-out/fan-in pass: how many elements were touched versus
/// how many individually failed (and were skipped).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MaterializationSummary {
    pub succeeded: usize,
    pub failed: usize,
    pub cancelled: bool,
}

impl MaterializationSummary {
    fn record(&mut self, result: Result<(), ()>) {
        match result {
            Ok(()) => self.succeeded += 1,
            Err(()) => self.failed += 1,
        }
    }
}

#[derive(Clone)]
pub struct Materializer {
    memberships: Arc<dyn MembershipStore>,
    group_roles: Arc<dyn GroupRoleStore>,
    user_roles: Arc<dyn UserRoleStore>,
    policy: PolicyEngineRegistry,
    id_gen: Arc<dyn IdGenerator>,
    batch_cap: usize,
}

impl Materializer {
    pub fn new(
        memberships: Arc<dyn MembershipStore>,
        group_roles: Arc<dyn GroupRoleStore>,
        user_roles: Arc<dyn UserRoleStore>,
        policy: PolicyEngineRegistry,
        id_gen: Arc<dyn IdGenerator>,
        batch_cap: usize,
    ) -> Self {
        Self {
            memberships,
            group_roles,
            user_roles,
            policy,
            id_gen,
            batch_cap,
        }
    }

    /// A user just joined `group_id`: materialize every active role the
    /// group currently carries, directly.
    pub async fn fan_out_membership_added(
        &self,
        group_id: &str,
        user_id: &str,
        cancel: &CancellationToken,
    ) -> Result<MaterializationSummary, CoreError> {
        let assignments = self.group_roles.find_active_for_group(group_id).await.map_err(CoreError::from)?;
        let now = Utc::now();
        let mut summary = MaterializationSummary::default();

        for assignment in assignments.into_iter().take(self.batch_cap) {
            if cancel.is_cancelled() {
                summary.cancelled = true;
                break;
            }
            if !assignment.is_effective_at(now) {
                continue;
            }
            summary.record(self.materialize_one(user_id, &assignment.role_id, group_id).await);
        }

        Ok(summary)
    }

    /// A role was just assigned to `group_id`: materialize it for every
    /// active user member of the group.
    pub async fn fan_out_role_assigned(
        &self,
        group_id: &str,
        role_id: &str,
        cancel: &CancellationToken,
    ) -> Result<MaterializationSummary, CoreError> {
        let members = self.memberships.find_active_user_members(group_id).await.map_err(CoreError::from)?;
        let mut summary = MaterializationSummary::default();

        for member in members.into_iter().take(self.batch_cap) {
            if cancel.is_cancelled() {
                summary.cancelled = true;
                break;
            }
            summary.record(self.materialize_one(&member.principal_id, role_id, group_id).await);
        }

        Ok(summary)
    }

    /// A user's membership in `group_id` ended: remove every `UserRole` row
    /// sourced from that membership, and the matching policy-engine tuples.
    pub async fn fan_in_membership_removed(
        &self,
        group_id: &str,
        user_id: &str,
        cancel: &CancellationToken,
    ) -> Result<MaterializationSummary, CoreError> {
        let assignments = self.group_roles.find_active_for_group(group_id).await.map_err(CoreError::from)?;
        let mut summary = MaterializationSummary::default();

        for assignment in assignments.into_iter().take(self.batch_cap) {
            if cancel.is_cancelled() {
                summary.cancelled = true;
                break;
            }
            let tuple = RelationTuple::role_membership(&assignment.role_id, ObjectType::User, user_id);
            let result = self.policy.delete_tuple(&tuple.subject, &tuple.relation, &tuple.object).await;
            if let Err(err) = result {
                tracing::warn!(group_id, user_id, role_id = %assignment.role_id, error = %err, "failed to delete policy tuple on fan-in, continuing");
            }
            summary.record(Ok(()));
        }

        if !summary.cancelled {
            if let Err(err) = self.user_roles.delete_by_user_and_source_group(user_id, group_id).await {
                tracing::warn!(group_id, user_id, error = %err, "failed to delete materialized user_roles on fan-in");
                summary.record(Err(()));
            }
        }

        Ok(summary)
    }

    /// A role was just removed from `group_id`: remove the materialized
    /// row and tuple for every active user member.
    pub async fn fan_in_role_removed(
        &self,
        group_id: &str,
        role_id: &str,
        cancel: &CancellationToken,
    ) -> Result<MaterializationSummary, CoreError> {
        let members = self.memberships.find_active_user_members(group_id).await.map_err(CoreError::from)?;
        let mut summary = MaterializationSummary::default();

        for member in members.into_iter().take(self.batch_cap) {
            if cancel.is_cancelled() {
                summary.cancelled = true;
                break;
            }
            let tuple = RelationTuple::role_membership(role_id, ObjectType::User, &member.principal_id);
            let result = self.policy.delete_tuple(&tuple.subject, &tuple.relation, &tuple.object).await;
            if let Err(err) = result {
                tracing::warn!(group_id, role_id, user_id = %member.principal_id, error = %err, "failed to delete policy tuple on fan-in, continuing");
            }
            summary.record(Ok(()));
        }

        if !summary.cancelled {
            if let Err(err) = self.user_roles.delete_by_role_and_source_group(role_id, group_id).await {
                tracing::warn!(group_id, role_id, error = %err, "failed to delete materialized user_roles on fan-in");
                summary.record(Err(()));
            }
        }

        Ok(summary)
    }

    /// Recomputes the expected set of direct `UserRole` rows for `user_id`
    /// within `organization_id` from current membership × group-role state,
    /// and reconciles stored rows to match: adds what's missing, removes
    /// what shouldn't be there. Read-driven; callable at any time to repair
    /// drift from a partially-failed fan-out/fan-in.
    pub async fn reconcile(
        &self,
        organization_id: &str,
        user_id: &str,
        cancel: &CancellationToken,
    ) -> Result<MaterializationSummary, CoreError> {
        let memberships = self
            .memberships
            .find_active_for_principal_in_org(organization_id, user_id)
            .await
            .map_err(CoreError::from)?;
        let now = Utc::now();

        let mut expected: Vec<(String, String)> = Vec::new(); // (role_id, group_id)
        for membership in &memberships {
            if membership.principal_type != PrincipalType::User || !membership.is_effective_at(now) {
                continue;
            }
            let assignments = self
                .group_roles
                .find_active_for_group(&membership.group_id)
                .await
                .map_err(CoreError::from)?;
            for assignment in assignments {
                if assignment.is_effective_at(now) {
                    expected.push((assignment.role_id, membership.group_id.clone()));
                }
            }
        }

        let current = self.user_roles.find_active_for_user(user_id).await.map_err(CoreError::from)?;
        let current_inherited: Vec<(String, String)> = current
            .into_iter()
            .filter(|r| r.source == crate::model::RoleSource::Inherited)
            .filter_map(|r| r.source_group_id.map(|g| (r.role_id, g)))
            .collect();

        let mut summary = MaterializationSummary::default();

        for (role_id, group_id) in &expected {
            if cancel.is_cancelled() {
                summary.cancelled = true;
                break;
            }
            if !current_inherited.contains(&(role_id.clone(), group_id.clone())) {
                summary.record(self.materialize_one(user_id, role_id, group_id).await);
            }
        }

        if !summary.cancelled {
            for (role_id, group_id) in &current_inherited {
                if cancel.is_cancelled() {
                    summary.cancelled = true;
                    break;
                }
                if !expected.contains(&(role_id.clone(), group_id.clone())) {
                    let tuple = RelationTuple::role_membership(role_id, ObjectType::User, user_id);
                    if let Err(err) = self.policy.delete_tuple(&tuple.subject, &tuple.relation, &tuple.object).await {
                        tracing::warn!(user_id, role_id, group_id, error = %err, "failed to delete stale policy tuple during reconcile");
                    }
                    match self.user_roles.delete_one(user_id, role_id, group_id).await {
                        Ok(_) => summary.record(Ok(())),
                        Err(err) => {
                            tracing::warn!(user_id, role_id, group_id, error = %err, "failed to delete stale user_role during reconcile");
                            summary.record(Err(()));
                        }
                    }
                }
            }
        }

        Ok(summary)
    }

    async fn materialize_one(&self, user_id: &str, role_id: &str, group_id: &str) -> Result<(), ()> {
        let id = self.id_gen.generate(EntityPrefix::UserRole);
        if let Err(err) = self.user_roles.upsert_inherited(&id, user_id, role_id, group_id).await {
            tracing::warn!(user_id, role_id, group_id, error = %err, "failed to upsert materialized user_role, skipping");
            return Err(());
        }

        let tuple = RelationTuple::role_membership(role_id, ObjectType::User, user_id);
        if let Err(err) = self.policy.write_tuple(&tuple.subject, &tuple.relation, &tuple.object).await {
            tracing::warn!(user_id, role_id, group_id, error = %err, "failed to write policy tuple, materialized row kept");
            return Err(());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{GroupMembership, GroupRole};
    use crate::tests_support::fake_repos::{FakeGroupRoleRepository, FakeMembershipRepository, FakeUserRoleRepository};
    use aaa_idgen::SequentialIdGenerator;
    use aaa_policy::MockPolicyEngine;

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
        memberships: Vec<GroupMembership>,
        group_roles: Vec<GroupRole>,
    ) -> (Materializer, FakeUserRoleRepository, Arc<MockPolicyEngine>) {
        let user_roles = FakeUserRoleRepository::new();
        let (policy, policy_backend) = PolicyEngineRegistry::mock();
        let materializer = Materializer::new(
            FakeMembershipRepository::new(memberships).into_repo(),
            FakeGroupRoleRepository::new(group_roles).into_repo(),
            user_roles.clone().into_repo(),
            policy,
            Arc::new(SequentialIdGenerator::new()),
            100,
        );
        (materializer, user_roles, policy_backend)
    }

    #[tokio::test]
    async fn fan_out_membership_added_materializes_every_active_role() {
        let (materializer, user_roles, policy) = build(vec![], vec![group_role("G1", "R1"), group_role("G1", "R2")]);
        let cancel = CancellationToken::new();
        let summary = materializer.fan_out_membership_added("G1", "U1", &cancel).await.unwrap();
        assert_eq!(summary.succeeded, 2);
        assert_eq!(user_roles.snapshot().len(), 2);
        assert!(policy.has_tuple("user:U1", "member", "role:R1"));
        assert!(policy.has_tuple("user:U1", "member", "role:R2"));
    }

    #[tokio::test]
    async fn fan_out_role_assigned_materializes_for_every_member() {
        let (materializer, user_roles, policy) =
            build(vec![membership("G1", "U1"), membership("G1", "U2")], vec![]);
        let cancel = CancellationToken::new();
        let summary = materializer.fan_out_role_assigned("G1", "R1", &cancel).await.unwrap();
        assert_eq!(summary.succeeded, 2);
        assert_eq!(user_roles.snapshot().len(), 2);
        assert!(policy.has_tuple("user:U1", "member", "role:R1"));
        assert!(policy.has_tuple("user:U2", "member", "role:R1"));
    }

    /// S6 — fan-in removes materialized rows and tuples after membership ends.
    #[tokio::test]
    async fn s6_fan_in_membership_removed_clears_rows_and_tuples() {
        let (materializer, user_roles, policy) = build(vec![], vec![group_role("G1", "R1")]);
        let cancel = CancellationToken::new();
        materializer.fan_out_membership_added("G1", "U1", &cancel).await.unwrap();
        assert_eq!(user_roles.snapshot().len(), 1);

        let summary = materializer.fan_in_membership_removed("G1", "U1", &cancel).await.unwrap();
        assert_eq!(summary.succeeded, 2); // 1 tuple delete + 1 bulk row delete
        assert!(user_roles.snapshot().is_empty());
        assert!(!policy.has_tuple("user:U1", "member", "role:R1"));
    }

    #[tokio::test]
    async fn fan_in_role_removed_clears_rows_and_tuples_for_all_members() {
        let (materializer, user_roles, policy) =
            build(vec![membership("G1", "U1"), membership("G1", "U2")], vec![]);
        let cancel = CancellationToken::new();
        materializer.fan_out_role_assigned("G1", "R1", &cancel).await.unwrap();
        assert_eq!(user_roles.snapshot().len(), 2);

        materializer.fan_in_role_removed("G1", "R1", &cancel).await.unwrap();
        assert!(user_roles.snapshot().is_empty());
        assert!(!policy.has_tuple("user:U1", "member", "role:R1"));
        assert!(!policy.has_tuple("user:U2", "member", "role:R1"));
    }

    #[tokio::test]
    async fn reconcile_adds_missing_and_removes_stale_rows() {
        let (materializer, user_roles, policy) =
            build(vec![membership("G1", "U1")], vec![group_role("G1", "R1")]);
        let cancel = CancellationToken::new();

        // Simulate drift: a stale row from a role that's no longer assigned.
        assert!(user_roles.snapshot().is_empty());
        let stale_id = "USRR_stale".to_string();
        let store: Arc<dyn UserRoleStore> = user_roles.clone().into_repo();
        store.upsert_inherited(&stale_id, "U1", "R_stale", "G1").await.unwrap();
        policy.add_tuple("user:U1", "member", "role:R_stale");

        let summary = materializer.reconcile("O1", "U1", &cancel).await.unwrap();
        assert!(summary.succeeded >= 2);

        let rows = user_roles.snapshot();
        assert!(rows.iter().any(|r| r.role_id == "R1"));
        assert!(!rows.iter().any(|r| r.role_id == "R_stale"));
        assert!(policy.has_tuple("user:U1", "member", "role:R1"));
        assert!(!policy.has_tuple("user:U1", "member", "role:R_stale"));
    }

    #[tokio::test]
    async fn cancellation_stops_fan_out_early() {
        let (materializer, user_roles, _policy) =
            build(vec![], vec![group_role("G1", "R1"), group_role("G1", "R2"), group_role("G1", "R3")]);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let summary = materializer.fan_out_membership_added("G1", "U1", &cancel).await.unwrap();
        assert!(summary.cancelled);
        assert_eq!(summary.succeeded, 0);
        assert!(user_roles.snapshot().is_empty());
    }
}
