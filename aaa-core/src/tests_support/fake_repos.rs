//! In-memory fakes for the core's store traits.
//!
//! Mirrors `r2e-openfga::MockBackend`'s "plain struct over a `DashMap`/`Mutex`,
//! no driver" shape, generalized to the four store traits in
//! `crate::store_traits` so `Hierarchy`/`Inheritance`/`Materializer`/
//! `GroupCore` can be exercised without Postgres.

use crate::model::{Group, GroupMembership, GroupRole, Organization, PrincipalType, Role, UserRole};
use crate::store_traits::{
    GroupRoleStore, GroupStore, MembershipStore, OrganizationLookup, RoleLookup, UserRoleStore,
};
use aaa_store::{Page, Pageable, StoreError};
use async_trait::async_trait;
use chrono::Utc;
use std::sync::{Arc, Mutex};

#[derive(Clone)]
pub struct FakeGroupRepository {
    rows: Arc<Mutex<Vec<Group>>>,
}

impl FakeGroupRepository {
    pub fn new(rows: Vec<Group>) -> Self {
        Self {
            rows: Arc::new(Mutex::new(rows)),
        }
    }

    pub fn into_repo(self) -> Arc<dyn GroupStore> {
        Arc::new(self)
    }

    pub fn snapshot(&self) -> Vec<Group> {
        self.rows.lock().unwrap().clone()
    }
}

#[async_trait]
impl GroupStore for FakeGroupRepository {
    async fn find_by_id(&self, id: &str) -> Result<Option<Group>, StoreError> {
        Ok(self.rows.lock().unwrap().iter().find(|g| g.id == id).cloned())
    }

    async fn find_by_name(&self, organization_id: &str, name: &str) -> Result<Option<Group>, StoreError> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .iter()
            .find(|g| g.organization_id == organization_id && g.name == name && !g.is_deleted())
            .cloned())
    }

    async fn find_active_children(&self, group_id: &str) -> Result<Vec<Group>, StoreError> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .iter()
            .filter(|g| g.parent_id.as_deref() == Some(group_id) && g.is_active && !g.is_deleted())
            .cloned()
            .collect())
    }

    async fn has_any_children(&self, group_id: &str) -> Result<bool, StoreError> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .iter()
            .any(|g| g.parent_id.as_deref() == Some(group_id) && !g.is_deleted()))
    }

    async fn find_all_paged(&self, pageable: &Pageable) -> Result<Page<Group>, StoreError> {
        let rows = self.rows.lock().unwrap();
        let alive: Vec<Group> = rows.iter().filter(|g| !g.is_deleted()).cloned().collect();
        let start = pageable.offset() as usize;
        let end = (start + pageable.size as usize).min(alive.len());
        let content = if start >= alive.len() { vec![] } else { alive[start..end].to_vec() };
        Ok(Page::new(content, pageable, alive.len() as u64))
    }

    async fn insert(&self, entity: &Group) -> Result<Group, StoreError> {
        let mut rows = self.rows.lock().unwrap();
        if rows.iter().any(|g| g.id == entity.id) {
            return Err(StoreError::Conflict(format!("group {} already exists", entity.id)));
        }
        rows.push(entity.clone());
        Ok(entity.clone())
    }

    async fn soft_delete(&self, id: &str, deleted_by: &str) -> Result<bool, StoreError> {
        let mut rows = self.rows.lock().unwrap();
        if let Some(g) = rows.iter_mut().find(|g| g.id == id) {
            g.deleted_at = Some(Utc::now());
            g.deleted_by = Some(deleted_by.to_string());
            Ok(true)
        } else {
            Ok(false)
        }
    }

    async fn update_versioned(
        &self,
        id: &str,
        expected_version: i64,
        mutate: Box<dyn FnOnce(&mut Group) + Send>,
    ) -> Result<Group, StoreError> {
        let mut rows = self.rows.lock().unwrap();
        let g = rows
            .iter_mut()
            .find(|g| g.id == id)
            .ok_or_else(|| StoreError::NotFound(format!("group {id}")))?;
        if g.version != expected_version {
            return Err(StoreError::OptimisticLockFailed {
                entity: "group",
                id: id.to_string(),
                expected: expected_version,
            });
        }
        mutate(g);
        g.version = expected_version + 1;
        g.updated_at = Utc::now();
        Ok(g.clone())
    }

    async fn current_version(&self, id: &str) -> Result<i64, StoreError> {
        self.rows
            .lock()
            .unwrap()
            .iter()
            .find(|g| g.id == id)
            .map(|g| g.version)
            .ok_or_else(|| StoreError::NotFound(format!("group {id}")))
    }
}

#[derive(Clone)]
pub struct FakeMembershipRepository {
    rows: Arc<Mutex<Vec<GroupMembership>>>,
}

impl FakeMembershipRepository {
    pub fn new(rows: Vec<GroupMembership>) -> Self {
        Self {
            rows: Arc::new(Mutex::new(rows)),
        }
    }

    pub fn into_repo(self) -> Arc<dyn MembershipStore> {
        Arc::new(self)
    }
}

#[async_trait]
impl MembershipStore for FakeMembershipRepository {
    async fn find_by_id(&self, id: &str) -> Result<Option<GroupMembership>, StoreError> {
        Ok(self.rows.lock().unwrap().iter().find(|m| m.id == id).cloned())
    }

    async fn find_active(&self, group_id: &str, principal_id: &str) -> Result<Option<GroupMembership>, StoreError> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .iter()
            .find(|m| m.group_id == group_id && m.principal_id == principal_id && m.is_active)
            .cloned())
    }

    async fn find_active_for_principal_in_org(
        &self,
        _organization_id: &str,
        principal_id: &str,
    ) -> Result<Vec<GroupMembership>, StoreError> {
        // Fakes don't carry the org->group join; tests that need org
        // scoping filter group ids by organization on the `Group` fixture
        // directly and construct memberships only for groups in-scope.
        Ok(self
            .rows
            .lock()
            .unwrap()
            .iter()
            .filter(|m| m.principal_id == principal_id && m.is_active)
            .cloned()
            .collect())
    }

    async fn find_active_user_members(&self, group_id: &str) -> Result<Vec<GroupMembership>, StoreError> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .iter()
            .filter(|m| m.group_id == group_id && m.is_active && m.principal_type == PrincipalType::User)
            .cloned()
            .collect())
    }

    async fn find_active_members(&self, group_id: &str) -> Result<Vec<GroupMembership>, StoreError> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .iter()
            .filter(|m| m.group_id == group_id && m.is_active)
            .cloned()
            .collect())
    }

    async fn has_any_active_membership(&self, group_id: &str) -> Result<bool, StoreError> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .iter()
            .any(|m| m.group_id == group_id && m.is_active))
    }

    async fn insert(&self, entity: &GroupMembership) -> Result<GroupMembership, StoreError> {
        self.rows.lock().unwrap().push(entity.clone());
        Ok(entity.clone())
    }

    async fn deactivate(&self, group_id: &str, principal_id: &str) -> Result<bool, StoreError> {
        let mut rows = self.rows.lock().unwrap();
        if let Some(m) = rows
            .iter_mut()
            .find(|m| m.group_id == group_id && m.principal_id == principal_id && m.is_active)
        {
            m.is_active = false;
            m.updated_at = Utc::now();
            Ok(true)
        } else {
            Ok(false)
        }
    }
}

#[derive(Clone)]
pub struct FakeGroupRoleRepository {
    rows: Arc<Mutex<Vec<GroupRole>>>,
}

impl FakeGroupRoleRepository {
    pub fn new(rows: Vec<GroupRole>) -> Self {
        Self {
            rows: Arc::new(Mutex::new(rows)),
        }
    }

    pub fn into_repo(self) -> Arc<dyn GroupRoleStore> {
        Arc::new(self)
    }
}

#[async_trait]
impl GroupRoleStore for FakeGroupRoleRepository {
    async fn find_by_id(&self, id: &str) -> Result<Option<GroupRole>, StoreError> {
        Ok(self.rows.lock().unwrap().iter().find(|r| r.id == id).cloned())
    }

    async fn find_active(&self, group_id: &str, role_id: &str) -> Result<Option<GroupRole>, StoreError> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .iter()
            .find(|r| r.group_id == group_id && r.role_id == role_id && r.is_active)
            .cloned())
    }

    async fn find_active_for_group(&self, group_id: &str) -> Result<Vec<GroupRole>, StoreError> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.group_id == group_id && r.is_active)
            .cloned()
            .collect())
    }

    async fn insert(&self, entity: &GroupRole) -> Result<GroupRole, StoreError> {
        self.rows.lock().unwrap().push(entity.clone());
        Ok(entity.clone())
    }

    async fn deactivate(&self, group_id: &str, role_id: &str) -> Result<bool, StoreError> {
        let mut rows = self.rows.lock().unwrap();
        if let Some(r) = rows
            .iter_mut()
            .find(|r| r.group_id == group_id && r.role_id == role_id && r.is_active)
        {
            r.is_active = false;
            r.updated_at = Utc::now();
            Ok(true)
        } else {
            Ok(false)
        }
    }
}

#[derive(Clone, Default)]
pub struct FakeUserRoleRepository {
    rows: Arc<Mutex<Vec<UserRole>>>,
}

impl FakeUserRoleRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn into_repo(self) -> Arc<dyn UserRoleStore> {
        Arc::new(self)
    }

    pub fn snapshot(&self) -> Vec<UserRole> {
        self.rows.lock().unwrap().clone()
    }
}

#[async_trait]
impl UserRoleStore for FakeUserRoleRepository {
    async fn upsert_inherited(
        &self,
        id_for_insert: &str,
        user_id: &str,
        role_id: &str,
        source_group_id: &str,
    ) -> Result<(), StoreError> {
        let mut rows = self.rows.lock().unwrap();
        if let Some(existing) = rows.iter_mut().find(|r| {
            r.user_id == user_id && r.role_id == role_id && r.source_group_id.as_deref() == Some(source_group_id)
        }) {
            existing.is_active = true;
            existing.updated_at = Utc::now();
            return Ok(());
        }
        rows.push(UserRole {
            id: id_for_insert.to_string(),
            user_id: user_id.to_string(),
            role_id: role_id.to_string(),
            source: crate::model::RoleSource::Inherited,
            source_group_id: Some(source_group_id.to_string()),
            is_active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        });
        Ok(())
    }

    async fn delete_by_user_and_source_group(&self, user_id: &str, group_id: &str) -> Result<u64, StoreError> {
        let mut rows = self.rows.lock().unwrap();
        let before = rows.len();
        rows.retain(|r| !(r.user_id == user_id && r.source_group_id.as_deref() == Some(group_id)));
        Ok((before - rows.len()) as u64)
    }

    async fn delete_by_role_and_source_group(&self, role_id: &str, group_id: &str) -> Result<u64, StoreError> {
        let mut rows = self.rows.lock().unwrap();
        let before = rows.len();
        rows.retain(|r| !(r.role_id == role_id && r.source_group_id.as_deref() == Some(group_id)));
        Ok((before - rows.len()) as u64)
    }

    async fn delete_one(&self, user_id: &str, role_id: &str, group_id: &str) -> Result<bool, StoreError> {
        let mut rows = self.rows.lock().unwrap();
        let before = rows.len();
        rows.retain(|r| {
            !(r.user_id == user_id && r.role_id == role_id && r.source_group_id.as_deref() == Some(group_id))
        });
        Ok(rows.len() < before)
    }

    async fn find_active_for_user(&self, user_id: &str) -> Result<Vec<UserRole>, StoreError> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.user_id == user_id && r.is_active)
            .cloned()
            .collect())
    }
}

#[derive(Clone, Default)]
pub struct FakeRoleLookup {
    rows: Arc<Mutex<Vec<Role>>>,
}

impl FakeRoleLookup {
    pub fn new(rows: Vec<Role>) -> Self {
        Self {
            rows: Arc::new(Mutex::new(rows)),
        }
    }

    pub fn into_repo(self) -> Arc<dyn RoleLookup> {
        Arc::new(self)
    }
}

#[async_trait]
impl RoleLookup for FakeRoleLookup {
    async fn find_by_id(&self, id: &str) -> Result<Option<Role>, StoreError> {
        Ok(self.rows.lock().unwrap().iter().find(|r| r.id == id).cloned())
    }
}

#[derive(Clone, Default)]
pub struct FakeOrganizationLookup {
    rows: Arc<Mutex<Vec<Organization>>>,
}

impl FakeOrganizationLookup {
    pub fn new(rows: Vec<Organization>) -> Self {
        Self {
            rows: Arc::new(Mutex::new(rows)),
        }
    }

    pub fn into_repo(self) -> Arc<dyn OrganizationLookup> {
        Arc::new(self)
    }
}

#[async_trait]
impl OrganizationLookup for FakeOrganizationLookup {
    async fn find_by_id(&self, id: &str) -> Result<Option<Organization>, StoreError> {
        Ok(self.rows.lock().unwrap().iter().find(|o| o.id == id).cloned())
    }
}
