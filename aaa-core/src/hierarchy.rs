//! Parent-child navigation, cycle detection, and descendant enumeration
//! over the group forest (`spec.md` §4.2).

use crate::error::CoreError;
use crate::model::Group;
use crate::store_traits::GroupStore;
use std::collections::HashSet;
use std::sync::Arc;

/// Navigates the group hierarchy. Holds no in-memory graph — every call
/// re-reads from the store, per `spec.md` §9 ("do not cache a global
/// in-memory graph").
#[derive(Clone)]
pub struct Hierarchy {
    groups: Arc<dyn GroupStore>,
    max_depth: u32,
}

impl Hierarchy {
    pub fn new(groups: Arc<dyn GroupStore>, max_depth: u32) -> Self {
        Self { groups, max_depth }
    }

    /// Direct children of `group_id`, active only.
    pub async fn children(&self, group_id: &str) -> Result<Vec<Group>, CoreError> {
        self.groups
            .find_active_children(group_id)
            .await
            .map_err(CoreError::from)
    }

    /// From parent upward, terminating at root; empty if `group_id` is a
    /// root group.
    pub async fn ancestors(&self, group_id: &str) -> Result<Vec<Group>, CoreError> {
        let mut result = Vec::new();
        let mut visited = HashSet::new();
        let mut current = self.require_group(group_id).await?;

        while let Some(parent_id) = current.parent_id.clone() {
            if !visited.insert(parent_id.clone()) {
                tracing::warn!(group_id, "cycle detected while walking ancestors, aborting defensively");
                break;
            }
            if result.len() as u32 >= self.max_depth {
                tracing::warn!(group_id, max_depth = self.max_depth, "ancestor traversal hit depth guard");
                break;
            }
            let parent = self.require_group(&parent_id).await?;
            result.push(parent.clone());
            current = parent;
        }

        Ok(result)
    }

    /// Transitive closure of children, active only, bounded by
    /// `max_depth`.
    pub async fn descendants(&self, group_id: &str) -> Result<Vec<Group>, CoreError> {
        let mut result = Vec::new();
        let mut frontier = vec![(group_id.to_string(), 0u32)];
        let mut visited = HashSet::new();
        visited.insert(group_id.to_string());

        while let Some((current_id, depth)) = frontier.pop() {
            if depth >= self.max_depth {
                tracing::warn!(group_id, max_depth = self.max_depth, "descendant traversal hit depth guard");
                continue;
            }
            let children = self.children(&current_id).await?;
            for child in children {
                if visited.insert(child.id.clone()) {
                    frontier.push((child.id.clone(), depth + 1));
                    result.push(child);
                }
            }
        }

        Ok(result)
    }

    /// True iff `candidate_parent_id == group_id` or `group_id` is an
    /// ancestor of `candidate_parent_id` — an ascent from
    /// `candidate_parent_id` with a visited-set guard (`spec.md` §4.2).
    pub async fn would_create_cycle(&self, group_id: &str, candidate_parent_id: &str) -> Result<bool, CoreError> {
        if group_id == candidate_parent_id {
            return Ok(true);
        }

        let mut visited = HashSet::new();
        let mut current_id = candidate_parent_id.to_string();

        loop {
            if current_id == group_id {
                return Ok(true);
            }
            if !visited.insert(current_id.clone()) {
                // Existing cycle elsewhere in the forest; cannot happen
                // under G3 but guarded defensively.
                return Ok(false);
            }
            if visited.len() as u32 > self.max_depth {
                return Ok(false);
            }

            let current = match self.groups.find_by_id(&current_id).await.map_err(CoreError::from)? {
                Some(g) => g,
                None => return Ok(false),
            };

            match current.parent_id {
                Some(parent_id) => current_id = parent_id,
                None => return Ok(false),
            }
        }
    }

    async fn require_group(&self, group_id: &str) -> Result<Group, CoreError> {
        self.groups
            .find_by_id(group_id)
            .await
            .map_err(CoreError::from)?
            .ok_or_else(|| CoreError::not_found(format!("group {group_id}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests_support::fake_repos::FakeGroupRepository;

    fn group(id: &str, parent: Option<&str>) -> Group {
        use chrono::Utc;
        Group {
            id: id.to_string(),
            organization_id: "org1".to_string(),
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
    async fn would_create_cycle_detects_self_parent() {
        let fake = FakeGroupRepository::new(vec![group("G1", None)]);
        let hierarchy = Hierarchy::new(fake.into_repo(), 32);
        assert!(hierarchy.would_create_cycle("G1", "G1").await.unwrap());
    }

    #[tokio::test]
    async fn would_create_cycle_detects_descendant_as_new_parent() {
        let fake = FakeGroupRepository::new(vec![
            group("CEO", None),
            group("Manager", Some("CEO")),
            group("Employee", Some("Manager")),
        ]);
        let hierarchy = Hierarchy::new(fake.into_repo(), 32);
        // Setting CEO's parent to Employee (its own descendant) is a cycle.
        assert!(hierarchy.would_create_cycle("CEO", "Employee").await.unwrap());
    }

    #[tokio::test]
    async fn would_create_cycle_false_for_unrelated_groups() {
        let fake = FakeGroupRepository::new(vec![group("GroupA", None), group("GroupB", None)]);
        let hierarchy = Hierarchy::new(fake.into_repo(), 32);
        assert!(!hierarchy.would_create_cycle("GroupA", "GroupB").await.unwrap());
    }

    #[tokio::test]
    async fn ancestors_walks_up_to_root() {
        let fake = FakeGroupRepository::new(vec![
            group("CEO", None),
            group("Manager", Some("CEO")),
            group("Employee", Some("Manager")),
        ]);
        let hierarchy = Hierarchy::new(fake.into_repo(), 32);
        let ancestors = hierarchy.ancestors("Employee").await.unwrap();
        let ids: Vec<_> = ancestors.iter().map(|g| g.id.as_str()).collect();
        assert_eq!(ids, vec!["Manager", "CEO"]);
    }

    #[tokio::test]
    async fn descendants_returns_transitive_closure() {
        let fake = FakeGroupRepository::new(vec![
            group("CEO", None),
            group("Manager", Some("CEO")),
            group("Employee", Some("Manager")),
        ]);
        let hierarchy = Hierarchy::new(fake.into_repo(), 32);
        let mut ids: Vec<_> = hierarchy
            .descendants("CEO")
            .await
            .unwrap()
            .into_iter()
            .map(|g| g.id)
            .collect();
        ids.sort();
        assert_eq!(ids, vec!["Employee".to_string(), "Manager".to_string()]);
    }
}
