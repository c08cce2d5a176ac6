use crate::model::role::Role;
use serde::{Deserialize, Serialize};

/// A role that applies to a user as a consequence of group membership and
/// bottom-up inheritance. Derived, non-persistent (`spec.md` §3).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EffectiveRole {
    pub role: Role,
    pub group_id: String,
    pub group_name: String,
    /// Ordered sequence of group IDs, from the user's direct group down to
    /// the source group.
    pub inheritance_path: Vec<String>,
    /// `len(inheritance_path) - 1`.
    pub distance: u32,
    /// `distance == 0`.
    pub is_direct: bool,
}

impl EffectiveRole {
    pub fn new(role: Role, group_id: String, group_name: String, inheritance_path: Vec<String>) -> Self {
        let distance = (inheritance_path.len() - 1) as u32;
        Self {
            role,
            group_id,
            group_name,
            is_direct: distance == 0,
            inheritance_path,
            distance,
        }
    }

    pub fn source_group_id(&self) -> &str {
        self.inheritance_path
            .last()
            .map(String::as_str)
            .unwrap_or(&self.group_id)
    }

    pub fn direct_group_id(&self) -> Option<&str> {
        self.inheritance_path.first().map(String::as_str)
    }
}
