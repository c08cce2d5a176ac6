use serde::{Deserialize, Serialize};

/// The mutation an [`AuditEvent`] records. One variant per `GroupCore`
/// operation that changes persisted state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    CreateGroup,
    UpdateGroup,
    ChangeGroupHierarchy,
    DeleteGroup,
    AddMember,
    RemoveMember,
    AssignRoleToGroup,
    RemoveRoleFromGroup,
}

impl AuditAction {
    pub const fn as_str(self) -> &'static str {
        match self {
            AuditAction::CreateGroup => "create_group",
            AuditAction::UpdateGroup => "update_group",
            AuditAction::ChangeGroupHierarchy => "change_group_hierarchy",
            AuditAction::DeleteGroup => "delete_group",
            AuditAction::AddMember => "add_member",
            AuditAction::RemoveMember => "remove_member",
            AuditAction::AssignRoleToGroup => "assign_role_to_group",
            AuditAction::RemoveRoleFromGroup => "remove_role_from_group",
        }
    }
}

/// A single recorded mutation.
///
/// `actor` is the subject that performed the action (`user:U1` or
/// `service:S1`); `org_id` scopes the event to its tenant; `target` is the
/// primary entity id affected (a group id, membership id, etc.); `detail`
/// carries action-specific context (e.g. `{"role_id": "R1"}`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    pub action: AuditAction,
    pub org_id: String,
    pub actor: String,
    pub target: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<serde_json::Value>,
}

impl AuditEvent {
    pub fn new(action: AuditAction, org_id: impl Into<String>, actor: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            action,
            org_id: org_id.into(),
            actor: actor.into(),
            target: target.into(),
            detail: None,
        }
    }

    pub fn with_detail(mut self, detail: serde_json::Value) -> Self {
        self.detail = Some(detail);
        self
    }
}
