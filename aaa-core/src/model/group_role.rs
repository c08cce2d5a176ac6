use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A role assigned to a group (`spec.md` §3, invariants R1-R2).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct GroupRole {
    pub id: String,
    pub group_id: String,
    pub role_id: String,
    pub organization_id: String,
    pub assigned_by: String,
    pub starts_at: Option<DateTime<Utc>>,
    pub ends_at: Option<DateTime<Utc>>,
    pub is_active: bool,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl GroupRole {
    pub fn is_effective_at(&self, t: DateTime<Utc>) -> bool {
        self.is_active
            && self.starts_at.map_or(true, |s| s <= t)
            && self.ends_at.map_or(true, |e| e > t)
    }
}

impl aaa_store::Entity for GroupRole {
    type Id = String;

    fn table_name() -> &'static str {
        "group_roles"
    }

    fn id_column() -> &'static str {
        "id"
    }

    fn columns() -> &'static [&'static str] {
        &[
            "id",
            "group_id",
            "role_id",
            "organization_id",
            "assigned_by",
            "starts_at",
            "ends_at",
            "is_active",
            "version",
            "created_at",
            "updated_at",
        ]
    }

    fn id(&self) -> &String {
        &self.id
    }
}

impl aaa_store::VersionedEntity for GroupRole {
    fn version(&self) -> i64 {
        self.version
    }
}
