use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A named container within an organization used to grant roles in bulk;
/// forms a forest via `parent_id` (`spec.md` §3, invariants G1-G4).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Group {
    pub id: String,
    pub organization_id: String,
    pub name: String,
    pub description: Option<String>,
    pub parent_id: Option<String>,
    pub is_active: bool,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub created_by: String,
    pub updated_by: String,
    pub deleted_by: Option<String>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Group {
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

impl aaa_store::Entity for Group {
    type Id = String;

    fn table_name() -> &'static str {
        "groups"
    }

    fn id_column() -> &'static str {
        "id"
    }

    fn columns() -> &'static [&'static str] {
        &[
            "id",
            "organization_id",
            "name",
            "description",
            "parent_id",
            "is_active",
            "version",
            "created_at",
            "updated_at",
            "created_by",
            "updated_by",
            "deleted_by",
            "deleted_at",
        ]
    }

    fn id(&self) -> &String {
        &self.id
    }
}

impl aaa_store::VersionedEntity for Group {
    fn version(&self) -> i64 {
        self.version
    }
}
