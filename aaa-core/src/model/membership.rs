use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Tagged discriminator for the identities a [`GroupMembership`] may
/// reference (`spec.md` §9, "Polymorphic principals").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrincipalType {
    User,
    Service,
}

impl PrincipalType {
    pub const fn as_str(self) -> &'static str {
        match self {
            PrincipalType::User => "user",
            PrincipalType::Service => "service",
        }
    }
}

/// A principal's membership in a group, with optional time bounds
/// (`spec.md` §3, invariants M1-M3).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct GroupMembership {
    pub id: String,
    pub group_id: String,
    pub principal_id: String,
    pub principal_type: PrincipalType,
    pub starts_at: Option<DateTime<Utc>>,
    pub ends_at: Option<DateTime<Utc>>,
    pub is_active: bool,
    pub added_by: String,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl GroupMembership {
    /// M2: "effective at time t" ⇔ active ∧ within `[starts_at, ends_at)`.
    pub fn is_effective_at(&self, t: DateTime<Utc>) -> bool {
        self.is_active
            && self.starts_at.map_or(true, |s| s <= t)
            && self.ends_at.map_or(true, |e| e > t)
    }
}

// `principal_type` is stored as a plain VARCHAR column (see `columns()`
// below), so `PrincipalType` needs a hand-written `sqlx::Type` bridge
// rather than a derive targeting a Postgres enum type.
impl sqlx::Type<sqlx::Postgres> for PrincipalType {
    fn type_info() -> sqlx::postgres::PgTypeInfo {
        <String as sqlx::Type<sqlx::Postgres>>::type_info()
    }
}

impl<'r> sqlx::Decode<'r, sqlx::Postgres> for PrincipalType {
    fn decode(value: sqlx::postgres::PgValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let s = <String as sqlx::Decode<sqlx::Postgres>>::decode(value)?;
        match s.as_str() {
            "user" => Ok(PrincipalType::User),
            "service" => Ok(PrincipalType::Service),
            other => Err(format!("unknown principal_type: {other}").into()),
        }
    }
}

impl<'q> sqlx::Encode<'q, sqlx::Postgres> for PrincipalType {
    fn encode_by_ref(
        &self,
        buf: &mut sqlx::postgres::PgArgumentBuffer,
    ) -> Result<sqlx::encode::IsNull, sqlx::error::BoxDynError> {
        <String as sqlx::Encode<sqlx::Postgres>>::encode(self.as_str().to_string(), buf)
    }
}

impl aaa_store::Entity for GroupMembership {
    type Id = String;

    fn table_name() -> &'static str {
        "group_memberships"
    }

    fn id_column() -> &'static str {
        "id"
    }

    fn columns() -> &'static [&'static str] {
        &[
            "id",
            "group_id",
            "principal_id",
            "principal_type",
            "starts_at",
            "ends_at",
            "is_active",
            "added_by",
            "version",
            "created_at",
            "updated_at",
        ]
    }

    fn id(&self) -> &String {
        &self.id
    }
}

impl aaa_store::VersionedEntity for GroupMembership {
    fn version(&self) -> i64 {
        self.version
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn membership(starts: Option<DateTime<Utc>>, ends: Option<DateTime<Utc>>, active: bool) -> GroupMembership {
        GroupMembership {
            id: "M1".into(),
            group_id: "G1".into(),
            principal_id: "U1".into(),
            principal_type: PrincipalType::User,
            starts_at: starts,
            ends_at: ends,
            is_active: active,
            added_by: "user:admin".into(),
            version: 1,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn inactive_membership_never_effective() {
        let m = membership(None, None, false);
        assert!(!m.is_effective_at(Utc::now()));
    }

    #[test]
    fn unbounded_active_membership_always_effective() {
        let m = membership(None, None, true);
        assert!(m.is_effective_at(Utc::now()));
    }

    #[test]
    fn bounded_membership_respects_window() {
        let now = Utc::now();
        let m = membership(Some(now - chrono::Duration::days(1)), Some(now + chrono::Duration::days(1)), true);
        assert!(m.is_effective_at(now));
        assert!(!m.is_effective_at(now - chrono::Duration::days(2)));
        assert!(!m.is_effective_at(now + chrono::Duration::days(2)));
    }
}
