use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Where a materialized [`UserRole`] came from (`spec.md` §3, invariant U3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoleSource {
    Direct,
    Inherited,
}

// `source` is stored as a plain VARCHAR column, so `RoleSource` needs a
// hand-written `sqlx::Type` bridge rather than a derive targeting a
// Postgres enum type.
impl sqlx::Type<sqlx::Postgres> for RoleSource {
    fn type_info() -> sqlx::postgres::PgTypeInfo {
        <String as sqlx::Type<sqlx::Postgres>>::type_info()
    }
}

impl<'r> sqlx::Decode<'r, sqlx::Postgres> for RoleSource {
    fn decode(value: sqlx::postgres::PgValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let s = <String as sqlx::Decode<sqlx::Postgres>>::decode(value)?;
        match s.as_str() {
            "direct" => Ok(RoleSource::Direct),
            "inherited" => Ok(RoleSource::Inherited),
            other => Err(format!("unknown role source: {other}").into()),
        }
    }
}

impl<'q> sqlx::Encode<'q, sqlx::Postgres> for RoleSource {
    fn encode_by_ref(
        &self,
        buf: &mut sqlx::postgres::PgArgumentBuffer,
    ) -> Result<sqlx::encode::IsNull, sqlx::error::BoxDynError> {
        let s = match self {
            RoleSource::Direct => "direct",
            RoleSource::Inherited => "inherited",
        };
        <String as sqlx::Encode<sqlx::Postgres>>::encode(s.to_string(), buf)
    }
}

/// A materialized grant: a precomputed row asserting a user holds a role.
/// Maintained by the `Materializer` for `Inherited` rows; `Direct` rows are
/// pass-through and never synthesized here (`spec.md` §3, U3).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct UserRole {
    pub id: String,
    pub user_id: String,
    pub role_id: String,
    pub source: RoleSource,
    pub source_group_id: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl aaa_store::Entity for UserRole {
    type Id = String;

    fn table_name() -> &'static str {
        "user_roles"
    }

    fn id_column() -> &'static str {
        "id"
    }

    fn columns() -> &'static [&'static str] {
        &[
            "id",
            "user_id",
            "role_id",
            "source",
            "source_group_id",
            "is_active",
            "created_at",
            "updated_at",
        ]
    }

    fn id(&self) -> &String {
        &self.id
    }
}
