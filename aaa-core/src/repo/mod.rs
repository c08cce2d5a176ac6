//! Concrete Postgres repositories for the core's four versioned/derived
//! entities, built on `aaa-store-sqlx::SqlxTable` and `with_transaction`.

pub mod group_repo;
pub mod group_role_repo;
pub mod membership_repo;
pub mod user_role_repo;

pub use group_repo::GroupRepository;
pub use group_role_repo::GroupRoleRepository;
pub use membership_repo::MembershipRepository;
pub use user_role_repo::UserRoleRepository;
