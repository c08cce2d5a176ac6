pub mod effective_role;
pub mod group;
pub mod group_role;
pub mod membership;
pub mod role;
pub mod user_role;

pub use effective_role::EffectiveRole;
pub use group::Group;
pub use group_role::GroupRole;
pub use membership::{GroupMembership, PrincipalType};
pub use role::{Organization, Role};
pub use user_role::{RoleSource, UserRole};
