//! Postgres/`sqlx` backend for `aaa-store`.
//!
//! Generalizes `r2e-data-sqlx`'s pool-wrapping repository and transaction
//! helper. Entity-specific repositories (Group, GroupMembership, GroupRole,
//! UserRole) live in `aaa-core::repo`, built on top of [`SqlxTable`] and
//! [`with_transaction`].

pub mod error;
pub mod repository;
pub mod tx;

pub use error::map_sqlx_error;
pub use repository::SqlxTable;
pub use sqlx::PgPool;
pub use tx::with_transaction;
