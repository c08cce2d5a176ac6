//! Relation-tuple policy engine for the access-control core.
//!
//! Provides Zanzibar-style relationship-based access control (ReBAC) backed
//! by an OpenFGA-compatible server. Roles, groups, and users are modeled as
//! `type:id` objects; membership is a `member` relation tuple
//! (`role:R1#member@user:U1`).
//!
//! # Architecture
//!
//! - [`PolicyEngineRegistry`] wraps any [`PolicyEngine`](backend::PolicyEngine)
//!   backend and adds decision caching. This is the handle `aaa-core`'s
//!   `Materializer` and `DecisionAPI` depend on.
//! - [`GrpcPolicyEngine`] is the concrete gRPC implementation, built on the
//!   `openfga-rs` client.
//! - [`MockPolicyEngine`] is an in-memory backend for tests — direct tuple
//!   lookups only, no transitive evaluation.
//!
//! ```ignore
//! use aaa_policy::{PolicyEngineConfig, PolicyEngineRegistry};
//!
//! let config = PolicyEngineConfig::new("http://localhost:8081", "store-id")
//!     .with_cache(true, 60);
//! let registry = PolicyEngineRegistry::connect(config).await?;
//!
//! registry.write_tuple("user:alice", "member", "role:admin").await?;
//! assert!(registry.check("user:alice", "member", "role:admin").await?);
//! ```

pub mod backend;
pub mod cache;
pub mod config;
pub mod error;
pub mod registry;
pub mod tuple;

pub use openfga_rs;

pub use backend::{GrpcPolicyEngine, MockPolicyEngine, PolicyEngine};
pub use config::PolicyEngineConfig;
pub use error::PolicyEngineError;
pub use registry::PolicyEngineRegistry;
pub use tuple::{typed_ref, ObjectType, RelationTuple};

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::backend::PolicyEngine;
    pub use crate::config::PolicyEngineConfig;
    pub use crate::error::PolicyEngineError;
    pub use crate::registry::PolicyEngineRegistry;
    pub use crate::tuple::{typed_ref, ObjectType, RelationTuple};
}
