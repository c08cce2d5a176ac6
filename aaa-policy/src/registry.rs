//! Policy engine registry — clonable handle to the backend plus its cache.

use crate::backend::{GrpcPolicyEngine, MockPolicyEngine, PolicyEngine};
use crate::cache::{CacheKey, DecisionCache};
use crate::config::PolicyEngineConfig;
use crate::error::PolicyEngineError;
use std::sync::Arc;

/// Clonable handle to a [`PolicyEngine`] backend with optional decision
/// caching.
///
/// Writes and deletes invalidate cached decisions for the affected object;
/// `check` consults the cache first and falls through to the backend on a
/// miss.
#[derive(Clone)]
pub struct PolicyEngineRegistry {
    backend: Arc<dyn PolicyEngine>,
    cache: Option<Arc<DecisionCache>>,
}

impl PolicyEngineRegistry {
    /// Create a new registry with a custom backend and no caching.
    pub fn new(backend: impl PolicyEngine) -> Self {
        Self {
            backend: Arc::new(backend),
            cache: None,
        }
    }

    /// Create a new registry with caching enabled.
    pub fn with_cache(backend: impl PolicyEngine, cache_ttl_secs: u64) -> Self {
        Self {
            backend: Arc::new(backend),
            cache: Some(Arc::new(DecisionCache::new(cache_ttl_secs))),
        }
    }

    /// Connect to a policy engine server over gRPC, per `config`.
    pub async fn connect(config: PolicyEngineConfig) -> Result<Self, PolicyEngineError> {
        let backend = GrpcPolicyEngine::connect(&config).await?;

        let cache = if config.cache_enabled {
            Some(Arc::new(DecisionCache::new(config.cache_ttl_secs)))
        } else {
            None
        };

        Ok(Self {
            backend: Arc::new(backend),
            cache,
        })
    }

    /// Create a registry with a mock backend for testing.
    pub fn mock() -> (Self, Arc<MockPolicyEngine>) {
        let backend = Arc::new(MockPolicyEngine::new());
        let registry = Self {
            backend: backend.clone(),
            cache: None,
        };
        (registry, backend)
    }

    /// Create a registry with a mock backend and caching enabled.
    pub fn mock_with_cache(cache_ttl_secs: u64) -> (Self, Arc<MockPolicyEngine>) {
        let backend = Arc::new(MockPolicyEngine::new());
        let registry = Self {
            backend: backend.clone(),
            cache: Some(Arc::new(DecisionCache::new(cache_ttl_secs))),
        };
        (registry, backend)
    }

    /// Check if `subject` has `relation` to `object`. Results are cached if
    /// caching is enabled.
    pub async fn check(&self, subject: &str, relation: &str, object: &str) -> Result<bool, PolicyEngineError> {
        if let Some(cache) = &self.cache {
            let key = CacheKey::new(subject, relation, object);
            if let Some(cached) = cache.get(&key) {
                tracing::trace!(subject, relation, object, allowed = cached, "cache hit");
                return Ok(cached);
            }
        }

        let allowed = self.backend.check(subject, relation, object).await?;
        tracing::trace!(subject, relation, object, allowed, "authorization check");

        if let Some(cache) = &self.cache {
            cache.set(CacheKey::new(subject, relation, object), allowed);
        }

        Ok(allowed)
    }

    /// List all objects of `object_type` that `subject` has `relation` to.
    /// Not cached — used by `DecisionAPI` operations that enumerate rather
    /// than check a single pair.
    pub async fn list_objects(
        &self,
        subject: &str,
        relation: &str,
        object_type: &str,
    ) -> Result<Vec<String>, PolicyEngineError> {
        self.backend.list_objects(subject, relation, object_type).await
    }

    /// Write a relation tuple (grant), invalidating cached decisions for
    /// `object`.
    pub async fn write_tuple(&self, subject: &str, relation: &str, object: &str) -> Result<(), PolicyEngineError> {
        self.backend.write_tuple(subject, relation, object).await?;

        if let Some(cache) = &self.cache {
            cache.invalidate_object(object);
        }

        tracing::debug!(subject, relation, object, "wrote tuple");
        Ok(())
    }

    /// Delete a relation tuple (revoke), invalidating cached decisions for
    /// `object`.
    pub async fn delete_tuple(&self, subject: &str, relation: &str, object: &str) -> Result<(), PolicyEngineError> {
        self.backend.delete_tuple(subject, relation, object).await?;

        if let Some(cache) = &self.cache {
            cache.invalidate_object(object);
        }

        tracing::debug!(subject, relation, object, "deleted tuple");
        Ok(())
    }

    /// Invalidate all cached decisions for an object.
    pub fn invalidate_object(&self, object: &str) {
        if let Some(cache) = &self.cache {
            cache.invalidate_object(object);
        }
    }

    /// Invalidate all cached decisions for a subject.
    pub fn invalidate_user(&self, subject: &str) {
        if let Some(cache) = &self.cache {
            cache.invalidate_user(subject);
        }
    }

    /// Clear all cached decisions.
    pub fn clear_cache(&self) {
        if let Some(cache) = &self.cache {
            cache.clear();
        }
    }

    /// Register the relation-tuple schema for `object_types` with the
    /// backend. Returns `PolicyEngineError::Unsupported` for backends that
    /// don't manage schema (e.g. `MockPolicyEngine`).
    pub async fn register_schema(&self, object_types: &[&str]) -> Result<String, PolicyEngineError> {
        self.backend.register_schema(object_types).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn check_with_mock_backend() {
        let (registry, backend) = PolicyEngineRegistry::mock();
        backend.add_tuple("user:alice", "member", "role:R1");

        assert!(registry.check("user:alice", "member", "role:R1").await.unwrap());
        assert!(!registry.check("user:bob", "member", "role:R1").await.unwrap());
    }

    #[tokio::test]
    async fn write_invalidates_cached_decision() {
        let (registry, _backend) = PolicyEngineRegistry::mock_with_cache(60);

        assert!(!registry.check("user:alice", "member", "role:R1").await.unwrap());

        registry.write_tuple("user:alice", "member", "role:R1").await.unwrap();

        assert!(registry.check("user:alice", "member", "role:R1").await.unwrap());
    }

    #[tokio::test]
    async fn delete_invalidates_cached_decision() {
        let (registry, backend) = PolicyEngineRegistry::mock_with_cache(60);
        backend.add_tuple("user:alice", "member", "role:R1");

        assert!(registry.check("user:alice", "member", "role:R1").await.unwrap());

        registry.delete_tuple("user:alice", "member", "role:R1").await.unwrap();

        assert!(!registry.check("user:alice", "member", "role:R1").await.unwrap());
    }
}
