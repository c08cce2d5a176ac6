//! Backend trait and implementations for the relation-tuple policy engine.
//!
//! [`PolicyEngine`] is the core abstraction — implement it to plug in a
//! custom authorization backend (REST proxy, in-process evaluation, etc.).
//!
//! Provided implementations:
//! - [`GrpcPolicyEngine`] — production gRPC client wrapping `openfga-rs`
//! - [`MockPolicyEngine`] — in-memory mock for tests

use crate::config::PolicyEngineConfig;
use crate::error::PolicyEngineError;
use openfga_rs::open_fga_service_client::OpenFgaServiceClient;
use openfga_rs::{
    userset, CheckRequest, CheckRequestTupleKey, DeleteRequestTupleKeys, DirectUserset,
    ListObjectsRequest, TupleKey, TupleKeyWithoutCondition, TypeDefinition, Userset,
    WriteAuthorizationModelRequest, WriteRequest, WriteRequestDeletes, WriteRequestWrites,
};
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tonic::transport::Channel;

/// Backend trait for relation-tuple authorization.
///
/// Unlike `r2e-openfga`'s `OpenFgaBackend` (which only declares `check` and
/// leaves writes to the concrete `GrpcBackend::client()`), this trait
/// declares the full set of operations `spec.md` §6 needs from the policy
/// engine collaborator, so [`PolicyEngineRegistry`](crate::registry::PolicyEngineRegistry)
/// can stay backend-agnostic for writes too.
pub trait PolicyEngine: Send + Sync + 'static {
    /// Check if `subject` has `relation` to `object`.
    fn check(
        &self,
        subject: &str,
        relation: &str,
        object: &str,
    ) -> Pin<Box<dyn Future<Output = Result<bool, PolicyEngineError>> + Send + '_>>;

    /// Write a relation tuple.
    fn write_tuple(
        &self,
        subject: &str,
        relation: &str,
        object: &str,
    ) -> Pin<Box<dyn Future<Output = Result<(), PolicyEngineError>> + Send + '_>>;

    /// Delete a relation tuple.
    fn delete_tuple(
        &self,
        subject: &str,
        relation: &str,
        object: &str,
    ) -> Pin<Box<dyn Future<Output = Result<(), PolicyEngineError>> + Send + '_>>;

    /// List all objects of `object_type` that `subject` has `relation` to.
    fn list_objects(
        &self,
        subject: &str,
        relation: &str,
        object_type: &str,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<String>, PolicyEngineError>> + Send + '_>>;

    /// Registers the authorization model for the given object types, each
    /// getting a `member` relation accepting direct assignment. Returns the
    /// new model id. Backends that don't support schema management (e.g.
    /// [`MockPolicyEngine`]) return `PolicyEngineError::Unsupported`.
    fn register_schema<'a>(
        &'a self,
        object_types: &'a [&str],
    ) -> Pin<Box<dyn Future<Output = Result<String, PolicyEngineError>> + Send + 'a>> {
        let _ = object_types;
        Box::pin(async move { Err(PolicyEngineError::Unsupported("schema registration".to_string())) })
    }
}

// ── GrpcPolicyEngine ─────────────────────────────────────────────────────

/// Production gRPC backend wrapping the `openfga-rs` client.
///
/// The tonic client is cheap to clone (shares the underlying HTTP/2 channel).
#[derive(Clone)]
pub struct GrpcPolicyEngine {
    client: OpenFgaServiceClient<Channel>,
    store_id: String,
    model_id: Option<String>,
    api_token: Option<String>,
}

impl GrpcPolicyEngine {
    /// Connect to a policy engine server using the given config.
    pub async fn connect(config: &PolicyEngineConfig) -> Result<Self, PolicyEngineError> {
        config.validate()?;

        let endpoint = tonic::transport::Endpoint::from_shared(config.endpoint.clone())
            .map_err(|e| PolicyEngineError::ConnectionFailed(e.to_string()))?
            .connect_timeout(std::time::Duration::from_secs(config.connect_timeout_secs))
            .timeout(std::time::Duration::from_secs(config.request_timeout_secs));

        let channel = endpoint.connect().await?;

        Ok(Self {
            client: OpenFgaServiceClient::new(channel),
            store_id: config.store_id.clone(),
            model_id: config.model_id.clone(),
            api_token: config.api_token.clone(),
        })
    }

    /// Returns a reference to the raw gRPC client, for schema registration
    /// and other operations the [`PolicyEngine`] trait doesn't expose.
    pub fn client(&self) -> &OpenFgaServiceClient<Channel> {
        &self.client
    }

    pub fn store_id(&self) -> &str {
        &self.store_id
    }

    pub fn model_id(&self) -> Option<&str> {
        self.model_id.as_deref()
    }

    /// Registers the authorization model used by `spec.md` §4.4's relation
    /// tuples: each `object_type` gets a `member` relation accepting direct
    /// assignment (`role:R1#member@user:U1`). Called once at boot
    /// (`Bootstrapping::register_schema`); returns the new model id.
    pub async fn register_schema(&self, object_types: &[&str]) -> Result<String, PolicyEngineError> {
        let member_relation = Userset {
            userset: Some(userset::Userset::This(DirectUserset {})),
        };

        let type_definitions = object_types
            .iter()
            .map(|object_type| TypeDefinition {
                r#type: object_type.to_string(),
                relations: HashMap::from([("member".to_string(), member_relation.clone())]),
                metadata: None,
            })
            .collect();

        let req = WriteAuthorizationModelRequest {
            store_id: self.store_id.clone(),
            type_definitions,
            schema_version: "1.1".to_string(),
            conditions: HashMap::new(),
        };

        let request = self.make_request(req)?;
        let resp = self.client.clone().write_authorization_model(request).await?;
        Ok(resp.into_inner().authorization_model_id)
    }

    fn make_request<T>(&self, msg: T) -> Result<tonic::Request<T>, PolicyEngineError> {
        let mut request = tonic::Request::new(msg);
        if let Some(token) = &self.api_token {
            request.metadata_mut().insert(
                "authorization",
                format!("Bearer {token}").parse().map_err(
                    |e: tonic::metadata::errors::InvalidMetadataValue| {
                        PolicyEngineError::InvalidConfig(format!("invalid api_token for header: {e}"))
                    },
                )?,
            );
        }
        Ok(request)
    }
}

impl PolicyEngine for GrpcPolicyEngine {
    fn check(
        &self,
        subject: &str,
        relation: &str,
        object: &str,
    ) -> Pin<Box<dyn Future<Output = Result<bool, PolicyEngineError>> + Send + '_>> {
        let req = CheckRequest {
            store_id: self.store_id.clone(),
            authorization_model_id: self.model_id.clone().unwrap_or_default(),
            tuple_key: Some(CheckRequestTupleKey {
                user: subject.to_string(),
                relation: relation.to_string(),
                object: object.to_string(),
            }),
            ..Default::default()
        };

        Box::pin(async move {
            let request = self.make_request(req)?;
            let resp = self.client.clone().check(request).await?;
            Ok(resp.into_inner().allowed)
        })
    }

    fn write_tuple(
        &self,
        subject: &str,
        relation: &str,
        object: &str,
    ) -> Pin<Box<dyn Future<Output = Result<(), PolicyEngineError>> + Send + '_>> {
        let req = WriteRequest {
            store_id: self.store_id.clone(),
            authorization_model_id: self.model_id.clone().unwrap_or_default(),
            writes: Some(WriteRequestWrites {
                tuple_keys: vec![TupleKey {
                    user: subject.to_string(),
                    relation: relation.to_string(),
                    object: object.to_string(),
                    condition: None,
                }],
            }),
            ..Default::default()
        };

        Box::pin(async move {
            let request = self.make_request(req)?;
            self.client.clone().write(request).await?;
            Ok(())
        })
    }

    fn delete_tuple(
        &self,
        subject: &str,
        relation: &str,
        object: &str,
    ) -> Pin<Box<dyn Future<Output = Result<(), PolicyEngineError>> + Send + '_>> {
        let req = WriteRequest {
            store_id: self.store_id.clone(),
            authorization_model_id: self.model_id.clone().unwrap_or_default(),
            deletes: Some(WriteRequestDeletes {
                tuple_keys: vec![TupleKeyWithoutCondition {
                    user: subject.to_string(),
                    relation: relation.to_string(),
                    object: object.to_string(),
                }],
            }),
            ..Default::default()
        };

        Box::pin(async move {
            let request = self.make_request(req)?;
            self.client.clone().write(request).await?;
            Ok(())
        })
    }

    fn list_objects(
        &self,
        subject: &str,
        relation: &str,
        object_type: &str,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<String>, PolicyEngineError>> + Send + '_>> {
        let req = ListObjectsRequest {
            store_id: self.store_id.clone(),
            authorization_model_id: self.model_id.clone().unwrap_or_default(),
            user: subject.to_string(),
            relation: relation.to_string(),
            r#type: object_type.to_string(),
            ..Default::default()
        };

        Box::pin(async move {
            let request = self.make_request(req)?;
            let resp = self.client.clone().list_objects(request).await?;
            Ok(resp.into_inner().objects)
        })
    }

    fn register_schema<'a>(
        &'a self,
        object_types: &'a [&str],
    ) -> Pin<Box<dyn Future<Output = Result<String, PolicyEngineError>> + Send + 'a>> {
        Box::pin(async move { GrpcPolicyEngine::register_schema(self, object_types).await })
    }
}

// ── MockPolicyEngine ─────────────────────────────────────────────────────

/// In-memory mock backend for testing.
///
/// Stores tuples as `(subject, relation, object)` triples in a `DashSet`.
/// Only performs direct tuple lookups — does **not** model transitive
/// relationships a real policy engine server would evaluate.
#[derive(Default)]
pub struct MockPolicyEngine {
    tuples: Arc<dashmap::DashSet<(String, String, String)>>,
}

impl MockPolicyEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_tuple(&self, subject: &str, relation: &str, object: &str) {
        self.tuples
            .insert((subject.to_string(), relation.to_string(), object.to_string()));
    }

    pub fn remove_tuple(&self, subject: &str, relation: &str, object: &str) {
        self.tuples
            .remove(&(subject.to_string(), relation.to_string(), object.to_string()));
    }

    pub fn has_tuple(&self, subject: &str, relation: &str, object: &str) -> bool {
        self.tuples
            .contains(&(subject.to_string(), relation.to_string(), object.to_string()))
    }

    pub fn list_tuples(&self, subject: &str, relation: &str, object_type: &str) -> Vec<String> {
        let prefix = format!("{object_type}:");
        self.tuples
            .iter()
            .filter(|t| t.0 == subject && t.1 == relation && t.2.starts_with(&prefix))
            .map(|t| t.2.clone())
            .collect()
    }
}

impl PolicyEngine for MockPolicyEngine {
    fn check(
        &self,
        subject: &str,
        relation: &str,
        object: &str,
    ) -> Pin<Box<dyn Future<Output = Result<bool, PolicyEngineError>> + Send + '_>> {
        let result = self.has_tuple(subject, relation, object);
        Box::pin(async move { Ok(result) })
    }

    fn write_tuple(
        &self,
        subject: &str,
        relation: &str,
        object: &str,
    ) -> Pin<Box<dyn Future<Output = Result<(), PolicyEngineError>> + Send + '_>> {
        self.add_tuple(subject, relation, object);
        Box::pin(async move { Ok(()) })
    }

    fn delete_tuple(
        &self,
        subject: &str,
        relation: &str,
        object: &str,
    ) -> Pin<Box<dyn Future<Output = Result<(), PolicyEngineError>> + Send + '_>> {
        self.remove_tuple(subject, relation, object);
        Box::pin(async move { Ok(()) })
    }

    fn list_objects(
        &self,
        subject: &str,
        relation: &str,
        object_type: &str,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<String>, PolicyEngineError>> + Send + '_>> {
        let result = self.list_tuples(subject, relation, object_type);
        Box::pin(async move { Ok(result) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mock_check_direct_tuple_only() {
        let mock = MockPolicyEngine::new();
        mock.add_tuple("user:alice", "member", "role:R1");

        assert!(mock.check("user:alice", "member", "role:R1").await.unwrap());
        assert!(!mock.check("user:bob", "member", "role:R1").await.unwrap());
    }

    #[tokio::test]
    async fn mock_write_then_delete_tuple() {
        let mock = MockPolicyEngine::new();
        mock.write_tuple("user:alice", "member", "role:R1").await.unwrap();
        assert!(mock.has_tuple("user:alice", "member", "role:R1"));

        mock.delete_tuple("user:alice", "member", "role:R1").await.unwrap();
        assert!(!mock.has_tuple("user:alice", "member", "role:R1"));
    }

    #[tokio::test]
    async fn mock_list_objects_filters_by_type_and_relation() {
        let mock = MockPolicyEngine::new();
        mock.add_tuple("user:alice", "member", "role:R1");
        mock.add_tuple("user:alice", "member", "role:R2");
        mock.add_tuple("user:alice", "owner", "role:R3");
        mock.add_tuple("user:alice", "member", "group:G1");

        let mut objects = mock.list_objects("user:alice", "member", "role").await.unwrap();
        objects.sort();
        assert_eq!(objects, vec!["role:R1".to_string(), "role:R2".to_string()]);
    }
}
