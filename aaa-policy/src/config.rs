use crate::error::PolicyEngineError;
use serde::Deserialize;

fn default_connect_timeout() -> u64 {
    10
}
fn default_request_timeout() -> u64 {
    5
}
fn default_cache_enabled() -> bool {
    true
}
fn default_cache_ttl() -> u64 {
    60
}

/// Configuration for connecting to the external relation-tuple policy
/// engine (`spec.md` §6, `policy_engine.endpoint` / `policy_engine.token`).
///
/// Builder-with-defaults shape copied from `r2e-openfga::OpenFgaConfig`.
#[derive(Debug, Clone, Deserialize)]
pub struct PolicyEngineConfig {
    pub endpoint: String,
    pub store_id: String,
    pub model_id: Option<String>,
    pub api_token: Option<String>,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_cache_enabled")]
    pub cache_enabled: bool,
    #[serde(default = "default_cache_ttl")]
    pub cache_ttl_secs: u64,
}

impl PolicyEngineConfig {
    pub fn new(endpoint: impl Into<String>, store_id: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            store_id: store_id.into(),
            model_id: None,
            api_token: None,
            connect_timeout_secs: default_connect_timeout(),
            request_timeout_secs: default_request_timeout(),
            cache_enabled: default_cache_enabled(),
            cache_ttl_secs: default_cache_ttl(),
        }
    }

    pub fn with_model_id(mut self, model_id: impl Into<String>) -> Self {
        self.model_id = Some(model_id.into());
        self
    }

    pub fn with_api_token(mut self, token: impl Into<String>) -> Self {
        self.api_token = Some(token.into());
        self
    }

    pub fn with_cache(mut self, enabled: bool, ttl_secs: u64) -> Self {
        self.cache_enabled = enabled;
        self.cache_ttl_secs = ttl_secs;
        self
    }

    pub fn validate(&self) -> Result<(), PolicyEngineError> {
        if self.endpoint.is_empty() {
            return Err(PolicyEngineError::InvalidConfig("endpoint cannot be empty".into()));
        }
        if self.store_id.is_empty() {
            return Err(PolicyEngineError::InvalidConfig("store_id cannot be empty".into()));
        }
        Ok(())
    }
}
