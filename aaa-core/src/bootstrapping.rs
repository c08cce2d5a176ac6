//! Schema registration and health/readiness aggregation (`spec.md` §6).
//!
//! Shape generalized from `r2e-core::health`'s `HealthIndicator`/
//! `HealthBuilder` — re-implemented locally, with no HTTP wiring, since the
//! RPC/HTTP boundary is explicitly out of scope (`spec.md` §1).

use aaa_cache::TypedCache;
use aaa_policy::{PolicyEngineError, PolicyEngineRegistry};
use aaa_store::StoreError;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Object types that carry a relation-tuple `member` relation (`spec.md`
/// §4.4): roles and groups, the two object kinds the policy engine tracks
/// direct assignments for.
pub const SCHEMA_OBJECT_TYPES: &[&str] = &["role", "group"];

/// Result of a single health check.
#[derive(Debug, Clone)]
pub enum HealthStatus {
    Up,
    Down(String),
}

impl HealthStatus {
    pub fn is_up(&self) -> bool {
        matches!(self, HealthStatus::Up)
    }
}

/// A named health indicator, checked once per `health()`/`readiness()` call.
pub trait HealthIndicator: Send + Sync + 'static {
    fn name(&self) -> &str;
    fn check(&self) -> Pin<Box<dyn Future<Output = HealthStatus> + Send + '_>>;
    /// Whether this check gates readiness (default: `true`). Liveness-only
    /// checks return `false`.
    fn affects_readiness(&self) -> bool {
        true
    }
}

#[derive(Debug, Clone)]
pub struct HealthCheck {
    pub name: String,
    pub status: HealthCheckStatus,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthCheckStatus {
    Up,
    Down,
}

#[derive(Debug, Clone)]
pub struct HealthReport {
    pub status: HealthCheckStatus,
    pub checks: Vec<HealthCheck>,
    pub uptime_seconds: u64,
}

impl HealthReport {
    pub fn is_up(&self) -> bool {
        self.status == HealthCheckStatus::Up
    }
}

async fn run_checks(indicators: &[Arc<dyn HealthIndicator>], start_time: Instant, readiness_only: bool) -> HealthReport {
    let mut checks = Vec::new();
    let mut all_up = true;

    for indicator in indicators {
        if readiness_only && !indicator.affects_readiness() {
            continue;
        }
        let status = indicator.check().await;
        let (check_status, reason) = match status {
            HealthStatus::Up => (HealthCheckStatus::Up, None),
            HealthStatus::Down(reason) => {
                all_up = false;
                (HealthCheckStatus::Down, Some(reason))
            }
        };
        checks.push(HealthCheck {
            name: indicator.name().to_string(),
            status: check_status,
            reason,
        });
    }

    HealthReport {
        status: if all_up { HealthCheckStatus::Up } else { HealthCheckStatus::Down },
        checks,
        uptime_seconds: start_time.elapsed().as_secs(),
    }
}

struct StoreHealthIndicator {
    name: &'static str,
    probe: Arc<dyn Fn() -> Pin<Box<dyn Future<Output = Result<(), StoreError>> + Send>> + Send + Sync>,
}

impl HealthIndicator for StoreHealthIndicator {
    fn name(&self) -> &str {
        self.name
    }

    fn check(&self) -> Pin<Box<dyn Future<Output = HealthStatus> + Send + '_>> {
        Box::pin(async move {
            match (self.probe)().await {
                Ok(()) => HealthStatus::Up,
                Err(err) => HealthStatus::Down(err.to_string()),
            }
        })
    }
}

struct CacheHealthIndicator {
    cache: TypedCache,
}

impl HealthIndicator for CacheHealthIndicator {
    fn name(&self) -> &str {
        "cache"
    }

    fn check(&self) -> Pin<Box<dyn Future<Output = HealthStatus> + Send + '_>> {
        Box::pin(async move {
            const KEY: &str = "__bootstrapping_health_probe__";
            self.cache.set(KEY, &true, Duration::from_secs(5)).await;
            let roundtrip: Option<bool> = self.cache.get(KEY).await;
            self.cache.delete(KEY).await;
            match roundtrip {
                Some(true) => HealthStatus::Up,
                _ => HealthStatus::Down("cache set/get round-trip failed".to_string()),
            }
        })
    }

    fn affects_readiness(&self) -> bool {
        // The cache is throughput-only (`spec.md` §9): an outage degrades
        // latency, it never makes the service incorrect or unable to serve.
        false
    }
}

struct PolicyEngineHealthIndicator {
    policy: PolicyEngineRegistry,
}

impl HealthIndicator for PolicyEngineHealthIndicator {
    fn name(&self) -> &str {
        "policy_engine"
    }

    fn check(&self) -> Pin<Box<dyn Future<Output = HealthStatus> + Send + '_>> {
        Box::pin(async move {
            match self.policy.check("user:__health_probe__", "member", "role:__health_probe__").await {
                Ok(_) => HealthStatus::Up,
                Err(err) => HealthStatus::Down(err.to_string()),
            }
        })
    }
}

/// Startup and liveness concerns: registering the relation-tuple schema with
/// the policy engine, and aggregating health across the store, cache, and
/// policy-engine collaborators.
pub struct Bootstrapping {
    indicators: Vec<Arc<dyn HealthIndicator>>,
    start_time: Instant,
    policy: Option<PolicyEngineRegistry>,
}

impl Bootstrapping {
    pub fn new() -> Self {
        Self {
            indicators: Vec::new(),
            start_time: Instant::now(),
            policy: None,
        }
    }

    pub fn with_indicator(mut self, indicator: Arc<dyn HealthIndicator>) -> Self {
        self.indicators.push(indicator);
        self
    }

    /// Registers a store-backed collaborator whose health is a simple
    /// "does a trivial read succeed" probe.
    pub fn with_store_probe<F, Fut>(mut self, name: &'static str, probe: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), StoreError>> + Send + 'static,
    {
        let probe: Arc<dyn Fn() -> Pin<Box<dyn Future<Output = Result<(), StoreError>> + Send>> + Send + Sync> =
            Arc::new(move || Box::pin(probe()) as Pin<Box<dyn Future<Output = Result<(), StoreError>> + Send>>);
        self.indicators.push(Arc::new(StoreHealthIndicator { name, probe }));
        self
    }

    pub fn with_cache(mut self, cache: TypedCache) -> Self {
        self.indicators.push(Arc::new(CacheHealthIndicator { cache }));
        self
    }

    pub fn with_policy_engine(mut self, policy: PolicyEngineRegistry) -> Self {
        self.policy = Some(policy.clone());
        self.indicators.push(Arc::new(PolicyEngineHealthIndicator { policy }));
        self
    }

    /// Aggregated health across every registered indicator.
    pub async fn health(&self) -> HealthReport {
        run_checks(&self.indicators, self.start_time, false).await
    }

    /// Aggregated health across only readiness-affecting indicators.
    pub async fn readiness(&self) -> HealthReport {
        run_checks(&self.indicators, self.start_time, true).await
    }

    /// Registers the relation-tuple schema with the policy engine supplied
    /// via [`Bootstrapping::with_policy_engine`]. Intended to run once at
    /// startup, before traffic is accepted. Returns
    /// `PolicyEngineError::Unsupported` if no policy engine was registered,
    /// or if the backend doesn't support schema management (e.g. in tests
    /// backed by `MockPolicyEngine`).
    pub async fn register_schema(&self) -> Result<String, PolicyEngineError> {
        let policy = self
            .policy
            .as_ref()
            .ok_or_else(|| PolicyEngineError::Unsupported("no policy engine registered".to_string()))?;
        policy.register_schema(SCHEMA_OBJECT_TYPES).await
    }
}

impl Default for Bootstrapping {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct AlwaysUp;
    impl HealthIndicator for AlwaysUp {
        fn name(&self) -> &str {
            "always_up"
        }
        fn check(&self) -> Pin<Box<dyn Future<Output = HealthStatus> + Send + '_>> {
            Box::pin(async { HealthStatus::Up })
        }
    }

    struct AlwaysDown {
        readiness_gating: bool,
    }
    impl HealthIndicator for AlwaysDown {
        fn name(&self) -> &str {
            "always_down"
        }
        fn check(&self) -> Pin<Box<dyn Future<Output = HealthStatus> + Send + '_>> {
            Box::pin(async { HealthStatus::Down("simulated failure".to_string()) })
        }
        fn affects_readiness(&self) -> bool {
            self.readiness_gating
        }
    }

    #[tokio::test]
    async fn health_is_up_when_every_indicator_is_up() {
        let bootstrapping = Bootstrapping::new().with_indicator(Arc::new(AlwaysUp));
        let report = bootstrapping.health().await;
        assert!(report.is_up());
    }

    #[tokio::test]
    async fn health_is_down_when_any_indicator_is_down() {
        let bootstrapping = Bootstrapping::new()
            .with_indicator(Arc::new(AlwaysUp))
            .with_indicator(Arc::new(AlwaysDown { readiness_gating: true }));
        let report = bootstrapping.health().await;
        assert!(!report.is_up());
        assert_eq!(report.checks.len(), 2);
    }

    #[tokio::test]
    async fn readiness_ignores_non_gating_indicators() {
        let bootstrapping = Bootstrapping::new()
            .with_indicator(Arc::new(AlwaysUp))
            .with_indicator(Arc::new(AlwaysDown { readiness_gating: false }));
        let readiness = bootstrapping.readiness().await;
        assert!(readiness.is_up());
        assert_eq!(readiness.checks.len(), 1);

        let health = bootstrapping.health().await;
        assert!(!health.is_up());
    }

    #[tokio::test]
    async fn cache_indicator_round_trips() {
        let bootstrapping = Bootstrapping::new().with_cache(TypedCache::in_memory());
        let report = bootstrapping.health().await;
        assert!(report.is_up());
        assert!(!bootstrapping.readiness().await.checks.iter().any(|c| c.name == "cache"));
    }

    #[tokio::test]
    async fn policy_engine_indicator_reports_up_for_mock() {
        let (policy, _backend) = PolicyEngineRegistry::mock();
        let bootstrapping = Bootstrapping::new().with_policy_engine(policy);
        let report = bootstrapping.health().await;
        assert!(report.is_up());
    }

    #[tokio::test]
    async fn register_schema_is_unsupported_without_a_policy_engine() {
        let bootstrapping = Bootstrapping::new();
        let err = bootstrapping.register_schema().await.unwrap_err();
        assert!(matches!(err, aaa_policy::PolicyEngineError::Unsupported(_)));
    }

    #[tokio::test]
    async fn register_schema_is_unsupported_for_mock_backend() {
        let (policy, _backend) = PolicyEngineRegistry::mock();
        let bootstrapping = Bootstrapping::new().with_policy_engine(policy);
        let err = bootstrapping.register_schema().await.unwrap_err();
        assert!(matches!(err, aaa_policy::PolicyEngineError::Unsupported(_)));
    }
}
