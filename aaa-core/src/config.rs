use serde::Deserialize;

fn default_effective_roles_ttl() -> u64 {
    300
}
fn default_hierarchy_ttl() -> u64 {
    1800
}
fn default_members_ttl() -> u64 {
    600
}
fn default_materializer_batch_cap() -> usize {
    10_000
}
fn default_hierarchy_max_depth() -> u32 {
    32
}

/// Runtime configuration for the access-control core (`spec.md` §6).
///
/// Builder-with-defaults shape copied from `r2e-openfga::OpenFgaConfig`.
#[derive(Debug, Clone, Deserialize)]
pub struct CoreConfig {
    #[serde(default = "default_effective_roles_ttl")]
    pub effective_roles_ttl_secs: u64,
    #[serde(default = "default_hierarchy_ttl")]
    pub hierarchy_ttl_secs: u64,
    #[serde(default = "default_members_ttl")]
    pub members_ttl_secs: u64,
    #[serde(default = "default_materializer_batch_cap")]
    pub materializer_batch_cap: usize,
    #[serde(default = "default_hierarchy_max_depth")]
    pub hierarchy_max_depth: u32,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            effective_roles_ttl_secs: default_effective_roles_ttl(),
            hierarchy_ttl_secs: default_hierarchy_ttl(),
            members_ttl_secs: default_members_ttl(),
            materializer_batch_cap: default_materializer_batch_cap(),
            hierarchy_max_depth: default_hierarchy_max_depth(),
        }
    }
}

impl CoreConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_effective_roles_ttl(mut self, secs: u64) -> Self {
        self.effective_roles_ttl_secs = secs;
        self
    }

    pub fn with_hierarchy_ttl(mut self, secs: u64) -> Self {
        self.hierarchy_ttl_secs = secs;
        self
    }

    pub fn with_members_ttl(mut self, secs: u64) -> Self {
        self.members_ttl_secs = secs;
        self
    }

    pub fn with_materializer_batch_cap(mut self, cap: usize) -> Self {
        self.materializer_batch_cap = cap;
        self
    }

    pub fn with_hierarchy_max_depth(mut self, depth: u32) -> Self {
        self.hierarchy_max_depth = depth;
        self
    }
}
