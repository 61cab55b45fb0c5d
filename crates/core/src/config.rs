// Orchestrator configuration (no magic values outside this module)

use std::collections::HashMap;

/// Scheduler tick cadence (5 s)
pub const DEFAULT_TICK_INTERVAL_MS: i64 = 5_000;

/// Agent liveness window: last heartbeat must be younger than this (120 s)
pub const DEFAULT_LIVENESS_TTL_MS: i64 = 120_000;

/// Agent record expiry in the store (300 s, refreshed on every write)
pub const DEFAULT_AGENT_RECORD_TTL_MS: i64 = 300_000;

/// Job record retention after terminal state (24 h)
pub const DEFAULT_JOB_RECORD_TTL_MS: i64 = 24 * 60 * 60 * 1000;

/// Non-processing affinity groups older than this are discarded (10 min)
pub const DEFAULT_GROUP_MAX_IDLE_MS: i64 = 10 * 60 * 1000;

/// Running jobs older than this are treated as crashed (30 min)
pub const DEFAULT_JOB_MAX_RUNTIME_MS: i64 = 30 * 60 * 1000;

/// Maximum execution attempts per job
pub const DEFAULT_MAX_ATTEMPTS: i32 = 3;

/// Weight assigned to tenants absent from the configured mapping
pub const DEFAULT_TENANT_WEIGHT: i64 = 10;

/// Tenant fairness weights (higher weight schedules first)
#[derive(Debug, Clone, Default)]
pub struct TenantWeights {
    weights: HashMap<String, i64>,
}

impl TenantWeights {
    pub fn new(weights: HashMap<String, i64>) -> Self {
        Self { weights }
    }

    /// Parse a `name=weight,name=weight` mapping (env-var format)
    pub fn parse(spec: &str) -> std::result::Result<Self, String> {
        let mut weights = HashMap::new();
        for entry in spec.split(',').filter(|e| !e.trim().is_empty()) {
            let (name, weight) = entry
                .split_once('=')
                .ok_or_else(|| format!("malformed tenant weight entry: {}", entry))?;
            let weight: i64 = weight
                .trim()
                .parse()
                .map_err(|_| format!("malformed tenant weight for {}: {}", name, weight))?;
            weights.insert(name.trim().to_string(), weight);
        }
        Ok(Self { weights })
    }

    pub fn weight_of(&self, tenant: &str) -> i64 {
        self.weights
            .get(tenant)
            .copied()
            .unwrap_or(DEFAULT_TENANT_WEIGHT)
    }
}

/// Process-wide orchestrator configuration, initialized once at startup
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub tick_interval_ms: i64,
    pub liveness_ttl_ms: i64,
    pub agent_record_ttl_ms: i64,
    pub job_record_ttl_ms: i64,
    pub group_max_idle_ms: i64,
    pub job_max_runtime_ms: i64,
    pub max_attempts: i32,
    pub tenant_weights: TenantWeights,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: DEFAULT_TICK_INTERVAL_MS,
            liveness_ttl_ms: DEFAULT_LIVENESS_TTL_MS,
            agent_record_ttl_ms: DEFAULT_AGENT_RECORD_TTL_MS,
            job_record_ttl_ms: DEFAULT_JOB_RECORD_TTL_MS,
            group_max_idle_ms: DEFAULT_GROUP_MAX_IDLE_MS,
            job_max_runtime_ms: DEFAULT_JOB_MAX_RUNTIME_MS,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            tenant_weights: TenantWeights::default(),
        }
    }
}
