// Agent registry - registration, heartbeats, liveness, claims

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::OrchestratorConfig;
use crate::domain::{Agent, AgentState, Job, JobState, Target, TransitionPatch};
use crate::error::{AppError, Result};
use crate::port::{IdProvider, TimeProvider};
use crate::store::RecordStore;

const MAX_NAME_LEN: usize = 128;

/// Registration request from a worker process
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterRequest {
    pub name: String,
    pub capabilities: Vec<String>,
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
}

pub struct AgentRegistry {
    records: Arc<RecordStore>,
    id_provider: Arc<dyn IdProvider>,
    time_provider: Arc<dyn TimeProvider>,
    config: Arc<OrchestratorConfig>,
}

impl AgentRegistry {
    pub fn new(
        records: Arc<RecordStore>,
        id_provider: Arc<dyn IdProvider>,
        time_provider: Arc<dyn TimeProvider>,
        config: Arc<OrchestratorConfig>,
    ) -> Self {
        Self {
            records,
            id_provider,
            time_provider,
            config,
        }
    }

    pub async fn register(&self, req: RegisterRequest) -> Result<Agent> {
        if req.name.is_empty() {
            return Err(AppError::Validation("agent name cannot be empty".to_string()));
        }
        if req.name.len() > MAX_NAME_LEN {
            return Err(AppError::Validation(format!(
                "agent name too long (max {} bytes)",
                MAX_NAME_LEN
            )));
        }
        if req.capabilities.is_empty() {
            return Err(AppError::Validation(
                "agent must declare at least one capability".to_string(),
            ));
        }
        let mut capabilities = Vec::with_capacity(req.capabilities.len());
        for cap in &req.capabilities {
            let target = Target::parse(cap)?;
            if !capabilities.contains(&target) {
                capabilities.push(target);
            }
        }

        let now = self.time_provider.now_millis();
        let agent = Agent::new(
            self.id_provider.generate_id(),
            req.name,
            capabilities,
            req.metadata,
            now,
        );
        self.records.put_agent(&agent).await?;
        info!(
            agent_id = %agent.id,
            name = %agent.name,
            capabilities = ?agent.capabilities,
            "Agent registered"
        );
        Ok(agent)
    }

    pub async fn get(&self, id: &str) -> Result<Agent> {
        self.records
            .get_agent(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("agent {} not found", id)))
    }

    /// Refresh `last_seen` and the record's expiry window. Idempotent.
    pub async fn heartbeat(&self, id: &str) -> Result<()> {
        let mut agent = self.get(id).await?;
        agent.last_seen = self.time_provider.now_millis();
        self.records.put_agent(&agent).await
    }

    pub async fn set_state(
        &self,
        id: &str,
        state: &str,
        current_job: Option<String>,
    ) -> Result<Agent> {
        let state = AgentState::parse(state)?;
        let mut agent = self.get(id).await?;
        let now = self.time_provider.now_millis();
        agent.set_state(state, current_job, now)?;
        self.records.put_agent(&agent).await?;
        info!(agent_id = %agent.id, state = %agent.state, "Agent state updated");
        Ok(agent)
    }

    /// Agents whose heartbeat falls inside the liveness window.
    ///
    /// Store expiry garbage-collects the rest passively; entries that are
    /// still retained but stale are filtered here.
    pub async fn live_agents(&self) -> Result<Vec<Agent>> {
        let now = self.time_provider.now_millis();
        let ttl = self.config.liveness_ttl_ms;
        Ok(self
            .records
            .scan_agents()
            .await?
            .into_iter()
            .filter(|a| a.is_live(now, ttl))
            .collect())
    }

    /// Bind a claimable job to a live, capable agent.
    ///
    /// The job mutation is written first; if the agent write below fails the
    /// reconciliation sweep detects the half-claim and rolls the job back to
    /// pending.
    pub async fn claim(&self, agent_id: &str, job_id: &str) -> Result<Job> {
        let now = self.time_provider.now_millis();

        let mut agent = self.get(agent_id).await?;
        if !agent.is_live(now, self.config.liveness_ttl_ms) {
            return Err(AppError::Conflict(format!(
                "agent {} is not live",
                agent_id
            )));
        }

        let mut job = self
            .records
            .get_job(job_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("job {} not found", job_id)))?;
        if !matches!(job.state, JobState::Pending | JobState::QueuedForGroup) {
            return Err(AppError::Conflict(format!(
                "job {} is not claimable from state {}",
                job_id, job.state
            )));
        }
        if !agent.can_service(job.target) {
            return Err(AppError::Forbidden(format!(
                "agent {} cannot service target {}",
                agent_id, job.target
            )));
        }

        job.transition(
            JobState::Running,
            TransitionPatch {
                assigned_agent: Some(agent_id.to_string()),
                ..Default::default()
            },
            now,
        )?;
        self.records.put_job(&job).await?;

        agent.set_state(AgentState::Busy, Some(job_id.to_string()), now)?;
        if let Err(e) = self.records.put_agent(&agent).await {
            warn!(
                agent_id,
                job_id,
                error = %e,
                "Agent write failed after job claim; reconciliation will revert"
            );
            return Err(e);
        }

        info!(agent_id, job_id, "Job claimed");
        Ok(job)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::port::id_provider::mocks::SequentialIdProvider;
    use crate::port::state_store::memory::MemoryStateStore;
    use crate::port::time_provider::mocks::MockTimeProvider;

    struct Rig {
        time: Arc<MockTimeProvider>,
        records: Arc<RecordStore>,
        agents: AgentRegistry,
    }

    fn rig() -> Rig {
        let time = Arc::new(MockTimeProvider::new(0));
        let config = Arc::new(OrchestratorConfig::default());
        let store = Arc::new(MemoryStateStore::new(time.clone()));
        let records = Arc::new(RecordStore::new(store, &config));
        let agents = AgentRegistry::new(
            records.clone(),
            Arc::new(SequentialIdProvider::new("agent")),
            time.clone(),
            config,
        );
        Rig {
            time,
            records,
            agents,
        }
    }

    fn register_req(caps: &[&str]) -> RegisterRequest {
        RegisterRequest {
            name: "bench-1".to_string(),
            capabilities: caps.iter().map(|c| c.to_string()).collect(),
            metadata: None,
        }
    }

    async fn pending_job(rig: &Rig, id: &str, target: Target) -> Job {
        let job = Job::new(
            id,
            rig.time.now_millis(),
            "acme",
            "build-1",
            "suite",
            crate::domain::Priority::Medium,
            target,
        );
        rig.records.put_job(&job).await.unwrap();
        job
    }

    #[tokio::test]
    async fn register_parses_and_dedupes_capabilities() {
        let rig = rig();
        let agent = rig
            .agents
            .register(register_req(&["emulator", "browserstack", "cloud"]))
            .await
            .unwrap();
        assert_eq!(agent.capabilities, vec![Target::Emulator, Target::Cloud]);
        assert_eq!(agent.state, AgentState::Idle);
    }

    #[tokio::test]
    async fn register_rejects_bad_input() {
        let rig = rig();
        let mut req = register_req(&["emulator"]);
        req.name = String::new();
        assert!(matches!(
            rig.agents.register(req).await,
            Err(AppError::Validation(_))
        ));
        assert!(matches!(
            rig.agents.register(register_req(&[])).await,
            Err(AppError::Validation(_))
        ));
        assert!(matches!(
            rig.agents.register(register_req(&["quantum"])).await,
            Err(AppError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn heartbeat_refreshes_last_seen_only() {
        let rig = rig();
        let agent = rig
            .agents
            .register(register_req(&["emulator"]))
            .await
            .unwrap();
        rig.time.advance(60_000);
        rig.agents.heartbeat(&agent.id).await.unwrap();
        let loaded = rig.agents.get(&agent.id).await.unwrap();
        assert_eq!(loaded.last_seen, 60_000);
        assert_eq!(loaded.state, agent.state);
        assert_eq!(loaded.capabilities, agent.capabilities);
        assert_eq!(loaded.registered_at, agent.registered_at);
    }

    #[tokio::test]
    async fn heartbeat_unknown_agent_is_not_found() {
        let rig = rig();
        assert!(matches!(
            rig.agents.heartbeat("ghost").await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn live_agents_filters_stale_heartbeats() {
        let rig = rig();
        let a1 = rig
            .agents
            .register(register_req(&["emulator"]))
            .await
            .unwrap();
        rig.time.advance(119_000);
        let a2 = rig
            .agents
            .register(register_req(&["device"]))
            .await
            .unwrap();
        rig.time.advance(1_000);

        let live = rig.agents.live_agents().await.unwrap();
        let ids: Vec<&str> = live.iter().map(|a| a.id.as_str()).collect();
        assert!(!ids.contains(&a1.id.as_str()));
        assert!(ids.contains(&a2.id.as_str()));
    }

    #[tokio::test]
    async fn set_state_busy_requires_job() {
        let rig = rig();
        let agent = rig
            .agents
            .register(register_req(&["emulator"]))
            .await
            .unwrap();
        assert!(matches!(
            rig.agents.set_state(&agent.id, "busy", None).await,
            Err(AppError::Validation(_))
        ));
        let updated = rig
            .agents
            .set_state(&agent.id, "maintenance", None)
            .await
            .unwrap();
        assert_eq!(updated.state, AgentState::Maintenance);
    }

    #[tokio::test]
    async fn claim_binds_job_and_agent() {
        let rig = rig();
        let agent = rig
            .agents
            .register(register_req(&["emulator"]))
            .await
            .unwrap();
        let job = pending_job(&rig, "j-1", Target::Emulator).await;

        let claimed = rig.agents.claim(&agent.id, &job.id).await.unwrap();
        assert_eq!(claimed.state, JobState::Running);
        assert_eq!(claimed.assigned_agent.as_deref(), Some(agent.id.as_str()));
        assert!(claimed.started_at.is_some());

        let loaded_agent = rig.agents.get(&agent.id).await.unwrap();
        assert_eq!(loaded_agent.state, AgentState::Busy);
        assert_eq!(loaded_agent.current_job.as_deref(), Some("j-1"));
    }

    #[tokio::test]
    async fn claim_race_loser_gets_conflict() {
        let rig = rig();
        let a1 = rig
            .agents
            .register(register_req(&["emulator"]))
            .await
            .unwrap();
        let a2 = rig
            .agents
            .register(register_req(&["emulator"]))
            .await
            .unwrap();
        let job = pending_job(&rig, "j-1", Target::Emulator).await;

        rig.agents.claim(&a1.id, &job.id).await.unwrap();
        assert!(matches!(
            rig.agents.claim(&a2.id, &job.id).await,
            Err(AppError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn claim_requires_capability() {
        let rig = rig();
        let agent = rig
            .agents
            .register(register_req(&["device"]))
            .await
            .unwrap();
        let job = pending_job(&rig, "j-1", Target::Cloud).await;
        assert!(matches!(
            rig.agents.claim(&agent.id, &job.id).await,
            Err(AppError::Forbidden(_))
        ));
    }

    #[tokio::test]
    async fn claim_rejects_non_live_agent() {
        let rig = rig();
        let agent = rig
            .agents
            .register(register_req(&["emulator"]))
            .await
            .unwrap();
        rig.time.advance(120_000);
        // keep the record alive in the store but outside the liveness window
        let job = pending_job(&rig, "j-1", Target::Emulator).await;
        assert!(matches!(
            rig.agents.claim(&agent.id, &job.id).await,
            Err(AppError::Conflict(_))
        ));
    }
}
