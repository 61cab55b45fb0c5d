// Agent domain model

use serde::{Deserialize, Serialize};

use crate::domain::error::{DomainError, Result};
use crate::domain::job::{JobId, Target};

/// Agent ID (server-assigned UUID v4)
pub type AgentId = String;

/// Worker process state as recorded by the registry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentState {
    Idle,
    Busy,
    Maintenance,
    Offline,
}

impl AgentState {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentState::Idle => "idle",
            AgentState::Busy => "busy",
            AgentState::Maintenance => "maintenance",
            AgentState::Offline => "offline",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "idle" => Ok(AgentState::Idle),
            "busy" => Ok(AgentState::Busy),
            "maintenance" => Ok(AgentState::Maintenance),
            "offline" => Ok(AgentState::Offline),
            other => Err(DomainError::ValidationError(format!(
                "invalid agent state: {}",
                other
            ))),
        }
    }
}

impl std::fmt::Display for AgentState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Worker process record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agent {
    pub id: AgentId,
    pub name: String,
    pub capabilities: Vec<Target>,
    pub state: AgentState,
    pub current_job: Option<JobId>,
    pub metadata: Option<serde_json::Value>,
    pub registered_at: i64, // epoch ms
    pub last_seen: i64,
}

impl Agent {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        capabilities: Vec<Target>,
        metadata: Option<serde_json::Value>,
        now: i64,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            capabilities,
            state: AgentState::Idle,
            current_job: None,
            metadata,
            registered_at: now,
            last_seen: now,
        }
    }

    /// Liveness: the recorded state is irrelevant once heartbeats stop
    pub fn is_live(&self, now: i64, liveness_ttl_ms: i64) -> bool {
        now - self.last_seen < liveness_ttl_ms
    }

    pub fn can_service(&self, target: Target) -> bool {
        self.capabilities.contains(&target)
    }

    /// Set state; `busy` requires a job, every other state clears it
    pub fn set_state(
        &mut self,
        state: AgentState,
        current_job: Option<JobId>,
        now: i64,
    ) -> Result<()> {
        match state {
            AgentState::Busy => {
                let job = current_job.ok_or_else(|| {
                    DomainError::ValidationError(
                        "busy agent requires a current job".to_string(),
                    )
                })?;
                self.current_job = Some(job);
            }
            _ => self.current_job = None,
        }
        self.state = state;
        self.last_seen = now;
        Ok(())
    }
}
