//! RPC Request/Response Types
//!
//! Submission and registration payloads reuse the core request types
//! directly; everything else is a thin parameter struct.

use serde::{Deserialize, Serialize};

use farmhand_core::domain::{Agent, Job, JobState};

/// job.get.v1 / job.cancel.v1
#[derive(Debug, Deserialize)]
pub struct JobIdRequest {
    pub job_id: String,
}

/// job.submit.v1 result
#[derive(Debug, Clone, Serialize)]
pub struct SubmitResponse {
    pub job: Job,
    pub queue_length: i64,
}

/// job.list.v1
#[derive(Debug, Deserialize)]
pub struct ListJobsRequest {
    #[serde(default)]
    pub tenant: Option<String>,
    #[serde(default)]
    pub state: Option<JobState>,
    #[serde(default)]
    pub build: Option<String>,
    #[serde(default)]
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ListJobsResponse {
    pub jobs: Vec<Job>,
}

/// job.transition.v1
#[derive(Debug, Deserialize)]
pub struct TransitionRequest {
    pub job_id: String,
    pub state: JobState,
    #[serde(default)]
    pub assigned_agent: Option<String>,
    #[serde(default)]
    pub last_error: Option<String>,
    #[serde(default)]
    pub result: Option<serde_json::Value>,
    #[serde(default)]
    pub attempt: Option<i32>,
}

/// job.claim.v1
#[derive(Debug, Deserialize)]
pub struct ClaimRequest {
    pub agent_id: String,
    pub job_id: String,
}

/// job.complete.v1
#[derive(Debug, Deserialize)]
pub struct CompleteRequest {
    pub agent_id: String,
    pub job_id: String,
    pub success: bool,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub result: Option<serde_json::Value>,
}

/// agent.heartbeat.v1 / agent.list.v1 ids
#[derive(Debug, Deserialize)]
pub struct AgentIdRequest {
    pub agent_id: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct HeartbeatResponse {
    pub agent_id: String,
}

/// agent.set_state.v1
#[derive(Debug, Deserialize)]
pub struct SetAgentStateRequest {
    pub agent_id: String,
    pub state: String,
    #[serde(default)]
    pub current_job: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ListAgentsResponse {
    pub agents: Vec<Agent>,
}

/// queue.snapshot.v1
#[derive(Debug, Deserialize)]
pub struct QueueSnapshotRequest {
    pub priority: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct QueueSnapshotResponse {
    pub priority: String,
    pub jobs: Vec<Job>,
}

/// admin.stats.v1
#[derive(Debug, Deserialize)]
pub struct StatsRequest {
    // No parameters needed
}

#[derive(Debug, Clone, Serialize)]
pub struct StatsResponse {
    pub total_jobs: i64,
    pub pending_jobs: i64,
    pub queued_for_group_jobs: i64,
    pub running_jobs: i64,
    pub retrying_jobs: i64,
    pub completed_jobs: i64,
    pub failed_jobs: i64,
    pub cancelled_jobs: i64,
    pub live_agents: i64,
    pub high_queue_length: i64,
    pub medium_queue_length: i64,
    pub low_queue_length: i64,
    pub uptime_seconds: i64,
}
