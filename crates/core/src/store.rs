// Typed record layer over the raw state store
//
// Key layout: `job:{id}`, `agent:{id}`, `queue:{priority}`.
// Jobs carry a retention TTL; agent records expire unless refreshed by
// heartbeats. Queue lists never expire.

use std::sync::Arc;

use crate::config::OrchestratorConfig;
use crate::domain::{Agent, Job, Priority};
use crate::error::Result;
use crate::port::StateStore;

pub const JOB_KEY_PREFIX: &str = "job:";
pub const AGENT_KEY_PREFIX: &str = "agent:";

pub fn job_key(id: &str) -> String {
    format!("{}{}", JOB_KEY_PREFIX, id)
}

pub fn agent_key(id: &str) -> String {
    format!("{}{}", AGENT_KEY_PREFIX, id)
}

pub fn queue_key(priority: Priority) -> String {
    format!("queue:{}", priority.as_str())
}

/// Job and agent records plus the three priority lists, JSON-encoded
pub struct RecordStore {
    store: Arc<dyn StateStore>,
    job_ttl_ms: i64,
    agent_ttl_ms: i64,
}

impl RecordStore {
    pub fn new(store: Arc<dyn StateStore>, config: &OrchestratorConfig) -> Self {
        Self {
            store,
            job_ttl_ms: config.job_record_ttl_ms,
            agent_ttl_ms: config.agent_record_ttl_ms,
        }
    }

    pub async fn ping(&self) -> Result<()> {
        self.store.ping().await
    }

    pub async fn put_job(&self, job: &Job) -> Result<()> {
        let payload = serde_json::to_string(job)?;
        self.store
            .put(&job_key(&job.id), &payload, Some(self.job_ttl_ms))
            .await
    }

    pub async fn get_job(&self, id: &str) -> Result<Option<Job>> {
        match self.store.get(&job_key(id)).await? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    /// All retained job records. Keys that vanish between the scan and the
    /// point read (store expiry) are skipped.
    pub async fn scan_jobs(&self) -> Result<Vec<Job>> {
        let keys = self.store.scan(JOB_KEY_PREFIX).await?;
        let mut jobs = Vec::with_capacity(keys.len());
        for key in keys {
            if let Some(raw) = self.store.get(&key).await? {
                jobs.push(serde_json::from_str(&raw)?);
            }
        }
        Ok(jobs)
    }

    /// Upsert an agent record, refreshing its expiry window
    pub async fn put_agent(&self, agent: &Agent) -> Result<()> {
        let payload = serde_json::to_string(agent)?;
        self.store
            .put(&agent_key(&agent.id), &payload, Some(self.agent_ttl_ms))
            .await
    }

    pub async fn get_agent(&self, id: &str) -> Result<Option<Agent>> {
        match self.store.get(&agent_key(id)).await? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    pub async fn scan_agents(&self) -> Result<Vec<Agent>> {
        let keys = self.store.scan(AGENT_KEY_PREFIX).await?;
        let mut agents = Vec::with_capacity(keys.len());
        for key in keys {
            if let Some(raw) = self.store.get(&key).await? {
                agents.push(serde_json::from_str(&raw)?);
            }
        }
        Ok(agents)
    }

    pub async fn queue_push(&self, priority: Priority, job_id: &str) -> Result<()> {
        self.store
            .list_push_tail(&queue_key(priority), job_id)
            .await
    }

    pub async fn queue_pop(&self, priority: Priority) -> Result<Option<String>> {
        self.store.list_pop_head(&queue_key(priority)).await
    }

    pub async fn queue_len(&self, priority: Priority) -> Result<i64> {
        self.store.list_len(&queue_key(priority)).await
    }

    pub async fn queue_snapshot(&self, priority: Priority) -> Result<Vec<String>> {
        self.store.list_snapshot(&queue_key(priority)).await
    }
}
