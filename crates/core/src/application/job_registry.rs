// Job registry - CRUD and state-machine transitions for job records

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::application::queues::PriorityQueues;
use crate::domain::{Job, JobState, Priority, Target, TransitionPatch};
use crate::error::{AppError, Result};
use crate::port::{IdProvider, TimeProvider};
use crate::store::RecordStore;

// Input caps
const MAX_TENANT_LEN: usize = 128;
const MAX_BUILD_LEN: usize = 256;
const MAX_ARTIFACT_LEN: usize = 512;
const MAX_ID_LEN: usize = 128;

/// Submission request; raw strings are validated and parsed here so the
/// transport layer stays a thin pass-through
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitRequest {
    pub tenant: String,
    pub build: String,
    pub artifact: String,
    #[serde(default)]
    pub priority: Option<String>,
    #[serde(default)]
    pub target: Option<String>,
    #[serde(default)]
    pub id: Option<String>,
}

/// Listing filter; results come back newest-first
#[derive(Debug, Clone, Default, Deserialize)]
pub struct JobFilter {
    pub tenant: Option<String>,
    pub state: Option<JobState>,
    pub build: Option<String>,
    pub limit: Option<usize>,
}

pub struct JobRegistry {
    records: Arc<RecordStore>,
    queues: Arc<PriorityQueues>,
    id_provider: Arc<dyn IdProvider>,
    time_provider: Arc<dyn TimeProvider>,
}

impl JobRegistry {
    pub fn new(
        records: Arc<RecordStore>,
        queues: Arc<PriorityQueues>,
        id_provider: Arc<dyn IdProvider>,
        time_provider: Arc<dyn TimeProvider>,
    ) -> Self {
        Self {
            records,
            queues,
            id_provider,
            time_provider,
        }
    }

    /// Create a pending job and append it to its priority queue.
    ///
    /// Returns the created record and the queue length after the append.
    pub async fn submit(&self, req: SubmitRequest) -> Result<(Job, i64)> {
        validate_submit(&req)?;

        let priority = match req.priority.as_deref() {
            Some(p) => Priority::parse(p)?,
            None => Priority::Medium,
        };
        let target = match req.target.as_deref() {
            Some(t) => Target::parse(t)?,
            None => Target::Emulator,
        };
        let id = match req.id {
            Some(id) => {
                if self.records.get_job(&id).await?.is_some() {
                    return Err(AppError::Conflict(format!("job {} already exists", id)));
                }
                id
            }
            None => self.id_provider.generate_id(),
        };

        let now = self.time_provider.now_millis();
        let job = Job::new(id, now, req.tenant, req.build, req.artifact, priority, target);

        // Record first, queue entry second: any reader that observes the
        // queue entry can resolve the id.
        self.records.put_job(&job).await?;
        self.queues.push(priority, &job.id).await?;
        let queue_len = self.queues.len(priority).await?;

        info!(
            job_id = %job.id,
            tenant = %job.tenant,
            build = %job.build,
            priority = %priority,
            target = %target,
            queue_len,
            "Job submitted"
        );

        Ok((job, queue_len))
    }

    pub async fn get(&self, id: &str) -> Result<Job> {
        self.records
            .get_job(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("job {} not found", id)))
    }

    pub async fn list(&self, filter: &JobFilter) -> Result<Vec<Job>> {
        let mut jobs = self.records.scan_jobs().await?;
        jobs.retain(|j| {
            filter.tenant.as_ref().map_or(true, |t| &j.tenant == t)
                && filter.state.map_or(true, |s| j.state == s)
                && filter.build.as_ref().map_or(true, |b| &j.build == b)
        });
        jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        if let Some(limit) = filter.limit {
            jobs.truncate(limit);
        }
        Ok(jobs)
    }

    /// Cancel a pending or running job.
    ///
    /// A cancelled running job keeps occupying its agent until the agent
    /// reports; the late report is accepted without re-opening the record.
    pub async fn cancel(&self, id: &str) -> Result<Job> {
        let mut job = self.get(id).await?;
        if !matches!(job.state, JobState::Pending | JobState::Running) {
            return Err(AppError::IllegalState(format!(
                "job {} cannot be cancelled from state {}",
                id, job.state
            )));
        }
        let now = self.time_provider.now_millis();
        job.transition(JobState::Cancelled, TransitionPatch::default(), now)?;
        self.records.put_job(&job).await?;
        info!(job_id = %job.id, "Job cancelled");
        Ok(job)
    }

    /// Apply a state transition through the domain machine
    pub async fn transition(
        &self,
        id: &str,
        to: JobState,
        patch: TransitionPatch,
    ) -> Result<Job> {
        let mut job = self.get(id).await?;
        let now = self.time_provider.now_millis();
        job.transition(to, patch, now)?;
        self.records.put_job(&job).await?;
        Ok(job)
    }
}

fn validate_submit(req: &SubmitRequest) -> Result<()> {
    check_field("tenant", &req.tenant, MAX_TENANT_LEN)?;
    check_field("build", &req.build, MAX_BUILD_LEN)?;
    check_field("artifact", &req.artifact, MAX_ARTIFACT_LEN)?;
    if let Some(id) = &req.id {
        check_field("id", id, MAX_ID_LEN)?;
    }
    Ok(())
}

fn check_field(name: &str, value: &str, max_len: usize) -> Result<()> {
    if value.is_empty() {
        return Err(AppError::Validation(format!("{} cannot be empty", name)));
    }
    if value.len() > max_len {
        return Err(AppError::Validation(format!(
            "{} too long (max {} bytes, got {})",
            name,
            max_len,
            value.len()
        )));
    }
    Ok(())
}
