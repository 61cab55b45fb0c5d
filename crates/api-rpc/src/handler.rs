//! RPC Method Handlers
//!
//! Implements the transport-side glue for each JSON-RPC method.

use std::sync::Arc;
use std::time::Instant;

use jsonrpsee::types::ErrorObjectOwned;
use tokio::sync::Notify;

use farmhand_core::application::{
    AgentRegistry, JobFilter, JobRegistry, LifecycleDriver, PriorityQueues, RegisterRequest,
    SubmitRequest,
};
use farmhand_core::domain::{Agent, Job, JobState, Priority, TransitionPatch};
use farmhand_core::store::RecordStore;

use crate::error::{throttled, to_rpc_error};
use crate::rate_limiter::RateLimiter;
use crate::types::{
    AgentIdRequest, ClaimRequest, CompleteRequest, HeartbeatResponse, JobIdRequest,
    ListAgentsResponse, ListJobsRequest, ListJobsResponse, QueueSnapshotRequest,
    QueueSnapshotResponse, SetAgentStateRequest, StatsRequest, StatsResponse, SubmitResponse,
    TransitionRequest,
};

/// RPC Handler with injected dependencies
pub struct RpcHandler {
    jobs: Arc<JobRegistry>,
    agents: Arc<AgentRegistry>,
    lifecycle: Arc<LifecycleDriver>,
    records: Arc<RecordStore>,
    queues: Arc<PriorityQueues>,
    scheduler_kick: Arc<Notify>,
    rate_limiter: RateLimiter,
    start_time: Instant,
}

impl RpcHandler {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        jobs: Arc<JobRegistry>,
        agents: Arc<AgentRegistry>,
        lifecycle: Arc<LifecycleDriver>,
        records: Arc<RecordStore>,
        queues: Arc<PriorityQueues>,
        scheduler_kick: Arc<Notify>,
    ) -> Self {
        // Submitter-facing mutation rate (configurable via env)
        let max_burst: u32 = std::env::var("FARMHAND_RATE_LIMIT_BURST")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(200);
        let rate_per_sec: u32 = std::env::var("FARMHAND_RATE_LIMIT_RATE")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(100);

        Self {
            jobs,
            agents,
            lifecycle,
            records,
            queues,
            scheduler_kick,
            rate_limiter: RateLimiter::new(max_burst, rate_per_sec),
            start_time: Instant::now(),
        }
    }

    /// job.submit.v1
    pub async fn submit(
        &self,
        params: SubmitRequest,
    ) -> Result<SubmitResponse, ErrorObjectOwned> {
        if !self.rate_limiter.check().await {
            return Err(throttled());
        }
        let (job, queue_length) = self.jobs.submit(params).await.map_err(to_rpc_error)?;
        self.scheduler_kick.notify_one();
        Ok(SubmitResponse { job, queue_length })
    }

    /// job.get.v1
    pub async fn get_job(&self, params: JobIdRequest) -> Result<Job, ErrorObjectOwned> {
        self.jobs.get(&params.job_id).await.map_err(to_rpc_error)
    }

    /// job.list.v1
    pub async fn list_jobs(
        &self,
        params: ListJobsRequest,
    ) -> Result<ListJobsResponse, ErrorObjectOwned> {
        let filter = JobFilter {
            tenant: params.tenant,
            state: params.state,
            build: params.build,
            limit: params.limit,
        };
        let jobs = self.jobs.list(&filter).await.map_err(to_rpc_error)?;
        Ok(ListJobsResponse { jobs })
    }

    /// job.cancel.v1
    pub async fn cancel_job(&self, params: JobIdRequest) -> Result<Job, ErrorObjectOwned> {
        if !self.rate_limiter.check().await {
            return Err(throttled());
        }
        self.jobs.cancel(&params.job_id).await.map_err(to_rpc_error)
    }

    /// job.transition.v1
    pub async fn transition_job(
        &self,
        params: TransitionRequest,
    ) -> Result<Job, ErrorObjectOwned> {
        let patch = TransitionPatch {
            assigned_agent: params.assigned_agent,
            last_error: params.last_error,
            result: params.result,
            attempt: params.attempt,
        };
        self.jobs
            .transition(&params.job_id, params.state, patch)
            .await
            .map_err(to_rpc_error)
    }

    /// job.claim.v1
    pub async fn claim_job(&self, params: ClaimRequest) -> Result<Job, ErrorObjectOwned> {
        self.agents
            .claim(&params.agent_id, &params.job_id)
            .await
            .map_err(to_rpc_error)
    }

    /// job.complete.v1
    pub async fn complete_job(&self, params: CompleteRequest) -> Result<Job, ErrorObjectOwned> {
        let job = self
            .lifecycle
            .complete(
                &params.agent_id,
                &params.job_id,
                params.success,
                params.error,
                params.result,
            )
            .await
            .map_err(to_rpc_error)?;
        self.scheduler_kick.notify_one();
        Ok(job)
    }

    /// agent.register.v1
    pub async fn register_agent(
        &self,
        params: RegisterRequest,
    ) -> Result<Agent, ErrorObjectOwned> {
        self.agents.register(params).await.map_err(to_rpc_error)
    }

    /// agent.heartbeat.v1
    pub async fn heartbeat_agent(
        &self,
        params: AgentIdRequest,
    ) -> Result<HeartbeatResponse, ErrorObjectOwned> {
        self.agents
            .heartbeat(&params.agent_id)
            .await
            .map_err(to_rpc_error)?;
        Ok(HeartbeatResponse {
            agent_id: params.agent_id,
        })
    }

    /// agent.set_state.v1
    pub async fn set_agent_state(
        &self,
        params: SetAgentStateRequest,
    ) -> Result<Agent, ErrorObjectOwned> {
        self.agents
            .set_state(&params.agent_id, &params.state, params.current_job)
            .await
            .map_err(to_rpc_error)
    }

    /// agent.list.v1
    pub async fn list_agents(&self) -> Result<ListAgentsResponse, ErrorObjectOwned> {
        let agents = self.agents.live_agents().await.map_err(to_rpc_error)?;
        Ok(ListAgentsResponse { agents })
    }

    /// queue.snapshot.v1
    pub async fn queue_snapshot(
        &self,
        params: QueueSnapshotRequest,
    ) -> Result<QueueSnapshotResponse, ErrorObjectOwned> {
        let priority = Priority::parse(&params.priority)
            .map_err(|e| to_rpc_error(e.into()))?;
        let ids = self.queues.snapshot(priority).await.map_err(to_rpc_error)?;
        let mut jobs = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(job) = self.records.get_job(&id).await.map_err(to_rpc_error)? {
                jobs.push(job);
            }
        }
        Ok(QueueSnapshotResponse {
            priority: priority.as_str().to_string(),
            jobs,
        })
    }

    /// admin.stats.v1
    pub async fn stats(&self, _params: StatsRequest) -> Result<StatsResponse, ErrorObjectOwned> {
        let jobs = self.records.scan_jobs().await.map_err(to_rpc_error)?;
        let count = |state: JobState| jobs.iter().filter(|j| j.state == state).count() as i64;

        let live_agents = self.agents.live_agents().await.map_err(to_rpc_error)?.len() as i64;

        Ok(StatsResponse {
            total_jobs: jobs.len() as i64,
            pending_jobs: count(JobState::Pending),
            queued_for_group_jobs: count(JobState::QueuedForGroup),
            running_jobs: count(JobState::Running),
            retrying_jobs: count(JobState::Retrying),
            completed_jobs: count(JobState::Completed),
            failed_jobs: count(JobState::Failed),
            cancelled_jobs: count(JobState::Cancelled),
            live_agents,
            high_queue_length: self.queues.len(Priority::High).await.map_err(to_rpc_error)?,
            medium_queue_length: self
                .queues
                .len(Priority::Medium)
                .await
                .map_err(to_rpc_error)?,
            low_queue_length: self.queues.len(Priority::Low).await.map_err(to_rpc_error)?,
            uptime_seconds: self.start_time.elapsed().as_secs() as i64,
        })
    }
}
