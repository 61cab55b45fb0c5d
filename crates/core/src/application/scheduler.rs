// Scheduler loop - periodic matcher binding pending jobs to idle agents
//
// Each tick: reconcile persisted state, expire stale groups, then drain the
// queues high -> medium -> low. Within a band, jobs are ordered by tenant
// weight (descending) then submission time, and each is either attached to
// an existing build group or claimed directly on a suitable idle agent.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use crate::application::agent_registry::AgentRegistry;
use crate::application::grouping::{GroupTable, SharedGroupTable};
use crate::application::queues::PriorityQueues;
use crate::application::shutdown::ShutdownToken;
use crate::config::{OrchestratorConfig, TenantWeights};
use crate::domain::{AffinityGroup, Agent, AgentState, GroupKey, Job, JobState, Priority, TransitionPatch};
use crate::error::{AppError, Result};
use crate::port::TimeProvider;
use crate::store::RecordStore;

/// Outcome of a single dispatch decision during the queue walk
enum Dispatch {
    /// Claimed directly on an idle agent; the agent is consumed for this tick
    Assigned,
    /// Attached to an existing build group; no agent consumed
    Grouped,
    /// No idle agent can service this target; job goes back, walk continues
    NoAgent,
    /// Idle agents ran out entirely; job and the rest go back, walk stops
    AgentsExhausted,
    /// Claim race lost; the job advanced elsewhere and is dropped from the queue
    Lost,
}

pub struct Scheduler {
    records: Arc<RecordStore>,
    queues: Arc<PriorityQueues>,
    agents: Arc<AgentRegistry>,
    groups: SharedGroupTable,
    config: Arc<OrchestratorConfig>,
    time_provider: Arc<dyn TimeProvider>,
    kick: Arc<Notify>,
}

impl Scheduler {
    pub fn new(
        records: Arc<RecordStore>,
        queues: Arc<PriorityQueues>,
        agents: Arc<AgentRegistry>,
        groups: SharedGroupTable,
        config: Arc<OrchestratorConfig>,
        time_provider: Arc<dyn TimeProvider>,
    ) -> Self {
        Self {
            records,
            queues,
            agents,
            groups,
            config,
            time_provider,
            kick: Arc::new(Notify::new()),
        }
    }

    /// Handle for submit/complete paths to trigger an early tick
    pub fn kick_handle(&self) -> Arc<Notify> {
        self.kick.clone()
    }

    /// Tick loop. Finishes the in-flight tick on shutdown; in-flight
    /// assignments are never rolled back (reconciliation owns that).
    pub async fn run(&self, mut shutdown: ShutdownToken) {
        info!(
            tick_interval_ms = self.config.tick_interval_ms,
            "Scheduler started"
        );
        loop {
            tokio::select! {
                _ = sleep(Duration::from_millis(self.config.tick_interval_ms as u64)) => {}
                _ = self.kick.notified() => {}
                _ = shutdown.wait() => {
                    info!("Scheduler shutting down");
                    break;
                }
            }
            if shutdown.is_shutdown() {
                break;
            }
            if let Err(e) = self.tick().await {
                error!(error = %e, "Scheduler tick aborted; retrying next cadence");
            }
        }
        info!("Scheduler stopped");
    }

    pub async fn tick(&self) -> Result<()> {
        self.reconcile().await?;
        self.expire_idle_groups().await?;

        let mut idle = self.idle_agents().await?;
        if idle.is_empty() {
            return Ok(());
        }
        for priority in Priority::ALL {
            self.schedule_band(priority, &mut idle).await?;
        }
        Ok(())
    }

    async fn idle_agents(&self) -> Result<Vec<Agent>> {
        Ok(self
            .agents
            .live_agents()
            .await?
            .into_iter()
            .filter(|a| a.state == AgentState::Idle)
            .collect())
    }

    /// Snapshot-sort-drain-walk cycle for one priority band
    async fn schedule_band(&self, priority: Priority, idle: &mut Vec<Agent>) -> Result<()> {
        let snapshot = self.queues.snapshot(priority).await?;
        if snapshot.is_empty() {
            return Ok(());
        }

        // Resolve references; ids that vanished or advanced past pending
        // fall out of the queue here.
        let mut candidates = Vec::new();
        let mut seen = HashSet::new();
        for id in &snapshot {
            if !seen.insert(id.clone()) {
                continue;
            }
            if let Some(job) = self.records.get_job(id).await? {
                if job.state == JobState::Pending {
                    candidates.push(job);
                }
            }
        }
        sort_for_dispatch(&mut candidates, &self.config.tenant_weights);

        // Drain the band. Entries that were appended after the snapshot are
        // concurrent submits; they are re-appended untouched and picked up
        // on the next tick.
        let drained = self.queues.drain(priority).await?;
        let snapshot_set: HashSet<&String> = snapshot.iter().collect();
        let newcomers: Vec<String> = drained
            .into_iter()
            .filter(|id| !snapshot_set.contains(id))
            .collect();

        let mut leftover: Vec<String> = Vec::new();
        let mut abort: Option<AppError> = None;
        let mut i = 0;
        while i < candidates.len() {
            match self.dispatch(&candidates[i], idle).await {
                Ok(Dispatch::Assigned) | Ok(Dispatch::Grouped) | Ok(Dispatch::Lost) => {}
                Ok(Dispatch::NoAgent) => leftover.push(candidates[i].id.clone()),
                Ok(Dispatch::AgentsExhausted) => {
                    leftover.extend(candidates[i..].iter().map(|j| j.id.clone()));
                    break;
                }
                Err(e) => {
                    // Re-append the un-walked remainder before aborting the
                    // tick so the drained entries are not lost.
                    leftover.extend(candidates[i..].iter().map(|j| j.id.clone()));
                    abort = Some(e);
                    break;
                }
            }
            i += 1;
        }

        for id in leftover.into_iter().chain(newcomers) {
            if let Err(e) = self.queues.push(priority, &id).await {
                error!(job_id = %id, error = %e, "Failed to re-append drained job");
                abort.get_or_insert(e);
            }
        }

        match abort {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    async fn dispatch(&self, job: &Job, idle: &mut Vec<Agent>) -> Result<Dispatch> {
        let now = self.time_provider.now_millis();

        // Attach to an existing group sharing this build. Several agents may
        // each hold a group for the build; the first (key order) whose agent
        // can service the job's target wins. The group's agent stays
        // reserved by the group; no idle agent is consumed.
        {
            let mut table = self.groups.lock().await;
            for key in table.groups_for_build(&job.build) {
                if table.get(&key).is_some_and(|g| g.contains(&job.id)) {
                    return Ok(Dispatch::Lost);
                }
                let agent_ok = self
                    .records
                    .get_agent(&key.agent_id)
                    .await?
                    .is_some_and(|a| a.can_service(job.target));
                if !agent_ok {
                    continue;
                }
                let mut queued = job.clone();
                queued.transition(
                    JobState::QueuedForGroup,
                    TransitionPatch {
                        assigned_agent: Some(key.agent_id.clone()),
                        ..Default::default()
                    },
                    now,
                )?;
                self.records.put_job(&queued).await?;
                if let Some(group) = table.get_mut(&key) {
                    group.push(job.id.clone());
                }
                debug!(
                    job_id = %job.id,
                    agent_id = %key.agent_id,
                    build = %job.build,
                    "Job attached to build group"
                );
                return Ok(Dispatch::Grouped);
            }
        }

        // Direct claim on a suitable idle agent
        if idle.is_empty() {
            return Ok(Dispatch::AgentsExhausted);
        }
        let Some(pos) = idle.iter().position(|a| a.can_service(job.target)) else {
            return Ok(Dispatch::NoAgent);
        };
        let agent_id = idle[pos].id.clone();

        match self.agents.claim(&agent_id, &job.id).await {
            Ok(_) => {
                idle.remove(pos);
                let mut table = self.groups.lock().await;
                table.insert(
                    GroupKey::new(agent_id.clone(), job.build.clone()),
                    AffinityGroup::new(job.id.clone(), now),
                );
                debug!(job_id = %job.id, agent_id = %agent_id, "Job dispatched");
                Ok(Dispatch::Assigned)
            }
            Err(AppError::Conflict(msg)) => {
                debug!(job_id = %job.id, reason = %msg, "Claim race lost");
                Ok(Dispatch::Lost)
            }
            Err(e) => Err(e),
        }
    }

    /// Reconciliation sweep.
    ///
    /// Persisted job/agent records are the ground truth for assignments; the
    /// in-memory group table is rebuilt from them after a restart. Jobs
    /// running on dead agents, over-runtime jobs, and half-written claims
    /// are reverted to pending without touching the attempt counter.
    async fn reconcile(&self) -> Result<()> {
        let now = self.time_provider.now_millis();
        let liveness = self.config.liveness_ttl_ms;
        // Half-finished two-step writes get one tick to land before the
        // mismatch checks treat them as inconsistencies.
        let grace = self.config.tick_interval_ms;

        let jobs = self.records.scan_jobs().await?;
        let agents: HashMap<String, Agent> = self
            .records
            .scan_agents()
            .await?
            .into_iter()
            .map(|a| (a.id.clone(), a))
            .collect();

        let mut table = self.groups.lock().await;
        let mut requeued: HashSet<String> = HashSet::new();

        for job in jobs.iter().filter(|j| j.state == JobState::Running) {
            let Some(agent_id) = job.assigned_agent.as_deref() else {
                // running without assignment is a broken record
                self.requeue_crashed(&mut table, job, "running with no agent", &mut requeued)
                    .await?;
                continue;
            };
            let agent = agents.get(agent_id);
            let live = agent.is_some_and(|a| a.is_live(now, liveness));
            let started_age = job.started_at.map(|s| now - s).unwrap_or(i64::MAX);

            if !live {
                self.requeue_crashed(&mut table, job, "agent not live", &mut requeued)
                    .await?;
            } else if started_age >= self.config.job_max_runtime_ms {
                self.requeue_crashed(&mut table, job, "max runtime exceeded", &mut requeued)
                    .await?;
            } else if started_age > grace
                && agent.is_some_and(|a| a.current_job.as_deref() != Some(job.id.as_str()))
            {
                // claim wrote the job but the agent write never landed
                self.requeue_crashed(&mut table, job, "half-written claim", &mut requeued)
                    .await?;
            }
        }

        for job in jobs.iter().filter(|j| j.state == JobState::QueuedForGroup) {
            if requeued.contains(&job.id) {
                continue;
            }
            let live = job
                .assigned_agent
                .as_deref()
                .and_then(|id| agents.get(id))
                .is_some_and(|a| a.is_live(now, liveness));
            if !live {
                self.requeue_crashed(&mut table, job, "group agent not live", &mut requeued)
                    .await?;
            }
        }

        self.rebuild_groups(&mut table, &jobs, &mut requeued, now)
            .await?;
        self.reconcile_agents(&jobs, &agents, now, grace).await?;
        Ok(())
    }

    /// Rebuild the group table from persisted records (lost on restart):
    /// every healthy running job heads its group; healthy queued members are
    /// re-attached in submission order; members with no running head are
    /// requeued.
    async fn rebuild_groups(
        &self,
        table: &mut GroupTable,
        jobs: &[Job],
        requeued: &mut HashSet<String>,
        now: i64,
    ) -> Result<()> {
        for job in jobs
            .iter()
            .filter(|j| j.state == JobState::Running && !requeued.contains(&j.id))
        {
            if let Some(agent_id) = job.assigned_agent.as_deref() {
                let key = GroupKey::new(agent_id, job.build.clone());
                if !table.contains(&key) {
                    table.insert(key, AffinityGroup::new(job.id.clone(), now));
                }
            }
        }

        let mut waiting: Vec<&Job> = jobs
            .iter()
            .filter(|j| j.state == JobState::QueuedForGroup && !requeued.contains(&j.id))
            .collect();
        waiting.sort_by_key(|j| j.created_at);
        for job in waiting {
            let Some(agent_id) = job.assigned_agent.as_deref() else {
                continue;
            };
            let key = GroupKey::new(agent_id, job.build.clone());
            match table.get_mut(&key) {
                Some(group) => {
                    if !group.contains(&job.id) {
                        group.push(job.id.clone());
                    }
                }
                None => {
                    // no running head to wait behind
                    self.requeue_crashed(table, job, "group lost its head", requeued)
                        .await?;
                }
            }
        }

        // groups whose head stopped running stop counting as processing
        for (key, group) in table.iter_mut() {
            let head_running = group.head().is_some_and(|head| {
                jobs.iter()
                    .any(|j| &j.id == head && j.state == JobState::Running)
            });
            if group.processing != head_running {
                debug!(
                    agent_id = %key.agent_id,
                    build = %key.build,
                    head_running,
                    "Group processing flag corrected"
                );
                group.processing = head_running;
            }
        }
        Ok(())
    }

    /// Live busy agents pointing at missing or finished jobs go back to idle
    async fn reconcile_agents(
        &self,
        jobs: &[Job],
        agents: &HashMap<String, Agent>,
        now: i64,
        grace: i64,
    ) -> Result<()> {
        let jobs_by_id: HashMap<&str, &Job> = jobs.iter().map(|j| (j.id.as_str(), j)).collect();
        for agent in agents.values() {
            if agent.state != AgentState::Busy || !agent.is_live(now, self.config.liveness_ttl_ms)
            {
                continue;
            }
            let healthy = match agent.current_job.as_deref().and_then(|id| jobs_by_id.get(id)) {
                Some(job) => {
                    let bound = job.state == JobState::Running
                        && job.assigned_agent.as_deref() == Some(agent.id.as_str());
                    // fresh transitions get a tick for the paired agent write
                    bound || now - job.updated_at <= grace
                }
                None => false,
            };
            if !healthy {
                warn!(
                    agent_id = %agent.id,
                    current_job = ?agent.current_job,
                    "Busy agent holds no running job; releasing"
                );
                let mut released = agent.clone();
                released.set_state(AgentState::Idle, None, now)?;
                self.records.put_agent(&released).await?;
            }
        }
        Ok(())
    }

    /// Revert a crashed assignment to pending and re-queue it at the tail.
    /// The whole group is torn down: its members wait on the same agent, so
    /// they are requeued alongside the head.
    async fn requeue_crashed(
        &self,
        table: &mut GroupTable,
        job: &Job,
        reason: &str,
        requeued: &mut HashSet<String>,
    ) -> Result<()> {
        warn!(job_id = %job.id, agent_id = ?job.assigned_agent, reason, "Reverting job to pending");

        let mut members: Vec<String> = vec![job.id.clone()];
        if let Some(agent_id) = job.assigned_agent.as_deref() {
            if let Some(group) = table.remove(&GroupKey::new(agent_id, job.build.clone())) {
                members.extend(group.members().cloned());
            }
        }

        let now = self.time_provider.now_millis();
        for id in members {
            if !requeued.insert(id.clone()) {
                continue;
            }
            let Some(mut member) = self.records.get_job(&id).await? else {
                continue;
            };
            if member.state.is_terminal() {
                continue;
            }
            member.requeue_after_crash(now);
            self.records.put_job(&member).await?;
            self.queues.push(member.priority, &member.id).await?;
        }
        Ok(())
    }

    /// Drop non-processing groups that sat idle past the limit and requeue
    /// any members still waiting
    async fn expire_idle_groups(&self) -> Result<()> {
        let now = self.time_provider.now_millis();
        let mut table = self.groups.lock().await;
        let expired = table.take_expired(now, self.config.group_max_idle_ms);
        for (key, group) in expired {
            warn!(
                agent_id = %key.agent_id,
                build = %key.build,
                members = group.len(),
                "Discarding idle build group"
            );
            for id in group.members() {
                let Some(mut job) = self.records.get_job(id).await? else {
                    continue;
                };
                if job.state != JobState::QueuedForGroup {
                    continue;
                }
                job.requeue_after_crash(now);
                self.records.put_job(&job).await?;
                self.queues.push(job.priority, &job.id).await?;
            }
        }
        Ok(())
    }
}

/// Tenant weight (descending) then submission time (ascending). The sort is
/// stable, so equal keys keep their queue order.
pub fn sort_for_dispatch(jobs: &mut [Job], weights: &TenantWeights) {
    jobs.sort_by(|a, b| {
        weights
            .weight_of(&b.tenant)
            .cmp(&weights.weight_of(&a.tenant))
            .then(a.created_at.cmp(&b.created_at))
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Target;

    fn job(id: &str, tenant: &str, created_at: i64) -> Job {
        Job::new(
            id,
            created_at,
            tenant,
            "build-1",
            "suite",
            Priority::Medium,
            Target::Emulator,
        )
    }

    #[test]
    fn sort_puts_heavier_tenants_first() {
        let weights =
            TenantWeights::parse("premium=100,standard=50").unwrap();
        let mut jobs = vec![
            job("j-std", "standard", 0),
            job("j-prem", "premium", 1_000),
        ];
        sort_for_dispatch(&mut jobs, &weights);
        assert_eq!(jobs[0].id, "j-prem");
        assert_eq!(jobs[1].id, "j-std");
    }

    #[test]
    fn sort_breaks_weight_ties_by_age() {
        let weights = TenantWeights::default();
        let mut jobs = vec![
            job("j-new", "acme", 2_000),
            job("j-old", "globex", 1_000),
        ];
        sort_for_dispatch(&mut jobs, &weights);
        assert_eq!(jobs[0].id, "j-old");
    }

    #[test]
    fn sort_is_stable_for_identical_keys() {
        let weights = TenantWeights::default();
        let mut jobs = vec![
            job("j-1", "acme", 1_000),
            job("j-2", "acme", 1_000),
            job("j-3", "acme", 1_000),
        ];
        sort_for_dispatch(&mut jobs, &weights);
        let ids: Vec<&str> = jobs.iter().map(|j| j.id.as_str()).collect();
        assert_eq!(ids, vec!["j-1", "j-2", "j-3"]);
    }
}
