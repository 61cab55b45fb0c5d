// Lifecycle driver - completion reports, retry, group advancement

use std::sync::Arc;

use tracing::{info, warn};

use crate::application::grouping::SharedGroupTable;
use crate::application::queues::PriorityQueues;
use crate::application::retry::{RetryDecision, RetryPolicy};
use crate::domain::{AgentState, GroupKey, Job, JobState, TransitionPatch};
use crate::error::{AppError, Result};
use crate::port::TimeProvider;
use crate::store::RecordStore;

pub struct LifecycleDriver {
    records: Arc<RecordStore>,
    queues: Arc<PriorityQueues>,
    groups: SharedGroupTable,
    retry_policy: RetryPolicy,
    time_provider: Arc<dyn TimeProvider>,
}

impl LifecycleDriver {
    pub fn new(
        records: Arc<RecordStore>,
        queues: Arc<PriorityQueues>,
        groups: SharedGroupTable,
        retry_policy: RetryPolicy,
        time_provider: Arc<dyn TimeProvider>,
    ) -> Self {
        Self {
            records,
            queues,
            groups,
            retry_policy,
            time_provider,
        }
    }

    /// Termination callback from an agent.
    ///
    /// Success finalizes the job; failure runs the retry policy. Either way
    /// the agent's build group advances: the next queued member is promoted
    /// or the agent is released.
    pub async fn complete(
        &self,
        agent_id: &str,
        job_id: &str,
        success: bool,
        error: Option<String>,
        result: Option<serde_json::Value>,
    ) -> Result<Job> {
        let now = self.time_provider.now_millis();

        let mut job = self
            .records
            .get_job(job_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("job {} not found", job_id)))?;

        if job.assigned_agent.as_deref() != Some(agent_id) {
            return Err(AppError::Forbidden(format!(
                "job {} is not assigned to agent {}",
                job_id, agent_id
            )));
        }

        if job.state.is_terminal() {
            // Cancelled (or otherwise finalized) while the agent was still
            // running it. Accept the late report, free the agent, leave the
            // record untouched. A repeated report no longer holds the job
            // and is rejected.
            let still_held = self
                .records
                .get_agent(agent_id)
                .await?
                .is_some_and(|a| a.current_job.as_deref() == Some(job_id));
            if !still_held {
                return Err(AppError::Forbidden(format!(
                    "job {} already reported",
                    job_id
                )));
            }
            info!(agent_id, job_id, state = %job.state, "Late report for terminal job");
            self.advance_group(agent_id, &job.build, job_id).await?;
            return Ok(job);
        }

        if job.state != JobState::Running {
            return Err(AppError::Forbidden(format!(
                "job {} is not running on agent {}",
                job_id, agent_id
            )));
        }

        if success {
            job.transition(
                JobState::Completed,
                TransitionPatch {
                    result,
                    ..Default::default()
                },
                now,
            )?;
            self.records.put_job(&job).await?;
            info!(agent_id, job_id, attempt = job.attempt, "Job completed");
        } else {
            let reason = error.unwrap_or_else(|| "unreported failure".to_string());
            match self.retry_policy.decide(&job) {
                RetryDecision::Retry => {
                    job.transition(
                        JobState::Retrying,
                        TransitionPatch {
                            attempt: Some(job.attempt + 1),
                            last_error: Some(reason),
                            ..Default::default()
                        },
                        now,
                    )?;
                    self.records.put_job(&job).await?;
                    // The pending write lands before the tail re-append so a
                    // queue reader always resolves a schedulable record.
                    job.transition(JobState::Pending, TransitionPatch::default(), now)?;
                    self.records.put_job(&job).await?;
                    self.queues.push(job.priority, &job.id).await?;
                    info!(
                        agent_id,
                        job_id,
                        attempt = job.attempt,
                        "Job requeued for retry"
                    );
                }
                RetryDecision::Exhausted => {
                    job.transition(
                        JobState::Failed,
                        TransitionPatch {
                            last_error: Some(reason),
                            ..Default::default()
                        },
                        now,
                    )?;
                    self.records.put_job(&job).await?;
                    warn!(agent_id, job_id, attempt = job.attempt, "Job failed");
                }
            }
        }

        self.advance_group(agent_id, &job.build, job_id).await?;
        Ok(job)
    }

    /// Pop the finished head from the `(agent, build)` group and promote the
    /// next member, or discard the group and return the agent to idle.
    async fn advance_group(&self, agent_id: &str, build: &str, finished: &str) -> Result<()> {
        let now = self.time_provider.now_millis();
        let mut table = self.groups.lock().await;
        let key = GroupKey::new(agent_id, build);

        if let Some(group) = table.get_mut(&key) {
            if group.head().map(String::as_str) == Some(finished) {
                group.pop_head();
            } else {
                group.remove(finished);
            }

            while let Some(next_id) = group.head().cloned() {
                match self.records.get_job(&next_id).await? {
                    Some(mut next) if next.state == JobState::QueuedForGroup => {
                        next.transition(JobState::Running, TransitionPatch::default(), now)?;
                        self.records.put_job(&next).await?;
                        if let Some(mut agent) = self.records.get_agent(agent_id).await? {
                            agent.set_state(AgentState::Busy, Some(next_id.clone()), now)?;
                            self.records.put_agent(&agent).await?;
                        }
                        group.processing = true;
                        info!(
                            agent_id,
                            job_id = %next_id,
                            build,
                            remaining = group.len(),
                            "Promoted next job in build group"
                        );
                        return Ok(());
                    }
                    // vanished or no longer waiting; skip it
                    _ => {
                        group.pop_head();
                    }
                }
            }
            table.remove(&key);
        }

        if let Some(mut agent) = self.records.get_agent(agent_id).await? {
            if agent.state == AgentState::Busy {
                agent.set_state(AgentState::Idle, None, now)?;
                self.records.put_agent(&agent).await?;
                info!(agent_id, "Agent released");
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::grouping::shared_group_table;
    use crate::config::OrchestratorConfig;
    use crate::domain::{AffinityGroup, Agent, Priority, Target};
    use crate::port::state_store::memory::MemoryStateStore;
    use crate::port::time_provider::mocks::MockTimeProvider;

    struct Rig {
        time: Arc<MockTimeProvider>,
        records: Arc<RecordStore>,
        queues: Arc<PriorityQueues>,
        groups: SharedGroupTable,
        lifecycle: LifecycleDriver,
    }

    fn rig() -> Rig {
        let time = Arc::new(MockTimeProvider::new(0));
        let config = OrchestratorConfig::default();
        let store = Arc::new(MemoryStateStore::new(time.clone()));
        let records = Arc::new(RecordStore::new(store, &config));
        let queues = Arc::new(PriorityQueues::new(records.clone()));
        let groups = shared_group_table();
        let lifecycle = LifecycleDriver::new(
            records.clone(),
            queues.clone(),
            groups.clone(),
            RetryPolicy::new(config.max_attempts),
            time.clone(),
        );
        Rig {
            time,
            records,
            queues,
            groups,
            lifecycle,
        }
    }

    async fn running_job(rig: &Rig, job_id: &str, agent_id: &str) -> Job {
        let now = rig.time.now_millis();
        let mut job = Job::new(
            job_id,
            now,
            "acme",
            "build-1",
            "suite",
            Priority::Medium,
            Target::Emulator,
        );
        job.transition(
            JobState::Running,
            TransitionPatch {
                assigned_agent: Some(agent_id.to_string()),
                ..Default::default()
            },
            now,
        )
        .unwrap();
        rig.records.put_job(&job).await.unwrap();

        let mut agent = Agent::new(agent_id, "bench", vec![Target::Emulator], None, now);
        agent
            .set_state(AgentState::Busy, Some(job_id.to_string()), now)
            .unwrap();
        rig.records.put_agent(&agent).await.unwrap();

        rig.groups.try_lock().unwrap().insert(
            GroupKey::new(agent_id, "build-1"),
            AffinityGroup::new(job_id.to_string(), now),
        );
        job
    }

    async fn queued_member(rig: &Rig, job_id: &str, agent_id: &str) {
        let now = rig.time.now_millis();
        let mut job = Job::new(
            job_id,
            now,
            "acme",
            "build-1",
            "suite",
            Priority::Medium,
            Target::Emulator,
        );
        job.transition(
            JobState::QueuedForGroup,
            TransitionPatch {
                assigned_agent: Some(agent_id.to_string()),
                ..Default::default()
            },
            now,
        )
        .unwrap();
        rig.records.put_job(&job).await.unwrap();
        rig.groups
            .try_lock()
            .unwrap()
            .get_mut(&GroupKey::new(agent_id, "build-1"))
            .unwrap()
            .push(job_id.to_string());
    }

    #[tokio::test]
    async fn success_finalizes_job_and_releases_agent() {
        let rig = rig();
        running_job(&rig, "j-1", "a-1").await;

        let done = rig
            .lifecycle
            .complete("a-1", "j-1", true, None, Some(serde_json::json!({"passed": 12})))
            .await
            .unwrap();
        assert_eq!(done.state, JobState::Completed);
        assert_eq!(done.result, Some(serde_json::json!({"passed": 12})));

        let agent = rig.records.get_agent("a-1").await.unwrap().unwrap();
        assert_eq!(agent.state, AgentState::Idle);
        assert!(agent.current_job.is_none());
        assert!(rig.groups.try_lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn success_promotes_next_group_member() {
        let rig = rig();
        running_job(&rig, "j-1", "a-1").await;
        queued_member(&rig, "j-2", "a-1").await;
        rig.time.advance(1_000);

        rig.lifecycle
            .complete("a-1", "j-1", true, None, None)
            .await
            .unwrap();

        let next = rig.records.get_job("j-2").await.unwrap().unwrap();
        assert_eq!(next.state, JobState::Running);
        assert_eq!(next.started_at, Some(1_000));
        assert_eq!(next.assigned_agent.as_deref(), Some("a-1"));

        // the agent never went idle in between
        let agent = rig.records.get_agent("a-1").await.unwrap().unwrap();
        assert_eq!(agent.state, AgentState::Busy);
        assert_eq!(agent.current_job.as_deref(), Some("j-2"));

        let table = rig.groups.try_lock().unwrap();
        let group = table.get(&GroupKey::new("a-1", "build-1")).unwrap();
        assert_eq!(group.head().map(String::as_str), Some("j-2"));
    }

    #[tokio::test]
    async fn failure_requeues_at_tail_with_attempt_bump() {
        let rig = rig();
        running_job(&rig, "j-1", "a-1").await;
        rig.queues.push(Priority::Medium, "j-0").await.unwrap();

        let updated = rig
            .lifecycle
            .complete("a-1", "j-1", false, Some("adb timeout".to_string()), None)
            .await
            .unwrap();
        assert_eq!(updated.state, JobState::Pending);
        assert_eq!(updated.attempt, 1);
        assert_eq!(updated.last_error.as_deref(), Some("adb timeout"));
        assert!(updated.assigned_agent.is_none());
        assert!(updated.started_at.is_none());

        let snapshot = rig.queues.snapshot(Priority::Medium).await.unwrap();
        assert_eq!(snapshot, vec!["j-0".to_string(), "j-1".to_string()]);
    }

    #[tokio::test]
    async fn exhausted_attempts_fail_the_job() {
        let rig = rig();
        let mut job = running_job(&rig, "j-1", "a-1").await;
        job.attempt = 2;
        rig.records.put_job(&job).await.unwrap();

        let updated = rig
            .lifecycle
            .complete("a-1", "j-1", false, Some("still broken".to_string()), None)
            .await
            .unwrap();
        assert_eq!(updated.state, JobState::Failed);
        assert!(updated.completed_at.is_some());
        assert_eq!(rig.queues.len(Priority::Medium).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn late_report_after_cancel_frees_agent_and_keeps_record() {
        let rig = rig();
        let mut job = running_job(&rig, "j-1", "a-1").await;
        job.transition(JobState::Cancelled, TransitionPatch::default(), 500)
            .unwrap();
        rig.records.put_job(&job).await.unwrap();

        let reported = rig
            .lifecycle
            .complete("a-1", "j-1", true, None, None)
            .await
            .unwrap();
        assert_eq!(reported.state, JobState::Cancelled);

        let agent = rig.records.get_agent("a-1").await.unwrap().unwrap();
        assert_eq!(agent.state, AgentState::Idle);

        // a second report no longer holds the job
        assert!(matches!(
            rig.lifecycle.complete("a-1", "j-1", true, None, None).await,
            Err(AppError::Forbidden(_))
        ));
    }

    #[tokio::test]
    async fn duplicate_complete_is_forbidden() {
        let rig = rig();
        running_job(&rig, "j-1", "a-1").await;
        rig.lifecycle
            .complete("a-1", "j-1", true, None, None)
            .await
            .unwrap();
        assert!(matches!(
            rig.lifecycle.complete("a-1", "j-1", true, None, None).await,
            Err(AppError::Forbidden(_))
        ));
    }

    #[tokio::test]
    async fn non_owner_report_is_forbidden() {
        let rig = rig();
        running_job(&rig, "j-1", "a-1").await;
        assert!(matches!(
            rig.lifecycle
                .complete("a-2", "j-1", true, None, None)
                .await,
            Err(AppError::Forbidden(_))
        ));
    }
}
