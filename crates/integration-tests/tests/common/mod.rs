// Shared test harness: the full engine stack on the in-memory store with a
// mock clock and deterministic ids.
//
// Each test target compiles this module separately and uses a different
// subset of it.
#![allow(dead_code)]

use std::sync::Arc;

use farmhand_core::application::{
    shared_group_table, AgentRegistry, JobRegistry, LifecycleDriver, PriorityQueues,
    RegisterRequest, RetryPolicy, Scheduler, SubmitRequest,
};
use farmhand_core::config::OrchestratorConfig;
use farmhand_core::domain::{Agent, Job};
use farmhand_core::port::id_provider::mocks::SequentialIdProvider;
use farmhand_core::port::state_store::memory::MemoryStateStore;
use farmhand_core::port::time_provider::mocks::MockTimeProvider;
use farmhand_core::store::RecordStore;

pub struct Rig {
    pub config: Arc<OrchestratorConfig>,
    pub time: Arc<MockTimeProvider>,
    pub store: Arc<MemoryStateStore>,
    pub records: Arc<RecordStore>,
    pub queues: Arc<PriorityQueues>,
    pub jobs: Arc<JobRegistry>,
    pub agents: Arc<AgentRegistry>,
    pub lifecycle: LifecycleDriver,
    pub scheduler: Scheduler,
}

impl Rig {
    pub fn new() -> Self {
        Self::with_config(OrchestratorConfig::default())
    }

    pub fn with_config(config: OrchestratorConfig) -> Self {
        let config = Arc::new(config);
        let time = Arc::new(MockTimeProvider::new(1_000_000));
        let store = Arc::new(MemoryStateStore::new(time.clone()));
        let records = Arc::new(RecordStore::new(store.clone(), &config));
        let queues = Arc::new(PriorityQueues::new(records.clone()));
        let groups = shared_group_table();

        let jobs = Arc::new(JobRegistry::new(
            records.clone(),
            queues.clone(),
            Arc::new(SequentialIdProvider::new("job")),
            time.clone(),
        ));
        let agents = Arc::new(AgentRegistry::new(
            records.clone(),
            Arc::new(SequentialIdProvider::new("agent")),
            time.clone(),
            config.clone(),
        ));
        let lifecycle = LifecycleDriver::new(
            records.clone(),
            queues.clone(),
            groups.clone(),
            RetryPolicy::new(config.max_attempts),
            time.clone(),
        );
        let scheduler = Scheduler::new(
            records.clone(),
            queues.clone(),
            agents.clone(),
            groups.clone(),
            config.clone(),
            time.clone(),
        );

        Self {
            config,
            time,
            store,
            records,
            queues,
            jobs,
            agents,
            lifecycle,
            scheduler,
        }
    }

    pub async fn register_agent(&self, name: &str, capabilities: &[&str]) -> Agent {
        self.agents
            .register(RegisterRequest {
                name: name.to_string(),
                capabilities: capabilities.iter().map(|c| c.to_string()).collect(),
                metadata: None,
            })
            .await
            .expect("agent registration failed")
    }

    pub async fn submit(&self, tenant: &str, build: &str) -> Job {
        self.submit_full(tenant, build, None, None).await
    }

    pub async fn submit_full(
        &self,
        tenant: &str,
        build: &str,
        priority: Option<&str>,
        target: Option<&str>,
    ) -> Job {
        let (job, _) = self
            .jobs
            .submit(SubmitRequest {
                tenant: tenant.to_string(),
                build: build.to_string(),
                artifact: "instrumented-suite".to_string(),
                priority: priority.map(|p| p.to_string()),
                target: target.map(|t| t.to_string()),
                id: None,
            })
            .await
            .expect("job submission failed");
        job
    }

    pub async fn job(&self, id: &str) -> Job {
        self.records
            .get_job(id)
            .await
            .expect("store read failed")
            .expect("job record missing")
    }

    pub async fn agent(&self, id: &str) -> Agent {
        self.records
            .get_agent(id)
            .await
            .expect("store read failed")
            .expect("agent record missing")
    }
}
