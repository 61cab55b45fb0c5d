//! JSON-RPC Server
//!
//! JSON-RPC 2.0 over TCP bound to localhost; authn/authz is assumed to be
//! terminated in front of this listener.

use std::sync::Arc;

use jsonrpsee::server::{Server, ServerHandle};
use jsonrpsee::RpcModule;
use tokio::sync::Notify;
use tracing::info;

use farmhand_core::application::{
    AgentRegistry, JobRegistry, LifecycleDriver, PriorityQueues, RegisterRequest, SubmitRequest,
};
use farmhand_core::store::RecordStore;

use crate::handler::RpcHandler;
use crate::types::{
    AgentIdRequest, ClaimRequest, CompleteRequest, JobIdRequest, ListJobsRequest,
    QueueSnapshotRequest, SetAgentStateRequest, StatsRequest, TransitionRequest,
};

const DEFAULT_RPC_HOST: &str = "127.0.0.1";
const DEFAULT_RPC_PORT: u16 = 9640;

/// RPC Server Configuration
pub struct RpcServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for RpcServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_RPC_HOST.to_string(),
            port: DEFAULT_RPC_PORT,
        }
    }
}

/// RPC Server
pub struct RpcServer {
    config: RpcServerConfig,
    handler: Arc<RpcHandler>,
}

impl RpcServer {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: RpcServerConfig,
        jobs: Arc<JobRegistry>,
        agents: Arc<AgentRegistry>,
        lifecycle: Arc<LifecycleDriver>,
        records: Arc<RecordStore>,
        queues: Arc<PriorityQueues>,
        scheduler_kick: Arc<Notify>,
    ) -> Self {
        Self {
            config,
            handler: Arc::new(RpcHandler::new(
                jobs,
                agents,
                lifecycle,
                records,
                queues,
                scheduler_kick,
            )),
        }
    }

    /// Start the JSON-RPC server and return its handle
    pub async fn start(self) -> Result<ServerHandle, String> {
        let addr = format!("{}:{}", self.config.host, self.config.port);

        info!(
            host = %self.config.host,
            port = %self.config.port,
            "Starting JSON-RPC server"
        );

        let server = Server::builder()
            .build(&addr)
            .await
            .map_err(|e| format!("Failed to build server on {}: {}", addr, e))?;

        let mut module = RpcModule::new(());

        let handler = self.handler.clone();
        module
            .register_async_method("job.submit.v1", move |params, _, _| {
                let handler = handler.clone();
                async move {
                    let req: SubmitRequest = params.parse()?;
                    handler.submit(req).await
                }
            })
            .map_err(|e| e.to_string())?;

        let handler = self.handler.clone();
        module
            .register_async_method("job.get.v1", move |params, _, _| {
                let handler = handler.clone();
                async move {
                    let req: JobIdRequest = params.parse()?;
                    handler.get_job(req).await
                }
            })
            .map_err(|e| e.to_string())?;

        let handler = self.handler.clone();
        module
            .register_async_method("job.list.v1", move |params, _, _| {
                let handler = handler.clone();
                async move {
                    let req: ListJobsRequest = params.parse()?;
                    handler.list_jobs(req).await
                }
            })
            .map_err(|e| e.to_string())?;

        let handler = self.handler.clone();
        module
            .register_async_method("job.cancel.v1", move |params, _, _| {
                let handler = handler.clone();
                async move {
                    let req: JobIdRequest = params.parse()?;
                    handler.cancel_job(req).await
                }
            })
            .map_err(|e| e.to_string())?;

        let handler = self.handler.clone();
        module
            .register_async_method("job.transition.v1", move |params, _, _| {
                let handler = handler.clone();
                async move {
                    let req: TransitionRequest = params.parse()?;
                    handler.transition_job(req).await
                }
            })
            .map_err(|e| e.to_string())?;

        let handler = self.handler.clone();
        module
            .register_async_method("job.claim.v1", move |params, _, _| {
                let handler = handler.clone();
                async move {
                    let req: ClaimRequest = params.parse()?;
                    handler.claim_job(req).await
                }
            })
            .map_err(|e| e.to_string())?;

        let handler = self.handler.clone();
        module
            .register_async_method("job.complete.v1", move |params, _, _| {
                let handler = handler.clone();
                async move {
                    let req: CompleteRequest = params.parse()?;
                    handler.complete_job(req).await
                }
            })
            .map_err(|e| e.to_string())?;

        let handler = self.handler.clone();
        module
            .register_async_method("agent.register.v1", move |params, _, _| {
                let handler = handler.clone();
                async move {
                    let req: RegisterRequest = params.parse()?;
                    handler.register_agent(req).await
                }
            })
            .map_err(|e| e.to_string())?;

        let handler = self.handler.clone();
        module
            .register_async_method("agent.heartbeat.v1", move |params, _, _| {
                let handler = handler.clone();
                async move {
                    let req: AgentIdRequest = params.parse()?;
                    handler.heartbeat_agent(req).await
                }
            })
            .map_err(|e| e.to_string())?;

        let handler = self.handler.clone();
        module
            .register_async_method("agent.set_state.v1", move |params, _, _| {
                let handler = handler.clone();
                async move {
                    let req: SetAgentStateRequest = params.parse()?;
                    handler.set_agent_state(req).await
                }
            })
            .map_err(|e| e.to_string())?;

        let handler = self.handler.clone();
        module
            .register_async_method("agent.list.v1", move |_params, _, _| {
                let handler = handler.clone();
                async move { handler.list_agents().await }
            })
            .map_err(|e| e.to_string())?;

        let handler = self.handler.clone();
        module
            .register_async_method("queue.snapshot.v1", move |params, _, _| {
                let handler = handler.clone();
                async move {
                    let req: QueueSnapshotRequest = params.parse()?;
                    handler.queue_snapshot(req).await
                }
            })
            .map_err(|e| e.to_string())?;

        let handler = self.handler.clone();
        module
            .register_async_method("admin.stats.v1", move |params, _, _| {
                let handler = handler.clone();
                async move {
                    let req: StatsRequest = params.parse().unwrap_or(StatsRequest {});
                    handler.stats(req).await
                }
            })
            .map_err(|e| e.to_string())?;

        info!("JSON-RPC server started successfully");

        let handle = server.start(module);
        Ok(handle)
    }
}
