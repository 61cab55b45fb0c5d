// Domain Layer - Pure business logic and entities

pub mod agent;
pub mod error;
pub mod group;
pub mod job;

// Re-exports
pub use agent::{Agent, AgentId, AgentState};
pub use error::DomainError;
pub use group::{AffinityGroup, GroupKey};
pub use job::{Job, JobId, JobState, Priority, Target, TransitionPatch};
