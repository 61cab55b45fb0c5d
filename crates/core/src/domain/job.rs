// Job domain model

use serde::{Deserialize, Serialize};

use crate::domain::error::{DomainError, Result};

/// Job ID (UUID v4, or client-supplied at submission)
pub type JobId = String;

/// Queue priority band
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    Medium,
    Low,
}

impl Priority {
    /// Drain order: higher bands are emptied before lower ones
    pub const ALL: [Priority; 3] = [Priority::High, Priority::Medium, Priority::Low];

    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::High => "high",
            Priority::Medium => "medium",
            Priority::Low => "low",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "high" => Ok(Priority::High),
            "medium" => Ok(Priority::Medium),
            "low" => Ok(Priority::Low),
            other => Err(DomainError::ValidationError(format!(
                "invalid priority: {}",
                other
            ))),
        }
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Target environment a job runs against; doubles as an agent capability
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Target {
    Emulator,
    Device,
    Cloud,
}

impl Target {
    pub fn as_str(&self) -> &'static str {
        match self {
            Target::Emulator => "emulator",
            Target::Device => "device",
            Target::Cloud => "cloud",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "emulator" => Ok(Target::Emulator),
            "device" => Ok(Target::Device),
            // "browserstack" is the legacy spelling for the cloud farm
            "cloud" | "browserstack" => Ok(Target::Cloud),
            other => Err(DomainError::ValidationError(format!(
                "invalid target: {}",
                other
            ))),
        }
    }
}

impl std::fmt::Display for Target {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Job lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum JobState {
    Pending,
    QueuedForGroup,
    Running,
    Retrying,
    Completed,
    Failed,
    Cancelled,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobState::Completed | JobState::Failed | JobState::Cancelled
        )
    }

    /// Legal edges of the public state machine. Everything else is rejected.
    pub fn can_transition(from: JobState, to: JobState) -> bool {
        use JobState::*;
        matches!(
            (from, to),
            (Pending, QueuedForGroup)
                | (Pending, Running)
                | (Pending, Cancelled)
                | (Pending, Failed)
                | (QueuedForGroup, Running)
                | (QueuedForGroup, Cancelled)
                | (Running, Completed)
                | (Running, Failed)
                | (Running, Retrying)
                | (Running, Cancelled)
                | (Retrying, Pending)
        )
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            JobState::Pending => "pending",
            JobState::QueuedForGroup => "queued-for-group",
            JobState::Running => "running",
            JobState::Retrying => "retrying",
            JobState::Completed => "completed",
            JobState::Failed => "failed",
            JobState::Cancelled => "cancelled",
        };
        write!(f, "{}", s)
    }
}

/// Optional fields applied atomically with a state transition
#[derive(Debug, Clone, Default)]
pub struct TransitionPatch {
    pub assigned_agent: Option<String>,
    pub last_error: Option<String>,
    pub result: Option<serde_json::Value>,
    pub attempt: Option<i32>,
}

/// Job entity
///
/// Fixed record shape: every annotation the scheduler needs lives in an
/// explicit optional field. The group key of an attached job is
/// `(assigned_agent, build)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub tenant: String,
    pub build: String,
    pub artifact: String,
    pub priority: Priority,
    pub target: Target,
    pub state: JobState,

    pub attempt: i32,
    pub last_error: Option<String>,
    pub assigned_agent: Option<String>,

    pub created_at: i64, // epoch ms
    pub updated_at: i64,
    pub started_at: Option<i64>,
    pub completed_at: Option<i64>,

    pub result: Option<serde_json::Value>,
}

impl Job {
    /// Create a new pending job with injected id and timestamp
    pub fn new(
        id: impl Into<String>,
        created_at: i64,
        tenant: impl Into<String>,
        build: impl Into<String>,
        artifact: impl Into<String>,
        priority: Priority,
        target: Target,
    ) -> Self {
        Self {
            id: id.into(),
            tenant: tenant.into(),
            build: build.into(),
            artifact: artifact.into(),
            priority,
            target,
            state: JobState::Pending,
            attempt: 0,
            last_error: None,
            assigned_agent: None,
            created_at,
            updated_at: created_at,
            started_at: None,
            completed_at: None,
            result: None,
        }
    }

    /// Single entry point for state transitions and timestamp stamping.
    ///
    /// Validates the edge, applies the patch, then stamps: `running` sets
    /// `started_at`, terminal states set `completed_at`, a return to
    /// `pending` clears the assignment.
    pub fn transition(&mut self, to: JobState, patch: TransitionPatch, now: i64) -> Result<()> {
        if !JobState::can_transition(self.state, to) {
            return Err(DomainError::InvalidStateTransition {
                from: self.state.to_string(),
                to: to.to_string(),
            });
        }

        if let Some(agent) = patch.assigned_agent {
            self.assigned_agent = Some(agent);
        }
        if let Some(err) = patch.last_error {
            self.last_error = Some(err);
        }
        if let Some(result) = patch.result {
            self.result = Some(result);
        }
        if let Some(attempt) = patch.attempt {
            self.attempt = attempt;
        }

        self.state = to;
        self.updated_at = now;

        match to {
            JobState::Running => self.started_at = Some(now),
            JobState::Pending => {
                self.assigned_agent = None;
                self.started_at = None;
            }
            s if s.is_terminal() => self.completed_at = Some(now),
            _ => {}
        }

        Ok(())
    }

    /// Crash-recovery requeue, used only by the reconciliation sweep.
    ///
    /// Bypasses the public edge set: a `running` or `queued-for-group` job
    /// whose agent died goes straight back to `pending`. The attempt counter
    /// is untouched (a crash is not a test failure).
    pub fn requeue_after_crash(&mut self, now: i64) {
        debug_assert!(!self.state.is_terminal());
        self.state = JobState::Pending;
        self.assigned_agent = None;
        self.started_at = None;
        self.updated_at = now;
    }
}
