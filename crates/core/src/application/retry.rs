// Retry policy

use tracing::warn;

use crate::domain::Job;

/// Retry decision result
#[derive(Debug, PartialEq, Eq)]
pub enum RetryDecision {
    /// Re-queue the job for another attempt
    Retry,
    /// Attempts exhausted; the job fails permanently
    Exhausted,
}

/// Bounded-attempt retry policy.
///
/// A job reported as failed is re-queued at the tail of its own priority
/// band until it has consumed `max_attempts` runs. Only test failures count;
/// crash-recovery requeues leave the attempt counter alone.
pub struct RetryPolicy {
    max_attempts: i32,
}

impl RetryPolicy {
    pub fn new(max_attempts: i32) -> Self {
        Self { max_attempts }
    }

    pub fn decide(&self, job: &Job) -> RetryDecision {
        if job.attempt + 1 < self.max_attempts {
            RetryDecision::Retry
        } else {
            warn!(
                job_id = %job.id,
                attempt = job.attempt,
                max_attempts = self.max_attempts,
                "Max attempts reached"
            );
            RetryDecision::Exhausted
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Priority, Target};

    fn job_with_attempt(attempt: i32) -> Job {
        let mut job = Job::new(
            "j-1",
            0,
            "acme",
            "b-1",
            "suite",
            Priority::Medium,
            Target::Emulator,
        );
        job.attempt = attempt;
        job
    }

    #[test]
    fn first_two_failures_retry_under_default_policy() {
        let policy = RetryPolicy::new(3);
        assert_eq!(policy.decide(&job_with_attempt(0)), RetryDecision::Retry);
        assert_eq!(policy.decide(&job_with_attempt(1)), RetryDecision::Retry);
    }

    #[test]
    fn third_failure_exhausts_default_policy() {
        let policy = RetryPolicy::new(3);
        assert_eq!(
            policy.decide(&job_with_attempt(2)),
            RetryDecision::Exhausted
        );
    }

    #[test]
    fn single_attempt_policy_never_retries() {
        let policy = RetryPolicy::new(1);
        assert_eq!(
            policy.decide(&job_with_attempt(0)),
            RetryDecision::Exhausted
        );
    }
}
