//! Task execution under timeout, retry and cancellation policy
//!
//! [`TaskRunner`] drives one [`Task`] to a single terminal outcome. The
//! sleeps between resumptions are the cooperative suspension points where
//! sibling runners scheduled on the same runtime make progress; an external
//! [`CancellationToken`] or the configured deadline wakes the runner early
//! and converts the wait into a cooperative cancellation.

use crate::backoff::BackoffPolicy;
use crate::error::EngineError;
use crate::task::{Task, TaskPoll};
use std::sync::Arc;
use std::time::Duration;
use strata_core::Resource;
use tokio::time::{self, Instant};
use tokio_util::sync::CancellationToken;

/// Bounded grace period a cancelled task gets to unwind and run
/// compensating cleanup.
const CANCEL_GRACE: Duration = Duration::from_secs(5);

/// Terminal outcome of driving one task.
#[derive(Debug, Clone)]
pub enum TaskOutcome {
    Complete,
    Failed(Arc<EngineError>),
    Cancelled,
}

impl TaskOutcome {
    pub fn is_complete(&self) -> bool {
        matches!(self, TaskOutcome::Complete)
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, TaskOutcome::Cancelled)
    }

    pub fn error(&self) -> Option<&EngineError> {
        match self {
            TaskOutcome::Failed(err) => Some(err),
            _ => None,
        }
    }
}

/// Stateful driver around one task.
pub struct TaskRunner {
    task: Task,
    timeout: Option<Duration>,
    retry_limit: u32,
    backoff: BackoffPolicy,
    min_poll_interval: Duration,
    steps: u64,
    outcome: Option<TaskOutcome>,
}

impl TaskRunner {
    pub fn new(task: Task) -> Self {
        Self {
            task,
            timeout: None,
            retry_limit: 0,
            backoff: BackoffPolicy::default(),
            min_poll_interval: Duration::from_millis(100),
            steps: 0,
            outcome: None,
        }
    }

    /// Deadline for the whole operation, including retries.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Number of retries after the first attempt; the operation runs at most
    /// `retry_limit + 1` times.
    pub fn with_retry_limit(mut self, retry_limit: u32) -> Self {
        self.retry_limit = retry_limit;
        self
    }

    pub fn with_backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.backoff = backoff;
        self
    }

    /// Floor applied to the poll interval a task requests.
    pub fn with_min_poll_interval(mut self, interval: Duration) -> Self {
        self.min_poll_interval = interval;
        self
    }

    pub fn is_done(&self) -> bool {
        self.outcome.is_some()
    }

    /// Resumption steps taken so far.
    pub fn steps(&self) -> u64 {
        self.steps
    }

    pub fn resource(&self) -> &Resource {
        self.task.resource()
    }

    pub fn into_resource(self) -> Resource {
        self.task.into_resource()
    }

    /// Drives the task to completion.
    ///
    /// Returns exactly one of Complete, Failed or Cancelled; once done the
    /// runner is inert and re-invocation returns the memoized outcome
    /// without stepping the task again.
    pub async fn run(&mut self, cancel: &CancellationToken) -> TaskOutcome {
        if let Some(outcome) = &self.outcome {
            return outcome.clone();
        }

        let deadline = self.timeout.map(|t| Instant::now() + t);
        let mut attempt: u32 = 0;

        let outcome = loop {
            if cancel.is_cancelled() {
                break self.cancelled().await;
            }

            self.steps += 1;
            match self.task.step().await {
                Ok(TaskPoll::Complete) => break TaskOutcome::Complete,
                Ok(TaskPoll::Pending { wait }) => {
                    let wait = wait.max(self.min_poll_interval);
                    match self.suspend(wait, deadline, cancel).await {
                        Wake::Elapsed => {}
                        Wake::DeadlineHit => break self.timed_out().await,
                        Wake::Cancelled => break self.cancelled().await,
                    }
                }
                Err(EngineError::Cancelled) => break self.cancelled().await,
                Err(err) if self.task.is_transient(&err) && attempt < self.retry_limit => {
                    let delay = self.backoff.delay_for_attempt(attempt);
                    attempt += 1;
                    tracing::debug!(
                        resource = %self.task.resource().name,
                        action = %self.task.action(),
                        attempt,
                        ?delay,
                        %err,
                        "transient failure, retrying after backoff"
                    );
                    match self.suspend(delay, deadline, cancel).await {
                        Wake::Elapsed => self.task.restart(),
                        Wake::DeadlineHit => break self.timed_out().await,
                        Wake::Cancelled => break self.cancelled().await,
                    }
                }
                Err(err) => {
                    tracing::warn!(
                        resource = %self.task.resource().name,
                        action = %self.task.action(),
                        %err,
                        "operation failed"
                    );
                    self.task.finalize_failure(&err.to_string()).await;
                    break TaskOutcome::Failed(Arc::new(err));
                }
            }
        };

        self.outcome = Some(outcome.clone());
        outcome
    }

    /// Sleeps for `wait`, waking early on deadline or external cancel.
    async fn suspend(
        &mut self,
        wait: Duration,
        deadline: Option<Instant>,
        cancel: &CancellationToken,
    ) -> Wake {
        let wake_at = Instant::now() + wait;
        let wake_at = match deadline {
            Some(d) => wake_at.min(d),
            None => wake_at,
        };

        tokio::select! {
            _ = cancel.cancelled() => return Wake::Cancelled,
            _ = time::sleep_until(wake_at) => {}
        }

        match deadline {
            Some(d) if Instant::now() >= d => Wake::DeadlineHit,
            _ => Wake::Elapsed,
        }
    }

    async fn timed_out(&mut self) -> TaskOutcome {
        let err = EngineError::Timeout {
            name: self.task.resource().name.clone(),
            action: self.task.action(),
            timeout: self.timeout.unwrap_or_default(),
        };
        tracing::warn!(resource = %self.task.resource().name, %err, "deadline elapsed, cancelling task");
        self.task.cancel();
        let _ = time::timeout(CANCEL_GRACE, self.task.unwind()).await;
        self.task.finalize_failure(&err.to_string()).await;
        TaskOutcome::Failed(Arc::new(err))
    }

    async fn cancelled(&mut self) -> TaskOutcome {
        tracing::debug!(
            resource = %self.task.resource().name,
            action = %self.task.action(),
            "cancellation requested, unwinding"
        );
        self.task.cancel();
        let _ = time::timeout(CANCEL_GRACE, self.task.unwind()).await;
        self.task.finalize_failure("operation cancelled").await;
        TaskOutcome::Cancelled
    }
}

enum Wake {
    Elapsed,
    DeadlineHit,
    Cancelled,
}
