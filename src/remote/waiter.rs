//! Waiting for stack operations to settle.
//!
//! Polling uses an exponential interval with an overall deadline. Time is
//! read through [`Clock`] so tests can run the loop without sleeping.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::error::{HalldyllError, RemoteError, Result};

use super::api::ControlPlane;
use super::types::{StackDescription, StackOperation, StackStatus};

/// Polling schedule for remote waits.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PollPolicy {
    /// Interval before the second poll.
    pub initial_interval: Duration,
    /// Upper bound for the interval.
    pub max_interval: Duration,
    /// Growth factor applied after each poll.
    pub multiplier: f64,
    /// Overall deadline.
    pub timeout: Duration,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            initial_interval: Duration::from_secs(5),
            max_interval: Duration::from_secs(30),
            multiplier: 1.5,
            timeout: Duration::from_secs(30 * 60),
        }
    }
}

impl PollPolicy {
    /// Interval following `current`.
    #[must_use]
    pub fn next_interval(&self, current: Duration) -> Duration {
        current.mul_f64(self.multiplier).min(self.max_interval)
    }
}

/// Source of time for poll loops.
#[async_trait]
pub trait Clock: Send + Sync {
    /// Current instant.
    fn now(&self) -> Instant;

    /// Sleeps for `duration`.
    async fn sleep(&self, duration: Duration);
}

/// Clock backed by the tokio timer.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioClock;

#[async_trait]
impl Clock for TokioClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Polls a stack until an operation reaches a terminal status.
#[derive(Clone)]
pub struct StackWaiter {
    control: Arc<dyn ControlPlane>,
    clock: Arc<dyn Clock>,
    policy: PollPolicy,
}

impl std::fmt::Debug for StackWaiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StackWaiter")
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl StackWaiter {
    /// Creates a waiter on the tokio clock.
    #[must_use]
    pub fn new(control: Arc<dyn ControlPlane>, policy: PollPolicy) -> Self {
        Self::with_clock(control, Arc::new(TokioClock), policy)
    }

    /// Creates a waiter with an explicit clock.
    #[must_use]
    pub fn with_clock(
        control: Arc<dyn ControlPlane>,
        clock: Arc<dyn Clock>,
        policy: PollPolicy,
    ) -> Self {
        Self {
            control,
            clock,
            policy,
        }
    }

    /// Waits until `operation` on `stack` settles.
    ///
    /// A vanished stack counts as success for a delete. The returned
    /// description is the last one observed.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteError::StackFailed`] if the stack settles in any other
    /// terminal status, [`RemoteError::StackNotFound`] if it disappears, and
    /// [`RemoteError::Timeout`] once the deadline passes.
    pub async fn wait(&self, stack: &str, operation: StackOperation) -> Result<StackDescription> {
        let started = self.clock.now();
        let mut interval = self.policy.initial_interval;

        info!("Waiting for {operation} of stack {stack}");

        loop {
            match self.control.describe_stack(stack).await? {
                None if operation == StackOperation::Delete => {
                    return Ok(StackDescription::new(stack, StackStatus::DeleteComplete));
                }
                None => {
                    return Err(HalldyllError::Remote(RemoteError::StackNotFound {
                        stack: stack.to_string(),
                    }));
                }
                Some(description) if description.status.is_in_progress() => {
                    debug!("Stack {stack} is {}", description.status);
                }
                Some(description) if description.status.is_success_for(operation) => {
                    info!("Stack {stack} settled in {}", description.status);
                    return Ok(description);
                }
                Some(description) => {
                    warn!("Stack {stack} settled in {}", description.status);
                    return Err(HalldyllError::Remote(RemoteError::StackFailed {
                        stack: stack.to_string(),
                        status: description.status.to_string(),
                        reason: description
                            .status_reason
                            .unwrap_or_else(|| String::from("no reason reported")),
                    }));
                }
            }

            let waited = self.clock.now().saturating_duration_since(started);
            if waited >= self.policy.timeout {
                return Err(HalldyllError::Remote(RemoteError::Timeout {
                    operation: format!("{operation} of stack {stack}"),
                    waited_secs: waited.as_secs(),
                }));
            }

            self.clock.sleep(interval).await;
            interval = self.policy.next_interval(interval);
        }
    }
}
