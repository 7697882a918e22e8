use crate::classify::{classify, Outcome, Phase};
use crate::clock::Clock;
use crate::concurrency::CancelToken;
use crate::CoreError;
use stackpilot_remote::{ControlPlane, RemoteError};
use stackpilot_schema::{OperationKind, StackId, StackStatus};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30 * 60);

/// Longest uninterrupted sleep; cancellation is checked between slices.
const SLEEP_SLICE: Duration = Duration::from_millis(250);

/// Timing of one wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSettings {
    /// Pause before the first status check.
    pub delay: Duration,
    /// Pause between consecutive status checks.
    pub min_interval: Duration,
    /// Upper bound on the whole wait.
    pub timeout: Duration,
}

impl PollSettings {
    pub fn for_kind(kind: OperationKind) -> Self {
        let min_interval = match kind {
            OperationKind::Create => Duration::from_secs(1),
            OperationKind::Update | OperationKind::Delete => Duration::from_secs(5),
        };
        Self {
            delay: Duration::ZERO,
            min_interval,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_min_interval(mut self, min_interval: Duration) -> Self {
        self.min_interval = min_interval;
        self
    }

    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

/// One observation of the stack, classified for the operation in flight.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollResult {
    /// 1-based index of the status check that produced this result.
    pub attempt: u32,
    pub status: StackStatus,
    pub outcome: Outcome,
    /// Identifier reported by the control plane. `None` when a delete wait
    /// found the stack already retired.
    pub stack_id: Option<StackId>,
}

/// Waits for a stack to leave the pending statuses of an operation.
pub struct StatePoller<'a> {
    plane: &'a dyn ControlPlane,
    clock: &'a dyn Clock,
    cancel: CancelToken,
    settings: PollSettings,
}

impl<'a> StatePoller<'a> {
    pub fn new(plane: &'a dyn ControlPlane, clock: &'a dyn Clock, settings: PollSettings) -> Self {
        Self {
            plane,
            clock,
            cancel: CancelToken::new(),
            settings,
        }
    }

    #[must_use]
    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn settings(&self) -> PollSettings {
        self.settings
    }

    /// Poll until a target status is observed.
    ///
    /// Returns the terminal observation, or fails on a status outside the
    /// operation's vocabulary, on transport errors, on cancellation, and once
    /// the timeout has elapsed.
    pub fn wait(&self, stack_id: &StackId, kind: OperationKind) -> Result<PollResult, CoreError> {
        let started = self.clock.now();
        // A timeout past the end of the clock's range means no deadline.
        let deadline = started.checked_add(self.settings.timeout);
        debug!(
            "waiting for {kind} of stack {stack_id} (interval {:?}, timeout {:?})",
            self.settings.min_interval, self.settings.timeout
        );

        self.pause(self.settings.delay, deadline, stack_id, None)?;

        let mut last: Option<PollResult> = None;
        loop {
            let last_status = last.as_ref().map(|p| p.status);
            if self.cancel.is_cancelled() {
                return Err(CoreError::Cancelled {
                    stack_id: stack_id.clone(),
                    last_status,
                });
            }
            let now = self.clock.now();
            if deadline.is_some_and(|d| now >= d) {
                warn!("gave up waiting for {kind} of stack {stack_id}");
                return Err(CoreError::Timeout {
                    stack_id: stack_id.clone(),
                    last_status,
                    waited: now.saturating_duration_since(started),
                });
            }

            let attempt = last.as_ref().map_or(1, |p| p.attempt + 1);
            let observed = self.poll_once(stack_id, kind, attempt)?;
            if observed.outcome.phase() == Phase::Target {
                debug!(
                    "stack {stack_id} reached {} after {attempt} poll(s)",
                    observed.status
                );
                return Ok(observed);
            }

            let status = observed.status;
            last = Some(observed);
            self.pause(
                self.settings.min_interval,
                deadline,
                stack_id,
                Some(status),
            )?;
        }
    }

    /// Describe the stack once and classify what came back.
    pub fn poll_once(
        &self,
        stack_id: &StackId,
        kind: OperationKind,
        attempt: u32,
    ) -> Result<PollResult, CoreError> {
        let described = match self.plane.describe_stack(stack_id) {
            Ok(described) => described,
            Err(RemoteError::StackNotFound(msg)) if kind == OperationKind::Delete => {
                debug!("stack {stack_id} no longer exists: {msg}");
                None
            }
            Err(e) => {
                warn!("describing stack {stack_id} failed: {e}");
                return Err(e.into());
            }
        };

        let Some(stack) = described else {
            if kind == OperationKind::Delete {
                return Ok(PollResult {
                    attempt,
                    status: StackStatus::DeleteComplete,
                    outcome: Outcome::Succeeded,
                    stack_id: None,
                });
            }
            return Err(CoreError::UnexpectedState {
                stack_id: stack_id.clone(),
                detail: format!("stack disappeared while waiting for {kind}"),
            });
        };

        let outcome = classify(stack.stack_status, kind);
        debug!(
            "poll {attempt}: stack {stack_id} is {}",
            stack.stack_status
        );
        if outcome.phase() == Phase::Neither {
            return Err(CoreError::UnexpectedState {
                stack_id: stack_id.clone(),
                detail: format!(
                    "status {} is not expected while waiting for {kind}",
                    stack.stack_status
                ),
            });
        }

        Ok(PollResult {
            attempt,
            status: stack.stack_status,
            outcome,
            stack_id: Some(stack.stack_id),
        })
    }

    /// Sleep for `duration`, never past `deadline`, checking for cancellation
    /// between slices. Without a representable wake time only cancellation
    /// ends the pause.
    fn pause(
        &self,
        duration: Duration,
        deadline: Option<Instant>,
        stack_id: &StackId,
        last_status: Option<StackStatus>,
    ) -> Result<(), CoreError> {
        let wake = match (self.clock.now().checked_add(duration), deadline) {
            (Some(wake), Some(deadline)) => Some(wake.min(deadline)),
            (wake, None) => wake,
            (None, deadline) => deadline,
        };
        loop {
            if self.cancel.is_cancelled() {
                return Err(CoreError::Cancelled {
                    stack_id: stack_id.clone(),
                    last_status,
                });
            }
            let remaining = match wake {
                Some(wake) => wake.saturating_duration_since(self.clock.now()),
                None => SLEEP_SLICE,
            };
            if remaining.is_zero() {
                return Ok(());
            }
            self.clock.sleep(remaining.min(SLEEP_SLICE));
        }
    }
}
