//! Lifecycle engine for remotely provisioned stacks.
//!
//! The control plane runs create, update, and delete asynchronously. This
//! crate submits an operation, polls until the stack reaches a terminal status
//! (`StatePoller`), and when the operation did not succeed, walks the stack's
//! paginated event log (`EventPages`) to collect the failure reasons that
//! belong to this operation (`ReasonExtractor`). `Coordinator` ties the pieces
//! together per operation kind. Waiting goes through an injected `Clock` and
//! can be aborted between polls with a `CancelToken`.

pub mod classify;
pub mod clock;
pub mod concurrency;
pub mod coordinator;
pub mod events;
pub mod poller;
pub mod reasons;

pub use classify::{classify, pending_statuses, target_statuses, Outcome, Phase};
pub use clock::{Clock, ManualClock, SystemClock};
pub use concurrency::{install_signal_handler, CancelToken};
pub use coordinator::{Coordinator, OperationResult};
pub use events::EventPages;
pub use poller::{PollResult, PollSettings, StatePoller};
pub use reasons::{ReasonExtractor, ReasonFilter};

use stackpilot_remote::RemoteError;
use stackpilot_schema::{StackId, StackStatus};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("transport error: {0}")]
    Transport(#[from] RemoteError),
    #[error("unexpected state for stack {stack_id}: {detail}")]
    UnexpectedState { stack_id: StackId, detail: String },
    #[error(
        "timed out after {}s waiting for stack {stack_id} (last status: {})",
        .waited.as_secs(),
        describe_last(.last_status)
    )]
    Timeout {
        stack_id: StackId,
        last_status: Option<StackStatus>,
        waited: Duration,
    },
    #[error(
        "wait for stack {stack_id} cancelled (last status: {})",
        describe_last(.last_status)
    )]
    Cancelled {
        stack_id: StackId,
        last_status: Option<StackStatus>,
    },
    #[error("{status}: {reasons:?}")]
    OperationFailed {
        status: StackStatus,
        reasons: Vec<String>,
        /// `None` once the failed operation left no stack behind.
        stack_id: Option<StackId>,
    },
}

fn describe_last(status: &Option<StackStatus>) -> String {
    status.map_or_else(|| "none observed".to_owned(), |s| s.to_string())
}
