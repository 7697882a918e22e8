use crate::reasons::ReasonFilter;
use stackpilot_schema::{OperationKind, StackStatus};

/// What a single observed status means for the operation being waited on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Outcome {
    InProgress,
    Succeeded,
    Failed,
    RolledBack,
    /// A create unwound all the way into deleting the stack.
    Deleted,
    /// Neither pending nor a target for this operation.
    Unexpected,
}

/// Partition of the status vocabulary for one operation kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    Pending,
    Target,
    Neither,
}

impl Outcome {
    pub fn phase(self) -> Phase {
        match self {
            Outcome::InProgress => Phase::Pending,
            Outcome::Succeeded | Outcome::Failed | Outcome::RolledBack | Outcome::Deleted => {
                Phase::Target
            }
            Outcome::Unexpected => Phase::Neither,
        }
    }

    /// The event-log filter that explains this outcome, if it needs explaining.
    pub fn diagnosis(self) -> Option<ReasonFilter> {
        match self {
            Outcome::Failed => Some(ReasonFilter::Failure),
            Outcome::RolledBack => Some(ReasonFilter::Rollback),
            Outcome::Deleted => Some(ReasonFilter::StackDeletion),
            Outcome::InProgress | Outcome::Succeeded | Outcome::Unexpected => None,
        }
    }
}

/// Classify a stack status for the given operation kind.
pub fn classify(status: StackStatus, kind: OperationKind) -> Outcome {
    use StackStatus as S;

    match kind {
        OperationKind::Create => match status {
            S::CreateInProgress | S::DeleteInProgress | S::RollbackInProgress => {
                Outcome::InProgress
            }
            S::CreateComplete => Outcome::Succeeded,
            S::CreateFailed => Outcome::Failed,
            S::RollbackComplete | S::RollbackFailed => Outcome::RolledBack,
            S::DeleteComplete | S::DeleteFailed => Outcome::Deleted,
            _ => Outcome::Unexpected,
        },
        OperationKind::Update => match status {
            S::UpdateInProgress
            | S::UpdateCompleteCleanupInProgress
            | S::UpdateRollbackInProgress
            | S::UpdateRollbackCompleteCleanupInProgress => Outcome::InProgress,
            // An update that changed nothing can leave a fresh stack in CREATE_COMPLETE.
            S::CreateComplete | S::UpdateComplete => Outcome::Succeeded,
            S::UpdateRollbackComplete | S::UpdateRollbackFailed => Outcome::RolledBack,
            _ => Outcome::Unexpected,
        },
        OperationKind::Delete => match status {
            S::DeleteInProgress | S::RollbackInProgress => Outcome::InProgress,
            S::DeleteComplete => Outcome::Succeeded,
            S::DeleteFailed => Outcome::Failed,
            _ => Outcome::Unexpected,
        },
    }
}

/// Statuses that keep the poller waiting for `kind`.
pub fn pending_statuses(kind: OperationKind) -> Vec<StackStatus> {
    statuses_in(kind, Phase::Pending)
}

/// Statuses that end the wait for `kind`.
pub fn target_statuses(kind: OperationKind) -> Vec<StackStatus> {
    statuses_in(kind, Phase::Target)
}

fn statuses_in(kind: OperationKind, phase: Phase) -> Vec<StackStatus> {
    StackStatus::ALL
        .iter()
        .copied()
        .filter(|s| classify(*s, kind).phase() == phase)
        .collect()
}
