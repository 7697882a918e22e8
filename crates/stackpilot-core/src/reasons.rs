use crate::events::EventPages;
use chrono::{DateTime, Utc};
use stackpilot_remote::{ControlPlane, RemoteError};
use stackpilot_schema::{ResourceStatus, StackEvent, StackId};
use tracing::debug;

/// Which events explain a non-successful outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReasonFilter {
    /// Any resource that ended in a `*_FAILED` status.
    Failure,
    /// Failures, plus resources that entered rollback.
    Rollback,
    /// Failures, plus the stack itself starting to delete.
    StackDeletion,
}

impl ReasonFilter {
    /// Events without a non-empty reason never match.
    pub fn matches(self, event: &StackEvent) -> bool {
        if event.reason().is_none() {
            return false;
        }
        if event.resource_status.is_failure() {
            return true;
        }
        match self {
            ReasonFilter::Failure => false,
            ReasonFilter::Rollback => event.resource_status.is_rollback(),
            ReasonFilter::StackDeletion => {
                event.resource_status == ResourceStatus::DeleteInProgress
                    && event.is_stack_resource()
            }
        }
    }
}

/// Collects failure reasons from a stack's event log.
pub struct ReasonExtractor<'a> {
    plane: &'a dyn ControlPlane,
}

impl<'a> ReasonExtractor<'a> {
    pub fn new(plane: &'a dyn ControlPlane) -> Self {
        Self { plane }
    }

    /// Reasons of events matching `filter`, newest first, across all pages.
    ///
    /// With `after` set, events at or before that instant are skipped. The walk
    /// still covers the whole log; pages are not assumed to be sorted.
    pub fn extract(
        &self,
        stack_id: &StackId,
        filter: ReasonFilter,
        after: Option<DateTime<Utc>>,
    ) -> Result<Vec<String>, RemoteError> {
        self.extract_with(stack_id, |event| filter.matches(event), after)
    }

    pub fn extract_with(
        &self,
        stack_id: &StackId,
        predicate: impl Fn(&StackEvent) -> bool,
        after: Option<DateTime<Utc>>,
    ) -> Result<Vec<String>, RemoteError> {
        let mut reasons = Vec::new();
        let mut pages = 0usize;

        for page in EventPages::new(self.plane, stack_id) {
            pages += 1;
            for event in page? {
                if after.is_some_and(|cutoff| event.timestamp <= cutoff) {
                    continue;
                }
                if !predicate(&event) {
                    continue;
                }
                if let Some(reason) = event.reason() {
                    reasons.push(reason.to_owned());
                }
            }
        }

        debug!(
            "collected {} reason(s) for stack {stack_id} from {pages} page(s)",
            reasons.len()
        );
        Ok(reasons)
    }

    /// Timestamp of the newest event in the log, if there is one.
    pub fn latest_event_time(
        &self,
        stack_id: &StackId,
    ) -> Result<Option<DateTime<Utc>>, RemoteError> {
        for page in EventPages::new(self.plane, stack_id) {
            if let Some(newest) = page?.first() {
                return Ok(Some(newest.timestamp));
            }
        }
        Ok(None)
    }
}
