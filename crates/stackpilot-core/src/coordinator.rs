use crate::classify::Outcome;
use crate::clock::Clock;
use crate::concurrency::CancelToken;
use crate::poller::{PollResult, PollSettings, StatePoller};
use crate::reasons::ReasonExtractor;
use crate::CoreError;
use chrono::{DateTime, Utc};
use serde::Serialize;
use stackpilot_remote::{ControlPlane, RemoteError};
use stackpilot_schema::{
    OperationKind, StackDefinition, StackDescription, StackId, StackIdentity, StackStatus,
};
use tracing::{debug, info, warn};

/// Outcome of a lifecycle operation that ended successfully.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OperationResult {
    pub final_status: StackStatus,
    /// Always empty on success; failures are reported as `CoreError::OperationFailed`.
    pub reasons: Vec<String>,
    /// `None` after a delete, when no stack remains.
    pub stack_id: Option<StackId>,
    /// Name and id of a freshly created stack.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identity: Option<StackIdentity>,
}

/// Drives create, update, and delete against a control plane.
///
/// Each operation submits the request, waits for a terminal status, and on a
/// non-successful outcome collects the reasons recorded in the event log.
pub struct Coordinator<'a> {
    plane: &'a dyn ControlPlane,
    clock: &'a dyn Clock,
    cancel: CancelToken,
    create: PollSettings,
    update: PollSettings,
    delete: PollSettings,
}

impl<'a> Coordinator<'a> {
    pub fn new(plane: &'a dyn ControlPlane, clock: &'a dyn Clock) -> Self {
        Self {
            plane,
            clock,
            cancel: CancelToken::new(),
            create: PollSettings::for_kind(OperationKind::Create),
            update: PollSettings::for_kind(OperationKind::Update),
            delete: PollSettings::for_kind(OperationKind::Delete),
        }
    }

    #[must_use]
    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    #[must_use]
    pub fn with_settings(mut self, kind: OperationKind, settings: PollSettings) -> Self {
        match kind {
            OperationKind::Create => self.create = settings,
            OperationKind::Update => self.update = settings,
            OperationKind::Delete => self.delete = settings,
        }
        self
    }

    pub fn settings(&self, kind: OperationKind) -> PollSettings {
        match kind {
            OperationKind::Create => self.create,
            OperationKind::Update => self.update,
            OperationKind::Delete => self.delete,
        }
    }

    fn poller(&self, kind: OperationKind) -> StatePoller<'a> {
        StatePoller::new(self.plane, self.clock, self.settings(kind))
            .with_cancel(self.cancel.clone())
    }

    /// Create a stack and wait for it to settle.
    pub fn create(&self, definition: &StackDefinition) -> Result<OperationResult, CoreError> {
        info!("creating stack {}", definition.name);
        let stack_id = self.plane.submit_create(definition)?;
        debug!("stack {} assigned id {stack_id}", definition.name);

        let polled = self
            .poller(OperationKind::Create)
            .wait(&stack_id, OperationKind::Create)?;
        let mut result = self.conclude(OperationKind::Create, &stack_id, polled, None)?;
        let id = result.stack_id.clone().unwrap_or(stack_id);
        result.identity = Some(StackIdentity::new(definition.name.clone(), id));
        Ok(result)
    }

    /// Update a stack in place and wait for it to settle.
    ///
    /// Only events newer than the log head at submit time are considered when
    /// explaining a rollback. A submission the control plane rejects as a no-op
    /// succeeds with the stack's current status.
    pub fn update(
        &self,
        stack_id: &StackId,
        definition: &StackDefinition,
    ) -> Result<OperationResult, CoreError> {
        info!("updating stack {stack_id}");
        let after = ReasonExtractor::new(self.plane).latest_event_time(stack_id)?;
        debug!("event window for update of {stack_id} starts after {after:?}");

        match self.plane.submit_update(stack_id, definition) {
            Ok(()) => {}
            Err(RemoteError::NoChanges) => {
                info!("stack {stack_id} is already up to date");
                return self.current(stack_id);
            }
            Err(e) => return Err(e.into()),
        }

        let polled = self
            .poller(OperationKind::Update)
            .wait(stack_id, OperationKind::Update)?;
        self.conclude(OperationKind::Update, stack_id, polled, after)
    }

    /// Delete a stack and wait until it is gone. Deleting a stack that does
    /// not exist succeeds.
    pub fn delete(&self, stack_id: &StackId) -> Result<OperationResult, CoreError> {
        info!("deleting stack {stack_id}");
        match self.plane.submit_delete(stack_id) {
            Ok(()) => {}
            Err(RemoteError::StackNotFound(msg)) => {
                info!("stack {stack_id} already deleted: {msg}");
                return Ok(OperationResult {
                    final_status: StackStatus::DeleteComplete,
                    reasons: Vec::new(),
                    stack_id: None,
                    identity: None,
                });
            }
            Err(e) => return Err(e.into()),
        }

        let polled = self
            .poller(OperationKind::Delete)
            .wait(stack_id, OperationKind::Delete)?;
        self.conclude(OperationKind::Delete, stack_id, polled, None)
    }

    /// Look up a live stack. Missing and fully deleted stacks read as `None`.
    pub fn read(&self, stack_id: &StackId) -> Result<Option<StackDescription>, CoreError> {
        match self.plane.describe_stack(stack_id) {
            Ok(Some(stack)) if stack.stack_status == StackStatus::DeleteComplete => {
                debug!("stack {stack_id} is deleted");
                Ok(None)
            }
            Ok(found) => Ok(found),
            Err(RemoteError::StackNotFound(msg)) => {
                debug!("stack {stack_id} not found: {msg}");
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    fn current(&self, stack_id: &StackId) -> Result<OperationResult, CoreError> {
        let Some(stack) = self.plane.describe_stack(stack_id)? else {
            return Err(CoreError::UnexpectedState {
                stack_id: stack_id.clone(),
                detail: "stack disappeared after a no-op update".to_owned(),
            });
        };
        Ok(OperationResult {
            final_status: stack.stack_status,
            reasons: Vec::new(),
            stack_id: Some(stack.stack_id),
            identity: None,
        })
    }

    fn conclude(
        &self,
        kind: OperationKind,
        stack_id: &StackId,
        polled: PollResult,
        after: Option<DateTime<Utc>>,
    ) -> Result<OperationResult, CoreError> {
        let Some(filter) = polled.outcome.diagnosis() else {
            info!("{kind} of stack {stack_id} finished: {}", polled.status);
            let stack_id = match kind {
                OperationKind::Delete => None,
                OperationKind::Create | OperationKind::Update => {
                    Some(polled.stack_id.unwrap_or_else(|| stack_id.clone()))
                }
            };
            return Ok(OperationResult {
                final_status: polled.status,
                reasons: Vec::new(),
                stack_id,
                identity: None,
            });
        };

        let reported_id = polled.stack_id.as_ref().unwrap_or(stack_id);
        let reasons = match ReasonExtractor::new(self.plane).extract(reported_id, filter, after) {
            Ok(reasons) => reasons,
            Err(e) => {
                warn!("reading failure reasons for stack {reported_id} failed: {e}");
                return Err(e.into());
            }
        };
        warn!(
            "{kind} of stack {stack_id} ended in {} with {} reason(s)",
            polled.status,
            reasons.len()
        );

        let retained = match polled.outcome {
            Outcome::Deleted => None,
            _ => Some(reported_id.clone()),
        };
        Err(CoreError::OperationFailed {
            status: polled.status,
            reasons,
            stack_id: retained,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use chrono::TimeZone;
    use stackpilot_remote::{DescribeReply, MockControlPlane, MockFailure};
    use stackpilot_schema::{ResourceStatus, StackEvent};

    fn definition() -> StackDefinition {
        StackDefinition::with_template_body("web", r#"{"Resources":{}}"#)
    }

    fn failed(reason: &str, secs: i64) -> StackEvent {
        StackEvent {
            resource_status: ResourceStatus::CreateFailed,
            resource_type: "AWS::EC2::Instance".to_owned(),
            logical_resource_id: Some("Web".to_owned()),
            resource_status_reason: Some(reason.to_owned()),
            timestamp: Utc.timestamp_opt(secs, 0).unwrap(),
        }
    }

    #[test]
    fn create_success_keeps_identifier() {
        let cp = MockControlPlane::new("arn:stack/web/1")
            .with_statuses(&[StackStatus::CreateInProgress, StackStatus::CreateComplete]);
        let clock = ManualClock::new();
        let result = Coordinator::new(&cp, &clock).create(&definition()).unwrap();
        assert_eq!(result.final_status, StackStatus::CreateComplete);
        assert!(result.reasons.is_empty());
        assert_eq!(result.stack_id, Some(StackId::new("arn:stack/web/1")));
        assert_eq!(
            result.identity,
            Some(StackIdentity::new("web", "arn:stack/web/1"))
        );
        assert_eq!(cp.submissions(), vec!["create:web"]);
        assert_eq!(cp.event_page_calls(), 0);
    }

    #[test]
    fn create_failed_keeps_identifier_and_reasons() {
        let cp = MockControlPlane::new("s-1")
            .with_statuses(&[StackStatus::CreateFailed])
            .with_events(vec![failed("bucket name taken", 10)]);
        let clock = ManualClock::new();
        let err = Coordinator::new(&cp, &clock).create(&definition()).unwrap_err();
        match err {
            CoreError::OperationFailed {
                status,
                reasons,
                stack_id,
            } => {
                assert_eq!(status, StackStatus::CreateFailed);
                assert_eq!(reasons, vec!["bucket name taken"]);
                assert_eq!(stack_id, Some(StackId::new("s-1")));
            }
            other => panic!("expected OperationFailed, got {other:?}"),
        }
    }

    #[test]
    fn rejected_create_submits_once_and_never_polls() {
        let cp = MockControlPlane::new("s-1").failing_create(MockFailure::Api {
            code: "AlreadyExistsException".to_owned(),
            message: "Stack [web] already exists".to_owned(),
        });
        let clock = ManualClock::new();
        let err = Coordinator::new(&cp, &clock).create(&definition()).unwrap_err();
        assert!(matches!(err, CoreError::Transport(RemoteError::Api { .. })));
        assert_eq!(cp.describe_calls(), 0);
    }

    #[test]
    fn reason_fetch_failure_is_reported() {
        let cp = MockControlPlane::new("s-1")
            .with_statuses(&[StackStatus::CreateFailed])
            .failing_event_fetch("throttled");
        let clock = ManualClock::new();
        let err = Coordinator::new(&cp, &clock).create(&definition()).unwrap_err();
        assert!(matches!(err, CoreError::Transport(RemoteError::Http(_))));
    }

    #[test]
    fn no_op_update_reports_current_status_without_polling() {
        let cp = MockControlPlane::new("s-1")
            .with_statuses(&[StackStatus::UpdateComplete])
            .failing_update(MockFailure::NoChanges);
        let clock = ManualClock::new();
        let result = Coordinator::new(&cp, &clock)
            .update(&StackId::new("s-1"), &definition())
            .unwrap();
        assert_eq!(result.final_status, StackStatus::UpdateComplete);
        assert_eq!(result.stack_id, Some(StackId::new("s-1")));
        assert_eq!(result.identity, None);
        assert_eq!(cp.describe_calls(), 1);
        assert_eq!(clock.elapsed(), std::time::Duration::ZERO);
    }

    #[test]
    fn delete_failed_reports_reasons() {
        let cp = MockControlPlane::new("s-1")
            .with_statuses(&[StackStatus::DeleteInProgress, StackStatus::DeleteFailed])
            .with_events_on_submit(vec![StackEvent {
                resource_status: ResourceStatus::DeleteFailed,
                ..failed("bucket not empty", 50)
            }]);
        let clock = ManualClock::new();
        let err = Coordinator::new(&cp, &clock)
            .delete(&StackId::new("s-1"))
            .unwrap_err();
        assert_eq!(err.to_string(), r#"DELETE_FAILED: ["bucket not empty"]"#);
    }

    #[test]
    fn read_hides_missing_and_deleted_stacks() {
        let clock = ManualClock::new();
        let id = StackId::new("s-1");

        let deleted = MockControlPlane::new("s-1").with_statuses(&[StackStatus::DeleteComplete]);
        assert!(Coordinator::new(&deleted, &clock).read(&id).unwrap().is_none());

        let missing = MockControlPlane::new("s-1").with_replies(vec![DescribeReply::NotFound]);
        assert!(Coordinator::new(&missing, &clock).read(&id).unwrap().is_none());

        let empty = MockControlPlane::new("s-1");
        assert!(Coordinator::new(&empty, &clock).read(&id).unwrap().is_none());

        let live = MockControlPlane::new("s-1").with_statuses(&[StackStatus::UpdateComplete]);
        let stack = Coordinator::new(&live, &clock).read(&id).unwrap().unwrap();
        assert_eq!(stack.stack_status, StackStatus::UpdateComplete);
    }

    #[test]
    fn read_propagates_transport_errors() {
        let clock = ManualClock::new();
        let cp = MockControlPlane::new("s-1")
            .with_replies(vec![DescribeReply::Fail("503".to_owned())]);
        assert!(matches!(
            Coordinator::new(&cp, &clock).read(&StackId::new("s-1")),
            Err(CoreError::Transport(_))
        ));
    }

    #[test]
    fn per_kind_settings_override() {
        let cp = MockControlPlane::new("s-1");
        let clock = ManualClock::new();
        let custom = PollSettings::for_kind(OperationKind::Delete)
            .with_timeout(std::time::Duration::from_secs(60));
        let coordinator =
            Coordinator::new(&cp, &clock).with_settings(OperationKind::Delete, custom);
        assert_eq!(coordinator.settings(OperationKind::Delete), custom);
        assert_eq!(
            coordinator.settings(OperationKind::Create),
            PollSettings::for_kind(OperationKind::Create)
        );
    }

    #[test]
    fn operation_result_serializes() {
        let result = OperationResult {
            final_status: StackStatus::CreateComplete,
            reasons: Vec::new(),
            stack_id: Some(StackId::new("s-1")),
            identity: Some(StackIdentity::new("web", "s-1")),
        };
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["final_status"], "CREATE_COMPLETE");
        assert_eq!(json["stack_id"], "s-1");
        assert_eq!(json["identity"]["name"], "web");
        assert_eq!(json["identity"]["id"], "s-1");
    }

    #[test]
    fn delete_result_omits_identity() {
        let result = OperationResult {
            final_status: StackStatus::DeleteComplete,
            reasons: Vec::new(),
            stack_id: None,
            identity: None,
        };
        let json = serde_json::to_value(&result).unwrap();
        assert!(json.get("identity").is_none());
        assert!(json["stack_id"].is_null());
    }
}
