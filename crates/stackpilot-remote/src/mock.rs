use crate::{ControlPlane, EventPage, RemoteError};
use stackpilot_schema::{
    StackDefinition, StackDescription, StackEvent, StackId, StackName, StackStatus,
};
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};

/// A scripted reply to one describe call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DescribeReply {
    Status(StackStatus),
    /// Zero stacks returned.
    Gone,
    /// The control plane reports the stack does not exist.
    NotFound,
    /// The call itself fails.
    Fail(String),
}

/// A scripted rejection of a submit call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockFailure {
    NotFound,
    NoChanges,
    Api { code: String, message: String },
    Http(String),
}

impl MockFailure {
    fn to_error(&self) -> RemoteError {
        match self {
            MockFailure::NotFound => RemoteError::StackNotFound("stack does not exist".to_owned()),
            MockFailure::NoChanges => RemoteError::NoChanges,
            MockFailure::Api { code, message } => RemoteError::Api {
                code: code.clone(),
                message: message.clone(),
            },
            MockFailure::Http(msg) => RemoteError::Http(msg.clone()),
        }
    }
}

#[derive(Debug)]
struct MockState {
    stack_id: StackId,
    stack_name: StackName,
    replies: VecDeque<DescribeReply>,
    last_reply: Option<DescribeReply>,
    /// Newest first.
    events: Vec<StackEvent>,
    /// Prepended to `events` when any submit succeeds. Newest first.
    events_on_submit: Vec<StackEvent>,
    explicit_pages: Option<Vec<Vec<StackEvent>>>,
    page_size: usize,
    create_failure: Option<MockFailure>,
    update_failure: Option<MockFailure>,
    delete_failure: Option<MockFailure>,
    event_failure: Option<String>,
    submissions: Vec<String>,
    describe_calls: usize,
    event_page_calls: usize,
}

/// In-memory control plane driven by a script of describe replies and a
/// fixed event log. Records every call for assertions.
pub struct MockControlPlane {
    state: Mutex<MockState>,
}

impl MockControlPlane {
    pub fn new(stack_id: &str) -> Self {
        Self {
            state: Mutex::new(MockState {
                stack_id: StackId::new(stack_id),
                stack_name: StackName::new("mock-stack"),
                replies: VecDeque::new(),
                last_reply: None,
                events: Vec::new(),
                events_on_submit: Vec::new(),
                explicit_pages: None,
                page_size: 100,
                create_failure: None,
                update_failure: None,
                delete_failure: None,
                event_failure: None,
                submissions: Vec::new(),
                describe_calls: 0,
                event_page_calls: 0,
            }),
        }
    }

    fn with_state(self, f: impl FnOnce(&mut MockState)) -> Self {
        if let Ok(mut state) = self.state.lock() {
            f(&mut state);
        }
        self
    }

    /// Describe calls return these statuses in order; the last one repeats.
    #[must_use]
    pub fn with_statuses(self, statuses: &[StackStatus]) -> Self {
        let replies: Vec<DescribeReply> =
            statuses.iter().copied().map(DescribeReply::Status).collect();
        self.with_replies(replies)
    }

    #[must_use]
    pub fn with_replies(self, replies: Vec<DescribeReply>) -> Self {
        self.with_state(|s| s.replies.extend(replies))
    }

    /// Event log, newest first, split into pages of `page_size`.
    #[must_use]
    pub fn with_events(self, events: Vec<StackEvent>) -> Self {
        self.with_state(|s| s.events = events)
    }

    /// Events that appear at the head of the log once a submit is accepted.
    #[must_use]
    pub fn with_events_on_submit(self, events: Vec<StackEvent>) -> Self {
        self.with_state(|s| s.events_on_submit = events)
    }

    /// Serve exactly these pages, ignoring `with_events` and `page_size`.
    #[must_use]
    pub fn with_pages(self, pages: Vec<Vec<StackEvent>>) -> Self {
        self.with_state(|s| s.explicit_pages = Some(pages))
    }

    #[must_use]
    pub fn with_page_size(self, page_size: usize) -> Self {
        self.with_state(|s| s.page_size = page_size.max(1))
    }

    #[must_use]
    pub fn failing_create(self, failure: MockFailure) -> Self {
        self.with_state(|s| s.create_failure = Some(failure))
    }

    #[must_use]
    pub fn failing_update(self, failure: MockFailure) -> Self {
        self.with_state(|s| s.update_failure = Some(failure))
    }

    #[must_use]
    pub fn failing_delete(self, failure: MockFailure) -> Self {
        self.with_state(|s| s.delete_failure = Some(failure))
    }

    #[must_use]
    pub fn failing_event_fetch(self, message: &str) -> Self {
        let message = message.to_owned();
        self.with_state(|s| s.event_failure = Some(message))
    }

    /// Accepted and rejected submissions, as `"<op>:<target>"`.
    pub fn submissions(&self) -> Vec<String> {
        self.state
            .lock()
            .map(|s| s.submissions.clone())
            .unwrap_or_default()
    }

    pub fn describe_calls(&self) -> usize {
        self.state.lock().map_or(0, |s| s.describe_calls)
    }

    pub fn event_page_calls(&self) -> usize {
        self.state.lock().map_or(0, |s| s.event_page_calls)
    }

    fn lock(&self) -> Result<MutexGuard<'_, MockState>, RemoteError> {
        self.state
            .lock()
            .map_err(|e| RemoteError::Http(format!("mock state poisoned: {e}")))
    }
}

impl MockState {
    fn accept_submission(&mut self) {
        let mut head = std::mem::take(&mut self.events_on_submit);
        head.append(&mut self.events);
        self.events = head;
    }

    fn pages(&self) -> Vec<Vec<StackEvent>> {
        if let Some(ref pages) = self.explicit_pages {
            return pages.clone();
        }
        self.events
            .chunks(self.page_size)
            .map(<[StackEvent]>::to_vec)
            .collect()
    }
}

impl ControlPlane for MockControlPlane {
    fn submit_create(&self, definition: &StackDefinition) -> Result<StackId, RemoteError> {
        let mut state = self.lock()?;
        state.submissions.push(format!("create:{}", definition.name));
        if let Some(ref failure) = state.create_failure {
            return Err(failure.to_error());
        }
        state.stack_name = definition.name.clone();
        state.accept_submission();
        Ok(state.stack_id.clone())
    }

    fn submit_update(
        &self,
        stack_id: &StackId,
        _definition: &StackDefinition,
    ) -> Result<(), RemoteError> {
        let mut state = self.lock()?;
        state.submissions.push(format!("update:{stack_id}"));
        if let Some(ref failure) = state.update_failure {
            return Err(failure.to_error());
        }
        state.accept_submission();
        Ok(())
    }

    fn submit_delete(&self, stack_id: &StackId) -> Result<(), RemoteError> {
        let mut state = self.lock()?;
        state.submissions.push(format!("delete:{stack_id}"));
        if let Some(ref failure) = state.delete_failure {
            return Err(failure.to_error());
        }
        state.accept_submission();
        Ok(())
    }

    fn describe_stack(&self, stack_id: &StackId) -> Result<Option<StackDescription>, RemoteError> {
        let mut state = self.lock()?;
        state.describe_calls += 1;
        let reply = match state.replies.pop_front() {
            Some(reply) => {
                state.last_reply = Some(reply.clone());
                reply
            }
            None => match state.last_reply {
                Some(ref reply) => reply.clone(),
                None => DescribeReply::Gone,
            },
        };
        match reply {
            DescribeReply::Status(status) => Ok(Some(StackDescription {
                stack_id: stack_id.clone(),
                stack_name: state.stack_name.clone(),
                stack_status: status,
                stack_status_reason: None,
                last_event_at: state.events.first().map(|e| e.timestamp),
                outputs: std::collections::BTreeMap::new(),
            })),
            DescribeReply::Gone => Ok(None),
            DescribeReply::NotFound => Err(RemoteError::StackNotFound(format!(
                "Stack with id {stack_id} does not exist"
            ))),
            DescribeReply::Fail(msg) => Err(RemoteError::Http(msg)),
        }
    }

    fn fetch_event_page(
        &self,
        _stack_id: &StackId,
        page_token: Option<&str>,
    ) -> Result<EventPage, RemoteError> {
        let mut state = self.lock()?;
        state.event_page_calls += 1;
        if let Some(ref msg) = state.event_failure {
            return Err(RemoteError::Http(msg.clone()));
        }

        let index = match page_token {
            None => 0,
            Some(token) => token
                .strip_prefix("page-")
                .and_then(|n| n.parse::<usize>().ok())
                .ok_or_else(|| RemoteError::Api {
                    code: "ValidationError".to_owned(),
                    message: format!("invalid next_token: {token}"),
                })?,
        };

        let pages = state.pages();
        let events = pages.get(index).cloned().unwrap_or_default();
        let next_token = (index + 1 < pages.len()).then(|| format!("page-{}", index + 1));
        Ok(EventPage { events, next_token })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use stackpilot_schema::ResourceStatus;

    fn event(secs: i64) -> StackEvent {
        StackEvent {
            resource_status: ResourceStatus::CreateComplete,
            resource_type: "AWS::S3::Bucket".to_owned(),
            logical_resource_id: None,
            resource_status_reason: None,
            timestamp: Utc.timestamp_opt(secs, 0).unwrap(),
        }
    }

    #[test]
    fn scripted_statuses_repeat_the_last_reply() {
        let cp = MockControlPlane::new("s-1")
            .with_statuses(&[StackStatus::CreateInProgress, StackStatus::CreateComplete]);
        let id = StackId::new("s-1");
        let statuses: Vec<StackStatus> = (0..3)
            .map(|_| cp.describe_stack(&id).unwrap().unwrap().stack_status)
            .collect();
        assert_eq!(
            statuses,
            vec![
                StackStatus::CreateInProgress,
                StackStatus::CreateComplete,
                StackStatus::CreateComplete
            ]
        );
        assert_eq!(cp.describe_calls(), 3);
    }

    #[test]
    fn unscripted_describe_returns_zero_stacks() {
        let cp = MockControlPlane::new("s-1");
        assert!(cp.describe_stack(&StackId::new("s-1")).unwrap().is_none());
    }

    #[test]
    fn events_are_paginated_with_tokens() {
        let cp = MockControlPlane::new("s-1")
            .with_events(vec![event(5), event(4), event(3)])
            .with_page_size(2);
        let id = StackId::new("s-1");

        let first = cp.fetch_event_page(&id, None).unwrap();
        assert_eq!(first.events.len(), 2);
        assert_eq!(first.next_token.as_deref(), Some("page-1"));

        let second = cp.fetch_event_page(&id, first.next_token.as_deref()).unwrap();
        assert_eq!(second.events.len(), 1);
        assert_eq!(second.next_token, None);
        assert_eq!(cp.event_page_calls(), 2);
    }

    #[test]
    fn submit_prepends_scripted_events() {
        let cp = MockControlPlane::new("s-1")
            .with_events(vec![event(100)])
            .with_events_on_submit(vec![event(120)]);
        let id = StackId::new("s-1");
        cp.submit_update(&id, &StackDefinition::with_template_body("web", "{}"))
            .unwrap();
        let page = cp.fetch_event_page(&id, None).unwrap();
        assert_eq!(page.events, vec![event(120), event(100)]);
        assert_eq!(cp.submissions(), vec!["update:s-1"]);
    }

    #[test]
    fn scripted_failures_are_returned() {
        let cp = MockControlPlane::new("s-1").failing_delete(MockFailure::NotFound);
        assert!(matches!(
            cp.submit_delete(&StackId::new("s-1")),
            Err(RemoteError::StackNotFound(_))
        ));
        assert_eq!(cp.submissions(), vec!["delete:s-1"]);
    }

    #[test]
    fn bad_page_token_is_rejected() {
        let cp = MockControlPlane::new("s-1");
        assert!(cp
            .fetch_event_page(&StackId::new("s-1"), Some("garbage"))
            .is_err());
    }
}
