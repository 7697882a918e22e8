use stackpilot_remote::{ControlPlane, RemoteError};
use stackpilot_schema::{StackEvent, StackId};
use std::iter::FusedIterator;

#[derive(Debug)]
enum Cursor {
    Start,
    Next(String),
    Done,
}

/// Walks a stack's event log one page at a time, newest events first.
///
/// Each item is one page. A failed fetch is yielded once and ends the walk.
pub struct EventPages<'a> {
    plane: &'a dyn ControlPlane,
    stack_id: &'a StackId,
    cursor: Cursor,
}

impl<'a> EventPages<'a> {
    pub fn new(plane: &'a dyn ControlPlane, stack_id: &'a StackId) -> Self {
        Self {
            plane,
            stack_id,
            cursor: Cursor::Start,
        }
    }
}

impl Iterator for EventPages<'_> {
    type Item = Result<Vec<StackEvent>, RemoteError>;

    fn next(&mut self) -> Option<Self::Item> {
        let token = match std::mem::replace(&mut self.cursor, Cursor::Done) {
            Cursor::Done => return None,
            Cursor::Start => None,
            Cursor::Next(token) => Some(token),
        };

        match self.plane.fetch_event_page(self.stack_id, token.as_deref()) {
            Ok(page) => {
                if let Some(next) = page.next_token.filter(|t| !t.is_empty()) {
                    self.cursor = Cursor::Next(next);
                }
                Some(Ok(page.events))
            }
            Err(e) => Some(Err(e)),
        }
    }
}

impl FusedIterator for EventPages<'_> {}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use stackpilot_remote::{EventPage, MockControlPlane};
    use stackpilot_schema::{ResourceStatus, StackDefinition, StackDescription};

    fn event(secs: i64) -> StackEvent {
        StackEvent {
            resource_status: ResourceStatus::UpdateComplete,
            resource_type: "AWS::SQS::Queue".to_owned(),
            logical_resource_id: Some("Queue".to_owned()),
            resource_status_reason: None,
            timestamp: Utc.timestamp_opt(secs, 0).unwrap(),
        }
    }

    #[test]
    fn walks_every_page_in_order() {
        let cp = MockControlPlane::new("s-1")
            .with_events(vec![event(5), event(4), event(3), event(2), event(1)])
            .with_page_size(2);
        let id = StackId::new("s-1");

        let pages: Vec<Vec<StackEvent>> = EventPages::new(&cp, &id)
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(pages.len(), 3);
        assert_eq!(pages[0], vec![event(5), event(4)]);
        assert_eq!(pages[2], vec![event(1)]);
        assert_eq!(cp.event_page_calls(), 3);
    }

    #[test]
    fn empty_log_yields_one_empty_page() {
        let cp = MockControlPlane::new("s-1");
        let id = StackId::new("s-1");
        let pages: Vec<_> = EventPages::new(&cp, &id).collect();
        assert_eq!(pages.len(), 1);
        assert!(pages[0].as_ref().unwrap().is_empty());
    }

    #[test]
    fn error_is_yielded_once_then_fused() {
        let cp = MockControlPlane::new("s-1").failing_event_fetch("connection reset");
        let id = StackId::new("s-1");
        let mut pages = EventPages::new(&cp, &id);
        assert!(matches!(pages.next(), Some(Err(RemoteError::Http(_)))));
        assert!(pages.next().is_none());
        assert!(pages.next().is_none());
        assert_eq!(cp.event_page_calls(), 1);
    }

    struct EmptyTokenPlane;

    impl ControlPlane for EmptyTokenPlane {
        fn submit_create(&self, _: &StackDefinition) -> Result<StackId, RemoteError> {
            Err(RemoteError::Http("unused".to_owned()))
        }
        fn submit_update(&self, _: &StackId, _: &StackDefinition) -> Result<(), RemoteError> {
            Err(RemoteError::Http("unused".to_owned()))
        }
        fn submit_delete(&self, _: &StackId) -> Result<(), RemoteError> {
            Err(RemoteError::Http("unused".to_owned()))
        }
        fn describe_stack(&self, _: &StackId) -> Result<Option<StackDescription>, RemoteError> {
            Ok(None)
        }
        fn fetch_event_page(
            &self,
            _: &StackId,
            _: Option<&str>,
        ) -> Result<EventPage, RemoteError> {
            Ok(EventPage {
                events: vec![event(1)],
                next_token: Some(String::new()),
            })
        }
    }

    #[test]
    fn empty_next_token_ends_the_walk() {
        let id = StackId::new("s-1");
        assert_eq!(EventPages::new(&EmptyTokenPlane, &id).count(), 1);
    }
}
