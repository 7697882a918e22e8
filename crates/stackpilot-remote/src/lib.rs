//! Control-plane access for the stackpilot lifecycle engine.
//!
//! This crate defines the [`ControlPlane`] trait the engine drives (submit
//! create/update/delete, describe a stack, fetch one event-log page), the
//! [`RemoteError`] taxonomy, an HTTP implementation backed by `ureq`, a
//! scripted in-memory implementation for tests, and endpoint configuration.

pub mod config;
pub mod http;
pub mod mock;

pub use config::RemoteConfig;
pub use http::HttpControlPlane;
pub use mock::{DescribeReply, MockControlPlane, MockFailure};

use serde::{Deserialize, Serialize};
use stackpilot_schema::{StackDefinition, StackDescription, StackEvent, StackId};
use thiserror::Error;

/// Protocol version sent as `X-Stackpilot-Protocol` header on all HTTP requests.
pub const PROTOCOL_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("remote I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("HTTP error: {0}")]
    Http(String),
    #[error("{code}: {message}")]
    Api { code: String, message: String },
    #[error("stack does not exist: {0}")]
    StackNotFound(String),
    #[error("no updates are to be performed")]
    NoChanges,
    #[error("serialization error: {0}")]
    Serialization(String),
    #[error("remote config error: {0}")]
    Config(String),
}

/// One page of a stack's event log, newest event first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventPage {
    pub events: Vec<StackEvent>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_token: Option<String>,
}

/// Capabilities of the remote control plane consumed by the engine.
///
/// Implementations translate provider-specific rejections into the structured
/// [`RemoteError::StackNotFound`] and [`RemoteError::NoChanges`] variants;
/// callers never inspect error messages.
pub trait ControlPlane: Send + Sync {
    /// Submit a create. Returns the id assigned to the new stack.
    fn submit_create(&self, definition: &StackDefinition) -> Result<StackId, RemoteError>;

    /// Submit an update of an existing stack.
    fn submit_update(
        &self,
        stack_id: &StackId,
        definition: &StackDefinition,
    ) -> Result<(), RemoteError>;

    /// Submit a delete.
    fn submit_delete(&self, stack_id: &StackId) -> Result<(), RemoteError>;

    /// Look up a stack. `Ok(None)` means the control plane returned zero stacks.
    fn describe_stack(&self, stack_id: &StackId) -> Result<Option<StackDescription>, RemoteError>;

    /// Fetch one page of the event log. `None` requests the newest page.
    fn fetch_event_page(
        &self,
        stack_id: &StackId,
        page_token: Option<&str>,
    ) -> Result<EventPage, RemoteError>;
}

/// Map a structured provider rejection to the error the engine reasons about.
///
/// This is the only place provider error codes and messages are interpreted.
pub fn translate_api_error(code: &str, message: &str) -> RemoteError {
    if code == "ValidationError" {
        if message == "No updates are to be performed." {
            return RemoteError::NoChanges;
        }
        if message.contains("does not exist") {
            return RemoteError::StackNotFound(message.to_owned());
        }
    }
    if code == "StackNotFound" {
        return RemoteError::StackNotFound(message.to_owned());
    }
    RemoteError::Api {
        code: code.to_owned(),
        message: message.to_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_updates_message_becomes_no_changes() {
        assert!(matches!(
            translate_api_error("ValidationError", "No updates are to be performed."),
            RemoteError::NoChanges
        ));
    }

    #[test]
    fn missing_stack_message_becomes_not_found() {
        let err = translate_api_error("ValidationError", "Stack with id s-1 does not exist");
        assert!(matches!(err, RemoteError::StackNotFound(ref m) if m.contains("s-1")));
        assert!(matches!(
            translate_api_error("StackNotFound", "gone"),
            RemoteError::StackNotFound(_)
        ));
    }

    #[test]
    fn other_validation_errors_stay_structured() {
        let err = translate_api_error("ValidationError", "Template format error");
        match err {
            RemoteError::Api { code, message } => {
                assert_eq!(code, "ValidationError");
                assert_eq!(message, "Template format error");
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn api_error_display_is_code_and_message() {
        let err = RemoteError::Api {
            code: "Throttling".to_owned(),
            message: "Rate exceeded".to_owned(),
        };
        assert_eq!(err.to_string(), "Throttling: Rate exceeded");
    }

    #[test]
    fn event_page_without_token_deserializes() {
        let page: EventPage = serde_json::from_str(r#"{"events": []}"#).unwrap();
        assert!(page.events.is_empty());
        assert_eq!(page.next_token, None);
    }
}
