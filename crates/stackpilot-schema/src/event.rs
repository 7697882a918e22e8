use crate::status::{ResourceStatus, StackStatus};
use crate::types::{StackId, StackName};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Resource type the control plane records stack-level transitions under.
pub const STACK_RESOURCE_TYPE: &str = "AWS::CloudFormation::Stack";

/// One entry of a stack's append-only event log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackEvent {
    pub resource_status: ResourceStatus,
    pub resource_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logical_resource_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_status_reason: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl StackEvent {
    /// The status reason, if present and non-empty.
    pub fn reason(&self) -> Option<&str> {
        self.resource_status_reason
            .as_deref()
            .filter(|r| !r.is_empty())
    }

    pub fn is_stack_resource(&self) -> bool {
        self.resource_type == STACK_RESOURCE_TYPE
    }
}

/// A single stack as returned by a status lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackDescription {
    pub stack_id: StackId,
    pub stack_name: StackName,
    pub stack_status: StackStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack_status_reason: Option<String>,
    /// Timestamp of the newest event recorded for the stack, when the
    /// control plane reports it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_event_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub outputs: BTreeMap<String, String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn event(status: ResourceStatus, reason: Option<&str>) -> StackEvent {
        StackEvent {
            resource_status: status,
            resource_type: "AWS::S3::Bucket".to_owned(),
            logical_resource_id: Some("Bucket".to_owned()),
            resource_status_reason: reason.map(str::to_owned),
            timestamp: Utc.timestamp_opt(100, 0).unwrap(),
        }
    }

    #[test]
    fn empty_reason_counts_as_absent() {
        assert_eq!(event(ResourceStatus::CreateFailed, Some("")).reason(), None);
        assert_eq!(event(ResourceStatus::CreateFailed, None).reason(), None);
        assert_eq!(
            event(ResourceStatus::CreateFailed, Some("limit exceeded")).reason(),
            Some("limit exceeded")
        );
    }

    #[test]
    fn stack_resource_detection() {
        let mut e = event(ResourceStatus::DeleteInProgress, None);
        assert!(!e.is_stack_resource());
        e.resource_type = STACK_RESOURCE_TYPE.to_owned();
        assert!(e.is_stack_resource());
    }

    #[test]
    fn event_deserializes_from_wire_json() {
        let json = r#"{
            "resource_status": "CREATE_FAILED",
            "resource_type": "AWS::EC2::Instance",
            "resource_status_reason": "Resource X limit exceeded",
            "timestamp": "2024-05-01T12:00:00Z"
        }"#;
        let e: StackEvent = serde_json::from_str(json).unwrap();
        assert_eq!(e.resource_status, ResourceStatus::CreateFailed);
        assert_eq!(e.reason(), Some("Resource X limit exceeded"));
        assert_eq!(e.logical_resource_id, None);
    }

    #[test]
    fn description_rejects_unknown_status() {
        let json = r#"{
            "stack_id": "s-1",
            "stack_name": "web",
            "stack_status": "HALF_DONE"
        }"#;
        assert!(serde_json::from_str::<StackDescription>(json).is_err());
    }
}
