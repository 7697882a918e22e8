//! Data model for the stackpilot lifecycle engine.
//!
//! This crate defines the schema layer: stack identifiers (`StackId`,
//! `StackName`), the closed status vocabularies reported by the control plane
//! (`StackStatus`, `ResourceStatus`), event-log records (`StackEvent`), stack
//! descriptions, and TOML stack definition files (`StackDefinition`).

pub mod definition;
pub mod event;
pub mod status;
pub mod types;

pub use definition::{
    parse_definition_file, parse_definition_str, validate_stack_name, DefinitionError,
    StackDefinition,
};
pub use event::{StackDescription, StackEvent, STACK_RESOURCE_TYPE};
pub use status::{OperationKind, ResourceStatus, StackStatus, StatusParseError};
pub use types::{StackId, StackIdentity, StackName};
