use crate::types::StackName;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DefinitionError {
    #[error("failed to read stack definition: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse stack definition: {0}")]
    ParseToml(#[from] toml::de::Error),
    #[error("stack name must not be empty")]
    EmptyName,
    #[error("stack name '{0}' must match [a-zA-Z][a-zA-Z0-9-]* and be at most 128 characters")]
    InvalidName(String),
    #[error("exactly one of template_body or template_url must be set")]
    TemplateSource,
    #[error("at most one of policy_body or policy_url may be set")]
    PolicySource,
}

/// Declarative description of a stack, passed through to the control plane
/// on create and update. Template and policy documents are opaque text.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct StackDefinition {
    pub name: StackName,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template_body: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template_url: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub capabilities: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub parameters: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub tags: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub notification_arns: Vec<String>,
    #[serde(default)]
    pub disable_rollback: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_failure: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_in_minutes: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iam_role_arn: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub policy_body: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub policy_url: Option<String>,
}

impl StackDefinition {
    /// A definition with an inline template and every optional field unset.
    pub fn with_template_body(name: impl Into<StackName>, body: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            template_body: Some(body.into()),
            template_url: None,
            capabilities: Vec::new(),
            parameters: BTreeMap::new(),
            tags: BTreeMap::new(),
            notification_arns: Vec::new(),
            disable_rollback: false,
            on_failure: None,
            timeout_in_minutes: None,
            iam_role_arn: None,
            policy_body: None,
            policy_url: None,
        }
    }

    pub fn validate(&self) -> Result<(), DefinitionError> {
        validate_stack_name(&self.name)?;
        if self.template_body.is_some() == self.template_url.is_some() {
            return Err(DefinitionError::TemplateSource);
        }
        if self.policy_body.is_some() && self.policy_url.is_some() {
            return Err(DefinitionError::PolicySource);
        }
        Ok(())
    }
}

pub fn validate_stack_name(name: &str) -> Result<(), DefinitionError> {
    if name.is_empty() {
        return Err(DefinitionError::EmptyName);
    }
    let mut bytes = name.bytes();
    let starts_alpha = bytes.next().is_some_and(|b| b.is_ascii_alphabetic());
    if !starts_alpha
        || name.len() > 128
        || !bytes.all(|b| b.is_ascii_alphanumeric() || b == b'-')
    {
        return Err(DefinitionError::InvalidName(name.to_owned()));
    }
    Ok(())
}

pub fn parse_definition_str(input: &str) -> Result<StackDefinition, DefinitionError> {
    let definition: StackDefinition = toml::from_str(input)?;
    definition.validate()?;
    Ok(definition)
}

pub fn parse_definition_file(path: impl AsRef<Path>) -> Result<StackDefinition, DefinitionError> {
    let content = fs::read_to_string(path)?;
    parse_definition_str(&content)
}
