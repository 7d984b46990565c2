//! Stack outputs: values the plan exposes to its caller.
//!
//! Most outputs (VPC id, cluster name, role ARN, kubeconfig) do not
//! exist until the engine has applied the plan, so an export usually
//! carries an [`AttributeRef`] rather than a value. Command exports
//! interpolate resolved attributes into a CLI template at apply time.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::graph::AttributeRef;

/// The value an export resolves to.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ExportValue {
    /// A value known at plan time.
    Literal(String),
    /// A provisioning-time output of one resource.
    Attribute(AttributeRef),
    /// A command template whose `{}` placeholders are filled with
    /// resolved attributes, in order.
    Command {
        /// Template with one `{}` per argument.
        template: String,
        /// Attributes interpolated into the template.
        arguments: Vec<AttributeRef>,
    },
}

/// One named stack output.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Export {
    /// Output name, unique within the plan.
    pub name: String,
    /// What the output resolves to.
    pub value: ExportValue,
    /// Whether the resolved value is sensitive and must be masked.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub secret: bool,
}

impl Export {
    /// Export a plan-time literal.
    pub fn literal(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: ExportValue::Literal(value.into()),
            secret: false,
        }
    }

    /// Export a resource attribute.
    pub fn attribute(name: impl Into<String>, attribute: AttributeRef) -> Self {
        Self {
            name: name.into(),
            value: ExportValue::Attribute(attribute),
            secret: false,
        }
    }

    /// Export a sensitive resource attribute, masked by the engine.
    pub fn secret_attribute(name: impl Into<String>, attribute: AttributeRef) -> Self {
        Self {
            name: name.into(),
            value: ExportValue::Attribute(attribute),
            secret: true,
        }
    }

    /// Export a command derived from resolved attributes.
    pub fn command(
        name: impl Into<String>,
        template: impl Into<String>,
        arguments: Vec<AttributeRef>,
    ) -> Self {
        Self {
            name: name.into(),
            value: ExportValue::Command {
                template: template.into(),
                arguments,
            },
            secret: false,
        }
    }

    /// Attributes this export needs resolved.
    pub fn attribute_refs(&self) -> Vec<&AttributeRef> {
        match &self.value {
            ExportValue::Literal(_) => Vec::new(),
            ExportValue::Attribute(attr) => vec![attr],
            ExportValue::Command { arguments, .. } => arguments.iter().collect(),
        }
    }

    /// Validate the export.
    pub fn validate(&self) -> Result<()> {
        let resource = format!("export/{}", self.name);
        if self.name.is_empty() {
            return Err(Error::validation(resource, "export name must not be empty"));
        }
        match &self.value {
            ExportValue::Literal(_) => {
                // A secret literal would put the sensitive value into the
                // plan itself. Sensitive exports must be attribute refs.
                if self.secret {
                    return Err(Error::validation(
                        resource,
                        "secret exports must reference a resource attribute, not a literal",
                    ));
                }
            }
            ExportValue::Attribute(_) => {}
            ExportValue::Command {
                template,
                arguments,
            } => {
                let placeholders = template.matches("{}").count();
                if placeholders != arguments.len() {
                    return Err(Error::validation(
                        resource,
                        format!(
                            "command template has {} placeholders but {} arguments",
                            placeholders,
                            arguments.len()
                        ),
                    ));
                }
            }
        }
        Ok(())
    }
}
