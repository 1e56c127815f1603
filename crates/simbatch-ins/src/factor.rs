use crate::{InsError, ParsedFile};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// A single override applied to a template instruction file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Factor {
    TopLevel {
        name: String,
        value: String,
    },
    /// A block-scoped parameter. Without a `block_type` the block is looked
    /// up by name alone.
    Block {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        block_type: Option<String>,
        block: String,
        parameter: String,
        value: String,
    },
    Composite {
        factors: Vec<Factor>,
    },
}

impl Factor {
    /// Builds a factor from a `name` or `block.name` key.
    pub fn parse(name: &str, value: impl Into<String>) -> Result<Self, InsError> {
        let value = value.into();
        let parts: Vec<&str> = name.split('.').collect();
        match parts.as_slice() {
            [name] if !name.is_empty() => Ok(Factor::TopLevel {
                name: name.to_string(),
                value,
            }),
            [block, parameter] if !block.is_empty() && !parameter.is_empty() => {
                Ok(Factor::Block {
                    block_type: None,
                    block: block.to_string(),
                    parameter: parameter.to_string(),
                    value,
                })
            }
            _ => Err(InsError::MalformedFactorName {
                name: name.to_string(),
            }),
        }
    }

    pub fn block(kind: &str, block: &str, parameter: &str, value: impl Into<String>) -> Self {
        Factor::Block {
            block_type: Some(kind.to_string()),
            block: block.to_string(),
            parameter: parameter.to_string(),
            value: value.into(),
        }
    }

    /// The `name` or `block.name` key of a leaf factor; composites join their
    /// members' keys with `+`.
    pub fn key(&self) -> String {
        match self {
            Factor::TopLevel { name, .. } => name.clone(),
            Factor::Block {
                block, parameter, ..
            } => format!("{block}.{parameter}"),
            Factor::Composite { factors } => factors
                .iter()
                .map(Factor::key)
                .collect::<Vec<_>>()
                .join("+"),
        }
    }

    /// `key_short`, where the short form keeps numbers verbatim and reduces
    /// anything else to a file stem.
    pub fn label(&self) -> String {
        match self {
            Factor::TopLevel { value, .. } | Factor::Block { value, .. } => {
                format!("{}_{}", self.key(), short_value(value))
            }
            Factor::Composite { factors } => factors
                .iter()
                .map(Factor::label)
                .collect::<Vec<_>>()
                .join("-"),
        }
    }

    pub fn apply(&self, file: &mut ParsedFile) -> Result<(), InsError> {
        match self {
            Factor::TopLevel { name, value } => {
                file.set_top_level_parameter_value(name, value);
                Ok(())
            }
            Factor::Block {
                block_type: Some(kind),
                block,
                parameter,
                value,
            } => file.set_block_parameter_value(kind, block, parameter, value),
            Factor::Block {
                block_type: None,
                block,
                parameter,
                value,
            } => file.set_block_parameter_by_name(block, parameter, value),
            Factor::Composite { factors } => {
                factors.iter().try_for_each(|factor| factor.apply(file))
            }
        }
    }
}

fn short_value(value: &str) -> String {
    if value.trim().parse::<f64>().is_ok() {
        return value.trim().to_string();
    }
    let unquoted = value.trim().trim_matches('"');
    Path::new(unquoted)
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| unquoted.to_string())
}
