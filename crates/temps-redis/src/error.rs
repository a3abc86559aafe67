//! Error types for the Redis plugin

use std::fmt;

use temps_core::PluginError;
use thiserror::Error;

use crate::options::DecorationKind;

/// One offending field in the plugin options
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    /// Location of the field, e.g. `[1].decorate`
    pub path: String,
    pub message: String,
}

impl FieldError {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.path.is_empty() {
            write!(f, "options {}", self.message)
        } else {
            write!(f, "{} {}", self.path, self.message)
        }
    }
}

fn join_fields(fields: &[FieldError]) -> String {
    fields
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

fn join_kinds(kinds: &[DecorationKind]) -> String {
    kinds
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Errors that abort plugin registration
#[derive(Error, Debug)]
pub enum RedisPluginError {
    #[error("Invalid redis plugin options: {}", join_fields(.fields))]
    Validation { fields: Vec<FieldError> },

    #[error("You cannot mix different types of decorate options (found {})", join_kinds(.kinds))]
    Consistency { kinds: Vec<DecorationKind> },

    #[error("Failed to connect to {target}: {source:#}")]
    Connection {
        /// Redacted description of the target
        target: String,
        #[source]
        source: anyhow::Error,
    },

    #[error(transparent)]
    Decoration(#[from] PluginError),
}

impl RedisPluginError {
    /// Offending fields of a validation error, empty otherwise
    pub fn fields(&self) -> &[FieldError] {
        match self {
            RedisPluginError::Validation { fields } => fields,
            _ => &[],
        }
    }
}
