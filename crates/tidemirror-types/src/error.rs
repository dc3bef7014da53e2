//! Configuration errors.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use validator::{ValidationErrors, ValidationErrorsKind};

/// Errors raised while loading or validating the static mirror configuration.
#[derive(Debug, Clone, Error, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "details")]
pub enum ConfigError {
    /// Config file could not be read
    #[error("Failed to read config {path}: {message}")]
    Io {
        /// Path that was read
        path: String,
        /// Underlying I/O error
        message: String,
    },

    /// Config file is not valid JSON for the expected shape
    #[error("Failed to parse config {path}: {message}")]
    Parse {
        /// Path that was parsed
        path: String,
        /// Parser error with line/column
        message: String,
    },

    /// A field failed validation
    #[error("Validation error for {field}: {message}")]
    Validation {
        /// Dotted path of the offending field
        field: String,
        /// Description of the failure
        message: String,
    },
}

impl ConfigError {
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation { field: field.into(), message: message.into() }
    }
}

impl From<validator::ValidationErrors> for ConfigError {
    fn from(errors: validator::ValidationErrors) -> Self {
        first_failure("", &errors)
            .unwrap_or_else(|| Self::validation("config", "validation failed"))
    }
}

/// Walk nested validation errors and report the first failing field by dotted path.
fn first_failure(prefix: &str, errors: &ValidationErrors) -> Option<ConfigError> {
    for (field, kind) in errors.errors() {
        let path =
            if prefix.is_empty() { field.to_string() } else { format!("{}.{}", prefix, field) };
        match kind {
            ValidationErrorsKind::Field(failures) => {
                if let Some(failure) = failures.first() {
                    let message = failure
                        .message
                        .as_ref()
                        .map(|m| m.to_string())
                        .unwrap_or_else(|| format!("failed `{}` check", failure.code));
                    return Some(ConfigError::validation(path, message));
                }
            },
            ValidationErrorsKind::Struct(inner) => {
                if let Some(found) = first_failure(&path, inner) {
                    return Some(found);
                }
            },
            ValidationErrorsKind::List(items) => {
                for (idx, inner) in items {
                    if let Some(found) = first_failure(&format!("{}[{}]", path, idx), inner) {
                        return Some(found);
                    }
                }
            },
        }
    }
    None
}
