//! Shared validation error for configuration sections.

use thiserror::Error;

/// A single invalid or missing configuration field.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FieldError {
    #[error("\"{0}\" is required")]
    Missing(&'static str),

    #[error("\"{field}\" {reason}")]
    Invalid { field: &'static str, reason: String },
}

impl FieldError {
    pub fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            field,
            reason: reason.into(),
        }
    }

    /// Name of the offending field.
    pub fn field(&self) -> &'static str {
        match self {
            Self::Missing(field) | Self::Invalid { field, .. } => field,
        }
    }
}
