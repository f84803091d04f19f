//! Validation errors for raw input
//!
//! Every variant names the field it rejects so the CLI can point the user
//! at the offending flag.

use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("title: must not be empty")]
    EmptyTitle,

    #[error("title: longer than {max} characters")]
    TitleTooLong { max: usize },

    #[error("status: unknown value '{0}' (expected open, done or archived)")]
    UnknownStatus(String),

    #[error("due: cannot parse '{0}' as a date (expected YYYY-MM-DD, today, tomorrow or +Nd)")]
    MalformedDate(String),

    #[error("due: cannot both set and clear the due date")]
    DueSetAndCleared,

    #[error("tags: {0}")]
    InvalidTag(String),

    #[error("id: must not be empty")]
    EmptyId,

    #[error("id: '{0}' is not a valid identifier")]
    MalformedId(String),

    #[error("id: prefix '{prefix}' matches {count} items")]
    AmbiguousId { prefix: String, count: usize },

    #[error("id: required when not running in a terminal")]
    IdRequired,

    #[error("patch: no fields to change")]
    EmptyPatch,
}

impl ValidationError {
    /// Name of the field this error rejects
    pub fn field(&self) -> &'static str {
        match self {
            ValidationError::EmptyTitle | ValidationError::TitleTooLong { .. } => "title",
            ValidationError::UnknownStatus(_) => "status",
            ValidationError::MalformedDate(_) | ValidationError::DueSetAndCleared => "due",
            ValidationError::InvalidTag(_) => "tags",
            ValidationError::EmptyId
            | ValidationError::MalformedId(_)
            | ValidationError::AmbiguousId { .. }
            | ValidationError::IdRequired => "id",
            ValidationError::EmptyPatch => "patch",
        }
    }
}
