//! Reconciler errors and their process exit codes

use thiserror::Error;

use crate::domain::ValidationError;
use crate::gateway::GatewayError;

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error("conflict on {id}: {reason}")]
    Conflict { id: String, reason: String },
}

impl ReconcileError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ReconcileError::Validation(_) => ErrorKind::Validation,
            ReconcileError::Gateway(err) => ErrorKind::from(err),
            ReconcileError::Conflict { .. } => ErrorKind::Conflict,
        }
    }
}

/// Error categories surfaced to the user
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    NotFound,
    RateLimited,
    Transport,
    Conflict,
    Rejected,
    Config,
    Interrupted,
    Other,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation",
            ErrorKind::NotFound => "not_found",
            ErrorKind::RateLimited => "rate_limited",
            ErrorKind::Transport => "transport",
            ErrorKind::Conflict => "conflict",
            ErrorKind::Rejected => "rejected",
            ErrorKind::Config => "config",
            ErrorKind::Interrupted => "interrupted",
            ErrorKind::Other => "error",
        }
    }

    pub fn exit_code(&self) -> u8 {
        match self {
            ErrorKind::Other | ErrorKind::Rejected | ErrorKind::Config => 1,
            ErrorKind::Validation => 2,
            ErrorKind::NotFound => 3,
            ErrorKind::RateLimited => 4,
            ErrorKind::Transport => 5,
            ErrorKind::Conflict => 6,
            ErrorKind::Interrupted => 130,
        }
    }
}

impl From<&GatewayError> for ErrorKind {
    fn from(err: &GatewayError) -> Self {
        match err {
            GatewayError::NotFound(_) => ErrorKind::NotFound,
            GatewayError::RateLimited { .. } => ErrorKind::RateLimited,
            GatewayError::Transport(_) => ErrorKind::Transport,
            // Stale only escapes the reconciler through a conflict
            GatewayError::Stale(_) => ErrorKind::Conflict,
            GatewayError::InvalidRecord { .. } => ErrorKind::Validation,
            GatewayError::Rejected { .. } | GatewayError::Decode(_) => ErrorKind::Rejected,
            GatewayError::Interrupted => ErrorKind::Interrupted,
        }
    }
}
