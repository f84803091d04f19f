//! life - manage personal items stored in a Notion database
//!
//! Commands map onto a remote database through four layers:
//!
//! - [`domain`] - validated items, patches and intents, no I/O
//! - [`gateway`] - the remote service behind a narrow trait, with retry
//! - [`reconcile`] - partial updates and conflict detection
//! - [`cli`] - argument parsing, rendering and per-run wiring
//!
//! [`storage`] holds the configuration file and the optional local mirror.

pub mod cli;
pub mod domain;
pub mod gateway;
pub mod reconcile;
pub mod storage;

pub use domain::{CommandIntent, Item, ItemId, ItemPatch, ItemStatus, ListFilter};
pub use gateway::{Gateway, GatewayError};
pub use reconcile::{ErrorKind, Outcome, ReconcileError, Reconciler};

/// Classifies a command failure for reporting and the exit code
pub fn error_kind(err: &anyhow::Error) -> ErrorKind {
    for cause in err.chain() {
        if let Some(err) = cause.downcast_ref::<ReconcileError>() {
            return err.kind();
        }
        if cause.is::<domain::ValidationError>() {
            return ErrorKind::Validation;
        }
        if let Some(err) = cause.downcast_ref::<GatewayError>() {
            return ErrorKind::from(err);
        }
        if cause.is::<storage::ConfigError>() {
            return ErrorKind::Config;
        }
    }
    ErrorKind::Other
}
