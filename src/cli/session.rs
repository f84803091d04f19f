//! Per-invocation wiring: configuration, gateway stack and mirror

use std::path::PathBuf;

use anyhow::{Context, Result};
use tracing::{debug, warn};

use crate::domain::{ItemId, ValidationError};
use crate::gateway::{Interrupt, NotionGateway, Retrying, ThreadSleeper};
use crate::reconcile::{Outcome, ReconcileError, Reconciler};
use crate::storage::{Config, ConfigError, Mirror, PrefixMatch};

pub type RemoteGateway = Retrying<NotionGateway, ThreadSleeper>;

/// Global options shared by every remote command
#[derive(Debug, Clone, Default)]
pub struct GlobalArgs {
    pub config: Option<PathBuf>,
    pub secret: Option<String>,
}

impl GlobalArgs {
    pub fn config_path(&self) -> Result<PathBuf, ConfigError> {
        self.config
            .clone()
            .or_else(Config::default_path)
            .ok_or(ConfigError::NoConfigDir)
    }
}

pub struct Session {
    reconciler: Reconciler<RemoteGateway>,
    mirror: Option<Mirror>,
}

impl Session {
    /// Loads the configuration and connects to the remote database
    pub fn open(args: &GlobalArgs) -> Result<Self> {
        let path = args.config_path()?;
        debug!(path = %path.display(), "loading configuration");
        let config = Config::load(&path)?;
        let secret = config.secret(args.secret.as_deref())?;

        let notion = NotionGateway::new(
            &secret,
            &config.api,
            &config.database,
            config.properties.clone(),
            config.statuses.clone(),
        )
        .context("Failed to set up the Notion client")?;

        let interrupt = Interrupt::install().unwrap_or_else(|err| {
            warn!(error = %err, "could not install the Ctrl-C handler");
            Interrupt::new()
        });
        let gateway = Retrying::new(notion, config.retry.policy(), ThreadSleeper::new(interrupt));

        let mirror = config.mirror.resolved_path().and_then(|path| {
            Mirror::open(&path)
                .map_err(|err| warn!(path = %path.display(), error = %err, "mirror unavailable"))
                .ok()
        });

        Ok(Self {
            reconciler: Reconciler::new(gateway),
            mirror,
        })
    }

    pub fn reconciler(&self) -> &Reconciler<RemoteGateway> {
        &self.reconciler
    }

    /// Expands an abbreviated id using the mirror
    ///
    /// Ids the mirror does not know are used as typed.
    pub fn resolve_id(&self, id: ItemId) -> Result<ItemId, ReconcileError> {
        resolve_id(self.mirror.as_ref(), id)
    }

    /// Records the result of a command in the mirror
    pub fn remember(&mut self, outcome: &Outcome, complete_listing: bool) {
        if let Some(mirror) = self.mirror.as_mut() {
            remember(mirror, outcome, complete_listing);
        }
    }

    /// Drops an item the remote service reported missing
    pub fn forget(&self, id: &ItemId) {
        forget(self.mirror.as_ref(), id);
    }

    /// Opens the mirror on its own, for offline commands
    pub fn offline_mirror(args: &GlobalArgs) -> Result<Mirror> {
        let path = args.config_path()?;
        let config = Config::load(&path)?;
        let mirror_path = config
            .mirror
            .resolved_path()
            .ok_or_else(|| anyhow::anyhow!("The local mirror is disabled in {}", path.display()))?;
        Mirror::open(&mirror_path)
            .with_context(|| format!("Failed to open mirror: {}", mirror_path.display()))
    }
}

pub(crate) fn resolve_id(mirror: Option<&Mirror>, id: ItemId) -> Result<ItemId, ReconcileError> {
    let mirror = match mirror {
        Some(mirror) => mirror,
        None => return Ok(id),
    };

    match mirror.resolve_prefix(id.as_str()) {
        Ok(PrefixMatch::Unique(full)) => {
            if full != id {
                debug!(prefix = %id, id = %full, "expanded id prefix");
            }
            Ok(full)
        }
        Ok(PrefixMatch::Ambiguous(count)) => Err(ValidationError::AmbiguousId {
            prefix: id.to_string(),
            count,
        }
        .into()),
        Ok(PrefixMatch::Unknown) => Ok(id),
        Err(err) => {
            warn!(error = %err, "mirror lookup failed");
            Ok(id)
        }
    }
}

pub(crate) fn remember(mirror: &mut Mirror, outcome: &Outcome, complete_listing: bool) {
    let result = match outcome {
        Outcome::Created(item)
        | Outcome::Shown(item)
        | Outcome::Unchanged(item)
        | Outcome::Updated { item, .. } => mirror.upsert(item),
        Outcome::Listed { items, .. } if complete_listing => mirror.replace_all(items),
        Outcome::Listed { items, .. } => mirror.upsert_all(items),
        Outcome::Deleted(id) => mirror.remove(id).map(|_| ()),
    };

    if let Err(err) = result {
        warn!(error = %err, "failed to update the local mirror");
    }
}

pub(crate) fn forget(mirror: Option<&Mirror>, id: &ItemId) {
    if let Some(mirror) = mirror {
        if let Err(err) = mirror.remove(id) {
            warn!(error = %err, "failed to update the local mirror");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Item;
    use crate::reconcile::ErrorKind;

    fn synced(id: &str, title: &str) -> Item {
        let mut item = Item::draft(title);
        item.id = Some(id.parse().unwrap());
        item
    }

    #[test]
    fn ids_pass_through_without_mirror() {
        let id: ItemId = "abcd".parse().unwrap();
        assert_eq!(resolve_id(None, id.clone()).unwrap(), id);
    }

    #[test]
    fn prefixes_expand_through_mirror() {
        let mut mirror = Mirror::in_memory().unwrap();
        mirror
            .upsert_all(&[
                synced("5e6f7081-aaaa", "First"),
                synced("5e6f9999-bbbb", "Second"),
            ])
            .unwrap();

        let full = resolve_id(Some(&mirror), "5e6f70".parse().unwrap()).unwrap();
        assert_eq!(full.as_str(), "5e6f7081-aaaa");

        let err = resolve_id(Some(&mirror), "5e6f".parse().unwrap()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);

        let unknown = resolve_id(Some(&mirror), "0000dead".parse().unwrap()).unwrap();
        assert_eq!(unknown.as_str(), "0000dead");
    }

    #[test]
    fn outcomes_update_the_mirror() {
        let mut mirror = Mirror::in_memory().unwrap();
        let item = synced("cafe0001", "Kept");

        remember(&mut mirror, &Outcome::Created(item.clone()), false);
        assert_eq!(mirror.len().unwrap(), 1);

        let listed = Outcome::Listed {
            items: vec![synced("cafe0002", "Fresh")],
            rejected: Vec::new(),
        };
        remember(&mut mirror, &listed, false);
        assert_eq!(mirror.len().unwrap(), 2);

        remember(&mut mirror, &listed, true);
        assert_eq!(mirror.len().unwrap(), 1);

        remember(
            &mut mirror,
            &Outcome::Deleted("cafe0002".parse().unwrap()),
            false,
        );
        assert!(mirror.is_empty().unwrap());
    }
}
