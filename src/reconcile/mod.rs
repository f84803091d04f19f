//! # Reconciler
//!
//! Turns a [`CommandIntent`] into gateway calls and an [`Outcome`].
//!
//! Updates are partial: the user's patch is resolved against a fresh
//! snapshot of the remote record and only the fields that differ are sent,
//! guarded by the snapshot's revision. When the record moved underneath us
//! the patch is resolved again against the new state, once. Anything beyond
//! that is a conflict for the user to look at.

mod error;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::domain::{CommandIntent, Field, Item, ItemId, ItemPatch, ListFilter};
use crate::gateway::{Gateway, GatewayError};

pub use error::{ErrorKind, ReconcileError};

/// Times a patch is re-resolved after the remote record changed mid-update
pub const MAX_REAPPLY: usize = 1;

/// A remote record left out of a listing because it failed validation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Rejection {
    pub id: String,
    pub reason: String,
}

/// Result of executing one intent
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Created(Item),
    Listed {
        items: Vec<Item>,
        rejected: Vec<Rejection>,
    },
    Shown(Item),
    Updated {
        item: Item,
        changed: Vec<Field>,
    },
    /// The patch matched the remote state; nothing was written
    Unchanged(Item),
    Deleted(ItemId),
}

pub struct Reconciler<G> {
    gateway: G,
}

impl<G: Gateway> Reconciler<G> {
    pub fn new(gateway: G) -> Self {
        Self { gateway }
    }

    pub fn gateway(&self) -> &G {
        &self.gateway
    }

    pub fn execute(&self, intent: CommandIntent) -> Result<Outcome, ReconcileError> {
        debug!(command = intent.verb(), "executing");

        match intent {
            CommandIntent::Create(item) => {
                let created = self.gateway.create(&item)?;
                info!(id = %display_id(&created), "created item");
                Ok(Outcome::Created(created))
            }
            CommandIntent::List(filter) => self.list(&filter),
            CommandIntent::Show(id) => Ok(Outcome::Shown(self.gateway.fetch(&id)?)),
            CommandIntent::Update { id, patch } => self.update(&id, &patch),
            CommandIntent::Delete(id) => {
                self.gateway.delete(&id)?;
                info!(id = %id, "deleted item");
                Ok(Outcome::Deleted(id))
            }
        }
    }

    fn list(&self, filter: &ListFilter) -> Result<Outcome, ReconcileError> {
        let mut items = Vec::new();
        let mut rejected = Vec::new();

        for record in self.gateway.list(filter) {
            match record {
                Ok(item) => items.push(item),
                Err(GatewayError::InvalidRecord { id, source }) => {
                    warn!(id = %id, error = %source, "skipping invalid remote record");
                    rejected.push(Rejection {
                        id,
                        reason: source.to_string(),
                    });
                }
                Err(err) => return Err(err.into()),
            }
        }

        info!(items = items.len(), rejected = rejected.len(), "listed items");
        Ok(Outcome::Listed { items, rejected })
    }

    fn update(&self, id: &ItemId, patch: &ItemPatch) -> Result<Outcome, ReconcileError> {
        let mut snapshot = self.gateway.fetch(id)?;
        let mut reapplied = 0;

        loop {
            let changes = patch.resolve(&snapshot).map_err(|field| ReconcileError::Conflict {
                id: id.to_string(),
                reason: format!("the remote record has no {} field", field),
            })?;

            if changes.is_empty() {
                info!(id = %id, "remote record already matches");
                return Ok(Outcome::Unchanged(snapshot));
            }

            match self.gateway.update(id, &changes, snapshot.revision.as_ref()) {
                Ok(item) => {
                    let changed = changes.fields();
                    info!(id = %id, fields = ?changed, "updated item");
                    return Ok(Outcome::Updated { item, changed });
                }
                Err(GatewayError::Stale(_)) if reapplied < MAX_REAPPLY => {
                    reapplied += 1;
                    warn!(id = %id, "item changed remotely, reapplying changes");
                    snapshot = match self.gateway.fetch(id) {
                        Ok(fresh) => fresh,
                        Err(GatewayError::NotFound(_)) => {
                            return Err(ReconcileError::Conflict {
                                id: id.to_string(),
                                reason: "the item was deleted remotely during the update".into(),
                            })
                        }
                        Err(err) => return Err(err.into()),
                    };
                }
                Err(GatewayError::Stale(_)) => {
                    return Err(ReconcileError::Conflict {
                        id: id.to_string(),
                        reason: "the item keeps changing remotely; nothing was written".into(),
                    })
                }
                Err(err) => return Err(err.into()),
            }
        }
    }
}

fn display_id(item: &Item) -> String {
    item.id.as_ref().map(ItemId::to_string).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ItemStatus, RawPatch, Tags, ValidationError};
    use crate::gateway::{InMemoryGateway, Operation};
    use chrono::NaiveDate;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 15).unwrap()
    }

    fn patch(raw: RawPatch) -> ItemPatch {
        raw.validate(today()).unwrap()
    }

    #[test]
    fn update_without_differences_writes_nothing() {
        let gateway = InMemoryGateway::new();
        let id = gateway.seed(&Item::draft("Same")).id.unwrap();
        let reconciler = Reconciler::new(&gateway);

        let outcome = reconciler
            .execute(CommandIntent::Update {
                id,
                patch: patch(RawPatch {
                    status: Some("open".into()),
                    ..RawPatch::default()
                }),
            })
            .unwrap();

        assert!(matches!(outcome, Outcome::Unchanged(_)));
        assert_eq!(gateway.calls(Operation::Update), 0);
    }

    #[test]
    fn stale_update_is_reapplied_once() {
        let gateway = InMemoryGateway::new();
        let id = gateway.seed(&Item::draft("Race")).id.unwrap();
        gateway.before_next_update(|item| item.tags = Tags::parse(["theirs"]).unwrap());

        let outcome = Reconciler::new(&gateway)
            .execute(CommandIntent::Update {
                id: id.clone(),
                patch: patch(RawPatch {
                    title: Some("Mine".into()),
                    ..RawPatch::default()
                }),
            })
            .unwrap();

        match outcome {
            Outcome::Updated { item, changed } => {
                assert_eq!(item.title, "Mine");
                assert!(item.tags.contains("theirs"));
                assert_eq!(changed, vec![Field::Title]);
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert_eq!(gateway.calls(Operation::Update), 2);
        assert_eq!(gateway.calls(Operation::Fetch), 2);
    }

    #[test]
    fn second_stale_is_a_conflict() {
        let gateway = InMemoryGateway::new();
        let id = gateway.seed(&Item::draft("Busy")).id.unwrap();
        gateway.fail_next(Operation::Update, GatewayError::Stale(id.to_string()));
        gateway.fail_next(Operation::Update, GatewayError::Stale(id.to_string()));

        let err = Reconciler::new(&gateway)
            .execute(CommandIntent::Update {
                id: id.clone(),
                patch: patch(RawPatch {
                    status: Some("done".into()),
                    ..RawPatch::default()
                }),
            })
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Conflict);
        assert_eq!(gateway.snapshot(&id).unwrap().status, ItemStatus::Open);
    }

    #[test]
    fn deletion_during_update_is_a_conflict() {
        let gateway = InMemoryGateway::new();
        let id = gateway.seed(&Item::draft("Vanishing")).id.unwrap();
        gateway.delete_before_next_update();

        let err = Reconciler::new(&gateway)
            .execute(CommandIntent::Update {
                id,
                patch: patch(RawPatch {
                    title: Some("Renamed".into()),
                    ..RawPatch::default()
                }),
            })
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Conflict);
        assert!(err.to_string().contains("deleted remotely"));
    }

    #[test]
    fn missing_item_is_not_found() {
        let gateway = InMemoryGateway::new();
        let id: ItemId = "nope".parse().unwrap();

        let err = Reconciler::new(&gateway)
            .execute(CommandIntent::Show(id))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn listing_reports_invalid_records() {
        let gateway = InMemoryGateway::new();
        gateway.seed(&Item::draft("Fine"));
        let bad = gateway.seed(&Item::draft("Broken")).id.unwrap();
        gateway.mark_invalid(&bad, ValidationError::UnknownStatus("Someday".into()));

        match Reconciler::new(&gateway)
            .execute(CommandIntent::List(ListFilter::default()))
            .unwrap()
        {
            Outcome::Listed { items, rejected } => {
                assert_eq!(items.len(), 1);
                assert_eq!(rejected.len(), 1);
                assert_eq!(rejected[0].id, bad.to_string());
                assert!(rejected[0].reason.contains("Someday"));
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[test]
    fn listing_failure_is_surfaced() {
        let gateway = InMemoryGateway::new();
        gateway.fail_next(
            Operation::Query,
            GatewayError::Rejected {
                status: 401,
                message: "unauthorized".into(),
            },
        );

        let err = Reconciler::new(&gateway)
            .execute(CommandIntent::List(ListFilter::open()))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Rejected);
    }
}
