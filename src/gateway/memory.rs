//! In-memory gateway
//!
//! Stands in for the remote service in tests. Besides the [`Gateway`]
//! operations it can script failures, simulate edits made by other clients
//! and slip such an edit in between an update's read and write.

use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap, VecDeque};

use super::{Gateway, GatewayError, Page};
use crate::domain::{Field, FieldChanges, Item, ItemId, ListFilter, Revision, ValidationError};

/// Gateway operations, used to script failures and count calls
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Create,
    Fetch,
    Update,
    Delete,
    Query,
}

type RemoteEdit = Box<dyn FnOnce(&mut Item)>;

/// Another client's write slipped in right before an update
enum Interleaved {
    Edit(RemoteEdit),
    Delete,
}

struct Stored {
    item: Item,
    version: u64,
    deleted: bool,
    invalid: Option<ValidationError>,
}

impl Stored {
    fn revision(&self) -> Revision {
        Revision::new(format!("v{}", self.version))
    }

    fn view(&self) -> Item {
        let mut item = self.item.clone();
        item.revision = Some(self.revision());
        item
    }
}

#[derive(Default)]
struct State {
    items: BTreeMap<ItemId, Stored>,
    next_id: u64,
    failures: HashMap<Operation, VecDeque<GatewayError>>,
    calls: HashMap<Operation, usize>,
    before_update: Option<Interleaved>,
}

impl State {
    /// Counts the call and pops a scripted failure, if any
    fn enter(&mut self, op: Operation) -> Result<(), GatewayError> {
        *self.calls.entry(op).or_insert(0) += 1;
        match self.failures.get_mut(&op).and_then(VecDeque::pop_front) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn live(&mut self, id: &ItemId) -> Result<&mut Stored, GatewayError> {
        match self.items.get_mut(id) {
            Some(stored) if !stored.deleted => Ok(stored),
            _ => Err(GatewayError::NotFound(id.to_string())),
        }
    }

    fn insert(&mut self, item: &Item) -> Item {
        self.next_id += 1;
        let id = ItemId::minted(format!("mem-{:04}", self.next_id));

        let mut stored_item = item.clone();
        stored_item.id = Some(id.clone());
        stored_item.url = Some(format!("memory://{}", id));
        stored_item.revision = None;

        let stored = Stored {
            item: stored_item,
            version: 1,
            deleted: false,
            invalid: None,
        };
        let view = stored.view();
        self.items.insert(id, stored);
        view
    }
}

/// Fake remote store
pub struct InMemoryGateway {
    state: RefCell<State>,
    page_size: usize,
    empty_pages: bool,
}

impl InMemoryGateway {
    pub fn new() -> Self {
        Self {
            state: RefCell::new(State::default()),
            page_size: 100,
            empty_pages: false,
        }
    }

    /// Sets the number of records per page
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Serves an empty page (with a cursor) before every real page
    pub fn with_empty_pages(mut self) -> Self {
        self.empty_pages = true;
        self
    }

    /// Stores an item directly, bypassing scripted failures and call counts
    pub fn seed(&self, item: &Item) -> Item {
        self.state.borrow_mut().insert(item)
    }

    /// Makes the next call of `op` fail with `err`
    ///
    /// Failures queue up: scripting three failures fails the next three calls.
    pub fn fail_next(&self, op: Operation, err: GatewayError) {
        self.state
            .borrow_mut()
            .failures
            .entry(op)
            .or_default()
            .push_back(err);
    }

    /// Simulates another client editing an item
    pub fn edit_remotely(&self, id: &ItemId, edit: impl FnOnce(&mut Item)) -> bool {
        let mut state = self.state.borrow_mut();
        match state.live(id) {
            Ok(stored) => {
                edit(&mut stored.item);
                stored.version += 1;
                true
            }
            Err(_) => false,
        }
    }

    /// Simulates another client deleting an item
    pub fn delete_remotely(&self, id: &ItemId) -> bool {
        let mut state = self.state.borrow_mut();
        match state.live(id) {
            Ok(stored) => {
                stored.deleted = true;
                true
            }
            Err(_) => false,
        }
    }

    /// Simulates the remote schema dropping a field of an item
    pub fn drop_field(&self, id: &ItemId, field: Field) -> bool {
        self.edit_remotely(id, |item| {
            item.unmapped.insert(field);
        })
    }

    /// Runs `edit` as another client's write right before the next update
    /// compares revisions
    pub fn before_next_update(&self, edit: impl FnOnce(&mut Item) + 'static) {
        self.state.borrow_mut().before_update = Some(Interleaved::Edit(Box::new(edit)));
    }

    /// Deletes the target of the next update right before it compares
    /// revisions
    pub fn delete_before_next_update(&self) {
        self.state.borrow_mut().before_update = Some(Interleaved::Delete);
    }

    /// Makes an item read back as failing validation
    pub fn mark_invalid(&self, id: &ItemId, err: ValidationError) -> bool {
        let mut state = self.state.borrow_mut();
        match state.live(id) {
            Ok(stored) => {
                stored.invalid = Some(err);
                true
            }
            Err(_) => false,
        }
    }

    /// Number of calls made to `op`
    pub fn calls(&self, op: Operation) -> usize {
        self.state.borrow().calls.get(&op).copied().unwrap_or(0)
    }

    /// Current stored state of an item, if it exists
    pub fn snapshot(&self, id: &ItemId) -> Option<Item> {
        let state = self.state.borrow();
        state
            .items
            .get(id)
            .filter(|stored| !stored.deleted)
            .map(Stored::view)
    }

    /// Number of live items
    pub fn len(&self) -> usize {
        self.state
            .borrow()
            .items
            .values()
            .filter(|stored| !stored.deleted)
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn parse_cursor(cursor: Option<&str>) -> Result<(bool, usize), GatewayError> {
        let cursor = match cursor {
            None => return Ok((false, 0)),
            Some(c) => c,
        };
        let bad = || GatewayError::Decode(format!("bad cursor '{}'", cursor));
        let (after_empty, offset) = if let Some(rest) = cursor.strip_prefix('o') {
            (false, rest)
        } else if let Some(rest) = cursor.strip_prefix('e') {
            (true, rest)
        } else {
            return Err(bad());
        };
        let offset: usize = offset.parse().map_err(|_| bad())?;
        Ok((after_empty, offset))
    }
}

impl Default for InMemoryGateway {
    fn default() -> Self {
        Self::new()
    }
}

impl Gateway for InMemoryGateway {
    fn create(&self, item: &Item) -> Result<Item, GatewayError> {
        let mut state = self.state.borrow_mut();
        state.enter(Operation::Create)?;

        if item.is_synced() {
            return Err(GatewayError::Rejected {
                status: 400,
                message: "item already has an identifier".into(),
            });
        }

        Ok(state.insert(item))
    }

    fn fetch(&self, id: &ItemId) -> Result<Item, GatewayError> {
        let mut state = self.state.borrow_mut();
        state.enter(Operation::Fetch)?;

        let stored = state.live(id)?;
        if let Some(err) = &stored.invalid {
            return Err(GatewayError::InvalidRecord {
                id: id.to_string(),
                source: err.clone(),
            });
        }
        Ok(stored.view())
    }

    fn update(
        &self,
        id: &ItemId,
        changes: &FieldChanges,
        expected: Option<&Revision>,
    ) -> Result<Item, GatewayError> {
        let mut state = self.state.borrow_mut();
        state.enter(Operation::Update)?;

        let interleaved = state.before_update.take();
        let stored = state.live(id)?;

        match interleaved {
            Some(Interleaved::Edit(edit)) => {
                edit(&mut stored.item);
                stored.version += 1;
            }
            Some(Interleaved::Delete) => {
                stored.deleted = true;
                stored.version += 1;
                return Err(match expected {
                    Some(_) => GatewayError::Stale(id.to_string()),
                    None => GatewayError::NotFound(id.to_string()),
                });
            }
            None => {}
        }

        if let Some(expected) = expected {
            if *expected != stored.revision() {
                return Err(GatewayError::Stale(id.to_string()));
            }
        }

        if let Some(field) = changes.fields().into_iter().find(|f| !stored.item.carries(*f)) {
            return Err(GatewayError::Rejected {
                status: 400,
                message: format!("{} is not a property of the database", field),
            });
        }

        changes.apply_to(&mut stored.item);
        stored.version += 1;
        Ok(stored.view())
    }

    fn delete(&self, id: &ItemId) -> Result<(), GatewayError> {
        let mut state = self.state.borrow_mut();
        state.enter(Operation::Delete)?;

        let stored = state.live(id)?;
        stored.deleted = true;
        stored.version += 1;
        Ok(())
    }

    fn query_page(
        &self,
        filter: &ListFilter,
        cursor: Option<&str>,
    ) -> Result<Page, GatewayError> {
        let mut state = self.state.borrow_mut();
        state.enter(Operation::Query)?;

        let (after_empty, offset) = Self::parse_cursor(cursor)?;

        if self.empty_pages && !after_empty {
            return Ok(Page {
                records: Vec::new(),
                next_cursor: Some(format!("e{}", offset)),
            });
        }

        let matching: Vec<&Stored> = state
            .items
            .values()
            .filter(|stored| !stored.deleted && filter.matches(&stored.item))
            .collect();

        let records = matching
            .iter()
            .skip(offset)
            .take(self.page_size)
            .map(|stored| match &stored.invalid {
                Some(err) => Err(GatewayError::InvalidRecord {
                    id: stored
                        .item
                        .id
                        .as_ref()
                        .map(ItemId::to_string)
                        .unwrap_or_default(),
                    source: err.clone(),
                }),
                None => Ok(stored.view()),
            })
            .collect();

        let next = offset + self.page_size;
        let next_cursor = (next < matching.len()).then(|| format!("o{}", next));

        Ok(Page {
            records,
            next_cursor,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ItemStatus;

    fn draft(title: &str) -> Item {
        Item::draft(title)
    }

    #[test]
    fn create_assigns_id_and_revision() {
        let gateway = InMemoryGateway::new();
        let item = gateway.create(&draft("Call mom")).unwrap();

        assert!(item.is_synced());
        assert_eq!(item.revision, Some(Revision::new("v1")));
        assert_eq!(gateway.len(), 1);
    }

    #[test]
    fn create_rejects_synced_items() {
        let gateway = InMemoryGateway::new();
        let item = gateway.create(&draft("Once")).unwrap();
        assert!(matches!(
            gateway.create(&item),
            Err(GatewayError::Rejected { status: 400, .. })
        ));
    }

    #[test]
    fn scripted_failures_are_consumed_in_order() {
        let gateway = InMemoryGateway::new();
        gateway.fail_next(Operation::Create, GatewayError::Transport("a".into()));
        gateway.fail_next(Operation::Create, GatewayError::Transport("b".into()));

        assert_eq!(
            gateway.create(&draft("x")),
            Err(GatewayError::Transport("a".into()))
        );
        assert_eq!(
            gateway.create(&draft("x")),
            Err(GatewayError::Transport("b".into()))
        );
        assert!(gateway.create(&draft("x")).is_ok());
        assert_eq!(gateway.calls(Operation::Create), 3);
        assert_eq!(gateway.len(), 1);
    }

    #[test]
    fn stale_revision_writes_nothing() {
        let gateway = InMemoryGateway::new();
        let item = gateway.seed(&draft("Stale"));
        let id = item.id.clone().unwrap();

        gateway.edit_remotely(&id, |i| i.status = ItemStatus::Archived);

        let changes = FieldChanges {
            title: Some("Fresh".into()),
            ..FieldChanges::default()
        };
        let err = gateway
            .update(&id, &changes, item.revision.as_ref())
            .unwrap_err();
        assert_eq!(err, GatewayError::Stale(id.to_string()));
        assert_eq!(gateway.snapshot(&id).unwrap().title, "Stale");
    }

    #[test]
    fn update_of_dropped_field_is_rejected_atomically() {
        let gateway = InMemoryGateway::new();
        let id = gateway.seed(&draft("Atomic")).id.unwrap();
        gateway.drop_field(&id, Field::Due);

        let changes = FieldChanges {
            title: Some("Changed".into()),
            due: Some(None),
            ..FieldChanges::default()
        };
        assert!(gateway.update(&id, &changes, None).is_err());
        assert_eq!(gateway.snapshot(&id).unwrap().title, "Atomic");
    }

    #[test]
    fn delete_twice_is_not_found() {
        let gateway = InMemoryGateway::new();
        let id = gateway.seed(&draft("Gone")).id.unwrap();

        gateway.delete(&id).unwrap();
        assert_eq!(gateway.delete(&id), Err(GatewayError::NotFound(id.to_string())));
        assert_eq!(gateway.fetch(&id), Err(GatewayError::NotFound(id.to_string())));
    }

    #[test]
    fn invalid_records_surface_per_record() {
        let gateway = InMemoryGateway::new();
        let good = gateway.seed(&draft("Good"));
        let bad = gateway.seed(&draft("Bad")).id.unwrap();
        gateway.mark_invalid(&bad, ValidationError::EmptyTitle);

        let page = gateway.query_page(&ListFilter::default(), None).unwrap();
        assert_eq!(page.records.len(), 2);
        assert_eq!(page.records[0].as_ref().unwrap().id, good.id);
        assert!(matches!(
            page.records[1],
            Err(GatewayError::InvalidRecord { .. })
        ));
    }

    #[test]
    fn bad_cursor_is_a_decode_error() {
        let gateway = InMemoryGateway::new();
        assert!(matches!(
            gateway.query_page(&ListFilter::default(), Some("zz")),
            Err(GatewayError::Decode(_))
        ));
    }
}
