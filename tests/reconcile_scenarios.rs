//! End-to-end reconciler scenarios against the in-memory gateway
//!
//! These drive the public API the same way the CLI does, with the remote
//! service replaced by a scripted fake.

use std::time::Duration;

use chrono::NaiveDate;
use proptest::prelude::*;

use life::domain::{
    CommandIntent, Field, Item, ItemPatch, ItemStatus, ListFilter, RawItem, RawPatch, Tags,
};
use life::gateway::{
    GatewayError, InMemoryGateway, Operation, RecordingSleeper, RetryPolicy, Retrying,
};
use life::reconcile::{ErrorKind, Outcome, Reconciler};

fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 3, 15).unwrap()
}

fn date(y: i32, m: u32, d: u32) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(y, m, d)
}

fn patch(raw: RawPatch) -> ItemPatch {
    raw.validate(today()).unwrap()
}

fn draft(title: &str, due: Option<&str>, tags: &[&str]) -> Item {
    RawItem {
        title: title.to_string(),
        due: due.map(str::to_string),
        tags: tags.iter().map(|t| t.to_string()).collect(),
        ..RawItem::default()
    }
    .validate(today())
    .unwrap()
}

// =============================================================================
// Plain operations
// =============================================================================

#[test]
fn test_create_then_show_round_trips() {
    let gateway = InMemoryGateway::new();
    let reconciler = Reconciler::new(&gateway);

    let created = match reconciler
        .execute(CommandIntent::Create(draft("Pay rent", Some("2024-04-01"), &["home"])))
        .unwrap()
    {
        Outcome::Created(item) => item,
        other => panic!("unexpected outcome: {:?}", other),
    };
    assert!(created.is_synced());

    let id = created.id.clone().unwrap();
    match reconciler.execute(CommandIntent::Show(id)).unwrap() {
        Outcome::Shown(shown) => {
            assert!(shown.same_fields(&created));
            assert_eq!(shown.due, date(2024, 4, 1));
            assert!(shown.tags.contains("home"));
        }
        other => panic!("unexpected outcome: {:?}", other),
    }
}

#[test]
fn test_created_item_appears_in_listing() {
    let gateway = InMemoryGateway::new();
    gateway.seed(&draft("Already there", None, &[]));
    let reconciler = Reconciler::new(&gateway);

    let created = match reconciler
        .execute(CommandIntent::Create(draft("Water plants", Some("2024-03-16"), &["home"])))
        .unwrap()
    {
        Outcome::Created(item) => item,
        other => panic!("unexpected outcome: {:?}", other),
    };

    match reconciler.execute(CommandIntent::List(ListFilter::open())).unwrap() {
        Outcome::Listed { items, rejected } => {
            assert!(rejected.is_empty());
            assert_eq!(items.len(), 2);
            let listed = items
                .iter()
                .find(|item| item.id == created.id)
                .expect("created item is listed");
            assert!(listed.same_fields(&created));
            assert_eq!(listed.due, date(2024, 3, 16));
        }
        other => panic!("unexpected outcome: {:?}", other),
    }
}

#[test]
fn test_delete_twice_is_not_found() {
    let gateway = InMemoryGateway::new();
    let id = gateway.seed(&draft("Old", None, &[])).id.unwrap();
    let reconciler = Reconciler::new(&gateway);

    let outcome = reconciler.execute(CommandIntent::Delete(id.clone())).unwrap();
    assert_eq!(outcome, Outcome::Deleted(id.clone()));

    let err = reconciler.execute(CommandIntent::Delete(id.clone())).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);

    let err = reconciler.execute(CommandIntent::Show(id)).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[test]
fn test_list_filters_by_status_and_tag() {
    let gateway = InMemoryGateway::new();
    gateway.seed(&draft("Groceries", None, &["errands"]));
    gateway.seed(&draft("Call mom", None, &["family"]));
    let mut done = draft("Taxes", None, &["errands"]);
    done.status = ItemStatus::Done;
    gateway.seed(&done);

    let filter = ListFilter {
        tag: Some("errands".into()),
        ..ListFilter::open()
    };
    match Reconciler::new(&gateway).execute(CommandIntent::List(filter)).unwrap() {
        Outcome::Listed { items, rejected } => {
            let titles: Vec<_> = items.iter().map(|i| i.title.as_str()).collect();
            assert_eq!(titles, vec!["Groceries"]);
            assert!(rejected.is_empty());
        }
        other => panic!("unexpected outcome: {:?}", other),
    }
}

#[test]
fn test_list_walks_past_empty_pages() {
    let gateway = InMemoryGateway::new().with_page_size(2).with_empty_pages();
    for n in 0..5 {
        gateway.seed(&draft(&format!("Item {}", n), None, &[]));
    }

    match Reconciler::new(&gateway)
        .execute(CommandIntent::List(ListFilter::default()))
        .unwrap()
    {
        Outcome::Listed { items, .. } => assert_eq!(items.len(), 5),
        other => panic!("unexpected outcome: {:?}", other),
    }
}

// =============================================================================
// Partial updates
// =============================================================================

#[test]
fn test_partial_update_keeps_untouched_fields() {
    let gateway = InMemoryGateway::new();
    let id = gateway
        .seed(&draft("Dentist", Some("2024-04-02"), &["health", "calls"]))
        .id
        .unwrap();

    let outcome = Reconciler::new(&gateway)
        .execute(CommandIntent::Update {
            id: id.clone(),
            patch: patch(RawPatch {
                title: Some("Dentist appointment".into()),
                ..RawPatch::default()
            }),
        })
        .unwrap();

    match outcome {
        Outcome::Updated { item, changed } => {
            assert_eq!(changed, vec![Field::Title]);
            assert_eq!(item.due, date(2024, 4, 2));
            assert_eq!(item.tags, Tags::parse(["calls", "health"]).unwrap());
        }
        other => panic!("unexpected outcome: {:?}", other),
    }
    assert_eq!(gateway.snapshot(&id).unwrap().title, "Dentist appointment");
}

#[test]
fn test_status_only_update_keeps_tags_and_due() {
    let gateway = InMemoryGateway::new();
    let id = gateway
        .seed(&draft("Pay rent", Some("2024-04-01"), &["home", "money"]))
        .id
        .unwrap();

    let outcome = Reconciler::new(&gateway)
        .execute(CommandIntent::Update {
            id: id.clone(),
            patch: patch(RawPatch {
                status: Some("done".into()),
                ..RawPatch::default()
            }),
        })
        .unwrap();

    let tags = Tags::parse(["home", "money"]).unwrap();
    match outcome {
        Outcome::Updated { item, changed } => {
            assert_eq!(changed, vec![Field::Status]);
            assert_eq!(item.status, ItemStatus::Done);
            assert_eq!(item.due, date(2024, 4, 1));
            assert_eq!(item.tags, tags);
        }
        other => panic!("unexpected outcome: {:?}", other),
    }

    let stored = gateway.snapshot(&id).unwrap();
    assert_eq!(stored.status, ItemStatus::Done);
    assert_eq!(stored.due, date(2024, 4, 1));
    assert_eq!(stored.tags, tags);
    assert_eq!(stored.title, "Pay rent");
}

#[test]
fn test_concurrent_edit_of_other_field_is_merged() {
    let gateway = InMemoryGateway::new();
    let id = gateway
        .seed(&draft("Renew passport", Some("2024-01-01"), &[]))
        .id
        .unwrap();

    // Another client moves the due date between our read and our write
    gateway.before_next_update(|item| {
        item.due = NaiveDate::from_ymd_opt(2024, 2, 1);
    });

    let outcome = Reconciler::new(&gateway)
        .execute(CommandIntent::Update {
            id: id.clone(),
            patch: patch(RawPatch {
                status: Some("done".into()),
                ..RawPatch::default()
            }),
        })
        .unwrap();

    assert!(matches!(outcome, Outcome::Updated { .. }));
    let stored = gateway.snapshot(&id).unwrap();
    assert_eq!(stored.status, ItemStatus::Done);
    assert_eq!(stored.due, date(2024, 2, 1));
}

#[test]
fn test_update_of_field_missing_remotely_is_a_conflict() {
    let gateway = InMemoryGateway::new();
    let id = gateway.seed(&draft("No dates here", None, &[])).id.unwrap();
    gateway.drop_field(&id, Field::Due);

    let err = Reconciler::new(&gateway)
        .execute(CommandIntent::Update {
            id,
            patch: patch(RawPatch {
                due: Some("tomorrow".into()),
                ..RawPatch::default()
            }),
        })
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Conflict);
    assert_eq!(gateway.calls(Operation::Update), 0);
}

// =============================================================================
// Retry
// =============================================================================

#[test]
fn test_rate_limited_create_backs_off_and_succeeds() {
    let gateway = InMemoryGateway::new();
    for _ in 0..2 {
        gateway.fail_next(Operation::Create, GatewayError::RateLimited { retry_after: None });
    }

    let reconciler = Reconciler::new(Retrying::new(
        &gateway,
        RetryPolicy::default(),
        RecordingSleeper::new(),
    ));
    let outcome = reconciler
        .execute(CommandIntent::Create(draft("Eventually", None, &[])))
        .unwrap();

    assert!(matches!(outcome, Outcome::Created(_)));
    assert_eq!(gateway.calls(Operation::Create), 3);
    assert_eq!(
        reconciler.gateway().sleeper().delays(),
        vec![Duration::from_millis(500), Duration::from_millis(1000)]
    );
    assert_eq!(gateway.len(), 1);
}

#[test]
fn test_exhausted_rate_limit_is_reported() {
    let gateway = InMemoryGateway::new();
    let policy = RetryPolicy {
        rate_limit_retries: 2,
        ..RetryPolicy::default()
    };
    for _ in 0..3 {
        gateway.fail_next(Operation::Fetch, GatewayError::RateLimited { retry_after: None });
    }
    let id = gateway.seed(&draft("Busy", None, &[])).id.unwrap();

    let reconciler = Reconciler::new(Retrying::new(&gateway, policy, RecordingSleeper::new()));
    let err = reconciler.execute(CommandIntent::Show(id)).unwrap_err();

    assert_eq!(err.kind(), ErrorKind::RateLimited);
    assert_eq!(gateway.calls(Operation::Fetch), 3);
}

// =============================================================================
// Properties
// =============================================================================

proptest! {
    #[test]
    fn prop_title_update_preserves_tags_and_due(
        tags in proptest::collection::btree_set("[a-z]{1,8}", 0..5),
        offset in 0i64..365,
        title in "[A-Za-z][A-Za-z ]{0,30}",
    ) {
        let due = today() + chrono::Duration::days(offset);
        let mut item = Item::draft("Start");
        item.due = Some(due);
        item.tags = Tags::parse(&tags).unwrap();

        let gateway = InMemoryGateway::new();
        let id = gateway.seed(&item).id.unwrap();

        let result = Reconciler::new(&gateway).execute(CommandIntent::Update {
            id: id.clone(),
            patch: patch(RawPatch {
                title: Some(title.clone()),
                ..RawPatch::default()
            }),
        });
        prop_assert!(result.is_ok());

        let stored = gateway.snapshot(&id).unwrap();
        prop_assert_eq!(stored.title, title.trim().to_string());
        prop_assert_eq!(stored.due, Some(due));
        prop_assert_eq!(stored.tags, item.tags);
    }
}
