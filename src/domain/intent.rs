//! Command intents and list filters

use chrono::NaiveDate;

use super::id::ItemId;
use super::item::{Item, ItemStatus};
use super::patch::ItemPatch;

/// What the user asked for in one invocation
///
/// Built once from validated CLI input and consumed by the reconciler.
#[derive(Debug, Clone, PartialEq)]
pub enum CommandIntent {
    Create(Item),
    List(ListFilter),
    Show(ItemId),
    Update { id: ItemId, patch: ItemPatch },
    Delete(ItemId),
}

impl CommandIntent {
    /// Short verb for logging
    pub fn verb(&self) -> &'static str {
        match self {
            CommandIntent::Create(_) => "create",
            CommandIntent::List(_) => "list",
            CommandIntent::Show(_) => "show",
            CommandIntent::Update { .. } => "update",
            CommandIntent::Delete(_) => "delete",
        }
    }
}

/// Criteria for listing items
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListFilter {
    /// Accepted statuses, empty means any
    pub statuses: Vec<ItemStatus>,
    pub tag: Option<String>,
    pub due_on_or_before: Option<NaiveDate>,
    pub due_on_or_after: Option<NaiveDate>,
    /// Case-insensitive title substring
    pub title_contains: Option<String>,
}

impl ListFilter {
    /// Filter for items that still need attention
    pub fn open() -> Self {
        Self {
            statuses: vec![ItemStatus::Open],
            ..Self::default()
        }
    }

    /// Returns true if no criterion is set
    pub fn is_unfiltered(&self) -> bool {
        self == &Self::default()
    }

    /// Evaluates the filter against an item
    pub fn matches(&self, item: &Item) -> bool {
        if !self.statuses.is_empty() && !self.statuses.contains(&item.status) {
            return false;
        }

        if let Some(tag) = &self.tag {
            if !item.tags.contains(tag) {
                return false;
            }
        }

        if let Some(limit) = self.due_on_or_before {
            match item.due {
                Some(due) if due <= limit => {}
                _ => return false,
            }
        }

        if let Some(limit) = self.due_on_or_after {
            match item.due {
                Some(due) if due >= limit => {}
                _ => return false,
            }
        }

        if let Some(needle) = &self.title_contains {
            if !item.title.to_lowercase().contains(&needle.to_lowercase()) {
                return false;
            }
        }

        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Tags;

    fn item(title: &str, status: ItemStatus, due: Option<(i32, u32, u32)>, tags: &[&str]) -> Item {
        let mut item = Item::draft(title);
        item.status = status;
        item.due = due.and_then(|(y, m, d)| NaiveDate::from_ymd_opt(y, m, d));
        item.tags = Tags::parse(tags).unwrap();
        item
    }

    #[test]
    fn unfiltered_matches_everything() {
        let filter = ListFilter::default();
        assert!(filter.is_unfiltered());
        assert!(filter.matches(&item("a", ItemStatus::Archived, None, &[])));
    }

    #[test]
    fn open_filter_excludes_done() {
        let filter = ListFilter::open();
        assert!(filter.matches(&item("a", ItemStatus::Open, None, &[])));
        assert!(!filter.matches(&item("b", ItemStatus::Done, None, &[])));
    }

    #[test]
    fn due_bounds_require_a_due_date() {
        let filter = ListFilter {
            due_on_or_before: NaiveDate::from_ymd_opt(2024, 1, 31),
            due_on_or_after: NaiveDate::from_ymd_opt(2024, 1, 1),
            ..ListFilter::default()
        };

        assert!(filter.matches(&item("in", ItemStatus::Open, Some((2024, 1, 15)), &[])));
        assert!(filter.matches(&item("edge", ItemStatus::Open, Some((2024, 1, 31)), &[])));
        assert!(!filter.matches(&item("late", ItemStatus::Open, Some((2024, 2, 1)), &[])));
        assert!(!filter.matches(&item("none", ItemStatus::Open, None, &[])));
    }

    #[test]
    fn tag_and_title_criteria() {
        let filter = ListFilter {
            tag: Some("home".into()),
            title_contains: Some("PLANT".into()),
            ..ListFilter::default()
        };

        assert!(filter.matches(&item("Water plants", ItemStatus::Open, None, &["home"])));
        assert!(!filter.matches(&item("Water plants", ItemStatus::Open, None, &["work"])));
        assert!(!filter.matches(&item("Feed cat", ItemStatus::Open, None, &["home"])));
    }

    #[test]
    fn verbs() {
        assert_eq!(CommandIntent::List(ListFilter::default()).verb(), "list");
        assert_eq!(CommandIntent::Delete("x".parse().unwrap()).verb(), "delete");
    }
}
