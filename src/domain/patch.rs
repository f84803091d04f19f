//! Partial updates
//!
//! An [`ItemPatch`] records only what the user asked to change. Resolving it
//! against a snapshot of the remote record yields [`FieldChanges`]: absolute
//! values for the fields that actually differ, which is all that gets sent
//! to the remote service.

use chrono::NaiveDate;
use serde::Serialize;

use super::date::parse_due;
use super::item::{validate_title, Field, Item, ItemStatus};
use super::tags::Tags;
use super::validation::ValidationError;

/// Requested change to the due date
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DueChange {
    Set(NaiveDate),
    Clear,
}

/// Requested change to the tag set
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagEdit {
    /// Replaces the current tags before `add`/`remove` apply
    pub replace: Option<Tags>,
    pub add: Tags,
    pub remove: Tags,
}

impl TagEdit {
    pub fn is_empty(&self) -> bool {
        self.replace.is_none() && self.add.is_empty() && self.remove.is_empty()
    }

    /// Applies the edit to a current tag set
    pub fn apply(&self, current: &Tags) -> Tags {
        let base = self.replace.as_ref().unwrap_or(current);
        base.edited(&self.add, &self.remove)
    }
}

/// Unvalidated update flags
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawPatch {
    pub title: Option<String>,
    pub status: Option<String>,
    pub due: Option<String>,
    pub clear_due: bool,
    pub tags: Option<Vec<String>>,
    pub add_tags: Vec<String>,
    pub remove_tags: Vec<String>,
}

impl RawPatch {
    /// Validates the flags into an [`ItemPatch`]
    pub fn validate(self, today: NaiveDate) -> Result<ItemPatch, ValidationError> {
        let title = self.title.as_deref().map(validate_title).transpose()?;
        let status = self
            .status
            .as_deref()
            .map(str::parse::<ItemStatus>)
            .transpose()?;

        let due = match (self.due.as_deref(), self.clear_due) {
            (Some(_), true) => return Err(ValidationError::DueSetAndCleared),
            (Some(raw), false) => Some(DueChange::Set(parse_due(raw, today)?)),
            (None, true) => Some(DueChange::Clear),
            (None, false) => None,
        };

        let tags = TagEdit {
            replace: self.tags.as_ref().map(Tags::parse).transpose()?,
            add: Tags::parse(&self.add_tags)?,
            remove: Tags::parse(&self.remove_tags)?,
        };

        if let Some(tag) = tags.add.intersection(&tags.remove).next() {
            return Err(ValidationError::InvalidTag(format!(
                "'{}' is both added and removed",
                tag
            )));
        }

        let patch = ItemPatch {
            title,
            status,
            due,
            tags,
        };

        if patch.is_empty() {
            return Err(ValidationError::EmptyPatch);
        }

        Ok(patch)
    }
}

/// A validated user delta
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ItemPatch {
    pub title: Option<String>,
    pub status: Option<ItemStatus>,
    pub due: Option<DueChange>,
    pub tags: TagEdit,
}

impl ItemPatch {
    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.status.is_none() && self.due.is_none() && self.tags.is_empty()
    }

    /// Fields this patch touches
    pub fn fields(&self) -> Vec<Field> {
        let mut fields = Vec::new();
        if self.title.is_some() {
            fields.push(Field::Title);
        }
        if self.status.is_some() {
            fields.push(Field::Status);
        }
        if self.due.is_some() {
            fields.push(Field::Due);
        }
        if !self.tags.is_empty() {
            fields.push(Field::Tags);
        }
        fields
    }

    /// Resolves the delta against a snapshot
    ///
    /// Fails with the first touched field the snapshot does not carry.
    pub fn resolve(&self, current: &Item) -> Result<FieldChanges, Field> {
        if let Some(missing) = self.fields().into_iter().find(|f| !current.carries(*f)) {
            return Err(missing);
        }

        let mut changes = FieldChanges::default();

        if let Some(title) = &self.title {
            if *title != current.title {
                changes.title = Some(title.clone());
            }
        }

        if let Some(status) = self.status {
            if status != current.status {
                changes.status = Some(status);
            }
        }

        if let Some(due) = self.due {
            let wanted = match due {
                DueChange::Set(date) => Some(date),
                DueChange::Clear => None,
            };
            if wanted != current.due {
                changes.due = Some(wanted);
            }
        }

        if !self.tags.is_empty() {
            let wanted = self.tags.apply(&current.tags);
            if wanted != current.tags {
                changes.tags = Some(wanted);
            }
        }

        Ok(changes)
    }
}

/// Absolute new values for the fields an update writes
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FieldChanges {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<ItemStatus>,

    /// `Some(None)` clears the due date
    #[serde(skip_serializing_if = "Option::is_none")]
    pub due: Option<Option<NaiveDate>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<Tags>,
}

impl FieldChanges {
    pub fn is_empty(&self) -> bool {
        self.fields().is_empty()
    }

    /// Fields this change set writes
    pub fn fields(&self) -> Vec<Field> {
        let mut fields = Vec::new();
        if self.title.is_some() {
            fields.push(Field::Title);
        }
        if self.status.is_some() {
            fields.push(Field::Status);
        }
        if self.due.is_some() {
            fields.push(Field::Due);
        }
        if self.tags.is_some() {
            fields.push(Field::Tags);
        }
        fields
    }

    /// Writes the changes into an item, leaving other fields untouched
    pub fn apply_to(&self, item: &mut Item) {
        if let Some(title) = &self.title {
            item.title = title.clone();
        }
        if let Some(status) = self.status {
            item.status = status;
        }
        if let Some(due) = self.due {
            item.due = due;
        }
        if let Some(tags) = &self.tags {
            item.tags = tags.clone();
        }
    }
}
