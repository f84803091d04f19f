//! Item domain model
//!
//! An Item is a single tracked task or note. Items come into existence as
//! drafts (no identifier, "pending creation") and become "synced" once the
//! remote service assigns them an identifier.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use super::date::parse_due;
use super::id::{ItemId, Revision};
use super::tags::Tags;
use super::validation::ValidationError;

/// Maximum title length accepted by the remote service for a text run
pub const MAX_TITLE_LEN: usize = 2000;

/// Status of an item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    #[default]
    Open,
    Done,
    Archived,
}

impl ItemStatus {
    pub const ALL: [ItemStatus; 3] = [ItemStatus::Open, ItemStatus::Done, ItemStatus::Archived];

    pub fn as_str(&self) -> &'static str {
        match self {
            ItemStatus::Open => "open",
            ItemStatus::Done => "done",
            ItemStatus::Archived => "archived",
        }
    }
}

impl fmt::Display for ItemStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ItemStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "open" | "todo" => Ok(ItemStatus::Open),
            "done" | "close" | "closed" => Ok(ItemStatus::Done),
            "archived" | "archive" => Ok(ItemStatus::Archived),
            _ => Err(ValidationError::UnknownStatus(s.trim().to_string())),
        }
    }
}

/// User-settable fields of an item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    Title,
    Status,
    Due,
    Tags,
}

impl Field {
    pub fn as_str(&self) -> &'static str {
        match self {
            Field::Title => "title",
            Field::Status => "status",
            Field::Due => "due",
            Field::Tags => "tags",
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A validated life-management record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    /// Remote identifier, `None` while pending creation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<ItemId>,

    pub title: String,

    #[serde(default)]
    pub status: ItemStatus,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due: Option<NaiveDate>,

    #[serde(default, skip_serializing_if = "Tags::is_empty")]
    pub tags: Tags,

    /// Link to the record in the remote service's UI
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    /// Remote version stamp captured when the item was read
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revision: Option<Revision>,

    /// Fields the remote record does not carry
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub unmapped: BTreeSet<Field>,
}

impl Item {
    /// Creates a draft with the given (already validated) title
    pub fn draft(title: impl Into<String>) -> Self {
        Self {
            id: None,
            title: title.into(),
            status: ItemStatus::Open,
            due: None,
            tags: Tags::new(),
            url: None,
            revision: None,
            unmapped: BTreeSet::new(),
        }
    }

    /// Returns true once the remote service has assigned an identifier
    pub fn is_synced(&self) -> bool {
        self.id.is_some()
    }

    /// Returns true while the item has not been persisted remotely
    pub fn is_pending(&self) -> bool {
        self.id.is_none()
    }

    /// Returns true if the remote record carries this field
    pub fn carries(&self, field: Field) -> bool {
        !self.unmapped.contains(&field)
    }

    /// Compares the user-settable fields only
    pub fn same_fields(&self, other: &Item) -> bool {
        self.title == other.title
            && self.status == other.status
            && self.due == other.due
            && self.tags == other.tags
    }
}

/// Unvalidated item fields as typed by the user or read from the remote service
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawItem {
    pub id: Option<String>,
    pub title: String,
    pub status: Option<String>,
    pub due: Option<String>,
    pub tags: Vec<String>,
    pub url: Option<String>,
    pub revision: Option<String>,
    pub unmapped: BTreeSet<Field>,
}

impl RawItem {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }

    /// Validates and normalizes into an [`Item`]
    ///
    /// `today` anchors relative dates such as `tomorrow` or `+3d`.
    pub fn validate(self, today: NaiveDate) -> Result<Item, ValidationError> {
        let id = self.id.map(|id| id.parse::<ItemId>()).transpose()?;
        let title = validate_title(&self.title)?;

        let status = match self.status.as_deref().map(str::trim) {
            None | Some("") => ItemStatus::default(),
            Some(s) => s.parse()?,
        };

        let due = match self.due.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(s) => Some(parse_due(s, today)?),
        };

        let tags = Tags::parse(&self.tags)?;

        Ok(Item {
            id,
            title,
            status,
            due,
            tags,
            url: self.url,
            revision: self.revision.map(Revision::new),
            unmapped: self.unmapped,
        })
    }
}

/// Trims a title and checks the remote service's constraints
pub fn validate_title(raw: &str) -> Result<String, ValidationError> {
    let title = raw.trim();
    if title.is_empty() {
        return Err(ValidationError::EmptyTitle);
    }
    if title.chars().count() > MAX_TITLE_LEN {
        return Err(ValidationError::TitleTooLong { max: MAX_TITLE_LEN });
    }
    Ok(title.to_string())
}
