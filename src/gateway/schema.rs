//! Notion page and property mapping
//!
//! Translates between Notion's JSON shapes and the domain. Pages are turned
//! into [`RawItem`]s and validated right away; anything that fails becomes a
//! per-record error instead of leaking into the rest of the crate.

use std::cell::OnceCell;
use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::debug;

use super::GatewayError;
use crate::domain::{
    format_due, Field, FieldChanges, Item, ItemStatus, ListFilter, RawItem, Revision, Tags,
};

/// How the status property is typed in the database
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StatusKind {
    #[default]
    Status,
    Select,
}

impl StatusKind {
    fn key(&self) -> &'static str {
        match self {
            StatusKind::Status => "status",
            StatusKind::Select => "select",
        }
    }
}

/// Database property names for each item field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PropertyNames {
    pub title: String,
    pub status: String,
    pub status_kind: StatusKind,
    pub due: String,
    pub tags: String,
}

impl Default for PropertyNames {
    fn default() -> Self {
        Self {
            title: "Name".into(),
            status: "Status".into(),
            status_kind: StatusKind::Status,
            due: "Date".into(),
            tags: "Tags".into(),
        }
    }
}

/// Remote status option names for each item status
///
/// The first name of each list is the one written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StatusNames {
    pub open: Vec<String>,
    pub done: Vec<String>,
    pub archived: Vec<String>,
}

impl Default for StatusNames {
    fn default() -> Self {
        Self {
            open: vec!["Not started".into(), "In progress".into(), "Paused".into()],
            done: vec!["Done".into()],
            archived: vec!["Abandoned".into()],
        }
    }
}

impl StatusNames {
    pub fn names(&self, status: ItemStatus) -> &[String] {
        match status {
            ItemStatus::Open => &self.open,
            ItemStatus::Done => &self.done,
            ItemStatus::Archived => &self.archived,
        }
    }

    /// Option name written for `status`
    pub fn write_name(&self, status: ItemStatus) -> &str {
        self.names(status)
            .first()
            .map(String::as_str)
            .unwrap_or(status.as_str())
    }

    /// Maps a remote option name to a domain status name
    ///
    /// Unknown names come back unchanged so domain validation can reject them.
    pub fn domain_name<'a>(&self, remote: &'a str) -> &'a str {
        let remote_trimmed = remote.trim();
        ItemStatus::ALL
            .iter()
            .find(|status| {
                self.names(**status)
                    .iter()
                    .any(|name| name.trim().eq_ignore_ascii_case(remote_trimmed))
            })
            .map(|status| status.as_str())
            .unwrap_or(remote)
    }
}

/// A page object as returned by the pages and query endpoints
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct WirePage {
    pub id: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub archived: bool,
    #[serde(default)]
    pub in_trash: bool,
    #[serde(default)]
    pub last_edited_time: String,
    #[serde(default)]
    pub properties: BTreeMap<String, PropertyValue>,
}

impl WirePage {
    pub fn is_removed(&self) -> bool {
        self.archived || self.in_trash
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub(crate) enum PropertyValue {
    Title {
        #[serde(default)]
        title: Vec<RichText>,
    },
    Status {
        status: Option<NamedOption>,
    },
    Select {
        select: Option<NamedOption>,
    },
    Date {
        date: Option<DateValue>,
    },
    MultiSelect {
        #[serde(default)]
        multi_select: Vec<NamedOption>,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct RichText {
    #[serde(default)]
    pub plain_text: String,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct NamedOption {
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct DateValue {
    pub start: String,
}

/// Response of `POST /databases/{id}/query`
#[derive(Debug, Deserialize)]
pub(crate) struct QueryResponse {
    #[serde(default)]
    pub results: Vec<Value>,
    #[serde(default)]
    pub next_cursor: Option<String>,
    #[serde(default)]
    pub has_more: bool,
}

/// Error object returned with non-2xx responses
#[derive(Debug, Deserialize)]
pub(crate) struct ErrorBody {
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub message: String,
}

/// Property mapping for one database
///
/// A database has exactly one title property. Its actual name is learned
/// from the first page or database object read, and every later write and
/// filter uses it instead of the configured name.
#[derive(Debug, Clone, Default)]
pub(crate) struct Schema {
    pub names: PropertyNames,
    pub statuses: StatusNames,
    title: OnceCell<String>,
}

impl Schema {
    pub fn new(names: PropertyNames, statuses: StatusNames) -> Self {
        Self {
            names,
            statuses,
            title: OnceCell::new(),
        }
    }

    /// Name of the title property, as learned or as configured
    pub fn title_name(&self) -> &str {
        self.title.get().unwrap_or(&self.names.title)
    }

    pub fn knows_title(&self) -> bool {
        self.title.get().is_some()
    }

    fn learn_title(&self, name: &str) {
        if self.title.get().is_none() {
            if name != self.names.title {
                debug!(configured = %self.names.title, actual = name, "title property renamed");
            }
            let _ = self.title.set(name.to_string());
        }
    }

    /// Learns the title property from a database object
    pub fn learn_title_from_database(&self, database: &Value) -> Result<(), GatewayError> {
        let name = database
            .get("properties")
            .and_then(Value::as_object)
            .and_then(|props| {
                props
                    .iter()
                    .find(|(_, prop)| prop.get("type").and_then(Value::as_str) == Some("title"))
            })
            .map(|(name, _)| name.clone())
            .ok_or_else(|| GatewayError::Decode("database has no title property".into()))?;
        self.learn_title(&name);
        Ok(())
    }

    /// Decodes and validates one page object
    pub fn decode(&self, value: Value, today: NaiveDate) -> Result<Item, GatewayError> {
        let page: WirePage =
            serde_json::from_value(value).map_err(|e| GatewayError::Decode(e.to_string()))?;
        self.decode_page(page, today)
    }

    pub fn decode_page(&self, page: WirePage, today: NaiveDate) -> Result<Item, GatewayError> {
        if page.is_removed() {
            return Err(GatewayError::NotFound(page.id));
        }

        let id = page.id.clone();
        let raw = self.raw_item(&page);
        raw.validate(today)
            .map_err(|source| GatewayError::InvalidRecord { id, source })
    }

    /// Extracts the mapped fields of a page, noting the ones it lacks
    pub fn raw_item(&self, page: &WirePage) -> RawItem {
        let mut raw = RawItem {
            id: Some(page.id.clone()),
            url: page.url.clone(),
            ..RawItem::default()
        };

        match self.title_property(page) {
            Some(text) => raw.title = text,
            None => {
                raw.unmapped.insert(Field::Title);
            }
        }

        match page.properties.get(&self.names.status) {
            Some(PropertyValue::Status { status: option })
            | Some(PropertyValue::Select { select: option }) => {
                raw.status = option
                    .as_ref()
                    .map(|o| self.statuses.domain_name(&o.name).to_string());
            }
            _ => {
                raw.unmapped.insert(Field::Status);
            }
        }

        match page.properties.get(&self.names.due) {
            Some(PropertyValue::Date { date }) => {
                raw.due = date.as_ref().map(|d| d.start.clone());
            }
            _ => {
                raw.unmapped.insert(Field::Due);
            }
        }

        match page.properties.get(&self.names.tags) {
            Some(PropertyValue::MultiSelect { multi_select }) => {
                raw.tags = multi_select.iter().map(|o| o.name.clone()).collect();
            }
            _ => {
                raw.unmapped.insert(Field::Tags);
            }
        }

        let revision = fingerprint(&page.last_edited_time, &raw);
        raw.revision = Some(revision.as_str().to_string());
        raw
    }

    /// Text of the title property, found by type
    fn title_property(&self, page: &WirePage) -> Option<String> {
        let (name, runs) = page.properties.iter().find_map(|(name, value)| match value {
            PropertyValue::Title { title } => Some((name, title)),
            _ => None,
        })?;
        self.learn_title(name);
        Some(plain_text(runs))
    }

    /// Properties object for a new page
    pub fn create_properties(&self, item: &Item) -> Map<String, Value> {
        let changes = FieldChanges {
            title: Some(item.title.clone()),
            status: Some(item.status),
            due: item.due.map(Some),
            tags: (!item.tags.is_empty()).then(|| item.tags.clone()),
        };
        self.properties(&changes)
    }

    /// Properties object carrying exactly the changed fields
    pub fn properties(&self, changes: &FieldChanges) -> Map<String, Value> {
        let mut props = Map::new();

        if let Some(title) = &changes.title {
            props.insert(
                self.title_name().to_string(),
                json!({ "title": [{ "type": "text", "text": { "content": title } }] }),
            );
        }

        if let Some(status) = changes.status {
            let mut value = Map::new();
            value.insert(
                self.names.status_kind.key().to_string(),
                json!({ "name": self.statuses.write_name(status) }),
            );
            props.insert(self.names.status.clone(), Value::Object(value));
        }

        if let Some(due) = changes.due {
            let date = match due {
                Some(date) => json!({ "start": format_due(date) }),
                None => Value::Null,
            };
            props.insert(self.names.due.clone(), json!({ "date": date }));
        }

        if let Some(tags) = &changes.tags {
            props.insert(self.names.tags.clone(), json!({ "multi_select": tag_options(tags) }));
        }

        props
    }

    /// Query filter for `filter`, `None` when it selects everything
    pub fn filter(&self, filter: &ListFilter) -> Option<Value> {
        let mut clauses = Vec::new();

        if !filter.statuses.is_empty() {
            let kind = self.names.status_kind.key();
            let options: Vec<Value> = filter
                .statuses
                .iter()
                .flat_map(|status| self.statuses.names(*status).iter())
                .map(|name| {
                    let mut clause = Map::new();
                    clause.insert("property".into(), json!(self.names.status));
                    clause.insert(kind.into(), json!({ "equals": name }));
                    Value::Object(clause)
                })
                .collect();
            clauses.push(single_or(options));
        }

        if let Some(tag) = &filter.tag {
            clauses.push(json!({
                "property": self.names.tags,
                "multi_select": { "contains": tag },
            }));
        }

        if let Some(limit) = filter.due_on_or_before {
            clauses.push(json!({
                "property": self.names.due,
                "date": { "on_or_before": format_due(limit) },
            }));
        }

        if let Some(limit) = filter.due_on_or_after {
            clauses.push(json!({
                "property": self.names.due,
                "date": { "on_or_after": format_due(limit) },
            }));
        }

        if let Some(query) = &filter.title_contains {
            clauses.push(json!({
                "property": self.title_name(),
                "title": { "contains": query },
            }));
        }

        match clauses.len() {
            0 => None,
            1 => clauses.pop(),
            _ => Some(json!({ "and": clauses })),
        }
    }

    pub fn sorts(&self) -> Value {
        json!([{ "property": self.names.due, "direction": "ascending" }])
    }
}

fn plain_text(runs: &[RichText]) -> String {
    runs.iter().map(|r| r.plain_text.as_str()).collect()
}

fn single_or(mut options: Vec<Value>) -> Value {
    if options.len() == 1 {
        options.remove(0)
    } else {
        json!({ "or": options })
    }
}

fn tag_options(tags: &Tags) -> Vec<Value> {
    tags.iter().map(|tag| json!({ "name": tag })).collect()
}

/// Version stamp of a page
///
/// `last_edited_time` alone only has minute precision, so the mapped values
/// are hashed along with it.
pub(crate) fn fingerprint(last_edited_time: &str, raw: &RawItem) -> Revision {
    let mut hasher = blake3::Hasher::new();
    let mut feed = |part: &str| {
        hasher.update(part.as_bytes());
        hasher.update(b"\0");
    };

    feed(last_edited_time);
    feed(&raw.title);
    feed(raw.status.as_deref().unwrap_or(""));
    feed(raw.due.as_deref().unwrap_or(""));
    let mut tags = raw.tags.clone();
    tags.sort();
    for tag in &tags {
        feed(tag);
    }

    Revision::new(hasher.finalize().to_hex().to_string())
}
