//! Text rendering of items
//!
//! Pure functions returning lines; printing is left to [`super::Output`].

use chrono::NaiveDate;

use crate::domain::{format_due, Field, Item, ItemStatus};
use crate::reconcile::Rejection;

/// Characters of the compact id shown in tables
pub const SHORT_ID_LEN: usize = 8;

const STATUS_WIDTH: usize = 9;
const DUE_WIDTH: usize = 11;

/// Table of items, one per line, with a header
pub fn table(items: &[Item], today: NaiveDate) -> Vec<String> {
    let mut lines = Vec::with_capacity(items.len() + 2);
    lines.push(format!(
        "{:<id$} {:<st$} {:<due$} TITLE",
        "ID",
        "STATUS",
        "DUE",
        id = SHORT_ID_LEN,
        st = STATUS_WIDTH,
        due = DUE_WIDTH,
    ));
    lines.push("-".repeat(60));

    for item in items {
        lines.push(row(item, today));
    }
    lines
}

/// One table row without the header
pub fn row(item: &Item, today: NaiveDate) -> String {
    let id = item
        .id
        .as_ref()
        .map(|id| id.short(SHORT_ID_LEN))
        .unwrap_or_else(|| "-".to_string());
    let due = item.due.map(|d| due_label(d, item, today)).unwrap_or_default();

    let mut line = format!(
        "{:<id_w$} {:<st$} {:<due_w$} {}",
        id,
        item.status.as_str(),
        due,
        item.title,
        id_w = SHORT_ID_LEN,
        st = STATUS_WIDTH,
        due_w = DUE_WIDTH,
    );
    if !item.tags.is_empty() {
        line.push_str("  ");
        line.push_str(&hashtags(item));
    }
    line
}

/// Due date, marked with `!` when an open item is past it
fn due_label(due: NaiveDate, item: &Item, today: NaiveDate) -> String {
    let mut label = format_due(due);
    if due < today && item.status == ItemStatus::Open {
        label.push('!');
    }
    label
}

fn hashtags(item: &Item) -> String {
    item.tags
        .iter()
        .map(|t| format!("#{}", t))
        .collect::<Vec<_>>()
        .join(" ")
}

/// All fields of one item
pub fn detail(item: &Item) -> Vec<String> {
    let mut lines = Vec::new();

    match &item.id {
        Some(id) => lines.push(format!("Item: {}", id)),
        None => lines.push("Item: (pending)".to_string()),
    }
    lines.push(format!("Title: {}", item.title));
    lines.push(format!("Status: {}", item.status));

    if item.carries(Field::Due) {
        let due = item.due.map(format_due).unwrap_or_else(|| "-".to_string());
        lines.push(format!("Due: {}", due));
    }
    if item.carries(Field::Tags) {
        let tags = if item.tags.is_empty() {
            "-".to_string()
        } else {
            item.tags.to_string()
        };
        lines.push(format!("Tags: {}", tags));
    }
    if let Some(url) = &item.url {
        lines.push(format!("URL: {}", url));
    }
    if !item.unmapped.is_empty() {
        let missing: Vec<_> = item.unmapped.iter().map(Field::as_str).collect();
        lines.push(format!("Not in database: {}", missing.join(", ")));
    }
    lines
}

/// One-line summary of an update
pub fn changed(item: &Item, fields: &[Field]) -> String {
    let names: Vec<_> = fields.iter().map(Field::as_str).collect();
    format!("Updated {}: {}", short_id(item), names.join(", "))
}

/// Warnings for records left out of a listing
pub fn rejected(rejected: &[Rejection]) -> Vec<String> {
    rejected
        .iter()
        .map(|r| format!("skipped invalid remote record {}: {}", r.id, r.reason))
        .collect()
}

pub fn short_id(item: &Item) -> String {
    item.id
        .as_ref()
        .map(|id| id.short(SHORT_ID_LEN))
        .unwrap_or_else(|| "(pending)".to_string())
}
