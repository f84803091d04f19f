//! Item CLI commands

use std::io::{self, IsTerminal};

use anyhow::{bail, Context, Result};
use chrono::{Local, NaiveDate};
use clap::Args;
use dialoguer::{theme::ColorfulTheme, FuzzySelect};

use super::output::Output;
use super::render;
use super::session::{GlobalArgs, Session};
use crate::domain::{
    parse_due, CommandIntent, ItemId, ItemPatch, ItemStatus, ListFilter, RawItem, RawPatch, Tags,
    ValidationError,
};
use crate::reconcile::{ErrorKind, Outcome};

#[derive(Debug, Clone, Args)]
pub struct CreateArgs {
    /// Item title (words are joined with spaces)
    #[arg(required = true, num_args = 1..)]
    pub title: Vec<String>,

    /// Initial status (open, done, archived)
    #[arg(long, short)]
    pub status: Option<String>,

    /// Due date (YYYY-MM-DD, today, tomorrow, +3d, +2w)
    #[arg(long, short)]
    pub due: Option<String>,

    /// Tag to attach (repeatable)
    #[arg(long = "tag", short = 't')]
    pub tags: Vec<String>,
}

impl CreateArgs {
    pub fn intent(&self, today: NaiveDate) -> Result<CommandIntent, ValidationError> {
        let raw = RawItem {
            title: self.title.join(" "),
            status: self.status.clone(),
            due: self.due.clone(),
            tags: self.tags.clone(),
            ..RawItem::default()
        };
        Ok(CommandIntent::Create(raw.validate(today)?))
    }
}

#[derive(Debug, Clone, Default, Args)]
pub struct ListArgs {
    /// Include done and archived items
    #[arg(long, short, conflicts_with = "statuses")]
    pub all: bool,

    /// Only items with this status (repeatable)
    #[arg(long = "status", short)]
    pub statuses: Vec<String>,

    /// Only items carrying this tag
    #[arg(long)]
    pub tag: Option<String>,

    /// Only items due on or before this date
    #[arg(long)]
    pub due_before: Option<String>,

    /// Only items due on or after this date
    #[arg(long)]
    pub due_after: Option<String>,

    /// Only items whose title contains this text
    #[arg(long)]
    pub search: Option<String>,
}

impl ListArgs {
    /// Builds the filter; without `--all` or `--status` only open items are listed
    pub fn filter(&self, today: NaiveDate) -> Result<ListFilter, ValidationError> {
        let mut filter = if self.all {
            ListFilter::default()
        } else if self.statuses.is_empty() {
            ListFilter::open()
        } else {
            ListFilter {
                statuses: self
                    .statuses
                    .iter()
                    .map(|s| s.parse::<ItemStatus>())
                    .collect::<Result<_, _>>()?,
                ..ListFilter::default()
            }
        };
        filter.statuses.sort();
        filter.statuses.dedup();

        if let Some(tag) = &self.tag {
            filter.tag = Tags::parse([tag])?.iter().next().map(str::to_string);
        }
        if let Some(due) = &self.due_before {
            filter.due_on_or_before = Some(parse_due(due, today)?);
        }
        if let Some(due) = &self.due_after {
            filter.due_on_or_after = Some(parse_due(due, today)?);
        }
        filter.title_contains = self
            .search
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string);

        Ok(filter)
    }
}

#[derive(Debug, Clone, Default, Args)]
pub struct UpdateArgs {
    /// Item id or unique prefix
    pub id: String,

    /// New title
    #[arg(long)]
    pub title: Option<String>,

    /// New status (open, done, archived)
    #[arg(long, short)]
    pub status: Option<String>,

    /// New due date
    #[arg(long, short)]
    pub due: Option<String>,

    /// Remove the due date
    #[arg(long)]
    pub clear_due: bool,

    /// Replace all tags (comma separated, empty to clear)
    #[arg(long)]
    pub tags: Option<String>,

    /// Add a tag (repeatable)
    #[arg(long = "add-tag")]
    pub add_tags: Vec<String>,

    /// Remove a tag (repeatable)
    #[arg(long = "remove-tag")]
    pub remove_tags: Vec<String>,
}

impl UpdateArgs {
    pub fn patch(&self, today: NaiveDate) -> Result<ItemPatch, ValidationError> {
        let raw = RawPatch {
            title: self.title.clone(),
            status: self.status.clone(),
            due: self.due.clone(),
            clear_due: self.clear_due,
            tags: self
                .tags
                .as_deref()
                .map(Tags::parse_csv)
                .transpose()?
                .map(|tags| tags.iter().map(str::to_string).collect()),
            add_tags: self.add_tags.clone(),
            remove_tags: self.remove_tags.clone(),
        };
        raw.validate(today)
    }
}

fn today() -> NaiveDate {
    Local::now().date_naive()
}

pub fn create(args: &CreateArgs, globals: &GlobalArgs, output: &Output) -> Result<()> {
    let intent = args.intent(today())?;
    let mut session = Session::open(globals)?;

    let outcome = session.reconciler().execute(intent)?;
    session.remember(&outcome, false);
    report(&outcome, output);
    Ok(())
}

pub fn list(args: &ListArgs, globals: &GlobalArgs, output: &Output) -> Result<()> {
    let filter = args.filter(today())?;
    let complete = filter.is_unfiltered();
    let mut session = Session::open(globals)?;

    let outcome = session.reconciler().execute(CommandIntent::List(filter))?;
    session.remember(&outcome, complete);
    report(&outcome, output);
    Ok(())
}

pub fn show(id: &str, globals: &GlobalArgs, output: &Output) -> Result<()> {
    let outcome = by_id(id, globals, CommandIntent::Show)?;
    report(&outcome, output);
    Ok(())
}

/// Opens an item's page; without an id, picks among open mirrored items
pub fn open(id: Option<&str>, globals: &GlobalArgs, output: &Output) -> Result<()> {
    let id = match id {
        Some(id) => id.to_string(),
        None => match pick_open_item(globals)? {
            Some(id) => id,
            None => return Ok(()),
        },
    };

    let outcome = by_id(&id, globals, CommandIntent::Show)?;
    let item = match &outcome {
        Outcome::Shown(item) => item,
        _ => bail!("Unexpected result while looking up {}", id),
    };
    let url = item
        .url
        .as_deref()
        .ok_or_else(|| anyhow::anyhow!("Item {} has no URL", render::short_id(item)))?;

    webbrowser::open(url).with_context(|| format!("Failed to open {} in a browser", url))?;
    if output.is_json() {
        output.data(&serde_json::json!({ "opened": url }));
    } else {
        output.success(&format!("Opened {}", url));
    }
    Ok(())
}

/// Fuzzy picker over the open items of the mirror
///
/// Returns `None` when the user dismisses the picker.
fn pick_open_item(globals: &GlobalArgs) -> Result<Option<String>> {
    if !io::stdin().is_terminal() || !io::stderr().is_terminal() {
        return Err(ValidationError::IdRequired.into());
    }

    let mirror = Session::offline_mirror(globals)?;
    let items = mirror
        .matching(&ListFilter::open())
        .context("Failed to read the local mirror")?;
    if items.is_empty() {
        bail!("No open items in the local mirror; run 'life list' first");
    }

    let today = today();
    let labels: Vec<String> = items.iter().map(|item| render::row(item, today)).collect();
    let choice = FuzzySelect::with_theme(&ColorfulTheme::default())
        .with_prompt("Open item")
        .default(0)
        .items(&labels)
        .interact_opt()?;

    Ok(choice
        .and_then(|index| items.get(index))
        .and_then(|item| item.id.as_ref())
        .map(ItemId::to_string))
}

pub fn update(args: &UpdateArgs, globals: &GlobalArgs, output: &Output) -> Result<()> {
    let patch = args.patch(today())?;
    let outcome = by_id(&args.id, globals, |id| CommandIntent::Update { id, patch })?;
    report(&outcome, output);
    Ok(())
}

pub fn delete(id: &str, globals: &GlobalArgs, output: &Output) -> Result<()> {
    let outcome = by_id(id, globals, CommandIntent::Delete)?;
    report(&outcome, output);
    Ok(())
}

pub fn search(query: &str, globals: &GlobalArgs, output: &Output) -> Result<()> {
    let mirror = Session::offline_mirror(globals)?;
    let items = mirror.search(query).context("Failed to search the local mirror")?;

    if output.is_json() {
        output.data(&items);
    } else if items.is_empty() {
        output.success(&format!("No mirrored items match '{}'", query.trim()));
    } else {
        output.lines(&render::table(&items, today()));
    }
    Ok(())
}

/// Runs an intent targeting one item, resolving id prefixes first
fn by_id(
    raw_id: &str,
    globals: &GlobalArgs,
    intent: impl FnOnce(ItemId) -> CommandIntent,
) -> Result<Outcome> {
    let id: ItemId = raw_id.parse()?;
    let mut session = Session::open(globals)?;
    let id = session.resolve_id(id)?;

    let result = session.reconciler().execute(intent(id.clone()));
    match result {
        Ok(outcome) => {
            session.remember(&outcome, false);
            Ok(outcome)
        }
        Err(err) => {
            if err.kind() == ErrorKind::NotFound {
                session.forget(&id);
            }
            Err(err.into())
        }
    }
}

fn report(outcome: &Outcome, output: &Output) {
    match outcome {
        Outcome::Created(item) => {
            if output.is_json() {
                output.data(item);
            } else {
                output.success(&format!("Created {}: {}", render::short_id(item), item.title));
            }
        }
        Outcome::Listed { items, rejected } => {
            for line in render::rejected(rejected) {
                output.warn(&line);
            }
            if output.is_json() {
                output.data(&serde_json::json!({ "items": items, "rejected": rejected }));
            } else if items.is_empty() {
                output.success("No items");
            } else {
                output.lines(&render::table(items, today()));
            }
        }
        Outcome::Shown(item) => {
            if output.is_json() {
                output.data(item);
            } else {
                output.lines(&render::detail(item));
            }
        }
        Outcome::Updated { item, changed } => {
            if output.is_json() {
                output.data(&serde_json::json!({ "item": item, "changed": changed }));
            } else {
                output.success(&render::changed(item, changed));
            }
        }
        Outcome::Unchanged(item) => {
            if output.is_json() {
                output.data(&serde_json::json!({ "item": item, "changed": [] }));
            } else {
                output.success(&format!("{} already up to date", render::short_id(item)));
            }
        }
        Outcome::Deleted(id) => {
            if output.is_json() {
                output.data(&serde_json::json!({ "deleted": id }));
            } else {
                output.success(&format!("Deleted {}", id));
            }
        }
    }
}
