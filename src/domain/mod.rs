//! Domain models for life
//!
//! Pure validation and data types without any I/O concerns. Everything the
//! gateway reads from the remote service passes through [`RawItem::validate`]
//! before the rest of the crate sees it.

mod date;
mod id;
mod intent;
mod item;
mod patch;
mod tags;
mod validation;

pub use date::{format_due, parse_due, DATE_FORMAT};
pub use id::{ItemId, Revision};
pub use intent::{CommandIntent, ListFilter};
pub use item::{validate_title, Field, Item, ItemStatus, RawItem, MAX_TITLE_LEN};
pub use patch::{DueChange, FieldChanges, ItemPatch, RawPatch, TagEdit};
pub use tags::{Tags, MAX_TAG_LEN};
pub use validation::ValidationError;
