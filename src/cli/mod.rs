//! # Command-Line Interface
//!
//! User-facing commands, output formatting and per-invocation wiring.
//!
//! | Command | Purpose |
//! |---------|---------|
//! | `init` | Write a configuration template |
//! | `create`, `list`, `show`, `update`, `delete` | Remote item operations |
//! | `open` | Open an item's page in the browser |
//! | `search` | Offline full-text search of the local mirror |
//!
//! ## Output Formats
//!
//! All commands support the `--format` flag:
//! - `text` (default) - Human-readable output
//! - `json` - Machine-parseable JSON
//!
//! Diagnostics go to stderr; raise them with `-v` or `LIFE_LOG`.
//!
//! ## Entry Point
//!
//! Call [`run()`] to parse arguments and execute the appropriate command.

mod app;
mod item;
mod logging;
mod output;
mod render;
mod session;

pub use app::{run, Cli, Commands};
pub use output::{Output, OutputFormat};
