//! # Storage Layer
//!
//! Local state of the CLI. The remote database is the source of truth;
//! nothing here is required for a command to succeed except the config.
//!
//! | Data | Format | Location |
//! |------|--------|----------|
//! | Config | TOML | `<config dir>/life/life.toml` |
//! | Mirror | SQLite + FTS5 | `<cache dir>/life/mirror.db` |
//!
//! ## Key Types
//!
//! - [`Config`] - Connection, property mapping and retry settings
//! - [`Mirror`] - Last known remote state for id prefixes and offline search

mod config;
mod mirror;

pub use config::{
    ApiConfig, Config, ConfigError, DatabaseConfig, MirrorConfig, RetryConfig, TEMPLATE,
};
pub use mirror::{Mirror, MirrorError, PrefixMatch, MIN_PREFIX_LEN};
