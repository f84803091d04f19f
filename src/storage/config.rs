//! Configuration handling for life
//!
//! Configuration is stored in `<config dir>/life/life.toml`, or wherever
//! `--config` / `LIFE_CONFIG` points. The API secret may also come from
//! `--secret` / `LIFE_API_SECRET`, which wins over the file.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::gateway::{PropertyNames, RetryPolicy, StatusNames};

const CONFIG_FILE: &str = "life.toml";
const MIRROR_FILE: &str = "mirror.db";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("no configuration at {}; run 'life init' to create one", .0.display())]
    NotFound(PathBuf),

    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse {}: {message}", path.display())]
    Parse { path: PathBuf, message: String },

    #[error("missing required setting '{0}'")]
    Missing(&'static str),

    #[error("invalid configuration: {0}")]
    Invalid(String),

    #[error("{} already exists; pass --force to overwrite it", .0.display())]
    Exists(PathBuf),

    #[error("could not determine the configuration directory")]
    NoConfigDir,
}

/// Remote API connection settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Integration secret; prefer `LIFE_API_SECRET` over storing it here
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secret: Option<String>,

    pub base_url: String,

    /// Value of the `Notion-Version` header
    pub version: String,

    pub timeout_secs: u64,

    /// Records requested per listing page (1-100)
    pub page_size: u32,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            secret: None,
            base_url: "https://api.notion.com/v1".into(),
            version: "2022-06-28".into(),
            timeout_secs: 30,
            page_size: 100,
        }
    }
}

/// The database holding the items
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct DatabaseConfig {
    pub id: String,

    /// Emoji set as the icon of new pages
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_icon: Option<String>,
}

/// Backoff settings, see [`RetryPolicy`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub rate_limit_retries: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub transport_retries: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        let policy = RetryPolicy::default();
        Self {
            rate_limit_retries: policy.rate_limit_retries,
            initial_backoff_ms: policy.initial_backoff.as_millis() as u64,
            max_backoff_ms: policy.max_backoff.as_millis() as u64,
            transport_retries: policy.transport_retries,
        }
    }
}

impl RetryConfig {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            rate_limit_retries: self.rate_limit_retries,
            initial_backoff: Duration::from_millis(self.initial_backoff_ms),
            max_backoff: Duration::from_millis(self.max_backoff_ms),
            transport_retries: self.transport_retries,
        }
    }
}

/// Local SQLite mirror used for id prefixes and offline search
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MirrorConfig {
    pub enabled: bool,

    /// Defaults to `mirror.db` in the cache directory
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

impl Default for MirrorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: None,
        }
    }
}

impl MirrorConfig {
    /// Effective mirror location, `None` when disabled or undeterminable
    pub fn resolved_path(&self) -> Option<PathBuf> {
        if !self.enabled {
            return None;
        }
        self.path.clone().or_else(|| {
            project_dirs().map(|dirs| dirs.cache_dir().join(MIRROR_FILE))
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub api: ApiConfig,
    pub database: DatabaseConfig,
    pub properties: PropertyNames,
    pub statuses: StatusNames,
    pub retry: RetryConfig,
    pub mirror: MirrorConfig,
}

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("", "", "life")
}

impl Config {
    /// Default location of the config file
    pub fn default_path() -> Option<PathBuf> {
        project_dirs().map(|dirs| dirs.config_dir().join(CONFIG_FILE))
    }

    /// Reads and validates the config file at `path`
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return Err(ConfigError::NotFound(path.to_path_buf()))
            }
            Err(source) => {
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };

        let config = Self::parse(&content).map_err(|message| ConfigError::Parse {
            path: path.to_path_buf(),
            message,
        })?;
        config.validate()?;
        Ok(config)
    }

    fn parse(content: &str) -> Result<Self, String> {
        toml::from_str(content).map_err(|e| e.to_string())
    }

    /// Checks the values the gateway cannot work without
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.database.id.trim().is_empty() {
            return Err(ConfigError::Missing("database.id"));
        }

        let base = self.api.base_url.trim();
        if !(base.starts_with("https://") || base.starts_with("http://")) {
            return Err(ConfigError::Invalid(format!(
                "api.base_url must be an http(s) URL, got '{}'",
                self.api.base_url
            )));
        }

        if self.api.timeout_secs == 0 {
            return Err(ConfigError::Invalid("api.timeout_secs must be positive".into()));
        }

        if !(1..=100).contains(&self.api.page_size) {
            return Err(ConfigError::Invalid(
                "api.page_size must be between 1 and 100".into(),
            ));
        }

        for (key, names) in [
            ("statuses.open", &self.statuses.open),
            ("statuses.done", &self.statuses.done),
            ("statuses.archived", &self.statuses.archived),
        ] {
            if names.is_empty() {
                return Err(ConfigError::Invalid(format!("{} needs at least one name", key)));
            }
            if names.iter().any(|n| n.trim().is_empty()) {
                return Err(ConfigError::Invalid(format!("{} contains a blank name", key)));
            }
        }

        if self.retry.max_backoff_ms < self.retry.initial_backoff_ms {
            return Err(ConfigError::Invalid(format!(
                "retry.max_backoff_ms ({}) is below retry.initial_backoff_ms ({})",
                self.retry.max_backoff_ms, self.retry.initial_backoff_ms
            )));
        }

        for (key, name) in [
            ("properties.title", &self.properties.title),
            ("properties.status", &self.properties.status),
            ("properties.due", &self.properties.due),
            ("properties.tags", &self.properties.tags),
        ] {
            if name.trim().is_empty() {
                return Err(ConfigError::Missing(key));
            }
        }

        Ok(())
    }

    /// Returns the API secret, preferring `explicit` over the file
    pub fn secret(&self, explicit: Option<&str>) -> Result<String, ConfigError> {
        explicit
            .or(self.api.secret.as_deref())
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .ok_or(ConfigError::Missing("api.secret"))
    }

    /// Writes the commented template to `path`
    pub fn write_template(path: &Path, force: bool) -> Result<(), ConfigError> {
        if path.exists() && !force {
            return Err(ConfigError::Exists(path.to_path_buf()));
        }

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|source| ConfigError::Write {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        fs::write(path, TEMPLATE).map_err(|source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// Starting point written by `life init`
pub const TEMPLATE: &str = r#"# life configuration

[api]
# Integration secret. Prefer the LIFE_API_SECRET environment variable.
# secret = "secret_..."
base_url = "https://api.notion.com/v1"
version = "2022-06-28"
timeout_secs = 30
page_size = 100

[database]
# Id of the Notion database holding your items (from its URL)
id = ""
# default_icon = "📌"

[properties]
title = "Name"
status = "Status"
# "status" or "select"
status_kind = "status"
due = "Date"
tags = "Tags"

# Option names of the status property. The first name is written.
[statuses]
open = ["Not started", "In progress", "Paused"]
done = ["Done"]
archived = ["Abandoned"]

[retry]
rate_limit_retries = 5
initial_backoff_ms = 500
max_backoff_ms = 30000
transport_retries = 1

[mirror]
enabled = true
# path = "/path/to/mirror.db"
"#;
