//! SQLite mirror of remote items
//!
//! The mirror remembers what the remote service last returned so ids can be
//! abbreviated and items searched offline. It is never authoritative: every
//! command still goes to the remote service, and a broken mirror only costs
//! those conveniences.

use std::fs;
use std::path::{Path, PathBuf};

use rusqlite::{params, Connection, OptionalExtension};
use thiserror::Error;

use crate::domain::{Item, ItemId, ListFilter};

/// Shortest prefix looked up in the mirror
pub const MIN_PREFIX_LEN: usize = 4;

#[derive(Debug, Error)]
pub enum MirrorError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("corrupt mirror row: {0}")]
    Corrupt(#[from] serde_json::Error),
}

/// Result of looking up an abbreviated id
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PrefixMatch {
    Unique(ItemId),
    Ambiguous(usize),
    Unknown,
}

pub struct Mirror {
    db_path: Option<PathBuf>,
    conn: Connection,
}

impl Mirror {
    /// Schema version - bump when schema changes to force rebuild
    const SCHEMA_VERSION: i32 = 1;

    /// Creates or opens the mirror at `path`
    pub fn open(path: &Path) -> Result<Self, MirrorError> {
        if let Some(dir) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(dir)?;
        }

        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;

        let mut mirror = Self {
            db_path: Some(path.to_path_buf()),
            conn,
        };
        mirror.ensure_schema()?;
        Ok(mirror)
    }

    /// Opens a throwaway mirror
    pub fn in_memory() -> Result<Self, MirrorError> {
        let mut mirror = Self {
            db_path: None,
            conn: Connection::open_in_memory()?,
        };
        mirror.ensure_schema()?;
        Ok(mirror)
    }

    fn ensure_schema(&mut self) -> Result<(), MirrorError> {
        if self.schema_version()? != Self::SCHEMA_VERSION {
            self.create_schema()?;
        }
        Ok(())
    }

    fn schema_version(&self) -> Result<i32, MirrorError> {
        let version: Option<i32> = self
            .conn
            .query_row("PRAGMA user_version", [], |row| row.get(0))
            .optional()?;
        Ok(version.unwrap_or(0))
    }

    fn create_schema(&mut self) -> Result<(), MirrorError> {
        self.conn.execute_batch(
            "
            DROP TABLE IF EXISTS items_fts;
            DROP TABLE IF EXISTS items;

            CREATE TABLE items (
                id TEXT PRIMARY KEY,
                compact TEXT NOT NULL,
                title TEXT NOT NULL,
                tags TEXT NOT NULL,
                data TEXT NOT NULL
            );

            CREATE INDEX idx_items_compact ON items(compact);

            CREATE VIRTUAL TABLE items_fts USING fts5(
                title,
                tags,
                content='items',
                content_rowid='rowid'
            );

            CREATE TRIGGER items_ai AFTER INSERT ON items BEGIN
                INSERT INTO items_fts(rowid, title, tags)
                VALUES (NEW.rowid, NEW.title, NEW.tags);
            END;

            CREATE TRIGGER items_ad AFTER DELETE ON items BEGIN
                INSERT INTO items_fts(items_fts, rowid, title, tags)
                VALUES ('delete', OLD.rowid, OLD.title, OLD.tags);
            END;

            CREATE TRIGGER items_au AFTER UPDATE ON items BEGIN
                INSERT INTO items_fts(items_fts, rowid, title, tags)
                VALUES ('delete', OLD.rowid, OLD.title, OLD.tags);
                INSERT INTO items_fts(rowid, title, tags)
                VALUES (NEW.rowid, NEW.title, NEW.tags);
            END;
            ",
        )?;

        self.conn.execute(
            &format!("PRAGMA user_version = {}", Self::SCHEMA_VERSION),
            [],
        )?;
        Ok(())
    }

    /// Records the remote state of synced items; pending items are ignored
    pub fn upsert_all(&mut self, items: &[Item]) -> Result<(), MirrorError> {
        let tx = self.conn.transaction()?;
        for item in items {
            upsert(&tx, item)?;
        }
        tx.commit()?;
        Ok(())
    }

    pub fn upsert(&mut self, item: &Item) -> Result<(), MirrorError> {
        upsert(&self.conn, item)
    }

    /// Replaces the whole mirror with a complete, unfiltered listing
    pub fn replace_all(&mut self, items: &[Item]) -> Result<(), MirrorError> {
        let tx = self.conn.transaction()?;
        tx.execute("DELETE FROM items", [])?;
        for item in items {
            upsert(&tx, item)?;
        }
        tx.commit()?;
        Ok(())
    }

    pub fn remove(&self, id: &ItemId) -> Result<bool, MirrorError> {
        let removed = self
            .conn
            .execute("DELETE FROM items WHERE id = ?1", params![id.as_str()])?;
        Ok(removed > 0)
    }

    pub fn get(&self, id: &ItemId) -> Result<Option<Item>, MirrorError> {
        let data: Option<String> = self
            .conn
            .query_row(
                "SELECT data FROM items WHERE id = ?1",
                params![id.as_str()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(data.map(|d| serde_json::from_str(&d)).transpose()?)
    }

    /// Looks up an abbreviated id
    ///
    /// Dashes and case are ignored. Prefixes shorter than
    /// [`MIN_PREFIX_LEN`] are never looked up.
    pub fn resolve_prefix(&self, prefix: &str) -> Result<PrefixMatch, MirrorError> {
        let needle: String = prefix
            .trim()
            .chars()
            .filter(|c| *c != '-')
            .flat_map(char::to_lowercase)
            .collect();

        if needle.chars().count() < MIN_PREFIX_LEN {
            return Ok(PrefixMatch::Unknown);
        }

        let mut stmt = self.conn.prepare(
            "SELECT id FROM items WHERE substr(lower(compact), 1, length(?1)) = ?1 ORDER BY id",
        )?;
        let ids: Vec<String> = stmt
            .query_map(params![needle], |row| row.get(0))?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(match ids.len() {
            0 => PrefixMatch::Unknown,
            1 => match ids[0].parse::<ItemId>() {
                Ok(id) => PrefixMatch::Unique(id),
                Err(_) => PrefixMatch::Unknown,
            },
            n => PrefixMatch::Ambiguous(n),
        })
    }

    /// Full-text search over titles and tags, best matches first
    pub fn search(&self, query: &str) -> Result<Vec<Item>, MirrorError> {
        let query = fts_query(query);
        if query.is_empty() {
            return Ok(Vec::new());
        }

        let mut stmt = self.conn.prepare(
            "SELECT items.data FROM items_fts
             JOIN items ON items.rowid = items_fts.rowid
             WHERE items_fts MATCH ?1
             ORDER BY items_fts.rank LIMIT 50",
        )?;
        let rows = stmt
            .query_map(params![query], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;

        rows.iter()
            .map(|data| serde_json::from_str(data).map_err(MirrorError::from))
            .collect()
    }

    /// Mirrored items selected by `filter`, soonest due first
    pub fn matching(&self, filter: &ListFilter) -> Result<Vec<Item>, MirrorError> {
        let mut stmt = self.conn.prepare("SELECT data FROM items")?;
        let rows = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;

        let mut items = Vec::with_capacity(rows.len());
        for data in &rows {
            let item: Item = serde_json::from_str(data)?;
            if filter.matches(&item) {
                items.push(item);
            }
        }
        items.sort_by(|a, b| {
            (a.due.is_none(), a.due, &a.title).cmp(&(b.due.is_none(), b.due, &b.title))
        });
        Ok(items)
    }

    pub fn len(&self) -> Result<usize, MirrorError> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM items", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    pub fn is_empty(&self) -> Result<bool, MirrorError> {
        Ok(self.len()? == 0)
    }

    /// Returns the path to the mirror database, `None` for in-memory mirrors
    pub fn path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }
}

fn upsert(conn: &Connection, item: &Item) -> Result<(), MirrorError> {
    let id = match &item.id {
        Some(id) => id,
        None => return Ok(()),
    };

    let tags: Vec<&str> = item.tags.iter().collect();
    conn.execute(
        "INSERT INTO items (id, compact, title, tags, data) VALUES (?1, ?2, ?3, ?4, ?5)
         ON CONFLICT(id) DO UPDATE SET
             compact = excluded.compact,
             title = excluded.title,
             tags = excluded.tags,
             data = excluded.data",
        params![
            id.as_str(),
            id.compact(),
            item.title,
            tags.join(" "),
            serde_json::to_string(item)?,
        ],
    )?;
    Ok(())
}

/// Quotes each word so user input is never parsed as FTS syntax
fn fts_query(input: &str) -> String {
    input
        .split_whitespace()
        .map(|word| format!("\"{}\"", word.replace('"', "\"\"")))
        .collect::<Vec<_>>()
        .join(" ")
}
