//! Tag sets
//!
//! Tags are trimmed, deduplicated and kept in sorted order, so two sets built
//! from the same names in any order compare equal.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

use super::validation::ValidationError;

/// Maximum length of a single tag name
pub const MAX_TAG_LEN: usize = 100;

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "Vec<String>", into = "Vec<String>")]
pub struct Tags(BTreeSet<String>);

impl Tags {
    pub fn new() -> Self {
        Self(BTreeSet::new())
    }

    /// Validates and normalizes a list of raw tag names
    pub fn parse<I, S>(raw: I) -> Result<Self, ValidationError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut tags = BTreeSet::new();
        for name in raw {
            tags.insert(validate_tag(name.as_ref())?);
        }
        Ok(Self(tags))
    }

    /// Splits a comma separated list (`"home, errands"`) and validates it
    pub fn parse_csv(raw: &str) -> Result<Self, ValidationError> {
        Self::parse(raw.split(',').filter(|part| !part.trim().is_empty()))
    }

    pub fn contains(&self, tag: &str) -> bool {
        self.0.contains(tag)
    }

    pub fn insert(&mut self, tag: impl Into<String>) -> bool {
        self.0.insert(tag.into())
    }

    pub fn remove(&mut self, tag: &str) -> bool {
        self.0.remove(tag)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    /// Returns tags shared with `other`
    pub fn intersection<'a>(&'a self, other: &'a Tags) -> impl Iterator<Item = &'a str> {
        self.0.intersection(&other.0).map(String::as_str)
    }

    /// Returns `(self ∪ add) − remove`
    pub fn edited(&self, add: &Tags, remove: &Tags) -> Tags {
        let mut result = self.0.clone();
        result.extend(add.0.iter().cloned());
        for tag in &remove.0 {
            result.remove(tag);
        }
        Tags(result)
    }
}

fn validate_tag(name: &str) -> Result<String, ValidationError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(ValidationError::InvalidTag("tag names must not be empty".into()));
    }
    // The remote service uses commas to separate select options
    if name.contains(',') {
        return Err(ValidationError::InvalidTag(format!(
            "'{}' must not contain a comma",
            name
        )));
    }
    if name.chars().count() > MAX_TAG_LEN {
        return Err(ValidationError::InvalidTag(format!(
            "'{}' is longer than {} characters",
            name, MAX_TAG_LEN
        )));
    }
    Ok(name.to_string())
}

impl fmt::Display for Tags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let joined: Vec<&str> = self.iter().collect();
        f.write_str(&joined.join(", "))
    }
}

impl TryFrom<Vec<String>> for Tags {
    type Error = ValidationError;

    fn try_from(value: Vec<String>) -> Result<Self, Self::Error> {
        Tags::parse(value)
    }
}

impl From<Tags> for Vec<String> {
    fn from(tags: Tags) -> Self {
        tags.0.into_iter().collect()
    }
}

impl<'a> IntoIterator for &'a Tags {
    type Item = &'a String;
    type IntoIter = std::collections::btree_set::Iter<'a, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}
