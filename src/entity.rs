//! Entity identifiers and the cache keys derived from them.
//!
//! An entity is whatever a job fetches data for: usually a ticker symbol, sometimes a
//! filing subject. Ids are normalized on construction so that `aapl`, ` AAPL ` and
//! `AAPL` all land on the same cache file.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::error::{Result, StockpileError};

/// A normalized, uppercase entity identifier.
///
/// Construction trims surrounding whitespace, uppercases the id and rejects anything
/// that could not be used verbatim as a single path component (empty ids, embedded
/// whitespace, path separators, `.` and `..`).
///
/// ```rust
/// # use stockpile::EntityId;
/// let id = EntityId::new(" brk.b ")?;
/// assert_eq!(id.as_str(), "BRK.B");
/// assert!(EntityId::new("../etc").is_err());
/// # Ok::<(), stockpile::StockpileError>(())
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct EntityId(String);

impl EntityId {
    pub fn new(raw: impl AsRef<str>) -> Result<Self> {
        let normalized = raw.as_ref().trim().to_uppercase();

        if normalized.is_empty()
            || normalized == "."
            || normalized == ".."
            || normalized
                .chars()
                .any(|c| c.is_whitespace() || c.is_control() || c == '/' || c == '\\')
        {
            return Err(StockpileError::InvalidEntity(raw.as_ref().to_string()));
        }

        Ok(Self(normalized))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for EntityId {
    type Err = StockpileError;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

impl TryFrom<String> for EntityId {
    type Error = StockpileError;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}

impl From<EntityId> for String {
    fn from(id: EntityId) -> Self {
        id.0
    }
}

impl AsRef<str> for EntityId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Identifies one persisted snapshot: the entity and the day it was fetched for.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub entity: EntityId,
    pub as_of: NaiveDate,
}

impl CacheKey {
    pub fn new(entity: EntityId, as_of: NaiveDate) -> Self {
        Self { entity, as_of }
    }

    /// File name of the snapshot, `{YYYY-MM-DD}-{ENTITY_ID}.json`.
    pub fn file_name(&self) -> String {
        format!("{}-{}.json", self.as_of.format("%Y-%m-%d"), self.entity)
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.entity, self.as_of)
    }
}
