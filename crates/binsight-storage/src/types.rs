//! Paging and sorting parameters.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::PersistenceError;

/// Default number of rows returned by `get_many`/`find_many`.
pub const DEFAULT_PAGE_LIMIT: u64 = 100;

/// Offset-based page of results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    /// Number of leading results to skip.
    pub skip: u64,
    /// Maximum number of results to return.
    pub limit: u64,
}

impl Default for Page {
    fn default() -> Self {
        Self {
            skip: 0,
            limit: DEFAULT_PAGE_LIMIT,
        }
    }
}

impl Page {
    /// Creates a page.
    #[must_use]
    pub fn new(skip: u64, limit: u64) -> Self {
        Self { skip, limit }
    }

    /// A page without an upper bound.
    #[must_use]
    pub fn unbounded() -> Self {
        Self {
            skip: 0,
            limit: u64::MAX,
        }
    }

    /// `skip` as a SQL `OFFSET` value.
    #[must_use]
    pub fn offset_i64(&self) -> i64 {
        i64::try_from(self.skip).unwrap_or(i64::MAX)
    }

    /// `limit` as a SQL `LIMIT` value.
    #[must_use]
    pub fn limit_i64(&self) -> i64 {
        i64::try_from(self.limit).unwrap_or(i64::MAX)
    }

    /// Applies the page to an in-memory iterator.
    pub fn apply<T>(&self, items: impl IntoIterator<Item = T>) -> Vec<T> {
        items
            .into_iter()
            .skip(usize::try_from(self.skip).unwrap_or(usize::MAX))
            .take(usize::try_from(self.limit).unwrap_or(usize::MAX))
            .collect()
    }
}

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    Ascending,
    Descending,
}

/// One key of a lexicographic sort over document paths.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortKey {
    /// Dotted field path.
    pub path: String,
    /// Direction for this key.
    pub direction: SortDirection,
}

impl SortKey {
    /// Creates an ascending sort key.
    #[must_use]
    pub fn asc(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            direction: SortDirection::Ascending,
        }
    }

    /// Creates a descending sort key.
    #[must_use]
    pub fn desc(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            direction: SortDirection::Descending,
        }
    }

    /// Returns true for descending keys.
    #[must_use]
    pub fn is_descending(&self) -> bool {
        self.direction == SortDirection::Descending
    }

    /// Parses a `{"path": 1, "other": -1}` specification, keeping key order.
    pub fn parse_spec(spec: &Value) -> Result<Vec<SortKey>, PersistenceError> {
        let Value::Object(map) = spec else {
            return Err(PersistenceError::invalid_query(
                "sort specification must be an object",
            ));
        };
        if map.is_empty() {
            return Err(PersistenceError::invalid_query(
                "sort specification must name at least one field",
            ));
        }
        map.iter()
            .map(|(path, dir)| match dir.as_i64() {
                Some(1) => Ok(SortKey::asc(path.clone())),
                Some(-1) => Ok(SortKey::desc(path.clone())),
                _ => Err(PersistenceError::invalid_query(format!(
                    "sort direction for '{path}' must be 1 or -1"
                ))),
            })
            .collect()
    }
}
