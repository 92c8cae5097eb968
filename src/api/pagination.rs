//! Transparent page assembly
//!
//! Both protocols paginate list calls. Managers feed every page into a
//! [`PageCursor`], which refuses cursors that do not advance, and then hand
//! the collected records to [`assemble`] for de-duplication and a stable
//! order. Callers only ever see the complete result.

use crate::error::{Error, Result};
use std::collections::{BTreeMap, HashSet};

/// Tracks continuation tokens across pages of one logical list call
#[derive(Debug)]
pub struct PageCursor {
    operation: String,
    seen: HashSet<String>,
    pages: usize,
}

impl PageCursor {
    pub fn new(operation: &str) -> Self {
        Self {
            operation: operation.to_string(),
            seen: HashSet::new(),
            pages: 0,
        }
    }

    /// Record a finished page and decide whether to fetch another
    ///
    /// Returns the next token, `None` at the end, or an internal error when
    /// the array hands back a token it already returned.
    pub fn advance(&mut self, next: Option<&str>) -> Result<Option<String>> {
        self.pages += 1;
        let next = match next.map(str::trim) {
            None | Some("") => return Ok(None),
            Some(token) => token.to_string(),
        };
        if !self.seen.insert(next.clone()) {
            return Err(Error::internal(
                &self.operation,
                format!("pagination did not advance after {} pages", self.pages),
            ));
        }
        Ok(Some(next))
    }

    pub fn pages(&self) -> usize {
        self.pages
    }
}

/// De-duplicate by identity and order by identity
pub fn assemble<T, F>(records: impl IntoIterator<Item = T>, key: F) -> Vec<T>
where
    F: Fn(&T) -> String,
{
    let mut by_key = BTreeMap::new();
    for record in records {
        by_key.entry(key(&record)).or_insert(record);
    }
    by_key.into_values().collect()
}

/// Compile a glob used to filter names
pub fn name_pattern(pattern: &str) -> Result<glob::Pattern> {
    glob::Pattern::new(pattern)
        .map_err(|e| Error::InvalidArgument(format!("invalid pattern '{}': {}", pattern, e)))
}
