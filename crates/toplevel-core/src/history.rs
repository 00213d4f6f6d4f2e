//! Bounded query history with a recall cursor.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

/// Default number of remembered queries.
pub const DEFAULT_HISTORY_LIMIT: usize = 1000;

/// Submitted queries plus a navigation cursor.
///
/// While navigating, the cursor is an index in `0..=len`; `len` stands for
/// the draft that was being edited when navigation started.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryLog {
    stack: VecDeque<String>,
    #[serde(skip)]
    current: Option<usize>,
    #[serde(skip)]
    saved: String,
    #[serde(skip, default = "default_limit")]
    limit: usize,
}

const fn default_limit() -> usize {
    DEFAULT_HISTORY_LIMIT
}

impl Default for HistoryLog {
    fn default() -> Self {
        Self::with_limit(DEFAULT_HISTORY_LIMIT)
    }
}

impl HistoryLog {
    /// Create an empty log keeping at most `limit` entries.
    #[must_use]
    pub fn with_limit(limit: usize) -> Self {
        Self {
            stack: VecDeque::new(),
            current: None,
            saved: String::new(),
            limit: limit.max(1),
        }
    }

    /// Restore a log from persisted entries, keeping the newest.
    #[must_use]
    pub fn from_entries(entries: impl IntoIterator<Item = String>, limit: usize) -> Self {
        let mut log = Self::with_limit(limit);
        for entry in entries {
            log.push(entry);
        }
        log
    }

    /// Record a submitted query and leave navigation.
    pub fn push(&mut self, query: impl Into<String>) {
        self.stack.push_back(query.into());
        while self.stack.len() > self.limit {
            self.stack.pop_front();
        }
        self.current = None;
    }

    /// Move to an older entry.
    ///
    /// `draft` is the text currently being edited; it is saved when
    /// navigation starts. Returns the text to show, or `None` if the input
    /// should stay as it is.
    pub fn up(&mut self, draft: &str) -> Option<String> {
        let cursor = match self.current {
            Some(cursor) => cursor,
            None => {
                self.saved = draft.to_string();
                self.stack.len()
            }
        };
        self.current = Some(cursor);

        if cursor == 0 {
            return None;
        }
        self.current = Some(cursor - 1);
        self.stack.get(cursor - 1).cloned()
    }

    /// Move to a newer entry, ending at the saved draft.
    pub fn down(&mut self) -> Option<String> {
        let cursor = self.current?;
        if cursor >= self.stack.len() {
            return None;
        }

        let cursor = cursor + 1;
        self.current = Some(cursor);
        if cursor < self.stack.len() {
            self.stack.get(cursor).cloned()
        } else {
            Some(self.saved.clone())
        }
    }

    /// The navigation cursor, `None` when not navigating.
    #[must_use]
    pub const fn cursor(&self) -> Option<usize> {
        self.current
    }

    /// Entries, oldest first.
    pub fn entries(&self) -> impl Iterator<Item = &str> {
        self.stack.iter().map(String::as_str)
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.stack.len()
    }

    /// Whether the log is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stack.is_empty()
    }
}
