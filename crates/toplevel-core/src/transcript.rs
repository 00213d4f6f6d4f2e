//! Per-query answer buffers.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::event::{Fragment, Target};

/// Default scrollback size limit (1 MB).
const SCROLLBACK_BYTES: usize = 1024 * 1024;

/// Query record identifier.
pub type QueryId = u64;

/// Output of one solution of one query. Append-only.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnswerBuffer {
    fragments: Vec<Fragment>,
}

impl AnswerBuffer {
    /// Fragments in write order.
    #[must_use]
    pub fn fragments(&self) -> &[Fragment] {
        &self.fragments
    }

    /// Concatenated text of all fragments.
    #[must_use]
    pub fn text(&self) -> String {
        self.fragments.iter().map(|f| f.text.as_str()).collect()
    }
}

/// A submitted query and its answers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryRecord {
    pub id: QueryId,
    pub text: String,
    pub answers: Vec<AnswerBuffer>,
    pub collapsed: bool,
}

/// Ordered query records plus the general scrollback.
///
/// At most one answer buffer is current; output lands there, or in the
/// scrollback when no query is active. The scrollback is bounded in bytes
/// and drops its oldest fragments first; query records are kept until
/// closed.
#[derive(Debug, Clone)]
pub struct Transcript {
    scrollback: VecDeque<Fragment>,
    scrollback_bytes: usize,
    scrollback_limit: usize,
    queries: Vec<QueryRecord>,
    current: Option<(QueryId, usize)>,
    ignore_blank: bool,
    next_id: QueryId,
}

impl Default for Transcript {
    fn default() -> Self {
        Self::with_scrollback_limit(SCROLLBACK_BYTES)
    }
}

impl Transcript {
    /// Create an empty transcript.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty transcript whose scrollback keeps at most `bytes`
    /// of text.
    #[must_use]
    pub const fn with_scrollback_limit(bytes: usize) -> Self {
        Self {
            scrollback: VecDeque::new(),
            scrollback_bytes: 0,
            scrollback_limit: bytes,
            queries: Vec::new(),
            current: None,
            ignore_blank: false,
            next_id: 0,
        }
    }

    /// Start a query: collapse the previous record and make a fresh first
    /// answer buffer current.
    pub fn start_query(&mut self, text: impl Into<String>) -> QueryId {
        if let Some(prev) = self.queries.last_mut() {
            prev.collapsed = true;
        }

        let id = self.next_id;
        self.next_id += 1;
        self.queries.push(QueryRecord {
            id,
            text: text.into(),
            answers: vec![AnswerBuffer::default()],
            collapsed: false,
        });
        self.current = Some((id, 0));
        self.ignore_blank = false;
        id
    }

    /// Open a sibling answer buffer after the current one.
    ///
    /// The blank line the engine prints before the next solution is
    /// swallowed. Returns `None` when no answer is current.
    pub fn next_answer(&mut self) -> Option<(QueryId, usize)> {
        let (id, _) = self.current?;
        let record = self.queries.iter_mut().find(|q| q.id == id)?;
        record.answers.push(AnswerBuffer::default());
        let index = record.answers.len() - 1;
        self.current = Some((id, index));
        self.ignore_blank = true;
        Some((id, index))
    }

    /// Swallow the next fragment if it is a blank line.
    pub fn suppress_next_blank(&mut self) {
        self.ignore_blank = true;
    }

    /// Send further output to the scrollback.
    pub fn detach(&mut self) {
        self.current = None;
        self.ignore_blank = false;
    }

    /// Append a fragment to the current target.
    ///
    /// Returns `None` when the fragment was suppressed.
    pub fn write(&mut self, fragment: Fragment) -> Option<Target> {
        let ignore_blank = std::mem::take(&mut self.ignore_blank);

        if let Some((id, index)) = self.current {
            if ignore_blank && fragment.is_blank() {
                return None;
            }
            if let Some(answer) = self
                .queries
                .iter_mut()
                .find(|q| q.id == id)
                .and_then(|q| q.answers.get_mut(index))
            {
                answer.fragments.push(fragment);
                return Some(Target::Answer { query: id, answer: index });
            }
        }

        self.push_scrollback(fragment);
        Some(Target::Scrollback)
    }

    fn push_scrollback(&mut self, fragment: Fragment) {
        let bytes = fragment.text.len();
        while self.scrollback_bytes.saturating_add(bytes) > self.scrollback_limit {
            let Some(front) = self.scrollback.pop_front() else {
                break;
            };
            self.scrollback_bytes = self.scrollback_bytes.saturating_sub(front.text.len());
        }
        self.scrollback.push_back(fragment);
        self.scrollback_bytes = self.scrollback_bytes.saturating_add(bytes);
    }

    /// Set, or toggle when `how` is `None`, the collapsed flag of a record.
    pub fn set_collapsed(&mut self, id: QueryId, how: Option<bool>) -> Option<bool> {
        let record = self.queries.iter_mut().find(|q| q.id == id)?;
        record.collapsed = how.unwrap_or(!record.collapsed);
        Some(record.collapsed)
    }

    /// Remove a record. Output of a closed current query goes to scrollback.
    pub fn close(&mut self, id: QueryId) -> bool {
        let before = self.queries.len();
        self.queries.retain(|q| q.id != id);
        if self.current.is_some_and(|(cur, _)| cur == id) {
            self.detach();
        }
        self.queries.len() != before
    }

    /// All query records, oldest first.
    #[must_use]
    pub fn queries(&self) -> &[QueryRecord] {
        &self.queries
    }

    /// Look up a record.
    #[must_use]
    pub fn query(&self, id: QueryId) -> Option<&QueryRecord> {
        self.queries.iter().find(|q| q.id == id)
    }

    /// The most recent record.
    #[must_use]
    pub fn last_query(&self) -> Option<&QueryRecord> {
        self.queries.last()
    }

    /// Output written outside any query, oldest first.
    #[must_use]
    pub const fn scrollback(&self) -> &VecDeque<Fragment> {
        &self.scrollback
    }

    /// The current answer buffer position.
    #[must_use]
    pub const fn current(&self) -> Option<(QueryId, usize)> {
        self.current
    }
}
