//! Bounded Line Window
//!
//! Fixed-capacity buffer of the most recent lines of one session. Lines are
//! kept in arrival order (oldest first); once the capacity is reached every
//! push evicts the oldest line. Snapshots are immutable copies, so a later
//! push never changes a snapshot that has already been published.

use std::collections::VecDeque;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::category::Category;

/// Default number of lines kept per window
pub const DEFAULT_WINDOW_CAPACITY: usize = 20;

/// A complete line tagged with the category of the session that produced it
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Line {
    text: Arc<str>,
    category: Category,
}

impl Line {
    /// Create a line
    pub fn new(text: impl Into<Arc<str>>, category: Category) -> Self {
        Self {
            text: text.into(),
            category,
        }
    }

    /// Line text, without terminator, exactly as decoded
    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Category of the producing session
    #[must_use]
    pub fn category(&self) -> Category {
        self.category
    }

    /// Line text with ANSI SGR sequences (`ESC [ ... m`) removed
    ///
    /// Producers embed color codes in the stream; renderers that choose
    /// their own colors want the bare text.
    #[must_use]
    pub fn plain_text(&self) -> String {
        strip_sgr(&self.text)
    }
}

fn strip_sgr(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(start) = rest.find("\x1b[") {
        out.push_str(&rest[..start]);
        let params = &rest[start + 2..];
        let param_len = params
            .find(|c: char| !(c.is_ascii_digit() || c == ';'))
            .unwrap_or(params.len());

        if params[param_len..].starts_with('m') {
            rest = &params[param_len + 1..];
        } else {
            // Not a color sequence, keep the escape byte verbatim
            out.push('\x1b');
            rest = &rest[start + 1..];
        }
    }

    out.push_str(rest);
    out
}

/// Immutable, ordered view of a window (oldest line first)
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WindowSnapshot {
    lines: Arc<[Line]>,
}

impl Default for WindowSnapshot {
    fn default() -> Self {
        Self {
            lines: Arc::from(Vec::new()),
        }
    }
}

impl WindowSnapshot {
    /// Number of lines in the snapshot
    #[must_use]
    pub fn len(&self) -> usize {
        self.lines.len()
    }

    /// Whether the snapshot holds no lines
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Lines, oldest first
    #[must_use]
    pub fn lines(&self) -> &[Line] {
        &self.lines
    }

    /// Iterate lines, oldest first
    pub fn iter(&self) -> std::slice::Iter<'_, Line> {
        self.lines.iter()
    }

    /// Text of every line, oldest first
    #[must_use]
    pub fn texts(&self) -> Vec<&str> {
        self.lines.iter().map(Line::text).collect()
    }

    /// The most recently arrived line
    #[must_use]
    pub fn newest(&self) -> Option<&Line> {
        self.lines.last()
    }
}

impl<'a> IntoIterator for &'a WindowSnapshot {
    type Item = &'a Line;
    type IntoIter = std::slice::Iter<'a, Line>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Capacity-bounded window of recent lines
#[derive(Debug)]
pub struct LineWindow {
    lines: VecDeque<Line>,
    capacity: usize,
    total_pushed: u64,
    total_evicted: u64,
}

impl Default for LineWindow {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW_CAPACITY)
    }
}

impl LineWindow {
    /// Create a window holding at most `capacity` lines (minimum 1)
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            lines: VecDeque::with_capacity(capacity),
            capacity,
            total_pushed: 0,
            total_evicted: 0,
        }
    }

    /// Append a line, evicting the oldest when full
    ///
    /// Returns the evicted line, if any.
    pub fn push(&mut self, line: Line) -> Option<Line> {
        self.lines.push_back(line);
        self.total_pushed += 1;

        if self.lines.len() > self.capacity {
            self.total_evicted += 1;
            return self.lines.pop_front();
        }
        None
    }

    /// Copy the current contents into an immutable snapshot
    #[must_use]
    pub fn snapshot(&self) -> WindowSnapshot {
        WindowSnapshot {
            lines: self.lines.iter().cloned().collect(),
        }
    }

    /// Number of lines currently held
    #[must_use]
    pub fn len(&self) -> usize {
        self.lines.len()
    }

    /// Whether the window is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Maximum number of lines held
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Lines pushed over the window's lifetime
    #[must_use]
    pub fn total_pushed(&self) -> u64 {
        self.total_pushed
    }

    /// Lines evicted over the window's lifetime
    #[must_use]
    pub fn total_evicted(&self) -> u64 {
        self.total_evicted
    }
}
